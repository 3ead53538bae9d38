//! Per-invocation log file naming.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::fs;
use tracing::warn;

const FALLBACK_DIR: &str = "vmig-logs";

/// Generates unique log paths of the form
/// `<dir>/<stem>[_<suffix>]_<yyyyMMdd_HHmmss_fff>_<seq>.log`.
#[derive(Debug)]
pub struct LogPathGenerator {
    dir: PathBuf,
    seq: AtomicU64,
}

impl LogPathGenerator {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            seq: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Next log path. Creates the directory, falling back to the system temp
    /// directory when that fails.
    pub async fn next(&self, stem: &str, suffix: Option<&str>) -> PathBuf {
        let seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        let stamp = Utc::now().format("%Y%m%d_%H%M%S_%3f");
        let file = match suffix.map(sanitize).filter(|s| !s.is_empty()) {
            Some(suffix) => format!("{stem}_{suffix}_{stamp}_{seq}.log"),
            None => format!("{stem}_{stamp}_{seq}.log"),
        };
        self.writable_dir().await.join(file)
    }

    async fn writable_dir(&self) -> PathBuf {
        match fs::create_dir_all(&self.dir).await {
            Ok(()) => self.dir.clone(),
            Err(e) => {
                let fallback = std::env::temp_dir().join(FALLBACK_DIR);
                warn!(
                    dir = %self.dir.display(),
                    fallback = %fallback.display(),
                    error = %e,
                    "log directory unavailable, using temp directory"
                );
                if let Err(e) = fs::create_dir_all(&fallback).await {
                    warn!(dir = %fallback.display(), error = %e, "temp log directory unavailable");
                }
                fallback
            }
        }
    }
}

/// Keep file names portable.
fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect()
}
