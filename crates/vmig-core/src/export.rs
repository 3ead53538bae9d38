//! Batch export/import.
//!
//! A [`MigrationDocument`] captures a selection of items, the options and
//! the endpoints by address only. Secrets are never part of it.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{MigrationItem, MigrationOptions, Result};

pub const SCHEMA_VERSION: &str = "1.0";

/// Persisted migration batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationDocument {
    pub schema_version: String,
    pub exported_at: DateTime<Utc>,
    /// Source endpoint address.
    pub source_cluster: String,
    /// Target endpoint address.
    pub target_cluster: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<String>,
    #[serde(default)]
    pub options: MigrationOptions,
    pub items: Vec<MigrationItem>,
}

impl MigrationDocument {
    pub fn new(
        source_cluster: &str,
        target_cluster: &str,
        options: MigrationOptions,
        items: Vec<MigrationItem>,
    ) -> Self {
        Self {
            schema_version: SCHEMA_VERSION.to_string(),
            exported_at: Utc::now(),
            source_cluster: source_cluster.to_string(),
            target_cluster: target_cluster.to_string(),
            destination: None,
            options,
            items,
        }
    }

    pub fn with_destination(mut self, destination: &str) -> Self {
        self.destination = Some(destination.to_string());
        self
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write pretty JSON to `path`, creating parent directories.
    pub async fn write_to(&self, path: &Path) -> Result<()> {
        let content = self.to_json()?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, content).await?;
        tracing::debug!(path = %path.display(), items = self.items.len(), "migration document written");
        Ok(())
    }

    pub async fn read_from(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path).await?;
        Self::from_json(&content)
    }
}

/// `<export_dir>/migration_<yyyyMMdd_HHmmss>.json`
pub fn default_export_path(export_dir: &Path, now: DateTime<Utc>) -> PathBuf {
    export_dir.join(format!("migration_{}.json", now.format("%Y%m%d_%H%M%S")))
}
