//! Aggregate statistics for a run.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::item::{ItemStatus, MigrationItem};

/// Overall verdict derived from a summary's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunVerdict {
    /// Nothing failed.
    Succeeded,
    /// At least one success and at least one failure.
    PartialFailure,
    /// Failures and no successes.
    TotalFailure,
}

/// Counters and timing closing out one run.
///
/// Always built from item statuses via [`RunSummary::from_items`], so the
/// counters cannot drift from the items they describe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Number of included items.
    pub total: usize,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
}

impl RunSummary {
    /// Count statuses of the included items.
    pub fn from_items(
        items: &[MigrationItem],
        started_at: DateTime<Utc>,
        ended_at: DateTime<Utc>,
    ) -> Self {
        let mut summary = Self {
            succeeded: 0,
            failed: 0,
            skipped: 0,
            total: 0,
            started_at,
            ended_at,
        };
        for item in items.iter().filter(|i| i.included) {
            summary.total += 1;
            match item.status {
                ItemStatus::Migrated => summary.succeeded += 1,
                ItemStatus::Failed => summary.failed += 1,
                ItemStatus::Skipped => summary.skipped += 1,
                ItemStatus::Pending => {}
            }
        }
        summary
    }

    pub fn processed(&self) -> usize {
        self.succeeded + self.failed + self.skipped
    }

    pub fn not_processed(&self) -> usize {
        self.total - self.processed()
    }

    pub fn duration(&self) -> Duration {
        self.ended_at - self.started_at
    }

    pub fn human_duration(&self) -> String {
        format_duration(self.duration())
    }

    pub fn verdict(&self) -> RunVerdict {
        match (self.succeeded, self.failed) {
            (_, 0) => RunVerdict::Succeeded,
            (0, _) => RunVerdict::TotalFailure,
            _ => RunVerdict::PartialFailure,
        }
    }

    /// Counts line: `"2 successful, 1 failed"`, skipped appended when non-zero.
    pub fn counts_line(&self) -> String {
        let mut line = format!("{} successful, {} failed", self.succeeded, self.failed);
        if self.skipped > 0 {
            line.push_str(&format!(", {} skipped", self.skipped));
        }
        line
    }
}

/// Render a duration as `"4.2s"`, `"2m 05s"` or `"1h 02m 03s"`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.num_milliseconds().max(0);
    let secs = millis / 1000;
    if secs < 60 {
        format!("{:.1}s", millis as f64 / 1000.0)
    } else if secs < 3600 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}h {:02}m {:02}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
