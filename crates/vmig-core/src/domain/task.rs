//! Audit records for attempted items.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// One attempted item within a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTask {
    pub description: String,
    pub item_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Terminal status, including failure detail. `"Running"` while open.
    pub status: String,
}

impl MigrationTask {
    /// Open a task starting now.
    pub fn start(description: String, item_id: &str) -> Self {
        Self {
            description,
            item_id: item_id.to_string(),
            started_at: Utc::now(),
            ended_at: None,
            status: "Running".to_string(),
        }
    }

    /// Close the task with a terminal status.
    pub fn finish(&mut self, status: String) {
        self.ended_at = Some(Utc::now());
        self.status = status;
    }

    pub fn is_finished(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Elapsed time; measured up to now for an open task.
    pub fn elapsed(&self) -> Duration {
        self.ended_at.unwrap_or_else(Utc::now) - self.started_at
    }
}
