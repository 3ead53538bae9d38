//! Run lifecycle: state, live progress and the frozen report.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::item::MigrationItem;
use super::summary::{RunSummary, RunVerdict};
use super::task::MigrationTask;

/// Orchestrator run state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    #[default]
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Cancelled | RunState::Failed
        )
    }
}

/// Live progress published while a run executes.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RunProgress {
    pub state: RunState,
    pub processed: usize,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Name of the item currently in flight.
    pub current_item: Option<String>,
}

impl RunProgress {
    /// `processed / total * 100`, 0 for an empty batch.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.processed as f64 / self.total as f64 * 100.0
        }
    }
}

/// Result of one orchestrator run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub items: Vec<MigrationItem>,
    pub tasks: Vec<MigrationTask>,
    pub summary: RunSummary,
    /// Run-level failure reason when `state` is `Failed`.
    pub failure: Option<String>,
}

impl RunReport {
    /// Aggregate status line. Always reports counts for partial failures.
    pub fn status_message(&self) -> String {
        let s = &self.summary;
        match self.state {
            RunState::Cancelled => format!(
                "Migration cancelled: {} successful, {} failed, {} not processed",
                s.succeeded,
                s.failed,
                s.not_processed()
            ),
            RunState::Failed => format!(
                "Migration failed: {}",
                self.failure.as_deref().unwrap_or("unknown error")
            ),
            _ => match s.verdict() {
                RunVerdict::Succeeded if s.skipped == 0 => {
                    format!("Migration completed: {} successful", s.succeeded)
                }
                RunVerdict::Succeeded => format!(
                    "Migration completed: {} successful, {} skipped",
                    s.succeeded, s.skipped
                ),
                RunVerdict::PartialFailure => {
                    format!("Migration completed with errors: {}", s.counts_line())
                }
                RunVerdict::TotalFailure => format!("Migration failed: {}", s.counts_line()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::item::{ItemKind, ItemStatus};
    use chrono::Utc;

    fn report(statuses: &[ItemStatus], state: RunState) -> RunReport {
        let items: Vec<MigrationItem> = statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                let mut item =
                    MigrationItem::new(ItemKind::Folder, &format!("f{i}"), &i.to_string(), "/");
                item.status = *status;
                item
            })
            .collect();
        let now = Utc::now();
        RunReport {
            run_id: Uuid::new_v4(),
            state,
            summary: RunSummary::from_items(&items, now, now),
            items,
            tasks: Vec::new(),
            failure: None,
        }
    }

    #[test]
    fn test_percent() {
        let progress = RunProgress {
            processed: 1,
            total: 4,
            ..RunProgress::default()
        };
        assert_eq!(progress.percent(), 25.0);
        assert_eq!(RunProgress::default().percent(), 0.0);
    }

    #[test]
    fn test_status_messages() {
        use ItemStatus::*;
        assert_eq!(
            report(&[Migrated, Migrated], RunState::Completed).status_message(),
            "Migration completed: 2 successful"
        );
        assert_eq!(
            report(&[Migrated, Failed, Migrated], RunState::Completed).status_message(),
            "Migration completed with errors: 2 successful, 1 failed"
        );
        assert_eq!(
            report(&[Failed, Failed], RunState::Completed).status_message(),
            "Migration failed: 0 successful, 2 failed"
        );
        assert_eq!(
            report(&[Migrated, Pending, Pending], RunState::Cancelled).status_message(),
            "Migration cancelled: 1 successful, 0 failed, 2 not processed"
        );
    }
}
