//! Classified result of a single external operation.

use serde::{Deserialize, Serialize};

use super::item::ItemStatus;

/// Coarse cause bucket for a failure reason.
///
/// Used only to simplify the message shown upstream; it never changes
/// control flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCause {
    Network,
    Authentication,
    Timeout,
    Certificate,
    Other,
}

impl FailureCause {
    pub fn label(&self) -> &'static str {
        match self {
            FailureCause::Network => "network",
            FailureCause::Authentication => "authentication",
            FailureCause::Timeout => "timeout",
            FailureCause::Certificate => "certificate",
            FailureCause::Other => "other",
        }
    }
}

/// The three-way classification of raw operation output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Failure { reason: String, cause: FailureCause },
    Skipped { reason: String },
}

/// Reason attached to output that no rule could interpret.
pub const UNPARSEABLE_RESULT: &str = "unparseable result";

impl Outcome {
    pub fn failure(reason: impl Into<String>, cause: FailureCause) -> Self {
        Outcome::Failure {
            reason: reason.into(),
            cause,
        }
    }

    pub fn unparseable() -> Self {
        Self::failure(UNPARSEABLE_RESULT, FailureCause::Other)
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Outcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Failure or skip reason, if any.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::Failure { reason, .. } | Outcome::Skipped { reason } => Some(reason),
        }
    }

    /// Item status this outcome maps to.
    pub fn item_status(&self) -> ItemStatus {
        match self {
            Outcome::Success => ItemStatus::Migrated,
            Outcome::Failure { .. } => ItemStatus::Failed,
            Outcome::Skipped { .. } => ItemStatus::Skipped,
        }
    }

    /// Terminal status string for the audit trail.
    pub fn task_status(&self) -> String {
        match self {
            Outcome::Success => "Completed".to_string(),
            Outcome::Failure { reason, .. } => format!("Failed: {reason}"),
            Outcome::Skipped { reason } => format!("Skipped: {reason}"),
        }
    }

    /// Simplified message for display, prefixed by the failure bucket.
    pub fn user_message(&self) -> String {
        match self {
            Outcome::Success => "Success".to_string(),
            Outcome::Skipped { reason } => format!("Skipped: {reason}"),
            Outcome::Failure { reason, cause } => match cause {
                FailureCause::Network => format!("Endpoint unreachable: {reason}"),
                FailureCause::Authentication => format!("Authentication failed: {reason}"),
                FailureCause::Timeout => format!("Operation timed out: {reason}"),
                FailureCause::Certificate => format!("Certificate validation failed: {reason}"),
                FailureCause::Other => reason.clone(),
            },
        }
    }
}
