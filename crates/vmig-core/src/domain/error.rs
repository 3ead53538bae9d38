//! Error taxonomy for the orchestration layer.

/// A run-level precondition that was not satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Precondition {
    #[error("no source connection selected")]
    MissingSourceConnection,

    #[error("no target connection selected")]
    MissingTargetConnection,

    #[error("no items selected for migration")]
    NoItemsSelected,

    #[error("no destination selected on the target")]
    NoDestination,
}

/// Errors produced by vmig-core.
///
/// Per-item failures are never surfaced through this type during a run; they
/// are recorded as [`Outcome`](crate::domain::Outcome) data instead.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("credential required for {endpoint}")]
    CredentialRequired { endpoint: String },

    #[error("execution of {operation} failed: {detail}")]
    ExecutionFailed { operation: String, detail: String },

    #[error("a migration run is already in progress")]
    RunAlreadyInProgress,

    #[error("precondition not met: {0}")]
    PreconditionNotMet(Precondition),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<Precondition> for MigrationError {
    fn from(p: Precondition) -> Self {
        MigrationError::PreconditionNotMet(p)
    }
}

/// Result type for vmig-core operations.
pub type Result<T> = std::result::Result<T, MigrationError>;
