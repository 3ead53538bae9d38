//! Error types for script-host

use thiserror::Error;

/// Errors raised while launching or waiting on an interpreter process.
#[derive(Error, Debug)]
pub enum ScriptHostError {
    /// Interpreter binary could not be located
    #[error("interpreter not found: {0}")]
    InterpreterNotFound(String),

    /// Process could not be spawned for another reason
    #[error("failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// Process exceeded its wall-clock limit and was killed
    #[error("process timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },

    /// Script file does not exist
    #[error("script not found: {0}")]
    ScriptNotFound(String),

    /// IO error while talking to the child
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Stdin payload could not be encoded
    #[error("JSON encoding error: {0}")]
    Json(#[from] serde_json::Error),
}
