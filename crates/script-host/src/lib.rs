//! Script-Host: local interpreter process layer for vmig
//!
//! This crate launches the external script interpreter that performs the
//! actual migration work. It captures stdout, stderr and the exit code,
//! enforces optional wall-clock limits and checks whether the interpreter is
//! installed.
//!
//! It deliberately knows nothing about migrations: classification of script
//! output and parameter conventions live in `vmig-core`.

pub mod error;
pub mod interpreter;
pub mod process;

pub use error::ScriptHostError;
pub use interpreter::Interpreter;
pub use process::{run_process, ProcessOutput, ProcessRequest};

/// Result type for script-host operations
pub type Result<T> = std::result::Result<T, ScriptHostError>;
