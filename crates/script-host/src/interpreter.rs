//! Script interpreter description and availability probing.
//!
//! An [`Interpreter`] knows how to turn "run this script with these
//! arguments" into a [`ProcessRequest`]. The default targets PowerShell 7
//! (`pwsh -NoProfile -NonInteractive -File <script>`), but any interpreter
//! that accepts a script path followed by arguments works.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ScriptHostError;
use crate::process::{run_process, ProcessRequest};
use crate::Result;

/// Interpreter configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Interpreter {
    /// Interpreter executable.
    pub program: String,
    /// Arguments placed before the script path.
    pub leading_args: Vec<String>,
    /// Arguments used by [`Interpreter::is_available`].
    pub version_args: Vec<String>,
}

impl Default for Interpreter {
    fn default() -> Self {
        Self {
            program: "pwsh".to_string(),
            leading_args: vec![
                "-NoProfile".to_string(),
                "-NonInteractive".to_string(),
                "-File".to_string(),
            ],
            version_args: vec!["-Version".to_string()],
        }
    }
}

impl Interpreter {
    /// Interpreter running scripts as `<program> <script> <args..>`.
    pub fn plain(program: &str) -> Self {
        Self {
            program: program.to_string(),
            leading_args: Vec::new(),
            version_args: vec!["--version".to_string()],
        }
    }

    /// Build a request running `script` with `args`.
    ///
    /// Fails with [`ScriptHostError::ScriptNotFound`] if the script path does
    /// not exist.
    pub fn command_for(&self, script: &Path, args: Vec<String>) -> Result<ProcessRequest> {
        if !script.exists() {
            return Err(ScriptHostError::ScriptNotFound(
                script.display().to_string(),
            ));
        }

        let mut request = ProcessRequest::new(self.program.clone());
        request.args.extend(self.leading_args.iter().cloned());
        request.args.push(script.display().to_string());
        request.args.extend(args);
        Ok(request)
    }

    /// Check whether the interpreter can be launched at all.
    pub async fn is_available(&self) -> bool {
        let request = ProcessRequest::new(self.program.clone())
            .args(self.version_args.iter().cloned())
            .timeout(Some(Duration::from_secs(10)));

        match run_process(&request).await {
            Ok(output) if output.succeeded() => {
                debug!(program = %self.program, version = %output.stdout.trim(), "interpreter available");
                true
            }
            Ok(output) => {
                warn!(program = %self.program, exit_code = output.exit_code, "interpreter version check failed");
                false
            }
            Err(e) => {
                warn!(program = %self.program, error = %e, "interpreter unavailable");
                false
            }
        }
    }
}
