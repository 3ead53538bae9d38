//! Process seam under the dispatcher.

use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use script_host::{run_process, Interpreter, ProcessOutput};

/// One fully encoded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRequest {
    pub script: PathBuf,
    pub args: Vec<String>,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

/// Runs encoded invocations.
#[async_trait]
pub trait ScriptBackend: Send + Sync {
    async fn execute(&self, request: BackendRequest) -> script_host::Result<ProcessOutput>;
}

/// Backend that spawns a local interpreter process.
#[derive(Debug, Clone, Default)]
pub struct InterpreterBackend {
    interpreter: Interpreter,
}

impl InterpreterBackend {
    pub fn new(interpreter: Interpreter) -> Self {
        Self { interpreter }
    }

    pub fn interpreter(&self) -> &Interpreter {
        &self.interpreter
    }
}

#[async_trait]
impl ScriptBackend for InterpreterBackend {
    async fn execute(&self, request: BackendRequest) -> script_host::Result<ProcessOutput> {
        let mut process = self
            .interpreter
            .command_for(&request.script, request.args)?
            .timeout(request.timeout);
        if let Some(stdin) = request.stdin {
            process = process.stdin(stdin);
        }
        run_process(&process).await
    }
}
