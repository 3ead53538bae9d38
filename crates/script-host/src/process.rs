//! Child process execution with captured output and an optional timeout.

use std::process::Stdio;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::process::Command;
use tracing::debug;

use crate::error::ScriptHostError;
use crate::Result;

/// Maximum bytes captured per stream (10 MiB). Anything beyond is dropped.
const MAX_OUTPUT_BYTES: u64 = 10 * 1024 * 1024;

/// A fully described process launch.
#[derive(Debug, Clone, Default)]
pub struct ProcessRequest {
    /// Executable to run.
    pub program: String,

    /// Arguments, in order.
    pub args: Vec<String>,

    /// Bytes written to stdin before it is closed. `None` leaves stdin null.
    pub stdin: Option<Vec<u8>>,

    /// Extra environment variables for the child.
    pub env: Vec<(String, String)>,

    /// Working directory (inherits the current one when `None`).
    pub working_dir: Option<String>,

    /// Wall-clock limit. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ProcessRequest {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn stdin(mut self, bytes: Vec<u8>) -> Self {
        self.stdin = Some(bytes);
        self
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Captured output of a finished process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code, `-1` when terminated by a signal.
    pub exit_code: i32,
    pub duration_ms: u64,
}

impl ProcessOutput {
    /// Whether the process exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Spawn the process described by `request` and wait for it.
///
/// The child is killed if the timeout fires (`kill_on_drop`).
pub async fn run_process(request: &ProcessRequest) -> Result<ProcessOutput> {
    let mut cmd = Command::new(&request.program);
    cmd.args(&request.args)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    if request.stdin.is_some() {
        cmd.stdin(Stdio::piped());
    } else {
        cmd.stdin(Stdio::null());
    }

    for (key, value) in &request.env {
        cmd.env(key, value);
    }

    if let Some(dir) = &request.working_dir {
        cmd.current_dir(dir);
    }

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ScriptHostError::InterpreterNotFound(request.program.clone()),
        _ => ScriptHostError::Spawn {
            program: request.program.clone(),
            reason: e.to_string(),
        },
    })?;

    debug!(program = %request.program, args = request.args.len(), "spawned process");

    // Readers and the stdin writer run concurrently so a full pipe on either
    // side cannot stall the wait below.
    let stdout_task = tokio::spawn(read_stream(child.stdout.take()));
    let stderr_task = tokio::spawn(read_stream(child.stderr.take()));
    let stdin_task = match (&request.stdin, child.stdin.take()) {
        (Some(payload), Some(stdin)) => Some(tokio::spawn(write_stream(stdin, payload.clone()))),
        _ => None,
    };

    let status = match request.timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(status) => status,
            Err(_elapsed) => {
                if let Some(task) = &stdin_task {
                    task.abort();
                }
                return Err(ScriptHostError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        },
        None => child.wait().await,
    };
    if let Some(task) = stdin_task {
        task.abort();
    }
    let status = status?;

    let stdout = stdout_task.await.unwrap_or_default();
    let stderr = stderr_task.await.unwrap_or_default();

    Ok(ProcessOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code: status.code().unwrap_or(-1),
        duration_ms: start.elapsed().as_millis() as u64,
    })
}

async fn write_stream<W: AsyncWrite + Unpin>(mut handle: W, payload: Vec<u8>) {
    // The child may exit before reading stdin; a broken pipe is not fatal.
    let _ = handle.write_all(&payload).await;
    let _ = handle.shutdown().await;
}

async fn read_stream<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(h) = handle {
        let _ = h.take(MAX_OUTPUT_BYTES).read_to_end(&mut buf).await;
    }
    buf
}
