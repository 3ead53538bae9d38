//! In-memory fakes for the async seams (testing only)
//!
//! Provides `ScriptedBackend`, `MemorySecretStore` and `ScriptedPrompt`
//! that satisfy the trait contracts without spawning processes or touching
//! a real credential vault.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use script_host::{ProcessOutput, ScriptHostError};
use serde_json::Value;

use crate::credentials::{PromptResponse, Secret, SecretPrompt, SecretStore};
use crate::dispatcher::{BackendRequest, ScriptBackend};
use crate::domain::{Connection, Result};

// ---------------------------------------------------------------------------
// ScriptedBackend
// ---------------------------------------------------------------------------

/// Backend answering from a queue of scripted responses.
///
/// Every request is recorded. Once the queue is empty each call answers
/// `Success` with exit code 0.
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<script_host::Result<ProcessOutput>>>,
    requests: Mutex<Vec<BackendRequest>>,
    delay: Option<Duration>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside every call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn push_stdout(&self, stdout: &str) {
        self.push_output(stdout, "", 0);
    }

    pub fn push_output(&self, stdout: &str, stderr: &str, exit_code: i32) {
        self.push(Ok(ProcessOutput {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            duration_ms: 1,
        }));
    }

    pub fn push_error(&self, error: ScriptHostError) {
        self.push(Err(error));
    }

    fn push(&self, response: script_host::Result<ProcessOutput>) {
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(response);
    }

    /// All requests received so far.
    pub fn requests(&self) -> Vec<BackendRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Stdin payloads decoded as JSON, skipping Direct-convention calls.
    pub fn stdin_payloads(&self) -> Vec<Value> {
        self.requests()
            .iter()
            .filter_map(|r| r.stdin.as_deref())
            .filter_map(|bytes| serde_json::from_slice(bytes).ok())
            .collect()
    }
}

#[async_trait]
impl ScriptBackend for ScriptedBackend {
    async fn execute(&self, request: BackendRequest) -> script_host::Result<ProcessOutput> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let next = self
            .responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        next.unwrap_or_else(|| {
            Ok(ProcessOutput {
                stdout: "Success".to_string(),
                stderr: String::new(),
                exit_code: 0,
                duration_ms: 1,
            })
        })
    }
}

// ---------------------------------------------------------------------------
// MemorySecretStore
// ---------------------------------------------------------------------------

/// Secret store keyed by `username@address`.
#[derive(Debug, Default)]
pub struct MemorySecretStore {
    secrets: Mutex<HashMap<String, Secret>>,
}

impl MemorySecretStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, connection: &Connection, secret: &str) {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.endpoint_key(), Secret::new(secret));
    }
}

#[async_trait]
impl SecretStore for MemorySecretStore {
    async fn get(&self, connection: &Connection) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&connection.endpoint_key())
            .cloned()
    }

    async fn put(&self, connection: &Connection, secret: &Secret) -> Result<()> {
        self.secrets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(connection.endpoint_key(), secret.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// ScriptedPrompt
// ---------------------------------------------------------------------------

/// Prompt answering from a queue; cancels once the queue is empty.
#[derive(Debug, Default)]
pub struct ScriptedPrompt {
    responses: Mutex<VecDeque<PromptResponse>>,
    titles: Mutex<Vec<String>>,
}

impl ScriptedPrompt {
    pub fn new(responses: Vec<PromptResponse>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            titles: Mutex::new(Vec::new()),
        }
    }

    /// Number of times the prompt was shown.
    pub fn calls(&self) -> usize {
        self.titles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn titles(&self) -> Vec<String> {
        self.titles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SecretPrompt for ScriptedPrompt {
    async fn prompt(&self, title: &str, _message: &str) -> PromptResponse {
        self.titles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(title.to_string());
        self.responses
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(PromptResponse::cancelled)
    }
}
