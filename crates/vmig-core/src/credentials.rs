//! Credential resolution.
//!
//! The orchestrator only sees [`SecretProvider`]. The standard provider,
//! [`CredentialResolver`], checks a [`SecretStore`] first and falls back to
//! a single interactive [`SecretPrompt`]. It never retries on its own and
//! never persists a prompted secret unless the caller calls
//! [`CredentialResolver::persist`].

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::{Connection, MigrationError, Result};

/// A secret value. `Debug` and `Display` never reveal it.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Secret(value.into())
    }

    /// The raw value. Callers must not log it.
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Debug for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl std::fmt::Display for Secret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("***")
    }
}

/// Persisted secrets (OS vault, environment, ...).
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// The persisted secret for `connection`, if any.
    async fn get(&self, connection: &Connection) -> Option<Secret>;

    /// Persist `secret` for `connection`.
    async fn put(&self, connection: &Connection, secret: &Secret) -> Result<()>;
}

/// Answer from an interactive prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptResponse {
    pub confirmed: bool,
    pub secret: Option<Secret>,
}

impl PromptResponse {
    pub fn confirmed(secret: &str) -> Self {
        Self {
            confirmed: true,
            secret: Some(Secret::new(secret)),
        }
    }

    pub fn cancelled() -> Self {
        Self {
            confirmed: false,
            secret: None,
        }
    }
}

/// Interactive password prompt.
#[async_trait]
pub trait SecretPrompt: Send + Sync {
    async fn prompt(&self, title: &str, message: &str) -> PromptResponse;
}

/// What the orchestrator depends on to obtain secrets.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    /// Resolve the secret for `connection` or fail with
    /// [`MigrationError::CredentialRequired`].
    async fn resolve(&self, connection: &Connection) -> Result<Secret>;
}

/// Store-then-prompt resolver.
pub struct CredentialResolver<S, P> {
    store: S,
    prompt: P,
}

impl<S: SecretStore, P: SecretPrompt> CredentialResolver<S, P> {
    pub fn new(store: S, prompt: P) -> Self {
        Self { store, prompt }
    }

    /// Explicitly persist a secret obtained elsewhere.
    pub async fn persist(&self, connection: &Connection, secret: &Secret) -> Result<()> {
        self.store.put(connection, secret).await?;
        info!(endpoint = %connection.endpoint_key(), "credential persisted");
        Ok(())
    }
}

#[async_trait]
impl<S: SecretStore, P: SecretPrompt> SecretProvider for CredentialResolver<S, P> {
    async fn resolve(&self, connection: &Connection) -> Result<Secret> {
        let endpoint = connection.endpoint_key();

        if let Some(secret) = self.store.get(connection).await {
            if !secret.is_empty() {
                debug!(endpoint = %endpoint, "using persisted credential");
                return Ok(secret);
            }
        }

        let title = format!("Password for {endpoint}");
        let message = format!(
            "Enter the password for {} on {}",
            connection.username, connection.address
        );
        let response = self.prompt.prompt(&title, &message).await;

        match response.secret {
            Some(secret) if response.confirmed && !secret.is_empty() => {
                debug!(endpoint = %endpoint, "credential supplied by prompt");
                Ok(secret)
            }
            _ => {
                info!(endpoint = %endpoint, "credential prompt cancelled or empty");
                Err(MigrationError::CredentialRequired { endpoint })
            }
        }
    }
}

/// Read-only store backed by environment variables.
///
/// The variable for `vc01.lab.local` with the default prefix is
/// `VMIG_PASSWORD_VC01_LAB_LOCAL`.
#[derive(Debug, Clone)]
pub struct EnvSecretStore {
    prefix: String,
}

impl Default for EnvSecretStore {
    fn default() -> Self {
        Self::new("VMIG_PASSWORD_")
    }
}

impl EnvSecretStore {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
        }
    }

    pub fn variable_for(&self, connection: &Connection) -> String {
        let suffix: String = connection
            .address
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() {
                    c.to_ascii_uppercase()
                } else {
                    '_'
                }
            })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl SecretStore for EnvSecretStore {
    async fn get(&self, connection: &Connection) -> Option<Secret> {
        std::env::var(self.variable_for(connection))
            .ok()
            .filter(|v| !v.is_empty())
            .map(Secret::new)
    }

    async fn put(&self, connection: &Connection, _secret: &Secret) -> Result<()> {
        Err(MigrationError::Config(format!(
            "environment secret store is read-only; set {}",
            self.variable_for(connection)
        )))
    }
}
