//! Endpoint connections and the shared connection-state registry.

use std::sync::{PoisonError, RwLock};

use serde::{Deserialize, Serialize};

/// A virtualization management endpoint.
///
/// Never carries a secret; secrets are resolved on demand through a
/// [`SecretProvider`](crate::credentials::SecretProvider).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connection {
    pub name: String,
    pub address: String,
    pub username: String,
    /// Whether the profile store claims to have a persisted password.
    #[serde(default)]
    pub password_persisted: bool,
}

impl Connection {
    pub fn new(name: &str, address: &str, username: &str) -> Self {
        Self {
            name: name.to_string(),
            address: address.to_string(),
            username: username.to_string(),
            password_persisted: false,
        }
    }

    /// `username@address`, the key used for prompts and secret lookups.
    pub fn endpoint_key(&self) -> String {
        format!("{}@{}", self.username, self.address)
    }
}

/// Shared "which connections are active" state.
///
/// Holds the selected source and target plus the connection most recently
/// confirmed by a connectivity test.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    source: RwLock<Option<Connection>>,
    target: RwLock<Option<Connection>>,
    active: RwLock<Option<Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_source(&self, connection: Connection) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    pub fn set_target(&self, connection: Connection) {
        *self.target.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    pub fn source(&self) -> Option<Connection> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn target(&self) -> Option<Connection> {
        self.target
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Record `connection` as the currently active one.
    pub fn set_active(&self, connection: Connection) {
        *self.active.write().unwrap_or_else(PoisonError::into_inner) = Some(connection);
    }

    pub fn active(&self) -> Option<Connection> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
