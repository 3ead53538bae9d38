//! TOML configuration.
//!
//! Every section is optional; missing keys take their defaults and a
//! missing file yields [`MigrationConfig::default`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use script_host::Interpreter;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::classifier::ClassifierConfig;
use crate::dispatcher::{DispatcherSettings, OperationRef};
use crate::domain::{ItemKind, MigrationError, Result};
use crate::orchestrator::{OperationCatalog, OrchestratorSettings};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub paths: PathsConfig,
    pub dispatcher: DispatcherConfig,
    pub orchestrator: OrchestratorConfig,
    pub classifier: ClassifierConfig,
    pub activity_log: ActivityLogConfig,
    pub operations: OperationsConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub log_dir: PathBuf,
    pub export_dir: PathBuf,
    pub scripts_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            export_dir: PathBuf::from("exports"),
            scripts_dir: PathBuf::from("scripts"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub interpreter: Interpreter,
    /// Per-invocation limit; `None` disables it.
    pub timeout_secs: Option<u64>,
    /// Characters of output kept in activity log previews.
    pub preview_chars: usize,
    pub bypass_parameter: String,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            interpreter: Interpreter::default(),
            timeout_secs: Some(1800),
            preview_chars: 200,
            bypass_parameter: "SkipModuleCheck".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub inter_item_delay_ms: u64,
    /// Accepted for forward compatibility; runs stay sequential.
    pub max_concurrent_migrations: usize,
    pub sequential_mode: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            inter_item_delay_ms: 500,
            max_concurrent_migrations: 1,
            sequential_mode: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivityLogConfig {
    pub capacity: usize,
}

impl Default for ActivityLogConfig {
    fn default() -> Self {
        Self {
            capacity: crate::activity_log::DEFAULT_CAPACITY,
        }
    }
}

/// Script file names, relative to `paths.scripts_dir` unless absolute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperationsConfig {
    pub host: String,
    pub virtual_machine: String,
    pub folder: String,
    pub role: String,
    pub permission: String,
    pub inventory: String,
    pub test_connection: String,
    pub capability_probe: Option<String>,
}

impl Default for OperationsConfig {
    fn default() -> Self {
        Self {
            host: "Migrate-Host.ps1".to_string(),
            virtual_machine: "Migrate-VM.ps1".to_string(),
            folder: "Migrate-Folder.ps1".to_string(),
            role: "Migrate-Role.ps1".to_string(),
            permission: "Migrate-Permission.ps1".to_string(),
            inventory: "Get-Inventory.ps1".to_string(),
            test_connection: "Test-Connection.ps1".to_string(),
            capability_probe: Some("Test-PowerCLI.ps1".to_string()),
        }
    }
}

impl OperationsConfig {
    pub fn script_for(&self, kind: ItemKind) -> &str {
        match kind {
            ItemKind::Host => &self.host,
            ItemKind::VirtualMachine => &self.virtual_machine,
            ItemKind::Folder => &self.folder,
            ItemKind::Role => &self.role,
            ItemKind::Permission => &self.permission,
        }
    }

    /// Resolve every script against `scripts_dir`.
    pub fn catalog(&self, scripts_dir: &Path) -> OperationCatalog {
        let resolve = |name: &str| OperationRef::new(scripts_dir.join(name));
        OperationCatalog {
            migrations: ItemKind::ALL
                .iter()
                .map(|kind| (*kind, resolve(self.script_for(*kind))))
                .collect(),
            inventory: resolve(&self.inventory),
            test_connection: resolve(&self.test_connection),
            capability_probe: self
                .capability_probe
                .as_deref()
                .filter(|s| !s.is_empty())
                .map(resolve),
        }
    }
}

impl MigrationConfig {
    /// Load from `path`, falling back to defaults when the file is missing.
    pub async fn load(path: &Path) -> Result<Self> {
        let config = if fs::try_exists(path).await? {
            let content = fs::read_to_string(path).await?;
            toml::from_str(&content).map_err(|e| {
                MigrationError::Config(format!("{}: {}", path.display(), e))
            })?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub async fn save(&self, path: &Path) -> Result<()> {
        self.validate()?;
        let content =
            toml::to_string_pretty(self).map_err(|e| MigrationError::Config(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    /// Validate configuration values for consistency.
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.dispatcher.interpreter.program.trim().is_empty() {
            errors.push("dispatcher.interpreter.program must not be empty");
        }
        if self.dispatcher.timeout_secs == Some(0) {
            errors.push("dispatcher.timeout_secs must be greater than 0 when set");
        }
        if self.dispatcher.preview_chars == 0 {
            errors.push("dispatcher.preview_chars must be greater than 0");
        }
        if self.orchestrator.max_concurrent_migrations == 0 {
            errors.push("orchestrator.max_concurrent_migrations must be greater than 0");
        }
        if self.activity_log.capacity == 0 {
            errors.push("activity_log.capacity must be greater than 0");
        }
        if self.classifier.success_sentinel.trim().is_empty() {
            errors.push("classifier.success_sentinel must not be empty");
        }
        if self.classifier.failure_prefix.trim().is_empty() {
            errors.push("classifier.failure_prefix must not be empty");
        }
        if ItemKind::ALL
            .iter()
            .any(|k| self.operations.script_for(*k).trim().is_empty())
        {
            errors.push("operations: every item kind needs a script");
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(MigrationError::Config(errors.join("; ")))
        }
    }

    pub fn dispatcher_settings(&self) -> DispatcherSettings {
        DispatcherSettings {
            log_dir: self.paths.log_dir.clone(),
            timeout: self.dispatcher.timeout_secs.map(Duration::from_secs),
            preview_chars: self.dispatcher.preview_chars,
            bypass_parameter: self.dispatcher.bypass_parameter.clone(),
        }
    }

    pub fn orchestrator_settings(&self) -> OrchestratorSettings {
        OrchestratorSettings {
            inter_item_delay: Duration::from_millis(self.orchestrator.inter_item_delay_ms),
            operations: self.operations.catalog(&self.paths.scripts_dir),
            max_concurrent_migrations: self.orchestrator.max_concurrent_migrations,
            sequential_mode: self.orchestrator.sequential_mode,
        }
    }
}
