//! Migration Orchestrator.
//!
//! Drives one batch of [`MigrationItem`]s through the dispatcher, one item
//! at a time, and turns per-item outcomes into a [`RunReport`].
//!
//! ```text
//! Idle -> Running -> Completed | Cancelled | Failed
//! ```
//!
//! Only an already-running orchestrator and unmet preconditions are
//! returned as errors from [`MigrationOrchestrator::run`]. Everything that
//! goes wrong for a single item (missing credentials, transport failures,
//! failure outcomes) is recorded on that item and the loop moves on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::activity_log::{ActivityLog, LogEntry, LogLevel};
use crate::classifier::ResultClassifier;
use crate::config::OperationsConfig;
use crate::credentials::{Secret, SecretProvider};
use crate::dispatcher::{ExecutionDispatcher, InvokeOptions, OperationRef, Parameters};
use crate::domain::{
    Connection, ConnectionRegistry, DiscoveredItem, FailureCause, ItemKind, ItemStatus,
    MigrationError, MigrationItem, MigrationOptions, MigrationTask, Outcome, Precondition,
    Result, RunProgress, RunReport, RunState, RunSummary,
};
use crate::metrics::METRICS;
use crate::obs;

const SOURCE: &str = "Orchestrator";

/// Scripts the orchestrator calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationCatalog {
    pub migrations: HashMap<ItemKind, OperationRef>,
    pub inventory: OperationRef,
    pub test_connection: OperationRef,
    /// Run before the first item of a run unless capability is confirmed.
    pub capability_probe: Option<OperationRef>,
}

impl OperationCatalog {
    pub fn migration_for(&self, kind: ItemKind) -> Result<&OperationRef> {
        self.migrations
            .get(&kind)
            .ok_or_else(|| MigrationError::Config(format!("no migration operation for {kind}")))
    }
}

/// Orchestrator tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorSettings {
    /// Pause between items, not after the last.
    pub inter_item_delay: Duration,
    pub operations: OperationCatalog,
    pub max_concurrent_migrations: usize,
    pub sequential_mode: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            inter_item_delay: Duration::from_millis(500),
            operations: OperationsConfig::default().catalog(std::path::Path::new("scripts")),
            max_concurrent_migrations: 1,
            sequential_mode: true,
        }
    }
}

/// Everything one run needs.
#[derive(Debug, Clone, Default)]
pub struct MigrationRequest {
    pub source: Option<Connection>,
    pub target: Option<Connection>,
    /// Destination container on the target.
    pub destination: Option<String>,
    pub items: Vec<MigrationItem>,
    pub options: MigrationOptions,
}

impl MigrationRequest {
    /// Request using the registry's active source and target.
    pub fn from_registry(
        registry: &ConnectionRegistry,
        destination: Option<String>,
        items: Vec<MigrationItem>,
        options: MigrationOptions,
    ) -> Self {
        Self {
            source: registry.source(),
            target: registry.target(),
            destination,
            items,
            options,
        }
    }

    fn check(&self) -> std::result::Result<(), Precondition> {
        if self.source.is_none() {
            return Err(Precondition::MissingSourceConnection);
        }
        if self.target.is_none() {
            return Err(Precondition::MissingTargetConnection);
        }
        if !self.items.iter().any(|i| i.included) {
            return Err(Precondition::NoItemsSelected);
        }
        if self
            .destination
            .as_deref()
            .map_or(true, |d| d.trim().is_empty())
        {
            return Err(Precondition::NoDestination);
        }
        Ok(())
    }
}

/// Parameter names passed to migration operations.
pub mod param {
    pub const SOURCE_SERVER: &str = "SourceServer";
    pub const SOURCE_USER: &str = "SourceUser";
    pub const SOURCE_PASSWORD: &str = "SourcePassword";
    pub const TARGET_SERVER: &str = "TargetServer";
    pub const TARGET_USER: &str = "TargetUser";
    pub const TARGET_PASSWORD: &str = "TargetPassword";
    pub const ITEM_TYPE: &str = "ItemType";
    pub const ITEM_NAME: &str = "ItemName";
    pub const ITEM_ID: &str = "ItemId";
    pub const ITEM_PATH: &str = "ItemPath";
    pub const DESTINATION: &str = "Destination";
    pub const OPTIONS: &str = "Options";
    pub const SERVER: &str = "Server";
    pub const USER: &str = "User";
    pub const PASSWORD: &str = "Password";
}

/// Resolved secrets for one run. A failed resolution is cached as `None`.
#[derive(Default)]
struct CredentialCache {
    entries: HashMap<String, Option<Secret>>,
}

/// Resets the state if the run future is dropped mid-run.
struct RunGuard<'a> {
    state: &'a Mutex<RunState>,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == RunState::Running {
            *state = RunState::Cancelled;
        }
    }
}

/// Sequential batch runner.
pub struct MigrationOrchestrator {
    dispatcher: Arc<ExecutionDispatcher>,
    credentials: Arc<dyn SecretProvider>,
    classifier: ResultClassifier,
    connections: Arc<ConnectionRegistry>,
    settings: OrchestratorSettings,
    state: Mutex<RunState>,
    cancel_requested: AtomicBool,
    progress: watch::Sender<RunProgress>,
}

impl MigrationOrchestrator {
    pub fn new(
        dispatcher: Arc<ExecutionDispatcher>,
        credentials: Arc<dyn SecretProvider>,
        classifier: ResultClassifier,
        connections: Arc<ConnectionRegistry>,
        settings: OrchestratorSettings,
    ) -> Self {
        let (progress, _) = watch::channel(RunProgress::default());
        Self {
            dispatcher,
            credentials,
            classifier,
            connections,
            settings,
            state: Mutex::new(RunState::Idle),
            cancel_requested: AtomicBool::new(false),
            progress,
        }
    }

    pub fn state(&self) -> RunState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn connections(&self) -> &Arc<ConnectionRegistry> {
        &self.connections
    }

    pub fn classifier(&self) -> &ResultClassifier {
        &self.classifier
    }

    /// Live progress of the current or last run.
    pub fn subscribe(&self) -> watch::Receiver<RunProgress> {
        self.progress.subscribe()
    }

    /// Ask the running loop to stop before the next item.
    ///
    /// Returns `false` when no run is active.
    pub fn cancel(&self) -> bool {
        if self.state() != RunState::Running {
            return false;
        }
        self.cancel_requested.store(true, Ordering::SeqCst);
        self.log(LogLevel::Warning, "Cancellation requested");
        true
    }

    /// Run one batch to completion, cancellation or failure.
    pub async fn run(&self, request: MigrationRequest) -> Result<RunReport> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if *state == RunState::Running {
                return Err(MigrationError::RunAlreadyInProgress);
            }
            request.check()?;
            *state = RunState::Running;
            self.cancel_requested.store(false, Ordering::SeqCst);
        }
        let _guard = RunGuard { state: &self.state };

        let run_id = Uuid::new_v4();
        let span = obs::run_span(&run_id.to_string());
        self.execute(run_id, request).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, request: MigrationRequest) -> Result<RunReport> {
        let started_at = Utc::now();
        let MigrationRequest {
            source,
            target,
            destination,
            mut items,
            options,
        } = request;
        // Checked by `MigrationRequest::check`.
        let (Some(source), Some(target), Some(destination)) = (source, target, destination)
        else {
            return Err(MigrationError::Config("run request incomplete".to_string()));
        };

        // Statuses carried over from an earlier run must not count here.
        for item in items.iter_mut().filter(|item| item.included) {
            item.reset();
        }
        let order: Vec<usize> = items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.included)
            .map(|(idx, _)| idx)
            .collect();
        let total = order.len();

        let mut progress = RunProgress {
            state: RunState::Running,
            total,
            ..RunProgress::default()
        };
        self.progress.send_replace(progress.clone());

        obs::emit_run_started(&run_id.to_string(), total, &destination);
        self.log(
            LogLevel::Info,
            &format!(
                "Starting migration of {total} item(s) from {} to {} ({destination})",
                source.address, target.address
            ),
        );

        if let Some(failure) = self.check_capability().await {
            let report = RunReport {
                run_id,
                state: RunState::Failed,
                summary: RunSummary::from_items(&items, started_at, Utc::now()),
                items,
                tasks: Vec::new(),
                failure: Some(failure),
            };
            return Ok(self.finish(report, progress));
        }

        let mut tasks = Vec::with_capacity(total);
        let mut cache = CredentialCache::default();
        let mut cancelled = false;

        for (position, idx) in order.iter().enumerate() {
            if position > 0 && !self.settings.inter_item_delay.is_zero() {
                tokio::time::sleep(self.settings.inter_item_delay).await;
            }
            if self.cancel_requested.load(Ordering::SeqCst) {
                cancelled = true;
                break;
            }

            let item = &mut items[*idx];
            progress.current_item = Some(item.name.clone());
            self.progress.send_replace(progress.clone());

            let mut task = MigrationTask::start(
                format!("Migrate {} '{}'", item.kind, item.name),
                &item.id,
            );
            let outcome = self
                .migrate_item(&source, &target, &destination, item, &options, &mut cache)
                .await;
            task.finish(outcome.task_status());
            tasks.push(task);
            item.apply_outcome(&outcome);

            match item.status {
                ItemStatus::Migrated => {
                    METRICS.inc_items_migrated();
                    progress.succeeded += 1;
                }
                ItemStatus::Failed => {
                    METRICS.inc_items_failed();
                    progress.failed += 1;
                }
                ItemStatus::Skipped => {
                    METRICS.inc_items_skipped();
                    progress.skipped += 1;
                }
                ItemStatus::Pending => {}
            }
            progress.processed += 1;

            obs::emit_item_finished(
                &run_id.to_string(),
                &item.name,
                item.kind.as_str(),
                &outcome.task_status(),
            );
            let level = match &outcome {
                Outcome::Success => LogLevel::Success,
                Outcome::Skipped { .. } => LogLevel::Warning,
                Outcome::Failure { .. } => LogLevel::Error,
            };
            self.log(
                level,
                &format!("{} '{}': {}", item.kind, item.name, outcome.user_message()),
            );
            self.progress.send_replace(progress.clone());
        }

        progress.current_item = None;
        let report = RunReport {
            run_id,
            state: if cancelled {
                RunState::Cancelled
            } else {
                RunState::Completed
            },
            summary: RunSummary::from_items(&items, started_at, Utc::now()),
            items,
            tasks,
            failure: None,
        };
        Ok(self.finish(report, progress))
    }

    /// `Some(reason)` when the capability probe ran and did not succeed.
    async fn check_capability(&self) -> Option<String> {
        let probe = self.settings.operations.capability_probe.as_ref()?;
        if self.dispatcher.capability_confirmed() {
            return None;
        }
        match self.dispatcher.probe_capability(probe, &self.classifier).await {
            Ok(outcome) if outcome.is_success() => None,
            Ok(outcome) => Some(format!("capability check failed: {}", outcome.user_message())),
            Err(e) => Some(format!("capability check failed: {e}")),
        }
    }

    async fn migrate_item(
        &self,
        source: &Connection,
        target: &Connection,
        destination: &str,
        item: &MigrationItem,
        options: &MigrationOptions,
        cache: &mut CredentialCache,
    ) -> Outcome {
        let source_secret = match self.secret_for(source, cache).await {
            Ok(secret) => secret,
            Err(e) => return Outcome::failure(e.to_string(), FailureCause::Authentication),
        };
        let target_secret = match self.secret_for(target, cache).await {
            Ok(secret) => secret,
            Err(e) => return Outcome::failure(e.to_string(), FailureCause::Authentication),
        };

        let operation = match self.settings.operations.migration_for(item.kind) {
            Ok(op) => op,
            Err(e) => return Outcome::failure(e.to_string(), FailureCause::Other),
        };

        let mut params = Parameters::new();
        params.insert(param::SOURCE_SERVER.into(), source.address.clone().into());
        params.insert(param::SOURCE_USER.into(), source.username.clone().into());
        params.insert(param::SOURCE_PASSWORD.into(), source_secret.expose().into());
        params.insert(param::TARGET_SERVER.into(), target.address.clone().into());
        params.insert(param::TARGET_USER.into(), target.username.clone().into());
        params.insert(param::TARGET_PASSWORD.into(), target_secret.expose().into());
        params.insert(param::ITEM_TYPE.into(), item.kind.as_str().into());
        params.insert(param::ITEM_NAME.into(), item.name.clone().into());
        params.insert(param::ITEM_ID.into(), item.id.clone().into());
        params.insert(param::ITEM_PATH.into(), item.path.clone().into());
        params.insert(param::DESTINATION.into(), destination.into());
        params.insert(param::OPTIONS.into(), options.to_parameter());

        let invoke = InvokeOptions::optimized().with_log_suffix(&item.name);
        match self.dispatcher.invoke(operation, params, invoke).await {
            Ok(raw) => self.classifier.classify(&raw.text),
            Err(e) => {
                let reason = e.to_string();
                let cause = self.classifier.cause_of(&reason);
                Outcome::failure(reason, cause)
            }
        }
    }

    async fn secret_for(
        &self,
        connection: &Connection,
        cache: &mut CredentialCache,
    ) -> Result<Secret> {
        let endpoint = connection.endpoint_key();
        if let Some(cached) = cache.entries.get(&endpoint) {
            return cached
                .clone()
                .ok_or(MigrationError::CredentialRequired { endpoint });
        }
        match self.credentials.resolve(connection).await {
            Ok(secret) => {
                cache.entries.insert(endpoint, Some(secret.clone()));
                Ok(secret)
            }
            Err(e) => {
                warn!(endpoint = %endpoint, error = %e, "credential unavailable for run");
                cache.entries.insert(endpoint, None);
                Err(e)
            }
        }
    }

    fn finish(&self, report: RunReport, mut progress: RunProgress) -> RunReport {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            *state = report.state;
        }
        progress.state = report.state;
        progress.current_item = None;
        self.progress.send_replace(progress);

        METRICS.inc_runs_completed();
        METRICS.flush();
        let duration_ms = report.summary.duration().num_milliseconds().max(0) as u64;
        obs::emit_run_finished(
            &report.run_id.to_string(),
            &format!("{:?}", report.state),
            duration_ms,
            report.summary.succeeded,
            report.summary.failed,
        );

        let message = report.status_message();
        let level = match report.state {
            RunState::Completed if report.summary.failed == 0 => LogLevel::Success,
            RunState::Completed | RunState::Cancelled => LogLevel::Warning,
            _ => LogLevel::Error,
        };
        self.log(
            level,
            &format!("{message} in {}", report.summary.human_duration()),
        );
        info!(state = ?report.state, "{message}");
        report
    }

    /// Direct-convention connectivity test. On success `connection` becomes
    /// the registry's active connection.
    pub async fn test_connection(&self, connection: &Connection) -> Result<Outcome> {
        let secret = self.credentials.resolve(connection).await?;
        let mut params = Parameters::new();
        params.insert(param::SERVER.into(), connection.address.clone().into());
        params.insert(param::USER.into(), connection.username.clone().into());
        params.insert(param::PASSWORD.into(), secret.expose().into());

        let raw = self
            .dispatcher
            .invoke(
                &self.settings.operations.test_connection,
                params,
                InvokeOptions::direct().with_log_suffix(&connection.name),
            )
            .await?;
        let outcome = self.classifier.classify(&raw.text);

        if outcome.is_success() {
            self.connections.set_active(connection.clone());
            self.log(
                LogLevel::Success,
                &format!("Connected to {}", connection.address),
            );
        } else {
            self.log(
                LogLevel::Error,
                &format!(
                    "Connection to {} failed: {}",
                    connection.address,
                    outcome.user_message()
                ),
            );
        }
        Ok(outcome)
    }

    /// List items of `kind` on `connection`. All items come back included
    /// and pending.
    pub async fn discover(
        &self,
        connection: &Connection,
        kind: ItemKind,
    ) -> Result<Vec<MigrationItem>> {
        let secret = self.credentials.resolve(connection).await?;
        let mut params = Parameters::new();
        params.insert(param::SERVER.into(), connection.address.clone().into());
        params.insert(param::USER.into(), connection.username.clone().into());
        params.insert(param::PASSWORD.into(), secret.expose().into());
        params.insert(param::ITEM_TYPE.into(), Value::from(kind.as_str()));

        let records: Vec<DiscoveredItem> = self
            .dispatcher
            .invoke_typed(
                &self.settings.operations.inventory,
                params,
                InvokeOptions::optimized().with_log_suffix(kind.as_str()),
            )
            .await?;

        self.log(
            LogLevel::Info,
            &format!("Discovered {} {kind} item(s) on {}", records.len(), connection.address),
        );
        Ok(records.into_iter().map(|r| r.into_item(kind)).collect())
    }

    fn log(&self, level: LogLevel, message: &str) {
        let activity: &ActivityLog = self.dispatcher.activity();
        activity.append(LogEntry::new(
            level,
            SOURCE,
            "-",
            self.dispatcher.session_id(),
            message,
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{CredentialResolver, PromptResponse};
    use crate::dispatcher::DispatcherSettings;
    use crate::fakes::{MemorySecretStore, ScriptedBackend, ScriptedPrompt};

    fn connections() -> (Connection, Connection) {
        (
            Connection::new("src", "vc01.lab", "admin"),
            Connection::new("dst", "vc02.lab", "admin"),
        )
    }

    fn orchestrator(backend: Arc<ScriptedBackend>, prompt: ScriptedPrompt) -> MigrationOrchestrator {
        let dir = std::env::temp_dir().join("vmig-orchestrator-tests");
        let dispatcher = Arc::new(ExecutionDispatcher::new(
            backend,
            Arc::new(ActivityLog::default()),
            DispatcherSettings {
                log_dir: dir,
                ..DispatcherSettings::default()
            },
        ));
        let mut settings = OrchestratorSettings {
            inter_item_delay: Duration::ZERO,
            ..OrchestratorSettings::default()
        };
        settings.operations.capability_probe = None;
        MigrationOrchestrator::new(
            dispatcher,
            Arc::new(CredentialResolver::new(MemorySecretStore::new(), prompt)),
            ResultClassifier::default(),
            Arc::new(ConnectionRegistry::new()),
            settings,
        )
    }

    fn request(items: Vec<MigrationItem>) -> MigrationRequest {
        let (source, target) = connections();
        MigrationRequest {
            source: Some(source),
            target: Some(target),
            destination: Some("/dc2/vm".to_string()),
            items,
            options: MigrationOptions::default(),
        }
    }

    fn vm(name: &str) -> MigrationItem {
        MigrationItem::new(ItemKind::VirtualMachine, name, &format!("id-{name}"), "/dc1/vm")
    }

    fn prompt_ok() -> ScriptedPrompt {
        ScriptedPrompt::new(vec![
            PromptResponse::confirmed("src-pass"),
            PromptResponse::confirmed("dst-pass"),
        ])
    }

    #[tokio::test]
    async fn test_preconditions_leave_state_untouched() {
        let orch = orchestrator(Arc::new(ScriptedBackend::new()), prompt_ok());

        let mut missing_source = request(vec![vm("a")]);
        missing_source.source = None;
        assert!(matches!(
            orch.run(missing_source).await,
            Err(MigrationError::PreconditionNotMet(Precondition::MissingSourceConnection))
        ));

        let mut missing_target = request(vec![vm("a")]);
        missing_target.target = None;
        assert!(matches!(
            orch.run(missing_target).await,
            Err(MigrationError::PreconditionNotMet(Precondition::MissingTargetConnection))
        ));

        assert!(matches!(
            orch.run(request(vec![vm("a").excluded()])).await,
            Err(MigrationError::PreconditionNotMet(Precondition::NoItemsSelected))
        ));

        let mut no_destination = request(vec![vm("a")]);
        no_destination.destination = Some("  ".to_string());
        assert!(matches!(
            orch.run(no_destination).await,
            Err(MigrationError::PreconditionNotMet(Precondition::NoDestination))
        ));

        assert_eq!(orch.state(), RunState::Idle);
    }

    #[tokio::test]
    async fn test_parameters_sent_to_operation() {
        let backend = Arc::new(ScriptedBackend::new());
        let orch = orchestrator(backend.clone(), prompt_ok());
        orch.run(request(vec![vm("web01")])).await.unwrap();

        let payload = &backend.stdin_payloads()[0];
        assert_eq!(payload["SourceServer"], "vc01.lab");
        assert_eq!(payload["SourcePassword"], "src-pass");
        assert_eq!(payload["TargetPassword"], "dst-pass");
        assert_eq!(payload["ItemType"], "VirtualMachine");
        assert_eq!(payload["ItemName"], "web01");
        assert_eq!(payload["ItemId"], "id-web01");
        assert_eq!(payload["ItemPath"], "/dc1/vm");
        assert_eq!(payload["Destination"], "/dc2/vm");
        assert_eq!(payload["Options"]["PreservePermissions"], true);

        let script = &backend.requests()[0].script;
        assert!(script.ends_with("Migrate-VM.ps1"));
    }

    #[tokio::test]
    async fn test_excluded_items_untouched_and_order_kept() {
        let backend = Arc::new(ScriptedBackend::new());
        let orch = orchestrator(backend.clone(), prompt_ok());
        let report = orch
            .run(request(vec![vm("a"), vm("b").excluded(), vm("c")]))
            .await
            .unwrap();

        assert_eq!(report.items[1].status, ItemStatus::Pending);
        let names: Vec<String> = backend
            .stdin_payloads()
            .iter()
            .map(|p| p["ItemName"].as_str().unwrap_or_default().to_string())
            .collect();
        assert_eq!(names, vec!["a", "c"]);
        assert_eq!(report.tasks.len(), 2);
        assert_eq!(report.summary.total, 2);
    }

    #[tokio::test]
    async fn test_credentials_resolved_once_per_run() {
        let prompt = ScriptedPrompt::new(vec![
            PromptResponse::confirmed("src-pass"),
            PromptResponse::confirmed("dst-pass"),
        ]);
        let orch = orchestrator(Arc::new(ScriptedBackend::new()), prompt);
        let report = orch
            .run(request(vec![vm("a"), vm("b"), vm("c")]))
            .await
            .unwrap();
        assert_eq!(report.summary.succeeded, 3);
    }

    #[tokio::test]
    async fn test_transport_failure_is_item_failure() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(script_host::ScriptHostError::Timeout { elapsed_ms: 10 });
        let orch = orchestrator(backend, prompt_ok());

        let report = orch.run(request(vec![vm("a"), vm("b")])).await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(report.items[0].status, ItemStatus::Failed);
        assert_eq!(report.items[1].status, ItemStatus::Migrated);
        assert!(report.tasks[0].status.starts_with("Failed: execution of Migrate-VM failed"));
    }

    #[tokio::test]
    async fn test_failed_probe_fails_run_without_touching_items() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Failure: PowerCLI module not found");
        let mut orch = orchestrator(backend.clone(), prompt_ok());
        orch.settings.operations.capability_probe =
            Some(OperationRef::new("scripts/Test-PowerCLI.ps1"));

        let report = orch.run(request(vec![vm("a")])).await.unwrap();
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.items[0].status, ItemStatus::Pending);
        assert!(report
            .status_message()
            .starts_with("Migration failed: capability check failed"));
        assert_eq!(orch.state(), RunState::Failed);
        assert_eq!(backend.requests().len(), 1);

        // Terminal state accepts a new run; the probe now passes and latches.
        let report = orch.run(request(vec![vm("a")])).await.unwrap();
        assert_eq!(report.state, RunState::Completed);
        assert_eq!(backend.stdin_payloads()[0]["SkipModuleCheck"], true);
    }

    #[tokio::test]
    async fn test_cancel_right_after_start_is_honored() {
        let backend = Arc::new(ScriptedBackend::new().with_delay(Duration::from_millis(20)));
        let orch = orchestrator(backend, prompt_ok());
        let mut progress = orch.subscribe();

        let (report, cancelled) = tokio::join!(orch.run(request(vec![vm("a"), vm("b")])), async {
            loop {
                if progress.changed().await.is_err() {
                    return false;
                }
                if progress.borrow().state == RunState::Running {
                    break;
                }
            }
            orch.cancel()
        });

        assert!(cancelled);
        let report = report.unwrap();
        assert_eq!(report.state, RunState::Cancelled);
        assert_eq!(report.items[1].status, ItemStatus::Pending);
        assert_eq!(report.summary.processed(), report.tasks.len());
    }

    #[tokio::test]
    async fn test_failed_capability_check_reports_no_stale_counts() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Failure: PowerCLI module not found");
        let mut orch = orchestrator(backend, prompt_ok());
        orch.settings.operations.capability_probe =
            Some(OperationRef::new("scripts/Test-PowerCLI.ps1"));

        let mut done = vm("a");
        done.status = ItemStatus::Migrated;
        let mut broken = vm("b");
        broken.status = ItemStatus::Failed;
        broken.detail = Some("timed out".to_string());

        let report = orch.run(request(vec![done, broken])).await.unwrap();
        assert_eq!(report.state, RunState::Failed);
        assert_eq!(report.summary.processed(), 0);
        assert_eq!(report.summary.not_processed(), 2);
        assert!(report
            .items
            .iter()
            .all(|i| i.status == ItemStatus::Pending && i.detail.is_none()));
    }

    #[tokio::test]
    async fn test_progress_is_published() {
        let orch = orchestrator(Arc::new(ScriptedBackend::new()), prompt_ok());
        let rx = orch.subscribe();
        orch.run(request(vec![vm("a"), vm("b")])).await.unwrap();

        let progress = rx.borrow().clone();
        assert_eq!(progress.state, RunState::Completed);
        assert_eq!(progress.processed, 2);
        assert_eq!(progress.succeeded, 2);
        assert_eq!(progress.percent(), 100.0);
        assert!(progress.current_item.is_none());
    }

    #[tokio::test]
    async fn test_connection_sets_active_on_success() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Failure: Could not resolve host");
        let orch = orchestrator(
            backend.clone(),
            ScriptedPrompt::new(vec![
                PromptResponse::confirmed("p1"),
                PromptResponse::confirmed("p2"),
            ]),
        );
        let (source, _) = connections();

        let failed = orch.test_connection(&source).await.unwrap();
        assert!(matches!(
            failed,
            Outcome::Failure {
                cause: FailureCause::Network,
                ..
            }
        ));
        assert!(orch.connections().active().is_none());

        assert!(orch.test_connection(&source).await.unwrap().is_success());
        assert_eq!(orch.connections().active(), Some(source));
        assert!(backend.requests()[0].stdin.is_none());
        assert!(backend.requests()[0].args.contains(&"-Server".to_string()));
    }

    #[tokio::test]
    async fn test_discover_maps_records() {
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout(
            r#"[{"Name":"web01","Id":"vm-1","Path":"/dc/vm"},{"Bogus":1},{"Name":"db01","Id":"vm-2"}]"#,
        );
        let orch = orchestrator(backend, prompt_ok());
        let (source, _) = connections();

        let items = orch.discover(&source, ItemKind::VirtualMachine).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "web01");
        assert_eq!(items[1].path, "");
        assert!(items.iter().all(|i| i.included && i.status == ItemStatus::Pending));
    }

    #[tokio::test]
    async fn test_cancel_without_run_is_noop() {
        let orch = orchestrator(Arc::new(ScriptedBackend::new()), prompt_ok());
        assert!(!orch.cancel());
    }
}
