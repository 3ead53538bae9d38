//! Execution Dispatcher.
//!
//! Every migration, discovery and connectivity operation is an external
//! script identified by an [`OperationRef`]. The dispatcher encodes the
//! parameters for the chosen [`CallingConvention`], assigns a per-invocation
//! log file, runs the script through a [`ScriptBackend`] and returns the raw
//! output for classification.
//!
//! Transport failures (interpreter missing, spawn error, timeout, or a
//! non-zero exit with no output) become [`MigrationError::ExecutionFailed`].
//! Anything the script actually printed is returned as a [`RawResult`], even
//! with a non-zero exit code.

pub mod backend;
pub mod log_path;
pub mod params;

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::activity_log::{ActivityLog, LogEntry, LogLevel};
use crate::classifier::ResultClassifier;
use crate::domain::{MigrationError, Outcome, Result};
use crate::metrics::METRICS;
use crate::obs;

pub use backend::{BackendRequest, InterpreterBackend, ScriptBackend};
pub use log_path::LogPathGenerator;
pub use params::Parameters;

const SOURCE: &str = "Dispatcher";

/// Parameter carrying the per-invocation log file.
pub const LOG_PATH_PARAMETER: &str = "LogPath";

/// Opaque reference to an operation script.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRef(PathBuf);

impl OperationRef {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self(path.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// File stem used for log naming and diagnostics.
    pub fn name(&self) -> String {
        self.0
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.display().to_string())
    }
}

/// How parameters reach the script.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallingConvention {
    /// `-Name value` argument pairs.
    Direct,
    /// One JSON object on stdin.
    #[default]
    Optimized,
}

impl CallingConvention {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallingConvention::Direct => "direct",
            CallingConvention::Optimized => "optimized",
        }
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct InvokeOptions {
    pub convention: CallingConvention,
    /// Appended to the generated log file name.
    pub log_suffix: Option<String>,
    /// Overrides log path generation.
    pub log_path: Option<PathBuf>,
    /// `None` uses the dispatcher default.
    pub timeout: Option<Option<Duration>>,
}

impl InvokeOptions {
    pub fn direct() -> Self {
        Self {
            convention: CallingConvention::Direct,
            ..Self::default()
        }
    }

    pub fn optimized() -> Self {
        Self::default()
    }

    pub fn with_log_suffix(mut self, suffix: &str) -> Self {
        self.log_suffix = Some(suffix.to_string());
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Raw output of one invocation, with sensitive parameter values redacted.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    /// Trimmed stdout.
    pub text: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub log_path: PathBuf,
    /// Stdout parsed as JSON, when possible.
    pub structured: Option<Value>,
}

impl RawResult {
    pub fn new(text: &str, stderr: &str, exit_code: i32, duration_ms: u64, log_path: PathBuf) -> Self {
        let text = text.trim().to_string();
        let structured = parse_structured(&text);
        Self {
            text,
            stderr: stderr.to_string(),
            exit_code,
            duration_ms,
            log_path,
            structured,
        }
    }

    /// Deserialize structured output into records.
    ///
    /// An array maps element-wise and a single object to one record.
    /// Elements that do not fit `T` are dropped with a warning. Missing or
    /// scalar output yields an empty vector.
    pub fn records<T: DeserializeOwned>(&self) -> Vec<T> {
        let elements: Vec<&Value> = match &self.structured {
            Some(Value::Array(values)) => values.iter().collect(),
            Some(value @ Value::Object(_)) => vec![value],
            _ => return Vec::new(),
        };

        elements
            .into_iter()
            .enumerate()
            .filter_map(|(index, value)| match T::deserialize(value) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(index = index, error = %e, "dropping malformed record");
                    None
                }
            })
            .collect()
    }
}

/// Whole text as JSON, or one JSON value per non-empty line.
fn parse_structured(text: &str) -> Option<Value> {
    if text.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Some(value);
    }

    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() < 2 {
        return None;
    }
    lines
        .into_iter()
        .map(|line| serde_json::from_str::<Value>(line).ok())
        .collect::<Option<Vec<_>>>()
        .map(Value::Array)
}

/// Dispatcher tunables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatcherSettings {
    pub log_dir: PathBuf,
    pub timeout: Option<Duration>,
    pub preview_chars: usize,
    /// Injected into Optimized calls once capability is confirmed.
    pub bypass_parameter: String,
}

impl Default for DispatcherSettings {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            timeout: Some(Duration::from_secs(1800)),
            preview_chars: 200,
            bypass_parameter: "SkipModuleCheck".to_string(),
        }
    }
}

/// Runs operations and reports raw results.
pub struct ExecutionDispatcher {
    backend: Arc<dyn ScriptBackend>,
    activity: Arc<ActivityLog>,
    settings: DispatcherSettings,
    log_paths: LogPathGenerator,
    capability_confirmed: AtomicBool,
    session_id: String,
}

impl ExecutionDispatcher {
    pub fn new(
        backend: Arc<dyn ScriptBackend>,
        activity: Arc<ActivityLog>,
        settings: DispatcherSettings,
    ) -> Self {
        let log_paths = LogPathGenerator::new(settings.log_dir.clone());
        Self {
            backend,
            activity,
            settings,
            log_paths,
            capability_confirmed: AtomicBool::new(false),
            session_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    pub fn settings(&self) -> &DispatcherSettings {
        &self.settings
    }

    pub fn activity(&self) -> &Arc<ActivityLog> {
        &self.activity
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Latch the capability flag. It is never unset.
    pub fn confirm_capability(&self) {
        if !self.capability_confirmed.swap(true, Ordering::SeqCst) {
            info!("script capability confirmed");
        }
    }

    pub fn capability_confirmed(&self) -> bool {
        self.capability_confirmed.load(Ordering::SeqCst)
    }

    /// Run the capability probe unless already latched. A `Success` outcome
    /// latches the flag.
    pub async fn probe_capability(
        &self,
        operation: &OperationRef,
        classifier: &ResultClassifier,
    ) -> Result<Outcome> {
        if self.capability_confirmed() {
            return Ok(Outcome::Success);
        }

        let raw = self
            .invoke(operation, Parameters::new(), InvokeOptions::direct())
            .await?;
        let outcome = classifier.classify(&raw.text);
        if outcome.is_success() {
            self.confirm_capability();
        } else {
            self.log(
                LogLevel::Warning,
                &operation.name(),
                format!("Capability probe failed: {}", outcome.user_message()),
            );
        }
        Ok(outcome)
    }

    /// Invoke `operation` with `params`.
    pub async fn invoke(
        &self,
        operation: &OperationRef,
        mut params: Parameters,
        options: InvokeOptions,
    ) -> Result<RawResult> {
        let name = operation.name();
        let log_path = match options.log_path {
            Some(path) => path,
            None => self.log_paths.next(&name, options.log_suffix.as_deref()).await,
        };
        params.insert(
            LOG_PATH_PARAMETER.to_string(),
            Value::String(log_path.display().to_string()),
        );

        let (args, stdin) = match options.convention {
            CallingConvention::Direct => (params::to_direct_args(&params), None),
            CallingConvention::Optimized => {
                if self.capability_confirmed() && !self.settings.bypass_parameter.is_empty() {
                    params.insert(self.settings.bypass_parameter.clone(), Value::Bool(true));
                }
                (Vec::new(), Some(params::to_stdin_payload(&params)?))
            }
        };

        let described = params::describe(&params);
        debug!(
            operation = %name,
            convention = options.convention.as_str(),
            params = %described,
            "invoking operation"
        );
        self.log(
            LogLevel::Info,
            &name,
            format!(
                "Invoking {name} ({}) with {described}",
                options.convention.as_str()
            ),
        );

        let request = BackendRequest {
            script: operation.path().to_path_buf(),
            args,
            stdin,
            timeout: options.timeout.unwrap_or(self.settings.timeout),
        };

        METRICS.inc_invocations();
        let output = match self.backend.execute(request).await {
            Ok(output) => output,
            Err(e) => {
                let detail = params::scrub(&e.to_string(), &params);
                return Err(self.transport_failure(&name, detail));
            }
        };

        if output.exit_code != 0 && output.stdout.trim().is_empty() {
            let stderr = params::truncate(output.stderr.trim(), self.settings.preview_chars);
            let detail = if stderr.is_empty() {
                format!("exit code {}", output.exit_code)
            } else {
                format!("exit code {}: {}", output.exit_code, stderr)
            };
            return Err(self.transport_failure(&name, params::scrub(&detail, &params)));
        }

        let result = RawResult::new(
            &params::scrub(&output.stdout, &params),
            &params::scrub(&output.stderr, &params),
            output.exit_code,
            output.duration_ms,
            log_path,
        );

        let preview = params::truncate(&result.text, self.settings.preview_chars);
        let level = if result.exit_code == 0 {
            LogLevel::Success
        } else {
            LogLevel::Warning
        };
        self.log(
            level,
            &name,
            format!(
                "{name} finished in {}ms (exit {}): {preview}",
                result.duration_ms, result.exit_code
            ),
        );
        obs::emit_dispatch_invoked(
            &name,
            options.convention.as_str(),
            result.exit_code,
            result.duration_ms,
        );

        Ok(result)
    }

    /// Invoke and deserialize the output into records.
    pub async fn invoke_typed<T: DeserializeOwned>(
        &self,
        operation: &OperationRef,
        params: Parameters,
        options: InvokeOptions,
    ) -> Result<Vec<T>> {
        let raw = self.invoke(operation, params, options).await?;
        Ok(raw.records())
    }

    fn transport_failure(&self, operation: &str, detail: String) -> MigrationError {
        METRICS.inc_invocation_failures();
        obs::emit_dispatch_failed(operation, &detail);
        self.log(
            LogLevel::Error,
            operation,
            format!("{operation} failed: {detail}"),
        );
        MigrationError::ExecutionFailed {
            operation: operation.to_string(),
            detail,
        }
    }

    fn log(&self, level: LogLevel, script: &str, message: String) {
        self.activity
            .append(LogEntry::new(level, SOURCE, script, &self.session_id, message));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::ScriptedBackend;
    use serde::Deserialize;
    use tempfile::tempdir;

    fn dispatcher(backend: Arc<ScriptedBackend>, log_dir: &Path) -> ExecutionDispatcher {
        ExecutionDispatcher::new(
            backend,
            Arc::new(ActivityLog::default()),
            DispatcherSettings {
                log_dir: log_dir.to_path_buf(),
                ..DispatcherSettings::default()
            },
        )
    }

    fn op(name: &str) -> OperationRef {
        OperationRef::new(format!("/scripts/{name}.ps1"))
    }

    #[test]
    fn test_operation_name_is_stem() {
        assert_eq!(op("Migrate-VM").name(), "Migrate-VM");
    }

    #[test]
    fn test_structured_parsing() {
        let p = PathBuf::new();
        assert_eq!(RawResult::new("Success", "", 0, 1, p.clone()).structured, None);
        assert!(matches!(
            RawResult::new(r#"[{"a":1}]"#, "", 0, 1, p.clone()).structured,
            Some(Value::Array(_))
        ));
        let lines = RawResult::new("{\"a\":1}\n{\"a\":2}\n", "", 0, 1, p.clone());
        assert_eq!(lines.structured, Some(serde_json::json!([{"a":1},{"a":2}])));
        assert_eq!(RawResult::new("", "", 0, 1, p).structured, None);
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Rec {
        name: String,
    }

    #[test]
    fn test_records_drop_malformed() {
        let raw = RawResult::new(
            r#"[{"name":"a"},{"nope":1},{"name":"b"}]"#,
            "",
            0,
            1,
            PathBuf::new(),
        );
        let recs: Vec<Rec> = raw.records();
        assert_eq!(recs.len(), 2);

        let single = RawResult::new(r#"{"name":"x"}"#, "", 0, 1, PathBuf::new());
        assert_eq!(single.records::<Rec>(), vec![Rec { name: "x".into() }]);

        let text = RawResult::new("not json", "", 0, 1, PathBuf::new());
        assert!(text.records::<Rec>().is_empty());
    }

    #[tokio::test]
    async fn test_direct_invocation_passes_log_path_argument() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Success");
        let d = dispatcher(backend.clone(), dir.path());

        let mut params = Parameters::new();
        params.insert("Server".into(), Value::from("vc01"));
        let raw = d
            .invoke(&op("Test-Connection"), params, InvokeOptions::direct())
            .await
            .unwrap();

        assert_eq!(raw.text, "Success");
        let requests = backend.requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].stdin.is_none());
        let idx = requests[0].args.iter().position(|a| a == "-LogPath").unwrap();
        assert_eq!(requests[0].args[idx + 1], raw.log_path.display().to_string());
        assert!(raw.log_path.starts_with(dir.path()));
    }

    #[tokio::test]
    async fn test_bypass_parameter_injected_after_confirmation() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        let d = dispatcher(backend.clone(), dir.path());

        d.invoke(&op("Migrate-VM"), Parameters::new(), InvokeOptions::optimized())
            .await
            .unwrap();
        d.confirm_capability();
        d.invoke(&op("Migrate-VM"), Parameters::new(), InvokeOptions::optimized())
            .await
            .unwrap();

        let payloads = backend.stdin_payloads();
        assert!(payloads[0].get("SkipModuleCheck").is_none());
        assert_eq!(payloads[1]["SkipModuleCheck"], Value::Bool(true));
        assert!(payloads[1].get("LogPath").is_some());
    }

    #[tokio::test]
    async fn test_transport_failures() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_error(script_host::ScriptHostError::Timeout { elapsed_ms: 5 });
        backend.push_output("", "boom", 2);
        backend.push_output("Failure: partial", "", 1);
        let d = dispatcher(backend, dir.path());

        let timed_out = d
            .invoke(&op("Migrate-VM"), Parameters::new(), InvokeOptions::optimized())
            .await;
        assert!(matches!(timed_out, Err(MigrationError::ExecutionFailed { .. })));

        match d
            .invoke(&op("Migrate-VM"), Parameters::new(), InvokeOptions::optimized())
            .await
        {
            Err(MigrationError::ExecutionFailed { operation, detail }) => {
                assert_eq!(operation, "Migrate-VM");
                assert_eq!(detail, "exit code 2: boom");
            }
            other => panic!("expected ExecutionFailed, got {other:?}"),
        }

        let with_output = d
            .invoke(&op("Migrate-VM"), Parameters::new(), InvokeOptions::optimized())
            .await
            .unwrap();
        assert_eq!(with_output.exit_code, 1);
        assert_eq!(with_output.text, "Failure: partial");
    }

    #[tokio::test]
    async fn test_secrets_never_reach_activity_log() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_output("", "bad password hunter2", 1);
        let d = dispatcher(backend, dir.path());

        let mut params = Parameters::new();
        params.insert("SourcePassword".into(), Value::from("hunter2"));
        let err = d
            .invoke(&op("Migrate-VM"), params, InvokeOptions::optimized())
            .await
            .unwrap_err();

        assert!(!err.to_string().contains("hunter2"));
        for entry in d.activity().snapshot(100) {
            assert!(!entry.message().contains("hunter2"), "{}", entry.message());
        }
    }

    #[tokio::test]
    async fn test_printed_secrets_redacted_from_result() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_output(
            "Failure: login failed for admin with password s3cret",
            "warning: retried with s3cret",
            0,
        );
        let d = dispatcher(backend, dir.path());

        let mut params = Parameters::new();
        params.insert("TargetPassword".into(), Value::from("s3cret"));
        let raw = d
            .invoke(&op("Migrate-VM"), params, InvokeOptions::optimized())
            .await
            .unwrap();

        assert_eq!(raw.text, "Failure: login failed for admin with password ***");
        assert!(!raw.stderr.contains("s3cret"));
        for entry in d.activity().snapshot(100) {
            assert!(!entry.message().contains("s3cret"), "{}", entry.message());
        }
    }

    #[tokio::test]
    async fn test_probe_latches_only_on_success() {
        let dir = tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Failure: module not installed");
        backend.push_stdout("Success");
        let d = dispatcher(backend.clone(), dir.path());
        let classifier = ResultClassifier::default();

        let first = d.probe_capability(&op("Test-PowerCLI"), &classifier).await.unwrap();
        assert!(!first.is_success());
        assert!(!d.capability_confirmed());

        let second = d.probe_capability(&op("Test-PowerCLI"), &classifier).await.unwrap();
        assert!(second.is_success());
        assert!(d.capability_confirmed());

        // Latched: no further invocation.
        d.probe_capability(&op("Test-PowerCLI"), &classifier).await.unwrap();
        assert_eq!(backend.requests().len(), 2);
    }
}
