//! vmig core library
//!
//! Orchestrates migration of hosts, virtual machines, folders, roles and
//! permissions between two virtualization management endpoints by driving
//! external migration scripts:
//!
//! - [`credentials`] resolves endpoint secrets (store first, then prompt)
//! - [`dispatcher`] runs operation scripts and returns their raw output
//! - [`classifier`] turns raw output into an [`Outcome`]
//! - [`orchestrator`] runs a batch and aggregates a [`RunReport`]
//! - [`activity_log`] keeps the bounded, shared diagnostic log

pub mod activity_log;
pub mod classifier;
pub mod config;
pub mod credentials;
pub mod dispatcher;
pub mod domain;
pub mod export;
pub mod fakes;
pub mod metrics;
pub mod obs;
pub mod orchestrator;
pub mod telemetry;

pub use activity_log::{ActivityLog, BufferEvent, LogEntry, LogFilter, LogLevel};
pub use classifier::{ClassifierConfig, FailureBucket, ResultClassifier};
pub use config::MigrationConfig;
pub use credentials::{
    CredentialResolver, EnvSecretStore, PromptResponse, Secret, SecretPrompt, SecretProvider,
    SecretStore,
};
pub use dispatcher::{
    CallingConvention, DispatcherSettings, ExecutionDispatcher, InterpreterBackend,
    InvokeOptions, OperationRef, Parameters, RawResult, ScriptBackend,
};
pub use domain::{
    Connection, ConnectionRegistry, DiscoveredItem, FailureCause, ItemKind, ItemStatus,
    MigrationError, MigrationItem, MigrationOptions, MigrationTask, Outcome, Precondition, Result,
    RunProgress, RunReport, RunState, RunSummary, RunVerdict,
};
pub use export::{default_export_path, MigrationDocument};
pub use orchestrator::{
    MigrationOrchestrator, MigrationRequest, OperationCatalog, OrchestratorSettings,
};
