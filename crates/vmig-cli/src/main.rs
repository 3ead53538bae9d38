//! vmig - infrastructure migration orchestrator CLI
//!
//! ## Commands
//!
//! - `discover`: List items of one kind on an endpoint into a batch file
//! - `run`: Migrate the included items of a batch file
//! - `test-connection`: Check that an endpoint accepts the credentials
//! - `classify`: Show how a raw script result is interpreted
//!
//! Passwords come from `VMIG_PASSWORD_<ADDRESS>` environment variables or
//! an interactive prompt.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use clap::{Parser, Subcommand};
use tracing::{info, Level};

use vmig_core::telemetry::init_tracing;
use vmig_core::{
    default_export_path, ActivityLog, Connection, ConnectionRegistry, CredentialResolver,
    EnvSecretStore, ExecutionDispatcher, InterpreterBackend, ItemKind, MigrationConfig,
    MigrationDocument, MigrationOrchestrator, MigrationRequest, PromptResponse,
    ResultClassifier, RunReport, RunState, RunVerdict, Secret, SecretPrompt, SecretProvider,
};

#[derive(Parser)]
#[command(name = "vmig")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Migrate inventory between virtualization endpoints", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Configuration file
    #[arg(long, global = true, env = "VMIG_CONFIG", default_value = "vmig.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Discover items on an endpoint and write them to a batch file
    Discover {
        /// Endpoint address
        #[arg(long)]
        server: String,

        /// User name on the endpoint
        #[arg(long)]
        user: String,

        /// Item kind (host, vm, folder, role, permission)
        #[arg(long, default_value = "vm")]
        kind: ItemKind,

        /// Target endpoint recorded in the batch file
        #[arg(long, default_value = "")]
        target: String,

        /// Output file (default: export directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Migrate the included items of a batch file
    Run {
        /// Batch file written by `discover` or a previous run
        #[arg(long)]
        batch: PathBuf,

        /// Source endpoint address
        #[arg(long)]
        source: String,

        /// User name on the source endpoint
        #[arg(long)]
        source_user: String,

        /// Target endpoint address
        #[arg(long)]
        target: String,

        /// User name on the target endpoint
        #[arg(long)]
        target_user: String,

        /// Destination container on the target (default: from the batch file)
        #[arg(long)]
        destination: Option<String>,

        /// Validate only, do not change anything
        #[arg(long)]
        dry_run: bool,
    },

    /// Test connectivity and credentials for an endpoint
    TestConnection {
        /// Endpoint address
        #[arg(long)]
        server: String,

        /// User name on the endpoint
        #[arg(long)]
        user: String,
    },

    /// Classify a raw script result
    Classify {
        /// Raw output text
        text: String,
    },
}

/// Password prompt on the controlling terminal.
struct TerminalPrompt;

#[async_trait]
impl SecretPrompt for TerminalPrompt {
    async fn prompt(&self, title: &str, message: &str) -> PromptResponse {
        eprintln!("{title}");
        eprint!("{message}: ");
        let line = tokio::task::spawn_blocking(|| {
            let mut line = String::new();
            std::io::stdin().read_line(&mut line).map(|_| line)
        })
        .await;

        match line {
            Ok(Ok(line)) if !line.trim_end_matches(['\r', '\n']).is_empty() => PromptResponse {
                confirmed: true,
                secret: Some(Secret::new(line.trim_end_matches(['\r', '\n']))),
            },
            _ => PromptResponse::cancelled(),
        }
    }
}

fn build_orchestrator(
    config: &MigrationConfig,
    credentials: Arc<dyn SecretProvider>,
) -> MigrationOrchestrator {
    let dispatcher = ExecutionDispatcher::new(
        Arc::new(InterpreterBackend::new(config.dispatcher.interpreter.clone())),
        Arc::new(ActivityLog::new(config.activity_log.capacity)),
        config.dispatcher_settings(),
    );
    MigrationOrchestrator::new(
        Arc::new(dispatcher),
        credentials,
        ResultClassifier::new(config.classifier.clone()),
        Arc::new(ConnectionRegistry::new()),
        config.orchestrator_settings(),
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    init_tracing(cli.json, level);

    let config = MigrationConfig::load(&cli.config)
        .await
        .with_context(|| format!("Failed to load configuration from {:?}", cli.config))?;

    if let Commands::Classify { text } = &cli.command {
        return cmd_classify(&config, text);
    }

    if !config.dispatcher.interpreter.is_available().await {
        anyhow::bail!(
            "Script interpreter '{}' is not available",
            config.dispatcher.interpreter.program
        );
    }

    let credentials = Arc::new(CredentialResolver::new(
        EnvSecretStore::default(),
        TerminalPrompt,
    ));
    let orchestrator = build_orchestrator(&config, credentials);

    match cli.command {
        Commands::Discover {
            server,
            user,
            kind,
            target,
            output,
        } => {
            cmd_discover(
                &orchestrator,
                &config,
                &Connection::new("source", &server, &user),
                kind,
                &target,
                output.as_deref(),
            )
            .await
        }
        Commands::Run {
            batch,
            source,
            source_user,
            target,
            target_user,
            destination,
            dry_run,
        } => {
            cmd_run(
                &orchestrator,
                &config,
                &batch,
                Connection::new("source", &source, &source_user),
                Connection::new("target", &target, &target_user),
                destination,
                dry_run,
            )
            .await
        }
        Commands::TestConnection { server, user } => {
            cmd_test_connection(&orchestrator, &Connection::new(&server, &server, &user)).await
        }
        Commands::Classify { .. } => Ok(()),
    }
}

async fn cmd_discover(
    orchestrator: &MigrationOrchestrator,
    config: &MigrationConfig,
    connection: &Connection,
    kind: ItemKind,
    target: &str,
    output: Option<&Path>,
) -> Result<()> {
    info!(server = %connection.address, kind = %kind, "discovering items");

    let items = orchestrator
        .discover(connection, kind)
        .await
        .with_context(|| format!("Failed to discover {kind} items on {}", connection.address))?;

    let count = items.len();
    let document = MigrationDocument::new(&connection.address, target, Default::default(), items);
    let path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_export_path(&config.paths.export_dir, Utc::now()));
    document
        .write_to(&path)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;

    println!("Discovered {count} {kind} item(s) on {}", connection.address);
    println!("Batch written to {}", path.display());
    Ok(())
}

async fn cmd_run(
    orchestrator: &MigrationOrchestrator,
    config: &MigrationConfig,
    batch: &Path,
    source: Connection,
    target: Connection,
    destination: Option<String>,
    dry_run: bool,
) -> Result<()> {
    let mut document = MigrationDocument::read_from(batch)
        .await
        .with_context(|| format!("Failed to read batch file {:?}", batch))?;

    let destination = destination.or_else(|| document.destination.clone());
    let mut options = document.options.clone();
    options.validate_only |= dry_run;

    orchestrator.connections().set_source(source.clone());
    orchestrator.connections().set_target(target.clone());
    let request = MigrationRequest::from_registry(
        orchestrator.connections(),
        destination.clone(),
        document.items.clone(),
        options.clone(),
    );

    let run = orchestrator.run(request);
    tokio::pin!(run);
    let report = tokio::select! {
        report = &mut run => report,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("Cancelling after the current item...");
            orchestrator.cancel();
            run.await
        }
    }
    .context("Migration could not start")?;

    print_report(&report);

    document.items = report.items.clone();
    document.options = options;
    document.source_cluster = source.address;
    document.target_cluster = target.address;
    document.destination = destination;
    document.exported_at = Utc::now();
    let path = default_export_path(&config.paths.export_dir, document.exported_at);
    document
        .write_to(&path)
        .await
        .with_context(|| format!("Failed to write {:?}", path))?;
    println!("Results written to {}", path.display());

    if report.state == RunState::Failed || report.summary.verdict() == RunVerdict::TotalFailure {
        anyhow::bail!("{}", report.status_message());
    }
    Ok(())
}

fn print_report(report: &RunReport) {
    println!("{}", report.status_message());
    println!("Duration: {}", report.summary.human_duration());
    println!();
    println!("{:<9} {:<15} {:<30} DETAIL", "STATUS", "KIND", "NAME");
    for item in report.items.iter().filter(|i| i.included) {
        println!(
            "{:<9} {:<15} {:<30} {}",
            format!("{:?}", item.status),
            item.kind.as_str(),
            item.name,
            item.detail.as_deref().unwrap_or("")
        );
    }
}

async fn cmd_test_connection(
    orchestrator: &MigrationOrchestrator,
    connection: &Connection,
) -> Result<()> {
    let outcome = orchestrator
        .test_connection(connection)
        .await
        .with_context(|| format!("Failed to test connection to {}", connection.address))?;

    if outcome.is_success() {
        println!("✓ Connected to {} as {}", connection.address, connection.username);
        Ok(())
    } else {
        anyhow::bail!("{}", outcome.user_message())
    }
}

fn cmd_classify(config: &MigrationConfig, text: &str) -> Result<()> {
    let classifier = ResultClassifier::new(config.classifier.clone());
    let outcome = classifier.classify(text);
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    println!("{}", outcome.user_message());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vmig_core::fakes::{MemorySecretStore, ScriptedBackend, ScriptedPrompt};
    use vmig_core::{
        DispatcherSettings, ItemStatus, MigrationItem, MigrationOptions, OrchestratorSettings,
    };

    fn fake_orchestrator(backend: Arc<ScriptedBackend>, logs: &Path) -> MigrationOrchestrator {
        let dispatcher = ExecutionDispatcher::new(
            backend,
            Arc::new(ActivityLog::default()),
            DispatcherSettings {
                log_dir: logs.to_path_buf(),
                ..DispatcherSettings::default()
            },
        );
        let mut settings = OrchestratorSettings {
            inter_item_delay: std::time::Duration::ZERO,
            ..OrchestratorSettings::default()
        };
        settings.operations.capability_probe = None;
        MigrationOrchestrator::new(
            Arc::new(dispatcher),
            Arc::new(CredentialResolver::new(
                MemorySecretStore::new(),
                ScriptedPrompt::new(vec![
                    PromptResponse::confirmed("p1"),
                    PromptResponse::confirmed("p2"),
                ]),
            )),
            ResultClassifier::default(),
            Arc::new(ConnectionRegistry::new()),
            settings,
        )
    }

    fn config(root: &Path) -> MigrationConfig {
        let mut config = MigrationConfig::default();
        config.paths.export_dir = root.join("exports");
        config.paths.log_dir = root.join("logs");
        config
    }

    #[tokio::test]
    async fn test_discover_writes_batch() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout(r#"[{"Name":"web01","Id":"vm-1","Path":"/dc/vm"}]"#);
        let orchestrator = fake_orchestrator(backend, &temp_dir.path().join("logs"));
        let output = temp_dir.path().join("batch.json");

        cmd_discover(
            &orchestrator,
            &config(temp_dir.path()),
            &Connection::new("source", "vc01", "admin"),
            ItemKind::VirtualMachine,
            "vc02",
            Some(&output),
        )
        .await
        .unwrap();

        let doc = MigrationDocument::read_from(&output).await.unwrap();
        assert_eq!(doc.source_cluster, "vc01");
        assert_eq!(doc.target_cluster, "vc02");
        assert_eq!(doc.items.len(), 1);
        assert_eq!(doc.items[0].status, ItemStatus::Pending);
    }

    #[tokio::test]
    async fn test_run_writes_results_and_fails_on_total_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config = config(temp_dir.path());
        let batch = temp_dir.path().join("batch.json");
        MigrationDocument::new(
            "vc01",
            "vc02",
            MigrationOptions::default(),
            vec![MigrationItem::new(ItemKind::Folder, "Prod", "f-1", "/dc1")],
        )
        .with_destination("/dc2")
        .write_to(&batch)
        .await
        .unwrap();

        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Failure: access denied");
        let orchestrator = fake_orchestrator(backend.clone(), &temp_dir.path().join("logs"));

        let result = cmd_run(
            &orchestrator,
            &config,
            &batch,
            Connection::new("source", "vc01", "admin"),
            Connection::new("target", "vc02", "admin"),
            None,
            true,
        )
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("0 successful, 1 failed"), "{err}");
        assert_eq!(backend.stdin_payloads()[0]["Options"]["ValidateOnly"], true);
        assert_eq!(backend.stdin_payloads()[0]["Destination"], "/dc2");

        let written: Vec<_> = std::fs::read_dir(&config.paths.export_dir)
            .unwrap()
            .collect();
        assert_eq!(written.len(), 1);
        let path = written[0].as_ref().unwrap().path();
        let doc = MigrationDocument::read_from(&path).await.unwrap();
        assert_eq!(doc.items[0].status, ItemStatus::Failed);
        assert!(!std::fs::read_to_string(&path).unwrap().contains("p1"));
    }

    #[tokio::test]
    async fn test_connection_reports_bucketed_failure() {
        let temp_dir = tempfile::tempdir().unwrap();
        let backend = Arc::new(ScriptedBackend::new());
        backend.push_stdout("Failure: Incorrect user name or password");
        let orchestrator = fake_orchestrator(backend, &temp_dir.path().join("logs"));

        let err = cmd_test_connection(&orchestrator, &Connection::new("vc01", "vc01", "admin"))
            .await
            .unwrap_err();
        assert!(err
            .to_string()
            .starts_with("Authentication failed: Incorrect user name or password"));
    }

    #[test]
    fn test_classify_command() {
        assert!(cmd_classify(&MigrationConfig::default(), "Success").is_ok());
    }

    #[test]
    fn test_cli_parses_run() {
        let cli = Cli::parse_from([
            "vmig",
            "run",
            "--batch",
            "b.json",
            "--source",
            "vc01",
            "--source-user",
            "admin",
            "--target",
            "vc02",
            "--target-user",
            "admin",
            "--dry-run",
        ]);
        assert!(matches!(cli.command, Commands::Run { dry_run: true, .. }));
    }
}
