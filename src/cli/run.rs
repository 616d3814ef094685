//! Run command implementation

use crate::circuit::CircuitBreakerRegistry;
use crate::cli::output::{format_report_json, format_report_table};
use crate::cli::{OutputFormat, RunArgs};
use crate::config::{ConfigError, LogFormat, LoggingConfig, RelayConfig};
use crate::provider::factory::build_provider_set;
use crate::queue::{AgentTask, Collaborators, Orchestrator, OrchestratorQueue};
use crate::routing::Router;
use crate::store::{
    BroadcastSink, LogEventKind, MemoryLedger, MemoryStore, MemoryVault, SinkEvent,
};
use crate::trace::DecisionTracer;
use std::io::{self, BufRead, Write};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

/// Load configuration with CLI args and env overrides
pub fn load_config_with_overrides(
    args: &RunArgs,
) -> Result<RelayConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => RelayConfig::load(Some(path))?,
        None => RelayConfig::default(),
    };

    config = config.with_env_overrides();

    if let Some(ref log_level) = args.log_level {
        config.logging.level = log_level.clone();
    }

    config.validate()?;
    Ok(config)
}

/// Initialize tracing based on configuration.
///
/// Logs go to stderr so stdout carries only the report.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let filter_str = crate::logging::build_filter_directives(config);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter_str));

    if config.enable_content_logging {
        eprintln!("WARNING: Content logging is enabled. Prompt and response previews will be logged.");
        eprintln!("         This may include sensitive data. Use only for debugging.");
    }

    match config.format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty().with_writer(io::stderr))
                .try_init()?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}

/// Build the orchestrator and its queue from configuration.
pub fn build_queue(
    config: &RelayConfig,
    events: Arc<BroadcastSink>,
) -> Result<OrchestratorQueue, ConfigError> {
    let providers = Arc::new(build_provider_set(&config.providers));
    let circuits = Arc::new(CircuitBreakerRegistry::new(config.circuit_breaker.clone()));
    let router = Arc::new(Router::from_config(config, providers, circuits)?);

    let store = Arc::new(MemoryStore::new());
    let tracer = Arc::new(DecisionTracer::new(
        &config.tracer,
        store.clone(),
        events.clone(),
    ));

    let orchestrator = Orchestrator::new(
        router,
        tracer,
        Collaborators {
            store,
            vault: Arc::new(MemoryVault::new()),
            ledger: Arc::new(MemoryLedger::new()),
            events,
        },
    )
    .with_content_logging(config.logging.enable_content_logging);

    Ok(OrchestratorQueue::start(
        Arc::new(orchestrator),
        config.queue.clone(),
    ))
}

/// Answer approval requests for `run_id` until the channel closes.
async fn handle_approvals(
    mut rx: broadcast::Receiver<SinkEvent>,
    tracer: Arc<DecisionTracer>,
    run_id: Uuid,
    auto_approve: bool,
) {
    loop {
        let event = match rx.recv().await {
            Ok(SinkEvent::Log { run_id: id, event }) if id == run_id => event,
            Ok(_) => continue,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "Approval listener lagged");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        if event.kind != LogEventKind::ApprovalRequired {
            continue;
        }

        let approved = if auto_approve {
            true
        } else {
            let message = event.message.clone();
            match tokio::task::spawn_blocking(move || prompt_yes_no(&message)).await {
                Ok(answer) => answer,
                Err(e) => {
                    tracing::error!(error = %e, "Approval prompt failed");
                    false
                }
            }
        };

        let result = if approved {
            tracer.approve(run_id, "cli")
        } else {
            tracer.reject(run_id, "cli", "rejected at prompt")
        };
        if let Err(e) = result {
            tracing::warn!(run_id = %run_id, error = %e, "Approval answer not delivered");
        }
    }
}

fn prompt_yes_no(message: &str) -> bool {
    let mut stderr = io::stderr();
    let _ = write!(stderr, "{} Approve? [y/N] ", message);
    let _ = stderr.flush();

    let mut line = String::new();
    match io::stdin().lock().read_line(&mut line) {
        Ok(_) => matches!(line.trim().to_lowercase().as_str(), "y" | "yes"),
        Err(_) => false,
    }
}

/// Handle `relay run` command
pub async fn handle_run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config_with_overrides(&args)?;
    init_tracing(&config.logging)?;

    tracing::debug!(
        providers = config.providers.len(),
        concurrency = config.queue.concurrency,
        "Configuration loaded"
    );

    let events = Arc::new(BroadcastSink::default());
    let approvals_rx = events.subscribe();
    let queue = build_queue(&config, events)?;

    let mut task = AgentTask::new(&args.org, &args.project, &args.goal, args.provider.as_str());
    if let Some(model) = &args.model {
        task = task.with_model(model);
    }
    let run_id = task.run_id;

    let approvals = tokio::spawn(handle_approvals(
        approvals_rx,
        Arc::clone(queue.orchestrator().tracer()),
        run_id,
        args.auto_approve,
    ));

    let receiver = queue.enqueue(task).await?;
    let report = receiver.await;

    approvals.abort();
    queue.shutdown().await;

    let report = report.map_err(|_| "run was dropped before it finished")?;

    let rendered = match args.format {
        OutputFormat::Table => format_report_table(&report),
        OutputFormat::Json => format_report_json(&report)?,
    };
    println!("{}", rendered);

    if report.is_success() {
        Ok(())
    } else {
        Err(format!(
            "run {}: {}",
            report.status,
            report.error.as_deref().unwrap_or("without a result")
        )
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn args(config: Option<PathBuf>) -> RunArgs {
        RunArgs {
            goal: "Summarize".to_string(),
            provider: "openai".to_string(),
            model: None,
            config,
            org: "local".to_string(),
            project: "default".to_string(),
            auto_approve: true,
            format: OutputFormat::Json,
            log_level: Some("debug".to_string()),
        }
    }

    #[test]
    fn test_load_config_cli_log_level_wins() {
        let config = load_config_with_overrides(&args(None)).unwrap();
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_load_config_missing_file_is_error() {
        let result = load_config_with_overrides(&args(Some(PathBuf::from(
            "/nonexistent/relay.toml",
        ))));
        assert!(result.is_err());
    }

    #[test]
    fn test_load_config_rejects_invalid_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[tracer]\napproval_threshold = 3.0").unwrap();
        let result = load_config_with_overrides(&args(Some(temp.path().to_path_buf())));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_build_queue_runs_unconfigured_provider_to_failure() {
        let config = RelayConfig::default();
        let queue = build_queue(&config, Arc::new(BroadcastSink::default())).unwrap();

        let rx = queue
            .enqueue(
                AgentTask::new("local", "default", "Say hello politely", "openai")
                    .with_model("gpt-4o"),
            )
            .await
            .unwrap();
        let report = rx.await.unwrap();

        assert!(!report.is_success());
        assert!(report.error.is_some());
        queue.shutdown().await;
    }
}
