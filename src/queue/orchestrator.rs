//! End-to-end execution of one agent run

use super::error::OrchestratorError;
use super::task::{AgentTask, RunReport};
use crate::logging::content_preview;
use crate::provider::{PricingTable, ProviderId, TokenUsage};
use crate::routing::{Credential, RouteEvent, RouteObserver, RouteRequest, Router};
use crate::store::{
    AgentRun, BudgetStatus, CostLedger, CredentialVault, EventSink, LogEvent, Message,
    RunStatus, RunStore, RunUpdate, StoreError, UsageRecord,
};
use crate::trace::{DecisionTracer, StepType, TraceOptions, TraceReceipt};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use uuid::Uuid;

/// Confidence of the initial provider selection.
pub const PROVIDER_SELECTION_CONFIDENCE: f64 = 0.95;
/// Context analysis confidence for goals with at least three words.
pub const CLEAR_GOAL_CONFIDENCE: f64 = 0.9;
/// Context analysis confidence for shorter goals.
pub const AMBIGUOUS_GOAL_CONFIDENCE: f64 = 0.6;
pub const RETRY_CONFIDENCE: f64 = 0.8;
pub const FALLBACK_CONFIDENCE: f64 = 0.85;
pub const RESPONSE_CONFIDENCE: f64 = 0.9;

/// External collaborators of the orchestrator.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RunStore>,
    pub vault: Arc<dyn CredentialVault>,
    pub ledger: Arc<dyn CostLedger>,
    pub events: Arc<dyn EventSink>,
}

/// Where a run got to before it finished.
#[derive(Debug, Default)]
struct Progress {
    used_provider: Option<ProviderId>,
    attempts: u32,
}

struct Completed {
    provider: ProviderId,
    model: String,
    content: String,
    cost_usd: f64,
}

/// Drives a single run through selection, routing, persistence and billing.
pub struct Orchestrator {
    router: Arc<Router>,
    tracer: Arc<DecisionTracer>,
    store: Arc<dyn RunStore>,
    vault: Arc<dyn CredentialVault>,
    ledger: Arc<dyn CostLedger>,
    events: Arc<dyn EventSink>,
    pricing: PricingTable,
    content_logging: bool,
}

impl Orchestrator {
    pub fn new(router: Arc<Router>, tracer: Arc<DecisionTracer>, parts: Collaborators) -> Self {
        Self {
            router,
            tracer,
            store: parts.store,
            vault: parts.vault,
            ledger: parts.ledger,
            events: parts.events,
            pricing: PricingTable::new(),
            content_logging: false,
        }
    }

    /// Log truncated prompts and responses at debug level.
    pub fn with_content_logging(mut self, enabled: bool) -> Self {
        self.content_logging = enabled;
        self
    }

    pub fn with_pricing(mut self, pricing: PricingTable) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    pub fn tracer(&self) -> &Arc<DecisionTracer> {
        &self.tracer
    }

    pub fn store(&self) -> &Arc<dyn RunStore> {
        &self.store
    }

    /// Persist the run record for `task` in `queued` state.
    pub async fn create_run(&self, task: &AgentTask) -> Result<(), StoreError> {
        self.store
            .create_agent_run(AgentRun::queued(
                task.run_id,
                task.org_id.clone(),
                task.project_id.clone(),
                task.goal.clone(),
                task.provider.clone(),
                task.model.clone(),
            ))
            .await
    }

    /// Execute a queued run to completion. Never fails: every error ends up
    /// as a `failed` run in the report.
    pub async fn execute(&self, task: &AgentTask) -> RunReport {
        let run_id = task.run_id;
        tracing::info!(
            run_id = %run_id,
            org_id = %task.org_id,
            provider = %task.provider,
            "Starting run"
        );
        if let Some(preview) = content_preview(&task.goal, self.content_logging) {
            tracing::debug!(run_id = %run_id, goal = %preview, "Run goal");
        }

        self.tracer.begin_run(run_id);
        let mut progress = Progress::default();
        let report = match self.run_pipeline(task, &mut progress).await {
            Ok(done) => {
                metrics::counter!("relay_runs_total", "status" => "completed").increment(1);
                tracing::info!(
                    run_id = %run_id,
                    provider = %done.provider,
                    attempts = progress.attempts,
                    cost_usd = done.cost_usd,
                    "Run completed"
                );
                RunReport {
                    run_id,
                    status: RunStatus::Completed,
                    used_provider: Some(done.provider),
                    model: Some(done.model),
                    content: Some(done.content),
                    attempts: progress.attempts,
                    cost_usd: done.cost_usd,
                    error: None,
                    traces: Vec::new(),
                }
            }
            Err(err) => self.fail_run(task, &progress, err).await,
        };
        self.tracer.end_run(run_id);

        self.with_traces(report).await
    }

    /// Record a run that crashed outside the pipeline.
    pub(crate) async fn fail_unexpected(&self, task: &AgentTask, message: String) -> RunReport {
        let report = self
            .fail_run(task, &Progress::default(), OrchestratorError::Internal(message))
            .await;
        self.tracer.end_run(task.run_id);
        self.with_traces(report).await
    }

    /// Mark a run that never started as cancelled.
    pub async fn cancel_queued(&self, task: &AgentTask) -> RunReport {
        let run_id = task.run_id;
        let error = "queue shut down before the run started".to_string();
        if let Err(e) = self
            .store
            .update_agent_run(
                run_id,
                RunUpdate::status(RunStatus::Cancelled).with_error(error.clone()),
            )
            .await
        {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to cancel run");
        }
        self.emit(run_id, LogEvent::warning("Run cancelled")).await;
        self.dispatch(
            &task.org_id,
            "run.cancelled",
            serde_json::json!({ "run_id": run_id }),
        )
        .await;
        metrics::counter!("relay_runs_total", "status" => "cancelled").increment(1);
        tracing::info!(run_id = %run_id, "Run cancelled");

        RunReport {
            run_id,
            status: RunStatus::Cancelled,
            used_provider: None,
            model: None,
            content: None,
            attempts: 0,
            cost_usd: 0.0,
            error: Some(error),
            traces: Vec::new(),
        }
    }

    async fn run_pipeline(
        &self,
        task: &AgentTask,
        progress: &mut Progress,
    ) -> Result<Completed, OrchestratorError> {
        let run_id = task.run_id;
        self.store
            .update_agent_run(run_id, RunUpdate::status(RunStatus::Running))
            .await?;
        self.emit(run_id, LogEvent::progress("Run started")).await;

        // Provider selection
        let started = Instant::now();
        let chain: Vec<String> = self
            .router
            .fallbacks()
            .chain(&task.provider)
            .iter()
            .map(ToString::to_string)
            .collect();
        let model_note = task
            .model
            .as_deref()
            .map(|m| format!(" with model {}", m))
            .unwrap_or_default();
        self.tracer
            .trace_decision(
                run_id,
                StepType::ProviderSelection,
                format!("Use {}{}", task.provider, model_note),
                if chain.is_empty() {
                    "Requested provider; no fallback chain configured".to_string()
                } else {
                    format!("Requested provider; fallback chain: {}", chain.join(" -> "))
                },
                TraceOptions::confidence(PROVIDER_SELECTION_CONFIDENCE)
                    .with_alternatives(chain)
                    .started_at(started)
                    .auto_approve(),
            )
            .await?;

        self.store
            .create_message(Message::user(run_id, task.goal.clone()))
            .await?;

        // Context analysis
        let started = Instant::now();
        let words = task.goal.split_whitespace().count();
        let (decision, confidence) = if words >= 3 {
            ("Goal is specific enough to execute", CLEAR_GOAL_CONFIDENCE)
        } else {
            ("Goal is short and may be ambiguous", AMBIGUOUS_GOAL_CONFIDENCE)
        };
        let receipt = self
            .tracer
            .trace_decision(
                run_id,
                StepType::ContextAnalysis,
                decision,
                format!("Goal has {} word(s)", words),
                TraceOptions::confidence(confidence)
                    .with_context(["goal"])
                    .started_at(started),
            )
            .await?;
        self.gate(run_id, &receipt, decision).await?;

        // Budget
        let monthly_limit = self
            .store
            .get_org(&task.org_id)
            .await?
            .and_then(|org| org.monthly_budget_usd);
        match self.ledger.check_budget(&task.org_id, monthly_limit).await? {
            BudgetStatus::HardLimit { current, limit } => {
                return Err(OrchestratorError::BudgetExceeded { current, limit });
            }
            BudgetStatus::SoftLimit { usage_percent } => {
                tracing::warn!(run_id = %run_id, usage_percent, "Organization nearing budget");
                self.emit(
                    run_id,
                    LogEvent::warning(format!("Budget {}% used", usage_percent)),
                )
                .await;
            }
            BudgetStatus::Normal => {}
        }

        // Credential, best-effort
        let credential = match self.vault.credential(&task.org_id, &task.provider).await {
            Ok(Some(api_key)) => Some(Credential {
                provider: task.provider.clone(),
                api_key,
            }),
            Ok(None) => {
                tracing::debug!(run_id = %run_id, provider = %task.provider, "No stored credential");
                None
            }
            Err(e) => {
                tracing::warn!(run_id = %run_id, error = %e, "Credential lookup failed");
                None
            }
        };

        let mut request = RouteRequest::new(task.provider.clone(), task.goal.clone());
        request.model = task.model.clone();
        request.credential = credential;

        let observer = TraceObserver {
            tracer: &self.tracer,
            events: &self.events,
            run_id,
        };
        let outcome = self.router.call_with_observer(&request, &observer).await;
        progress.used_provider = Some(outcome.used_provider.clone());
        progress.attempts = outcome.attempts;

        let response = outcome.result?;
        let provider = outcome.used_provider;
        let usage = response.usage.unwrap_or_default();
        let cost_usd = self
            .pricing
            .estimate_cost(&response.model, usage.input_tokens, usage.output_tokens)
            .unwrap_or(0.0);
        if let Some(preview) = content_preview(&response.content, self.content_logging) {
            tracing::debug!(run_id = %run_id, response = %preview, "Provider response");
        }

        self.store
            .create_message(Message::assistant(
                run_id,
                response.content.clone(),
                provider.clone(),
                response.model.clone(),
            ))
            .await?;

        self.tracer
            .trace_decision(
                run_id,
                StepType::ResponseGeneration,
                format!("Response generated by {} ({})", provider, response.model),
                format!(
                    "{} attempt(s), {} input / {} output tokens",
                    outcome.attempts, usage.input_tokens, usage.output_tokens
                ),
                TraceOptions::confidence(RESPONSE_CONFIDENCE).auto_approve(),
            )
            .await?;

        // Terminal status is the last fallible step; everything after is best-effort.
        self.store
            .update_agent_run(
                run_id,
                RunUpdate::status(RunStatus::Completed)
                    .with_provider(provider.clone(), response.model.clone())
                    .with_cost(cost_usd),
            )
            .await?;

        self.record_usage(task, &provider, &response.model, usage, cost_usd)
            .await;
        self.dispatch(
            &task.org_id,
            "run.completed",
            serde_json::json!({
                "run_id": run_id,
                "provider": provider,
                "model": response.model,
                "attempts": outcome.attempts,
                "cost_usd": cost_usd,
            }),
        )
        .await;
        self.emit(run_id, LogEvent::progress("Run completed")).await;

        Ok(Completed {
            provider,
            model: response.model,
            content: response.content,
            cost_usd,
        })
    }

    /// Block on the approval gate when the trace demands it.
    async fn gate(
        &self,
        run_id: Uuid,
        receipt: &TraceReceipt,
        decision: &str,
    ) -> Result<(), OrchestratorError> {
        if receipt.requires_approval {
            self.tracer
                .wait_for_approval(run_id, receipt.trace_id, decision)
                .await?;
        }
        Ok(())
    }

    async fn record_usage(
        &self,
        task: &AgentTask,
        provider: &ProviderId,
        model: &str,
        usage: TokenUsage,
        cost_usd: f64,
    ) {
        if let Err(e) = self.ledger.track_cost(&task.org_id, cost_usd).await {
            tracing::warn!(run_id = %task.run_id, error = %e, "Failed to track cost");
        }
        let record = UsageRecord {
            id: Uuid::new_v4(),
            org_id: task.org_id.clone(),
            run_id: task.run_id,
            provider: provider.clone(),
            model: model.to_string(),
            input_tokens: usage.input_tokens,
            output_tokens: usage.output_tokens,
            cost_usd,
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create_usage_record(record).await {
            tracing::warn!(run_id = %task.run_id, error = %e, "Failed to write usage record");
        }
    }

    async fn fail_run(
        &self,
        task: &AgentTask,
        progress: &Progress,
        err: OrchestratorError,
    ) -> RunReport {
        let run_id = task.run_id;
        let message = err.to_string();
        tracing::error!(run_id = %run_id, error = %message, "Run failed");

        if let Err(e) = self
            .tracer
            .trace_decision(
                run_id,
                StepType::ErrorHandling,
                "Abort run",
                message.clone(),
                TraceOptions::confidence(1.0).auto_approve(),
            )
            .await
        {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to trace run failure");
        }

        let mut update = RunUpdate::status(RunStatus::Failed).with_error(message.clone());
        update.provider = progress.used_provider.clone();
        if let Err(e) = self.store.update_agent_run(run_id, update).await {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to mark run failed");
        }

        self.emit(run_id, LogEvent::error(message.clone())).await;
        self.dispatch(
            &task.org_id,
            "run.failed",
            serde_json::json!({ "run_id": run_id, "error": message }),
        )
        .await;
        metrics::counter!("relay_runs_total", "status" => "failed").increment(1);

        RunReport {
            run_id,
            status: RunStatus::Failed,
            used_provider: progress.used_provider.clone(),
            model: None,
            content: None,
            attempts: progress.attempts,
            cost_usd: 0.0,
            error: Some(message),
            traces: Vec::new(),
        }
    }

    async fn with_traces(&self, mut report: RunReport) -> RunReport {
        match self.store.list_decision_traces(report.run_id).await {
            Ok(traces) => report.traces = traces,
            Err(e) => {
                tracing::warn!(run_id = %report.run_id, error = %e, "Failed to load traces")
            }
        }
        report
    }

    async fn emit(&self, run_id: Uuid, event: LogEvent) {
        if let Err(e) = self.events.emit(run_id, event).await {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to emit run event");
        }
    }

    async fn dispatch(&self, org_id: &str, name: &str, payload: serde_json::Value) {
        if let Err(e) = self.events.dispatch_event(org_id, name, payload).await {
            tracing::warn!(org_id, event = name, error = %e, "Failed to dispatch event");
        }
    }
}

/// Turns router retries and fallbacks into decision traces.
struct TraceObserver<'a> {
    tracer: &'a DecisionTracer,
    events: &'a Arc<dyn EventSink>,
    run_id: Uuid,
}

#[async_trait]
impl RouteObserver for TraceObserver<'_> {
    async fn on_event(&self, event: &RouteEvent) {
        let traced = match event {
            RouteEvent::Retry {
                provider,
                attempt,
                max_attempts,
                delay,
                error,
            } => {
                self.tracer
                    .trace_decision(
                        self.run_id,
                        StepType::Retry,
                        format!("Retry {} (attempt {}/{})", provider, attempt, max_attempts),
                        format!("{}; backing off {}ms", error, delay.as_millis()),
                        TraceOptions::confidence(RETRY_CONFIDENCE).auto_approve(),
                    )
                    .await
            }
            RouteEvent::Fallback { from, to, reason } => {
                self.tracer
                    .trace_decision(
                        self.run_id,
                        StepType::Fallback,
                        format!("Fall back from {} to {}", from, to),
                        reason.clone(),
                        TraceOptions::confidence(FALLBACK_CONFIDENCE)
                            .with_alternatives([from.to_string()])
                            .auto_approve(),
                    )
                    .await
            }
            RouteEvent::CircuitOpen { provider } => {
                if let Err(e) = self
                    .events
                    .emit(
                        self.run_id,
                        LogEvent::warning(format!("Circuit open for {}, skipping", provider)),
                    )
                    .await
                {
                    tracing::warn!(run_id = %self.run_id, error = %e, "Failed to emit run event");
                }
                return;
            }
            RouteEvent::NotConfigured { provider, reason } => {
                tracing::debug!(run_id = %self.run_id, provider = %provider, reason = %reason, "Provider skipped");
                return;
            }
        };

        if let Err(e) = traced {
            tracing::warn!(run_id = %self.run_id, error = %e, "Failed to trace routing event");
        }
    }
}
