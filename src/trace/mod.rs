//! Decision tracing and the human approval gate
//!
//! Every orchestration decision is recorded as an immutable
//! [`DecisionTrace`] with a per-run step number. Decisions below the
//! confidence threshold must be approved before the run continues;
//! [`DecisionTracer::wait_for_approval`] parks the run on a oneshot channel
//! keyed by run id until [`approve`](DecisionTracer::approve),
//! [`reject`](DecisionTracer::reject) or the timeout.

pub mod error;
pub mod types;

pub use error::TraceError;
pub use types::{
    ApprovalDecision, ApprovalStatus, DecisionTrace, StepType, TraceApproval, TraceOptions,
    TraceReceipt,
};

use crate::config::TracerConfig;
use crate::store::{AuditLog, EventSink, LogEvent, RunStatus, RunStore, RunUpdate};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use uuid::Uuid;

struct PendingApproval {
    trace_id: Uuid,
    decision: String,
    since: DateTime<Utc>,
    tx: oneshot::Sender<ApprovalDecision>,
}

/// A run parked on the approval gate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingSummary {
    pub run_id: Uuid,
    pub trace_id: Uuid,
    pub decision: String,
    pub since: DateTime<Utc>,
}

/// Records decisions and runs the approval gate.
pub struct DecisionTracer {
    store: Arc<dyn RunStore>,
    events: Arc<dyn EventSink>,
    approval_threshold: f64,
    approval_timeout: Duration,
    /// Last step number issued per run
    counters: DashMap<Uuid, u32>,
    pending: DashMap<Uuid, PendingApproval>,
}

impl DecisionTracer {
    pub fn new(config: &TracerConfig, store: Arc<dyn RunStore>, events: Arc<dyn EventSink>) -> Self {
        Self {
            store,
            events,
            approval_threshold: config.approval_threshold.clamp(0.0, 1.0),
            approval_timeout: config.approval_timeout(),
            counters: DashMap::new(),
            pending: DashMap::new(),
        }
    }

    pub fn approval_threshold(&self) -> f64 {
        self.approval_threshold
    }

    pub fn approval_timeout(&self) -> Duration {
        self.approval_timeout
    }

    /// Start numbering steps for `run_id` from 1.
    pub fn begin_run(&self, run_id: Uuid) {
        self.counters.insert(run_id, 0);
    }

    /// Forget the step counter of a finished run.
    pub fn end_run(&self, run_id: Uuid) {
        self.counters.remove(&run_id);
    }

    /// Record one decision and persist it.
    pub async fn trace_decision(
        &self,
        run_id: Uuid,
        step_type: StepType,
        decision: impl Into<String>,
        reasoning: impl Into<String>,
        options: TraceOptions,
    ) -> Result<TraceReceipt, TraceError> {
        let step_number = {
            let mut counter = self.counters.entry(run_id).or_insert(0);
            *counter += 1;
            *counter
        };

        let confidence = match options.confidence {
            Some(c) if c.is_nan() => 0.0,
            Some(c) => c.clamp(0.0, 1.0),
            None => 1.0,
        };
        let requires_approval = options
            .require_approval
            .unwrap_or(confidence < self.approval_threshold);
        let duration_ms = options
            .started_at
            .map(|started| started.elapsed().as_millis() as u64)
            .unwrap_or(0);

        let trace = DecisionTrace {
            id: Uuid::new_v4(),
            run_id,
            step_number,
            step_type,
            decision: decision.into(),
            reasoning: reasoning.into(),
            confidence,
            alternatives: options.alternatives,
            context_used: options.context_used,
            duration_ms,
            approval_status: if requires_approval {
                ApprovalStatus::Pending
            } else {
                ApprovalStatus::NotRequired
            },
            approved_by: None,
            rejection_reason: None,
            created_at: Utc::now(),
        };
        let trace_id = trace.id;

        tracing::debug!(
            run_id = %run_id,
            step = step_number,
            step_type = %step_type,
            confidence,
            requires_approval,
            decision = %trace.decision,
            "Decision traced"
        );
        self.store.create_decision_trace(trace).await?;

        Ok(TraceReceipt {
            trace_id,
            step_number,
            requires_approval,
        })
    }

    /// Park the run until a human answers or the timeout elapses.
    ///
    /// Returns the approver on success. Rejection and timeout come back as
    /// [`TraceError::Rejected`] / [`TraceError::TimedOut`].
    pub async fn wait_for_approval(
        &self,
        run_id: Uuid,
        trace_id: Uuid,
        decision: &str,
    ) -> Result<String, TraceError> {
        let (tx, rx) = oneshot::channel();
        match self.pending.entry(run_id) {
            Entry::Occupied(_) => return Err(TraceError::ApprovalAlreadyPending(run_id)),
            Entry::Vacant(slot) => {
                slot.insert(PendingApproval {
                    trace_id,
                    decision: decision.to_string(),
                    since: Utc::now(),
                    tx,
                });
            }
        }

        let run = match self
            .store
            .update_agent_run(run_id, RunUpdate::status(RunStatus::AwaitingApproval))
            .await
        {
            Ok(run) => run,
            Err(e) => {
                self.pending.remove(&run_id);
                return Err(e.into());
            }
        };

        tracing::info!(run_id = %run_id, trace_id = %trace_id, decision, "Awaiting approval");
        self.emit(
            run_id,
            LogEvent::approval_required(trace_id, format!("Approval required: {}", decision)),
        )
        .await;

        let answer = match tokio::time::timeout(self.approval_timeout, rx).await {
            Ok(Ok(answer)) => Some(answer),
            // Sender dropped without an answer
            Ok(Err(_)) => Some(ApprovalDecision::Rejected {
                by: "system".to_string(),
                reason: "approval channel closed".to_string(),
            }),
            Err(_) => {
                self.pending
                    .remove_if(&run_id, |_, pending| pending.trace_id == trace_id);
                None
            }
        };

        match answer {
            Some(ApprovalDecision::Approved { by }) => {
                self.store
                    .update_decision_trace(trace_id, TraceApproval::approved(by.clone()))
                    .await?;
                self.audit(&run.org_id, run_id, "approval.granted", &by, trace_id, None)
                    .await;
                self.store
                    .update_agent_run(run_id, RunUpdate::status(RunStatus::Running))
                    .await?;
                metrics::counter!("relay_approvals_total", "outcome" => "approved").increment(1);
                tracing::info!(run_id = %run_id, approved_by = %by, "Decision approved");
                Ok(by)
            }
            Some(ApprovalDecision::Rejected { by, reason }) => {
                self.store
                    .update_decision_trace(trace_id, TraceApproval::rejected(reason.clone()))
                    .await?;
                self.audit(
                    &run.org_id,
                    run_id,
                    "approval.rejected",
                    &by,
                    trace_id,
                    Some(&reason),
                )
                .await;
                metrics::counter!("relay_approvals_total", "outcome" => "rejected").increment(1);
                tracing::warn!(run_id = %run_id, rejected_by = %by, reason = %reason, "Decision rejected");
                Err(TraceError::Rejected { reason })
            }
            None => {
                let seconds = self.approval_timeout.as_secs();
                let reason = format!("approval timed out after {}s", seconds);
                self.store
                    .update_decision_trace(trace_id, TraceApproval::rejected(reason.clone()))
                    .await?;
                self.audit(
                    &run.org_id,
                    run_id,
                    "approval.timeout",
                    "system",
                    trace_id,
                    Some(&reason),
                )
                .await;
                metrics::counter!("relay_approvals_total", "outcome" => "timeout").increment(1);
                tracing::warn!(run_id = %run_id, seconds, "Approval timed out");
                Err(TraceError::TimedOut { seconds })
            }
        }
    }

    /// Approve the decision `run_id` is waiting on.
    pub fn approve(&self, run_id: Uuid, approved_by: impl Into<String>) -> Result<(), TraceError> {
        self.answer(
            run_id,
            ApprovalDecision::Approved {
                by: approved_by.into(),
            },
        )
    }

    /// Reject the decision `run_id` is waiting on.
    pub fn reject(
        &self,
        run_id: Uuid,
        rejected_by: impl Into<String>,
        reason: impl Into<String>,
    ) -> Result<(), TraceError> {
        self.answer(
            run_id,
            ApprovalDecision::Rejected {
                by: rejected_by.into(),
                reason: reason.into(),
            },
        )
    }

    fn answer(&self, run_id: Uuid, decision: ApprovalDecision) -> Result<(), TraceError> {
        let (_, pending) = self
            .pending
            .remove(&run_id)
            .ok_or(TraceError::NoPendingApproval(run_id))?;
        pending
            .tx
            .send(decision)
            .map_err(|_| TraceError::NoPendingApproval(run_id))
    }

    pub fn is_awaiting(&self, run_id: Uuid) -> bool {
        self.pending.contains_key(&run_id)
    }

    /// Runs currently parked on the gate, oldest first.
    pub fn pending_approvals(&self) -> Vec<PendingSummary> {
        let mut pending: Vec<PendingSummary> = self
            .pending
            .iter()
            .map(|entry| PendingSummary {
                run_id: *entry.key(),
                trace_id: entry.trace_id,
                decision: entry.decision.clone(),
                since: entry.since,
            })
            .collect();
        pending.sort_by_key(|p| p.since);
        pending
    }

    async fn emit(&self, run_id: Uuid, event: LogEvent) {
        if let Err(e) = self.events.emit(run_id, event).await {
            tracing::warn!(run_id = %run_id, error = %e, "Failed to emit run event");
        }
    }

    async fn audit(
        &self,
        org_id: &str,
        run_id: Uuid,
        action: &str,
        actor: &str,
        trace_id: Uuid,
        reason: Option<&str>,
    ) {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            org_id: org_id.to_string(),
            run_id: Some(run_id),
            action: action.to_string(),
            actor: actor.to_string(),
            details: serde_json::json!({ "trace_id": trace_id, "reason": reason }),
            created_at: Utc::now(),
        };
        if let Err(e) = self.store.create_audit_log(entry).await {
            tracing::warn!(run_id = %run_id, action, error = %e, "Failed to write audit log");
        }
    }
}
