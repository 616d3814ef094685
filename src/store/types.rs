//! Records exchanged with the persistence layer

use crate::provider::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Lifecycle state of an agent run.
///
/// ```text
/// queued ──► running ──► completed
///   │          │  ▲
///   │          ▼  │
///   │     awaiting_approval ──► failed
///   ▼
/// cancelled (from any non-terminal state)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Queued,
    Running,
    AwaitingApproval,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunStatus::Completed | RunStatus::Failed | RunStatus::Cancelled
        )
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        use RunStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Cancelled)
                | (Running, AwaitingApproval)
                | (Running, Completed)
                | (Running, Failed)
                | (Running, Cancelled)
                | (AwaitingApproval, Running)
                | (AwaitingApproval, Failed)
                | (AwaitingApproval, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::AwaitingApproval => "awaiting_approval",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One end-to-end agent execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRun {
    pub id: Uuid,
    pub org_id: String,
    pub project_id: String,
    pub goal: String,
    pub status: RunStatus,
    /// Requested provider until the run completes, then the one that answered.
    pub provider: ProviderId,
    pub model: Option<String>,
    pub cost_estimate: f64,
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AgentRun {
    /// A new run in `queued` state.
    pub fn queued(
        id: Uuid,
        org_id: impl Into<String>,
        project_id: impl Into<String>,
        goal: impl Into<String>,
        provider: ProviderId,
        model: Option<String>,
    ) -> Self {
        Self {
            id,
            org_id: org_id.into(),
            project_id: project_id.into(),
            goal: goal.into(),
            status: RunStatus::Queued,
            provider,
            model,
            cost_estimate: 0.0,
            error: None,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Partial update of an [`AgentRun`]. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunUpdate {
    pub status: Option<RunStatus>,
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub cost_estimate: Option<f64>,
    pub error: Option<String>,
}

impl RunUpdate {
    pub fn status(status: RunStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    pub fn with_provider(mut self, provider: ProviderId, model: impl Into<String>) -> Self {
        self.provider = Some(provider);
        self.model = Some(model.into());
        self
    }

    pub fn with_cost(mut self, cost: f64) -> Self {
        self.cost_estimate = Some(cost);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// A message exchanged during a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub run_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub provider: Option<ProviderId>,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(run_id: Uuid, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            role: MessageRole::User,
            content: content.into(),
            provider: None,
            model: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(
        run_id: Uuid,
        content: impl Into<String>,
        provider: ProviderId,
        model: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            run_id,
            role: MessageRole::Assistant,
            content: content.into(),
            provider: Some(provider),
            model: Some(model.into()),
            created_at: Utc::now(),
        }
    }
}

/// Token usage and cost of one provider response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    pub id: Uuid,
    pub org_id: String,
    pub run_id: Uuid,
    pub provider: ProviderId,
    pub model: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub cost_usd: f64,
    pub created_at: DateTime<Utc>,
}

/// Audit trail entry for human decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLog {
    pub id: Uuid,
    pub org_id: String,
    pub run_id: Option<Uuid>,
    /// e.g. `approval.granted`
    pub action: String,
    pub actor: String,
    pub details: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Org {
    pub id: String,
    pub name: String,
    pub monthly_budget_usd: Option<f64>,
}

/// Budget state reported by a cost ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BudgetStatus {
    /// No limit, or under 75% of it
    Normal,

    /// Approaching limit
    SoftLimit {
        /// Percentage of budget used (0-100)
        usage_percent: u8,
    },

    /// Limit reached; no further provider calls
    HardLimit { current: f64, limit: f64 },
}

impl BudgetStatus {
    /// Percentage at which a budget becomes a soft limit.
    pub const SOFT_LIMIT_PERCENT: f64 = 75.0;

    /// Classify `spent` against an optional monthly `limit`.
    pub fn from_usage(spent: f64, limit: Option<f64>) -> Self {
        let Some(limit) = limit else {
            return BudgetStatus::Normal;
        };
        if limit <= 0.0 || spent >= limit {
            return BudgetStatus::HardLimit {
                current: spent,
                limit,
            };
        }
        let percent = (spent / limit) * 100.0;
        if percent >= Self::SOFT_LIMIT_PERCENT {
            BudgetStatus::SoftLimit {
                usage_percent: percent.min(100.0) as u8,
            }
        } else {
            BudgetStatus::Normal
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, BudgetStatus::HardLimit { .. })
    }
}

/// Kind of a run log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogEventKind {
    Progress,
    Warning,
    Error,
    ApprovalRequired,
}

/// A line in a run's live log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub kind: LogEventKind,
    pub message: String,
    pub trace_id: Option<Uuid>,
    pub timestamp: DateTime<Utc>,
}

impl LogEvent {
    fn new(kind: LogEventKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            trace_id: None,
            timestamp: Utc::now(),
        }
    }

    pub fn progress(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Progress, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogEventKind::Error, message)
    }

    pub fn approval_required(trace_id: Uuid, message: impl Into<String>) -> Self {
        Self {
            trace_id: Some(trace_id),
            ..Self::new(LogEventKind::ApprovalRequired, message)
        }
    }
}
