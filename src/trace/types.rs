//! Decision trace records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Kind of orchestration decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    ProviderSelection,
    Retry,
    Fallback,
    ModelSelection,
    ContextAnalysis,
    ToolCall,
    ResponseGeneration,
    ErrorHandling,
}

impl StepType {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepType::ProviderSelection => "provider_selection",
            StepType::Retry => "retry",
            StepType::Fallback => "fallback",
            StepType::ModelSelection => "model_selection",
            StepType::ContextAnalysis => "context_analysis",
            StepType::ToolCall => "tool_call",
            StepType::ResponseGeneration => "response_generation",
            StepType::ErrorHandling => "error_handling",
        }
    }
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Approval state of a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    NotRequired,
    Pending,
    Approved,
    Rejected,
}

impl fmt::Display for ApprovalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApprovalStatus::NotRequired => "not_required",
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

/// One recorded decision. Only the approval fields change after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTrace {
    pub id: Uuid,
    pub run_id: Uuid,
    /// 1-based, strictly increasing within a run
    pub step_number: u32,
    pub step_type: StepType,
    pub decision: String,
    pub reasoning: String,
    /// Clamped to 0.0..=1.0
    pub confidence: f64,
    pub alternatives: Vec<String>,
    pub context_used: Vec<String>,
    pub duration_ms: u64,
    pub approval_status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl DecisionTrace {
    /// Apply an approval update. The decision itself is left untouched.
    pub fn apply(&mut self, approval: &TraceApproval) {
        self.approval_status = approval.status;
        if approval.approved_by.is_some() {
            self.approved_by = approval.approved_by.clone();
        }
        if approval.rejection_reason.is_some() {
            self.rejection_reason = approval.rejection_reason.clone();
        }
    }
}

/// The only update a stored trace accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceApproval {
    pub status: ApprovalStatus,
    pub approved_by: Option<String>,
    pub rejection_reason: Option<String>,
}

impl TraceApproval {
    pub fn pending() -> Self {
        Self {
            status: ApprovalStatus::Pending,
            approved_by: None,
            rejection_reason: None,
        }
    }

    pub fn approved(by: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::Approved,
            approved_by: Some(by.into()),
            rejection_reason: None,
        }
    }

    pub fn rejected(reason: impl Into<String>) -> Self {
        Self {
            status: ApprovalStatus::Rejected,
            approved_by: None,
            rejection_reason: Some(reason.into()),
        }
    }
}

/// Optional inputs to [`DecisionTracer::trace_decision`](super::DecisionTracer::trace_decision).
#[derive(Debug, Clone, Default)]
pub struct TraceOptions {
    /// Defaults to 1.0
    pub confidence: Option<f64>,
    pub alternatives: Vec<String>,
    pub context_used: Vec<String>,
    /// When the decision started; used for `duration_ms`.
    pub started_at: Option<tokio::time::Instant>,
    /// Force or suppress the approval gate regardless of confidence.
    pub require_approval: Option<bool>,
}

impl TraceOptions {
    pub fn confidence(confidence: f64) -> Self {
        Self {
            confidence: Some(confidence),
            ..Self::default()
        }
    }

    pub fn with_alternatives<I, S>(mut self, alternatives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.alternatives = alternatives.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_context<I, S>(mut self, context: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.context_used = context.into_iter().map(Into::into).collect();
        self
    }

    pub fn started_at(mut self, started_at: tokio::time::Instant) -> Self {
        self.started_at = Some(started_at);
        self
    }

    pub fn auto_approve(mut self) -> Self {
        self.require_approval = Some(false);
        self
    }

    pub fn require_approval(mut self) -> Self {
        self.require_approval = Some(true);
        self
    }
}

/// What `trace_decision` hands back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TraceReceipt {
    pub trace_id: Uuid,
    pub step_number: u32,
    pub requires_approval: bool,
}

/// Answer delivered to a waiting run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    Approved { by: String },
    Rejected { by: String, reason: String },
}
