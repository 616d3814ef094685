//! Error types for the decision tracer

use crate::store::StoreError;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TraceError {
    #[error("Trace persistence failed: {0}")]
    Store(#[from] StoreError),

    /// A second waiter for the same run. Callers must serialize approvals.
    #[error("Run {0} already has a pending approval")]
    ApprovalAlreadyPending(Uuid),

    #[error("Run {0} has no pending approval")]
    NoPendingApproval(Uuid),

    #[error("Approval rejected: {reason}")]
    Rejected { reason: String },

    #[error("Approval timed out after {seconds}s")]
    TimedOut { seconds: u64 },
}

impl TraceError {
    /// Whether the run was refused by a human or by the timeout.
    pub fn is_rejection(&self) -> bool {
        matches!(self, TraceError::Rejected { .. } | TraceError::TimedOut { .. })
    }
}
