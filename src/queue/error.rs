//! Error types for the orchestrator queue

use crate::routing::RouteError;
use crate::store::StoreError;
use crate::trace::TraceError;
use thiserror::Error;

/// Errors from queue operations
#[derive(Debug, Error)]
pub enum QueueError {
    /// Too many runs waiting
    #[error("Queue is full ({max_pending} pending runs)")]
    Full { max_pending: u32 },

    /// Queue is disabled or shut down
    #[error("Queue is not accepting runs")]
    Closed,

    /// The run record could not be created
    #[error("Failed to create run: {0}")]
    Store(#[from] StoreError),
}

/// Reasons a run fails.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("Budget exhausted: ${current:.2} spent of ${limit:.2}")]
    BudgetExceeded { current: f64, limit: f64 },

    /// Anything that escaped the pipeline, including panics.
    #[error("Unexpected failure: {0}")]
    Internal(String),
}
