//! Error types for persistence and event delivery

use super::types::RunStatus;
use thiserror::Error;

/// Errors returned by store, vault and ledger implementations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("{kind} '{id}' not found")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} '{id}' already exists")]
    Duplicate { kind: &'static str, id: String },

    /// Run status change not allowed by the run state machine.
    #[error("Invalid run status transition: {from} -> {to}")]
    InvalidTransition { from: RunStatus, to: RunStatus },

    /// Failure in the underlying storage engine.
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Errors returned by event sinks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EventError {
    #[error("Event delivery failed: {0}")]
    Delivery(String),
}
