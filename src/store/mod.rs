//! Persistence, credential, cost and event collaborators
//!
//! The orchestrator only talks to storage through these traits. In-memory
//! implementations in [`memory`] back the CLI and the test suite.

use async_trait::async_trait;
use uuid::Uuid;

pub mod error;
pub mod memory;
pub mod types;

pub use error::{EventError, StoreError};
pub use memory::{BroadcastSink, MemoryLedger, MemoryStore, MemoryVault, SinkEvent};
pub use types::{
    AgentRun, AuditLog, BudgetStatus, LogEvent, LogEventKind, Message, MessageRole, Org,
    RunStatus, RunUpdate, UsageRecord,
};

use crate::provider::ProviderId;
use crate::trace::{DecisionTrace, TraceApproval};

/// Run, message, trace and audit persistence.
#[async_trait]
pub trait RunStore: Send + Sync + 'static {
    async fn create_agent_run(&self, run: AgentRun) -> Result<(), StoreError>;

    async fn get_agent_run(&self, run_id: Uuid) -> Result<Option<AgentRun>, StoreError>;

    /// Apply `update`, enforcing the run status state machine.
    async fn update_agent_run(&self, run_id: Uuid, update: RunUpdate)
        -> Result<AgentRun, StoreError>;

    async fn create_message(&self, message: Message) -> Result<(), StoreError>;

    async fn create_decision_trace(&self, trace: DecisionTrace) -> Result<(), StoreError>;

    /// Update the approval fields of a trace. Nothing else is mutable.
    async fn update_decision_trace(
        &self,
        trace_id: Uuid,
        approval: TraceApproval,
    ) -> Result<DecisionTrace, StoreError>;

    /// Traces of one run ordered by step number.
    async fn list_decision_traces(&self, run_id: Uuid) -> Result<Vec<DecisionTrace>, StoreError>;

    async fn create_usage_record(&self, record: UsageRecord) -> Result<(), StoreError>;

    async fn create_audit_log(&self, entry: AuditLog) -> Result<(), StoreError>;

    async fn get_org(&self, org_id: &str) -> Result<Option<Org>, StoreError>;
}

/// Per-organization provider credentials.
#[async_trait]
pub trait CredentialVault: Send + Sync + 'static {
    async fn credential(
        &self,
        org_id: &str,
        provider: &ProviderId,
    ) -> Result<Option<String>, StoreError>;
}

/// Spend tracking against organization budgets.
///
/// Limits live on the [`Org`] record; the ledger only knows what was spent.
#[async_trait]
pub trait CostLedger: Send + Sync + 'static {
    async fn track_cost(&self, org_id: &str, amount_usd: f64) -> Result<(), StoreError>;

    /// Classify the organization's spend against its monthly limit, if any.
    async fn check_budget(
        &self,
        org_id: &str,
        monthly_limit_usd: Option<f64>,
    ) -> Result<BudgetStatus, StoreError>;
}

/// Live run log and webhook-style event dispatch. Fire-and-forget.
#[async_trait]
pub trait EventSink: Send + Sync + 'static {
    async fn emit(&self, run_id: Uuid, event: LogEvent) -> Result<(), EventError>;

    async fn dispatch_event(
        &self,
        org_id: &str,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<(), EventError>;
}
