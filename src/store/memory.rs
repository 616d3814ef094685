//! In-memory collaborators

use super::{
    AgentRun, AuditLog, BudgetStatus, CostLedger, CredentialVault, EventError, EventSink,
    LogEvent, Message, Org, RunStatus, RunStore, RunUpdate, StoreError, UsageRecord,
};
use crate::provider::ProviderId;
use crate::trace::{DecisionTrace, TraceApproval};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Process-local [`RunStore`].
#[derive(Default)]
pub struct MemoryStore {
    runs: DashMap<Uuid, AgentRun>,
    messages: DashMap<Uuid, Vec<Message>>,
    traces: DashMap<Uuid, DecisionTrace>,
    usage: DashMap<Uuid, UsageRecord>,
    audit: DashMap<Uuid, AuditLog>,
    orgs: DashMap<String, Org>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_org(&self, org: Org) {
        self.orgs.insert(org.id.clone(), org);
    }

    /// Messages of a run in insertion order.
    pub fn messages(&self, run_id: Uuid) -> Vec<Message> {
        self.messages
            .get(&run_id)
            .map(|m| m.value().clone())
            .unwrap_or_default()
    }

    pub fn usage_records(&self, run_id: Uuid) -> Vec<UsageRecord> {
        let mut records: Vec<UsageRecord> = self
            .usage
            .iter()
            .filter(|r| r.run_id == run_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(|r| r.created_at);
        records
    }

    pub fn audit_logs(&self, run_id: Uuid) -> Vec<AuditLog> {
        let mut entries: Vec<AuditLog> = self
            .audit
            .iter()
            .filter(|e| e.run_id == Some(run_id))
            .map(|e| e.value().clone())
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries
    }
}

#[async_trait]
impl RunStore for MemoryStore {
    async fn create_agent_run(&self, run: AgentRun) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.runs.entry(run.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                kind: "run",
                id: run.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(run);
                Ok(())
            }
        }
    }

    async fn get_agent_run(&self, run_id: Uuid) -> Result<Option<AgentRun>, StoreError> {
        Ok(self.runs.get(&run_id).map(|r| r.value().clone()))
    }

    async fn update_agent_run(
        &self,
        run_id: Uuid,
        update: RunUpdate,
    ) -> Result<AgentRun, StoreError> {
        let mut run = self.runs.get_mut(&run_id).ok_or_else(|| StoreError::NotFound {
            kind: "run",
            id: run_id.to_string(),
        })?;

        if let Some(next) = update.status {
            if next != run.status {
                if !run.status.can_transition_to(next) {
                    return Err(StoreError::InvalidTransition {
                        from: run.status,
                        to: next,
                    });
                }
                let now = Utc::now();
                if next == RunStatus::Running && run.started_at.is_none() {
                    run.started_at = Some(now);
                }
                if next.is_terminal() {
                    run.completed_at = Some(now);
                }
                run.status = next;
            }
        }
        if let Some(provider) = update.provider {
            run.provider = provider;
        }
        if let Some(model) = update.model {
            run.model = Some(model);
        }
        if let Some(cost) = update.cost_estimate {
            run.cost_estimate = cost;
        }
        if let Some(error) = update.error {
            run.error = Some(error);
        }
        Ok(run.clone())
    }

    async fn create_message(&self, message: Message) -> Result<(), StoreError> {
        self.messages.entry(message.run_id).or_default().push(message);
        Ok(())
    }

    async fn create_decision_trace(&self, trace: DecisionTrace) -> Result<(), StoreError> {
        use dashmap::mapref::entry::Entry;
        match self.traces.entry(trace.id) {
            Entry::Occupied(_) => Err(StoreError::Duplicate {
                kind: "trace",
                id: trace.id.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(trace);
                Ok(())
            }
        }
    }

    async fn update_decision_trace(
        &self,
        trace_id: Uuid,
        approval: TraceApproval,
    ) -> Result<DecisionTrace, StoreError> {
        let mut trace = self
            .traces
            .get_mut(&trace_id)
            .ok_or_else(|| StoreError::NotFound {
                kind: "trace",
                id: trace_id.to_string(),
            })?;
        trace.apply(&approval);
        Ok(trace.clone())
    }

    async fn list_decision_traces(&self, run_id: Uuid) -> Result<Vec<DecisionTrace>, StoreError> {
        let mut traces: Vec<DecisionTrace> = self
            .traces
            .iter()
            .filter(|t| t.run_id == run_id)
            .map(|t| t.value().clone())
            .collect();
        traces.sort_by_key(|t| t.step_number);
        Ok(traces)
    }

    async fn create_usage_record(&self, record: UsageRecord) -> Result<(), StoreError> {
        self.usage.insert(record.id, record);
        Ok(())
    }

    async fn create_audit_log(&self, entry: AuditLog) -> Result<(), StoreError> {
        self.audit.insert(entry.id, entry);
        Ok(())
    }

    async fn get_org(&self, org_id: &str) -> Result<Option<Org>, StoreError> {
        Ok(self.orgs.get(org_id).map(|o| o.value().clone()))
    }
}

/// Process-local [`CredentialVault`].
#[derive(Default)]
pub struct MemoryVault {
    keys: DashMap<(String, ProviderId), String>,
}

impl MemoryVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, org_id: &str, provider: impl Into<ProviderId>, api_key: impl Into<String>) {
        self.keys
            .insert((org_id.to_string(), provider.into()), api_key.into());
    }
}

#[async_trait]
impl CredentialVault for MemoryVault {
    async fn credential(
        &self,
        org_id: &str,
        provider: &ProviderId,
    ) -> Result<Option<String>, StoreError> {
        Ok(self
            .keys
            .get(&(org_id.to_string(), provider.clone()))
            .map(|k| k.value().clone()))
    }
}

/// Process-local [`CostLedger`].
#[derive(Default)]
pub struct MemoryLedger {
    spent: DashMap<String, f64>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn spent(&self, org_id: &str) -> f64 {
        self.spent.get(org_id).map(|s| *s).unwrap_or(0.0)
    }
}

#[async_trait]
impl CostLedger for MemoryLedger {
    async fn track_cost(&self, org_id: &str, amount_usd: f64) -> Result<(), StoreError> {
        *self.spent.entry(org_id.to_string()).or_insert(0.0) += amount_usd.max(0.0);
        Ok(())
    }

    async fn check_budget(
        &self,
        org_id: &str,
        monthly_limit_usd: Option<f64>,
    ) -> Result<BudgetStatus, StoreError> {
        Ok(BudgetStatus::from_usage(self.spent(org_id), monthly_limit_usd))
    }
}

/// Everything a [`BroadcastSink`] publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Log {
        run_id: Uuid,
        event: LogEvent,
    },
    Dispatch {
        org_id: String,
        name: String,
        payload: serde_json::Value,
    },
}

/// [`EventSink`] that fans events out over a tokio broadcast channel.
///
/// Sending with no subscriber is not an error; slow subscribers lag.
pub struct BroadcastSink {
    tx: broadcast::Sender<SinkEvent>,
}

impl BroadcastSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SinkEvent> {
        self.tx.subscribe()
    }
}

impl Default for BroadcastSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl EventSink for BroadcastSink {
    async fn emit(&self, run_id: Uuid, event: LogEvent) -> Result<(), EventError> {
        let _ = self.tx.send(SinkEvent::Log { run_id, event });
        Ok(())
    }

    async fn dispatch_event(
        &self,
        org_id: &str,
        name: &str,
        payload: serde_json::Value,
    ) -> Result<(), EventError> {
        let _ = self.tx.send(SinkEvent::Dispatch {
            org_id: org_id.to_string(),
            name: name.to_string(),
            payload,
        });
        Ok(())
    }
}
