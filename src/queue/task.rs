//! Queued tasks and their reports

use crate::provider::ProviderId;
use crate::store::RunStatus;
use crate::trace::DecisionTrace;
use serde::Serialize;
use uuid::Uuid;

/// One agent run waiting to be executed.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentTask {
    pub run_id: Uuid,
    pub org_id: String,
    pub project_id: String,
    pub goal: String,
    pub provider: ProviderId,
    pub model: Option<String>,
}

impl AgentTask {
    pub fn new(
        org_id: impl Into<String>,
        project_id: impl Into<String>,
        goal: impl Into<String>,
        provider: impl Into<ProviderId>,
    ) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            org_id: org_id.into(),
            project_id: project_id.into(),
            goal: goal.into(),
            provider: provider.into(),
            model: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_run_id(mut self, run_id: Uuid) -> Self {
        self.run_id = run_id;
        self
    }
}

/// Final state of a run, sent back to whoever enqueued it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub status: RunStatus,
    /// Provider that answered, or the last one attempted.
    pub used_provider: Option<ProviderId>,
    pub model: Option<String>,
    pub content: Option<String>,
    pub attempts: u32,
    pub cost_usd: f64,
    pub error: Option<String>,
    pub traces: Vec<DecisionTrace>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Completed
    }
}
