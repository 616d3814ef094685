//! Orchestrator queue integration tests.

mod common;

use common::{ok, HarnessBuilder, ScriptedProvider};
use relay::config::QueueConfig;
use relay::queue::{AgentTask, OrchestratorQueue, QueueError};
use relay::store::{RunStatus, RunStore};
use std::sync::Arc;

#[tokio::test]
async fn test_queued_runs_all_complete_with_their_own_traces() {
    let openai = ScriptedProvider::new("openai", (0..4).map(|i| ok(&format!("answer {}", i))).collect());
    let harness = HarnessBuilder::new().provider(openai.clone()).build();
    let queue = OrchestratorQueue::start(
        Arc::clone(&harness.orchestrator),
        QueueConfig {
            enabled: true,
            concurrency: 2,
            max_pending: 10,
        },
    );

    let mut receivers = Vec::new();
    let mut run_ids = Vec::new();
    for i in 0..4 {
        let task = AgentTask::new(
            format!("org-{}", i),
            "batch",
            "Summarize the support ticket",
            "openai",
        )
        .with_model("gpt-4o-mini");
        run_ids.push(task.run_id);
        receivers.push(queue.enqueue(task).await.unwrap());
    }

    for (rx, run_id) in receivers.into_iter().zip(run_ids) {
        let report = rx.await.unwrap();
        assert_eq!(report.run_id, run_id);
        assert!(report.is_success());
        assert!(report.traces.iter().all(|t| t.run_id == run_id));
        assert_eq!(report.traces.first().map(|t| t.step_number), Some(1));

        let run = harness.store.get_agent_run(run_id).await.unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Completed);
    }

    assert_eq!(openai.calls(), 4);
    assert_eq!(queue.depth(), 0);
    queue.shutdown().await;
    assert!(queue.is_closed());
}

#[tokio::test]
async fn test_disabled_queue_rejects_without_creating_run() {
    let harness = HarnessBuilder::new().build();
    let queue = OrchestratorQueue::start(
        Arc::clone(&harness.orchestrator),
        QueueConfig {
            enabled: false,
            concurrency: 1,
            max_pending: 10,
        },
    );

    let task = AgentTask::new("acme", "batch", "Summarize the support ticket", "openai");
    let run_id = task.run_id;
    let result = queue.enqueue(task).await;

    assert!(matches!(result, Err(QueueError::Closed)));
    assert!(harness.store.get_agent_run(run_id).await.unwrap().is_none());
    queue.shutdown().await;
}

#[tokio::test]
async fn test_enqueue_after_shutdown_is_closed() {
    let harness = HarnessBuilder::new().build();
    let queue = OrchestratorQueue::start(Arc::clone(&harness.orchestrator), QueueConfig::default());
    queue.shutdown().await;

    let result = queue
        .enqueue(AgentTask::new("acme", "batch", "Summarize the support ticket", "openai"))
        .await;
    assert!(matches!(result, Err(QueueError::Closed)));
}
