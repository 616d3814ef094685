//! Orchestrator queue
//!
//! Bounded FIFO queue of agent runs. A dispatcher task takes runs off a
//! tokio channel as concurrency permits become available and executes each
//! one on its own task. Shutdown stops dispatching and cancels runs that
//! never started; runs already executing finish normally.

pub mod error;
pub mod orchestrator;
pub mod task;

pub use error::{OrchestratorError, QueueError};
pub use orchestrator::{Collaborators, Orchestrator};
pub use task::{AgentTask, RunReport};

use crate::config::QueueConfig;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A run waiting for a concurrency slot
struct QueuedTask {
    task: AgentTask,
    reply: oneshot::Sender<RunReport>,
}

/// Decrements the active-run count when a run task ends, even by panic.
struct ActiveGuard(Arc<AtomicUsize>);

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        let active = self.0.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("relay_runs_active").set(active as f64);
    }
}

/// Bounded-concurrency FIFO queue in front of an [`Orchestrator`].
pub struct OrchestratorQueue {
    orchestrator: Arc<Orchestrator>,
    tx: mpsc::Sender<QueuedTask>,
    depth: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    config: QueueConfig,
    cancel: CancellationToken,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl OrchestratorQueue {
    /// Create the queue and spawn its dispatcher on the current runtime.
    pub fn start(orchestrator: Arc<Orchestrator>, config: QueueConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.max_pending.max(1) as usize);
        let depth = Arc::new(AtomicUsize::new(0));
        let active = Arc::new(AtomicUsize::new(0));
        let cancel = CancellationToken::new();

        let dispatcher = tokio::spawn(dispatch_loop(
            Arc::clone(&orchestrator),
            rx,
            Arc::new(Semaphore::new(config.concurrency.max(1))),
            Arc::clone(&depth),
            Arc::clone(&active),
            cancel.clone(),
        ));

        tracing::info!(
            concurrency = config.concurrency,
            max_pending = config.max_pending,
            "Orchestrator queue started"
        );

        Self {
            orchestrator,
            tx,
            depth,
            active,
            config,
            cancel,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    /// Create the run record and queue it.
    ///
    /// The receiver resolves with the final [`RunReport`] once the run
    /// completes, fails or is cancelled.
    pub async fn enqueue(&self, task: AgentTask) -> Result<oneshot::Receiver<RunReport>, QueueError> {
        if !self.config.is_enabled() || self.cancel.is_cancelled() {
            return Err(QueueError::Closed);
        }

        // CAS loop to atomically check-and-increment depth
        loop {
            let current = self.depth.load(Ordering::SeqCst);
            if current >= self.config.max_pending as usize {
                return Err(QueueError::Full {
                    max_pending: self.config.max_pending,
                });
            }
            if self
                .depth
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                break;
            }
        }
        metrics::gauge!("relay_queue_depth").set(self.depth() as f64);

        if let Err(e) = self.orchestrator.create_run(&task).await {
            self.release_slot();
            return Err(e.into());
        }

        let (reply, rx) = oneshot::channel();
        let run_id = task.run_id;
        if let Err(mpsc::error::TrySendError::Closed(queued)
        | mpsc::error::TrySendError::Full(queued)) = self.tx.try_send(QueuedTask { task, reply })
        {
            self.release_slot();
            // The run record exists; close it out.
            let _ = self.orchestrator.cancel_queued(&queued.task).await;
            return Err(QueueError::Closed);
        }

        tracing::debug!(run_id = %run_id, depth = self.depth(), "Run queued");
        Ok(rx)
    }

    /// Runs waiting for a slot.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }

    /// Runs currently executing.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn orchestrator(&self) -> &Arc<Orchestrator> {
        &self.orchestrator
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Stop dispatching and cancel every waiting run.
    ///
    /// Returns once the dispatcher has drained the queue. Running tasks are
    /// not interrupted.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.dispatcher.lock().await.take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Queue dispatcher ended abnormally");
            }
        }
    }

    fn release_slot(&self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        metrics::gauge!("relay_queue_depth").set(self.depth() as f64);
    }
}

impl Drop for OrchestratorQueue {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Take runs in FIFO order as permits become available.
async fn dispatch_loop(
    orchestrator: Arc<Orchestrator>,
    mut rx: mpsc::Receiver<QueuedTask>,
    permits: Arc<Semaphore>,
    depth: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    cancel: CancellationToken,
) {
    tracing::debug!("Queue dispatcher started");

    loop {
        let permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            permit = Arc::clone(&permits).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        let queued = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = rx.recv() => match next {
                Some(queued) => queued,
                None => break,
            },
        };

        let remaining = depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("relay_queue_depth").set(remaining as f64);
        let running = active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::gauge!("relay_runs_active").set(running as f64);

        let guard = ActiveGuard(Arc::clone(&active));
        let orchestrator = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            let _permit = permit;
            let _guard = guard;
            let QueuedTask { task, reply } = queued;

            let report = match AssertUnwindSafe(orchestrator.execute(&task))
                .catch_unwind()
                .await
            {
                Ok(report) => report,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "run task panicked".to_string());
                    tracing::error!(run_id = %task.run_id, panic = %message, "Run task panicked");
                    orchestrator.fail_unexpected(&task, message).await
                }
            };

            if reply.send(report).is_err() {
                tracing::debug!(run_id = %task.run_id, "Run report receiver dropped");
            }
        });
    }

    // Cancel everything still waiting
    rx.close();
    while let Ok(queued) = rx.try_recv() {
        let remaining = depth.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        metrics::gauge!("relay_queue_depth").set(remaining as f64);
        let report = orchestrator.cancel_queued(&queued.task).await;
        let _ = queued.reply.send(report);
    }

    tracing::info!("Queue dispatcher stopped");
}
