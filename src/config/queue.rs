//! Orchestrator queue configuration

use serde::{Deserialize, Serialize};

/// Configuration for the orchestrator task queue.
///
/// Runs beyond `concurrency` wait in FIFO order; at most `max_pending` runs
/// may wait at once.
///
/// # Example
///
/// ```toml
/// [queue]
/// enabled = true
/// concurrency = 2
/// max_pending = 100
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Whether the queue accepts work.
    ///
    /// Default: true
    pub enabled: bool,

    /// Runs executing at the same time.
    ///
    /// Default: 2
    pub concurrency: usize,

    /// Maximum number of runs waiting for a slot.
    ///
    /// Default: 100
    /// When max_pending is 0, queuing is disabled (equivalent to enabled=false).
    pub max_pending: u32,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 2,
            max_pending: 100,
        }
    }
}

impl QueueConfig {
    /// Check if queuing is effectively enabled.
    ///
    /// Queuing is disabled if either enabled=false or max_pending=0.
    pub fn is_enabled(&self) -> bool {
        self.enabled && self.max_pending > 0
    }
}
