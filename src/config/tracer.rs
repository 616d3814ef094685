//! Decision tracer configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Approval gate settings.
///
/// # Example
///
/// ```toml
/// [tracer]
/// approval_threshold = 0.7
/// approval_timeout_seconds = 300
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Decisions with confidence strictly below this value need approval.
    ///
    /// Default: 0.7
    pub approval_threshold: f64,

    /// How long a run waits for an approval before it counts as rejected.
    ///
    /// Default: 300 seconds
    pub approval_timeout_seconds: u64,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            approval_threshold: 0.7,
            approval_timeout_seconds: 300,
        }
    }
}

impl TracerConfig {
    pub fn approval_timeout(&self) -> Duration {
        Duration::from_secs(self.approval_timeout_seconds)
    }
}
