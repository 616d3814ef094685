//! Circuit breaker configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-provider circuit breaker thresholds.
///
/// # Example
///
/// ```toml
/// [circuit_breaker]
/// failure_threshold = 5
/// reset_seconds = 60
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive recorded failures that open the breaker.
    ///
    /// Default: 5
    pub failure_threshold: u32,

    /// How long an open breaker stays open.
    ///
    /// Default: 60 seconds
    pub reset_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            reset_seconds: 60,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn reset_after(&self) -> Duration {
        Duration::from_secs(self.reset_seconds)
    }
}
