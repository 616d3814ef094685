//! Retry policy configuration

use serde::{Deserialize, Serialize};

/// Retry and backoff settings applied to every provider in a chain.
///
/// # Example
///
/// ```toml
/// [retry]
/// max_retries = 2
/// base_delay_ms = 1000
/// max_delay_ms = 30000
/// backoff_multiplier = 2.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Retries per provider after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay_ms: u64,
    /// Upper bound on the computed delay (before jitter).
    pub max_delay_ms: u64,
    /// Growth factor between consecutive retries.
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}
