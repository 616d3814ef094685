//! Per-provider circuit breakers.
//!
//! Thread-safe in-memory registry of breaker state keyed by [`ProviderId`].
//! Every mutation happens while the DashMap shard lock for that provider is
//! held and never spans an `.await`, so concurrent runs touching the same
//! provider cannot lose updates.
//!
//! Open breakers close lazily: the first access after `open_until` resets the
//! state. There is no background timer.

use crate::config::CircuitBreakerConfig;
use crate::provider::ProviderId;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Mutable breaker state for one provider.
#[derive(Debug, Clone, Default)]
struct CircuitState {
    failure_count: u32,
    last_failure_at: Option<DateTime<Utc>>,
    is_open: bool,
    open_until: Option<Instant>,
}

impl CircuitState {
    /// Close the breaker if its deadline has passed.
    fn expire_if_due(&mut self, now: Instant) {
        if self.is_open && self.open_until.is_some_and(|until| now >= until) {
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.failure_count = 0;
        self.is_open = false;
        self.open_until = None;
    }
}

/// Read-only view of a provider's breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitSnapshot {
    pub provider: ProviderId,
    pub failure_count: u32,
    pub is_open: bool,
    pub last_failure_at: Option<DateTime<Utc>>,
    /// Time left until the breaker closes, if open.
    #[serde(skip)]
    pub remaining: Option<Duration>,
}

/// Registry of circuit breakers, one per provider.
///
/// # Examples
///
/// ```
/// use relay::circuit::CircuitBreakerRegistry;
/// use relay::config::CircuitBreakerConfig;
///
/// let circuits = CircuitBreakerRegistry::new(CircuitBreakerConfig {
///     failure_threshold: 2,
///     reset_seconds: 60,
/// });
///
/// circuits.record_failure("OpenAI");
/// assert!(!circuits.is_open("openai"));
/// circuits.record_failure("openai");
/// assert!(circuits.is_open("openai"));
///
/// circuits.record_success("openai");
/// assert!(!circuits.is_open("openai"));
/// ```
pub struct CircuitBreakerRegistry {
    states: DashMap<ProviderId, CircuitState>,
    failure_threshold: u32,
    reset_after: Duration,
}

impl CircuitBreakerRegistry {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            states: DashMap::new(),
            failure_threshold: config.failure_threshold.max(1),
            reset_after: config.reset_after(),
        }
    }

    pub fn failure_threshold(&self) -> u32 {
        self.failure_threshold
    }

    pub fn reset_after(&self) -> Duration {
        self.reset_after
    }

    /// Whether calls to `provider` should be skipped right now.
    pub fn is_open(&self, provider: impl Into<ProviderId>) -> bool {
        let provider = provider.into();
        let now = Instant::now();
        let mut state = self.states.entry(provider).or_default();
        state.expire_if_due(now);
        state.is_open
    }

    /// Record a failed call (after retries). Opens the breaker at the threshold.
    pub fn record_failure(&self, provider: impl Into<ProviderId>) {
        let provider = provider.into();
        let now = Instant::now();
        let mut state = self.states.entry(provider.clone()).or_default();
        state.expire_if_due(now);

        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure_at = Some(Utc::now());

        if !state.is_open && state.failure_count >= self.failure_threshold {
            state.is_open = true;
            state.open_until = Some(now + self.reset_after);
            let failures = state.failure_count;
            drop(state);

            metrics::counter!("relay_circuit_opened_total", "provider" => provider.to_string())
                .increment(1);
            tracing::warn!(
                provider = %provider,
                failures,
                reset_after_secs = self.reset_after.as_secs(),
                "Circuit breaker opened"
            );
        } else {
            tracing::debug!(
                provider = %provider,
                failures = state.failure_count,
                "Recorded provider failure"
            );
        }
    }

    /// Record a successful call. Closes the breaker and clears the count.
    pub fn record_success(&self, provider: impl Into<ProviderId>) {
        let provider = provider.into();
        let mut state = self.states.entry(provider.clone()).or_default();
        let was_open = state.is_open;
        state.reset();
        drop(state);

        if was_open {
            tracing::info!(provider = %provider, "Circuit breaker closed after success");
        }
    }

    /// Operator reset: close the breaker regardless of its deadline.
    pub fn reset(&self, provider: impl Into<ProviderId>) {
        let provider = provider.into();
        if let Some(mut state) = self.states.get_mut(&provider) {
            state.reset();
            state.last_failure_at = None;
        }
        tracing::info!(provider = %provider, "Circuit breaker manually reset");
    }

    /// Current state of one provider's breaker.
    pub fn snapshot(&self, provider: impl Into<ProviderId>) -> CircuitSnapshot {
        let provider = provider.into();
        let now = Instant::now();
        let mut state = self.states.entry(provider.clone()).or_default();
        state.expire_if_due(now);
        Self::to_snapshot(provider, &state, now)
    }

    /// State of every provider seen so far, sorted by name.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        let now = Instant::now();
        let mut snapshots: Vec<CircuitSnapshot> = self
            .states
            .iter_mut()
            .map(|mut entry| {
                entry.value_mut().expire_if_due(now);
                Self::to_snapshot(entry.key().clone(), entry.value(), now)
            })
            .collect();
        snapshots.sort_by(|a, b| a.provider.cmp(&b.provider));
        snapshots
    }

    fn to_snapshot(provider: ProviderId, state: &CircuitState, now: Instant) -> CircuitSnapshot {
        CircuitSnapshot {
            provider,
            failure_count: state.failure_count,
            is_open: state.is_open,
            last_failure_at: state.last_failure_at,
            remaining: state
                .open_until
                .filter(|_| state.is_open)
                .map(|until| until.saturating_duration_since(now)),
        }
    }
}

impl Default for CircuitBreakerRegistry {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn registry(threshold: u32, reset_seconds: u64) -> CircuitBreakerRegistry {
        CircuitBreakerRegistry::new(CircuitBreakerConfig {
            failure_threshold: threshold,
            reset_seconds,
        })
    }

    #[tokio::test(start_paused = true)]
    async fn opens_at_threshold_and_not_before() {
        let circuits = registry(5, 60);
        for _ in 0..4 {
            circuits.record_failure("openai");
        }
        assert!(!circuits.is_open("openai"));
        assert_eq!(circuits.snapshot("openai").failure_count, 4);

        circuits.record_failure("openai");
        assert!(circuits.is_open("openai"));
    }

    #[tokio::test(start_paused = true)]
    async fn resets_lazily_after_reset_duration() {
        let circuits = registry(5, 60);
        for _ in 0..5 {
            circuits.record_failure("openai");
        }
        assert!(circuits.is_open("openai"));

        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(circuits.is_open("openai"));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(!circuits.is_open("openai"));
        assert_eq!(circuits.snapshot("openai").failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_reports_remaining_open_time() {
        let circuits = registry(1, 60);
        circuits.record_failure("anthropic");
        tokio::time::advance(Duration::from_secs(15)).await;

        let snapshot = circuits.snapshot("anthropic");
        assert!(snapshot.is_open);
        assert_eq!(snapshot.remaining, Some(Duration::from_secs(45)));
        assert!(snapshot.last_failure_at.is_some());
    }

    #[test]
    fn spellings_share_one_breaker() {
        let circuits = registry(2, 60);
        circuits.record_failure("OpenAI");
        circuits.record_failure(" openai");
        assert!(circuits.is_open("OPENAI"));
        assert_eq!(circuits.snapshots().len(), 1);
    }

    #[test]
    fn success_resets_any_failure_count() {
        for failures in [1u32, 3, 4, 5, 12] {
            let circuits = registry(5, 60);
            for _ in 0..failures {
                circuits.record_failure("openai");
            }
            circuits.record_success("openai");

            let snapshot = circuits.snapshot("openai");
            assert_eq!(snapshot.failure_count, 0, "after {} failures", failures);
            assert!(!snapshot.is_open);
        }
    }

    #[test]
    fn operator_reset_closes_open_breaker() {
        let circuits = registry(1, 3600);
        circuits.record_failure("mistral");
        assert!(circuits.is_open("mistral"));

        circuits.reset("mistral");
        let snapshot = circuits.snapshot("mistral");
        assert!(!snapshot.is_open);
        assert_eq!(snapshot.failure_count, 0);
        assert!(snapshot.last_failure_at.is_none());
    }

    #[test]
    fn unknown_provider_is_closed() {
        let circuits = CircuitBreakerRegistry::default();
        assert!(!circuits.is_open("never-seen"));
        assert_eq!(circuits.failure_threshold(), 5);
        assert_eq!(circuits.reset_after(), Duration::from_secs(60));
    }

    #[test]
    fn snapshots_sorted_by_provider() {
        let circuits = registry(5, 60);
        circuits.record_failure("openai");
        circuits.record_failure("anthropic");
        circuits.record_failure("mistral");

        let names: Vec<String> = circuits
            .snapshots()
            .into_iter()
            .map(|s| s.provider.to_string())
            .collect();
        assert_eq!(names, vec!["anthropic", "mistral", "openai"]);
    }

    #[tokio::test]
    async fn concurrent_failures_are_not_lost() {
        let circuits = Arc::new(registry(1000, 60));
        let mut handles = vec![];

        for _ in 0..50 {
            let c = Arc::clone(&circuits);
            handles.push(tokio::spawn(async move {
                for _ in 0..10 {
                    c.record_failure("openai");
                    tokio::task::yield_now().await;
                }
            }));
        }

        futures::future::join_all(handles).await;
        assert_eq!(circuits.snapshot("openai").failure_count, 500);
    }
}
