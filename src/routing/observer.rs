//! Routing events for observers
//!
//! Observers see what the router does but cannot change it.

use crate::provider::ProviderId;
use async_trait::async_trait;
use std::time::Duration;

/// Something the router did while handling one request.
#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    /// Provider skipped because its breaker is open. No attempt counted.
    CircuitOpen { provider: ProviderId },

    /// Provider has no adapter, credential or model. No breaker penalty.
    NotConfigured { provider: ProviderId, reason: String },

    /// A retryable error; the router sleeps `delay` and calls again.
    Retry {
        provider: ProviderId,
        /// Number of the upcoming call on this provider (2 for the first retry).
        attempt: u32,
        max_attempts: u32,
        delay: Duration,
        error: String,
    },

    /// Moving on to the next candidate.
    Fallback {
        from: ProviderId,
        to: ProviderId,
        reason: String,
    },
}

/// Receives [`RouteEvent`]s in order. Called inline on the routing task.
#[async_trait]
pub trait RouteObserver: Send + Sync {
    async fn on_event(&self, event: &RouteEvent);
}

/// Observer that ignores every event.
pub struct NoopObserver;

#[async_trait]
impl RouteObserver for NoopObserver {
    async fn on_event(&self, _event: &RouteEvent) {}
}
