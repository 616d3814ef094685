//! Retry/fallback routing across providers
//!
//! The router walks the candidate list for a request (`[primary] + fallback
//! chain`), skips providers whose circuit breaker is open, retries
//! transient failures with exponential backoff, and records every provider
//! outcome in the [`CircuitBreakerRegistry`].
//!
//! Control flow never depends on the [`RouteObserver`]; it only watches.

use std::sync::Arc;

pub mod backoff;
pub mod error;
pub mod fallback;
pub mod observer;

pub use backoff::RetryPolicy;
pub use error::RouteError;
pub use fallback::FallbackTable;
pub use observer::{NoopObserver, RouteEvent, RouteObserver};

use crate::circuit::CircuitBreakerRegistry;
use crate::config::{ConfigError, RelayConfig};
use crate::provider::{ErrorClass, ProviderId, ProviderRequest, ProviderResponse, ProviderSet};

/// API key issued for one provider.
#[derive(Clone, PartialEq)]
pub struct Credential {
    pub provider: ProviderId,
    pub api_key: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential")
            .field("provider", &self.provider)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// One request to route.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteRequest {
    /// Primary provider
    pub provider: ProviderId,
    pub prompt: String,
    /// Model for the primary provider. Falls back to its default model.
    pub model: Option<String>,
    pub credential: Option<Credential>,
}

impl RouteRequest {
    pub fn new(provider: impl Into<ProviderId>, prompt: impl Into<String>) -> Self {
        Self {
            provider: provider.into(),
            prompt: prompt.into(),
            model: None,
            credential: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// The caller's API key, only for the provider it was issued for.
    fn api_key_for(&self, provider: &ProviderId) -> Option<String> {
        self.credential
            .as_ref()
            .filter(|c| &c.provider == provider)
            .map(|c| c.api_key.clone())
    }
}

/// Result of routing one request.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteOutcome {
    /// Provider that answered, or the last one attempted on failure.
    pub used_provider: ProviderId,
    /// Provider calls made across all candidates.
    pub attempts: u32,
    pub result: Result<ProviderResponse, RouteError>,
}

impl RouteOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }

    pub fn content(&self) -> Option<&str> {
        self.result.as_ref().ok().map(|r| r.content.as_str())
    }

    pub fn error(&self) -> Option<&RouteError> {
        self.result.as_ref().err()
    }
}

/// Routes requests across providers with retry, fallback and circuit breaking.
pub struct Router {
    providers: Arc<ProviderSet>,
    circuits: Arc<CircuitBreakerRegistry>,
    fallbacks: FallbackTable,
    policy: RetryPolicy,
}

impl Router {
    pub fn new(
        providers: Arc<ProviderSet>,
        circuits: Arc<CircuitBreakerRegistry>,
        fallbacks: FallbackTable,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            providers,
            circuits,
            fallbacks,
            policy,
        }
    }

    /// Build a router from the `[routing]` and `[retry]` sections.
    pub fn from_config(
        config: &RelayConfig,
        providers: Arc<ProviderSet>,
        circuits: Arc<CircuitBreakerRegistry>,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(
            providers,
            circuits,
            FallbackTable::from_config(&config.routing)?,
            RetryPolicy::from(&config.retry),
        ))
    }

    pub fn circuits(&self) -> &Arc<CircuitBreakerRegistry> {
        &self.circuits
    }

    pub fn providers(&self) -> &Arc<ProviderSet> {
        &self.providers
    }

    pub fn fallbacks(&self) -> &FallbackTable {
        &self.fallbacks
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Route a request without observing events.
    pub async fn call_with_retry(&self, request: &RouteRequest) -> RouteOutcome {
        self.call_with_observer(request, &NoopObserver).await
    }

    /// Route a request, reporting each skip, retry and fallback to `observer`.
    pub async fn call_with_observer(
        &self,
        request: &RouteRequest,
        observer: &dyn RouteObserver,
    ) -> RouteOutcome {
        let candidates = self.fallbacks.candidates(&request.provider);
        let max_attempts = self.policy.max_attempts();

        let mut attempts = 0u32;
        let mut last_attempted: Option<ProviderId> = None;
        let mut last_error: Option<String> = None;
        // Provider just abandoned and why
        let mut abandoned: Option<(ProviderId, String)> = None;

        for (index, candidate) in candidates.iter().enumerate() {
            if let Some((from, reason)) = abandoned.take() {
                metrics::counter!(
                    "relay_fallbacks_total",
                    "from" => from.to_string(),
                    "to" => candidate.to_string()
                )
                .increment(1);
                tracing::info!(from = %from, to = %candidate, reason = %reason, "Falling back");
                observer
                    .on_event(&RouteEvent::Fallback {
                        from,
                        to: candidate.clone(),
                        reason,
                    })
                    .await;
            }

            if self.circuits.is_open(candidate) {
                tracing::debug!(provider = %candidate, "Skipping provider with open circuit");
                let reason = format!("circuit breaker open for '{}'", candidate);
                last_error.get_or_insert_with(|| reason.clone());
                observer
                    .on_event(&RouteEvent::CircuitOpen {
                        provider: candidate.clone(),
                    })
                    .await;
                abandoned = Some((candidate.clone(), reason));
                continue;
            }

            let Some(model) = self.resolve_model(candidate, index == 0, request) else {
                let reason = format!("no model configured for '{}'", candidate);
                tracing::debug!(provider = %candidate, "Skipping provider without model");
                last_error.get_or_insert_with(|| reason.clone());
                observer
                    .on_event(&RouteEvent::NotConfigured {
                        provider: candidate.clone(),
                        reason: reason.clone(),
                    })
                    .await;
                abandoned = Some((candidate.clone(), reason));
                continue;
            };

            let provider_request = ProviderRequest {
                prompt: request.prompt.clone(),
                model,
                api_key: request.api_key_for(candidate),
            };

            let mut attempt = 0u32;
            loop {
                attempt += 1;
                attempts += 1;
                last_attempted = Some(candidate.clone());
                metrics::counter!("relay_provider_attempts_total", "provider" => candidate.to_string())
                    .increment(1);
                tracing::debug!(
                    provider = %candidate,
                    model = %provider_request.model,
                    attempt,
                    max_attempts,
                    "Calling provider"
                );

                let err = match self.providers.call(candidate, &provider_request).await {
                    Ok(response) => {
                        self.circuits.record_success(candidate);
                        tracing::debug!(provider = %candidate, attempts, "Provider call succeeded");
                        return RouteOutcome {
                            used_provider: candidate.clone(),
                            attempts,
                            result: Ok(response),
                        };
                    }
                    Err(err) => err,
                };

                match err.class() {
                    ErrorClass::NotConfigured => {
                        let reason = err.to_string();
                        tracing::debug!(provider = %candidate, "Provider not configured");
                        last_error = Some(reason.clone());
                        observer
                            .on_event(&RouteEvent::NotConfigured {
                                provider: candidate.clone(),
                                reason: reason.clone(),
                            })
                            .await;
                        abandoned = Some((candidate.clone(), reason));
                        break;
                    }
                    ErrorClass::Fatal => {
                        self.circuits.record_failure(candidate);
                        tracing::warn!(
                            provider = %candidate,
                            error = %err,
                            "Non-retryable provider error, abandoning chain"
                        );
                        return RouteOutcome {
                            used_provider: candidate.clone(),
                            attempts,
                            result: Err(RouteError::NonRetryable {
                                provider: candidate.clone(),
                                source: err,
                            }),
                        };
                    }
                    ErrorClass::Retryable if attempt < max_attempts => {
                        let delay = self.policy.backoff(attempt - 1);
                        tracing::warn!(
                            provider = %candidate,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "Retryable provider error, backing off"
                        );
                        observer
                            .on_event(&RouteEvent::Retry {
                                provider: candidate.clone(),
                                attempt: attempt + 1,
                                max_attempts,
                                delay,
                                error: err.to_string(),
                            })
                            .await;
                        tokio::time::sleep(delay).await;
                    }
                    ErrorClass::Retryable => {
                        self.circuits.record_failure(candidate);
                        tracing::warn!(
                            provider = %candidate,
                            attempts = attempt,
                            error = %err,
                            "Provider failed after retries"
                        );
                        last_error = Some(err.to_string());
                        abandoned = Some((
                            candidate.clone(),
                            format!("retries exhausted: {}", err),
                        ));
                        break;
                    }
                }
            }
        }

        let last_error = last_error.unwrap_or_else(|| "no providers available".to_string());
        tracing::error!(
            provider = %request.provider,
            attempts,
            error = %last_error,
            "All providers in fallback chain failed"
        );
        RouteOutcome {
            used_provider: last_attempted.unwrap_or_else(|| request.provider.clone()),
            attempts,
            result: Err(RouteError::Exhausted {
                chain: candidates,
                last_error,
            }),
        }
    }

    /// Requested model for the primary, configured default for everyone else.
    fn resolve_model(
        &self,
        provider: &ProviderId,
        is_primary: bool,
        request: &RouteRequest,
    ) -> Option<String> {
        if is_primary {
            if let Some(model) = &request.model {
                return Some(model.clone());
            }
        }
        self.fallbacks.default_model(provider).map(str::to_string)
    }
}
