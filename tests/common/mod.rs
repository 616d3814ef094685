//! Shared test utilities for Relay integration tests.
//!
//! Provides a scripted provider adapter and a harness that wires the router,
//! tracer and orchestrator to in-memory collaborators.

#![allow(dead_code)]

use async_trait::async_trait;
use relay::circuit::CircuitBreakerRegistry;
use relay::config::{CircuitBreakerConfig, TracerConfig};
use relay::provider::{
    ProviderAdapter, ProviderError, ProviderId, ProviderRequest, ProviderResponse, ProviderSet,
    TokenUsage,
};
use relay::queue::{Collaborators, Orchestrator};
use relay::routing::{FallbackTable, RetryPolicy, Router};
use relay::store::{BroadcastSink, MemoryLedger, MemoryStore, MemoryVault, RunStore};
use relay::trace::DecisionTracer;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

// =============================================================================
// Scripted Provider
// =============================================================================

/// Adapter that replays a fixed list of results, then fails with a network error.
pub struct ScriptedProvider {
    id: ProviderId,
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    calls: AtomicU32,
    last_request: Mutex<Option<ProviderRequest>>,
}

impl ScriptedProvider {
    pub fn new(name: &str, script: Vec<Result<ProviderResponse, ProviderError>>) -> Arc<Self> {
        Arc::new(Self {
            id: ProviderId::new(name),
            script: Mutex::new(script.into()),
            calls: AtomicU32::new(0),
            last_request: Mutex::new(None),
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<ProviderRequest> {
        self.last_request.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderAdapter for ScriptedProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ProviderError::Network("script exhausted".to_string())))
    }
}

/// Successful reply from `model` with 1000 input / 500 output tokens.
pub fn ok_from(model: &str, content: &str) -> Result<ProviderResponse, ProviderError> {
    Ok(ProviderResponse {
        content: content.to_string(),
        model: model.to_string(),
        usage: Some(TokenUsage {
            input_tokens: 1000,
            output_tokens: 500,
        }),
    })
}

pub fn ok(content: &str) -> Result<ProviderResponse, ProviderError> {
    ok_from("test-model", content)
}

pub fn rate_limited() -> Result<ProviderResponse, ProviderError> {
    Err(ProviderError::RateLimited("rate limit exceeded".to_string()))
}

pub fn unauthorized() -> Result<ProviderResponse, ProviderError> {
    Err(ProviderError::Upstream {
        status: 401,
        message: "invalid api key".to_string(),
    })
}

// =============================================================================
// Harness
// =============================================================================

/// Orchestrator wired to in-memory collaborators, plus handles to inspect them.
pub struct Harness {
    pub providers: Arc<ProviderSet>,
    pub circuits: Arc<CircuitBreakerRegistry>,
    pub store: Arc<MemoryStore>,
    pub vault: Arc<MemoryVault>,
    pub ledger: Arc<MemoryLedger>,
    pub events: Arc<BroadcastSink>,
    pub tracer: Arc<DecisionTracer>,
    pub orchestrator: Arc<Orchestrator>,
}

pub struct HarnessBuilder {
    adapters: Vec<Arc<dyn ProviderAdapter>>,
    fallbacks: FallbackTable,
    policy: RetryPolicy,
    tracer: TracerConfig,
    circuit: CircuitBreakerConfig,
    wrap_store: Option<fn(Arc<MemoryStore>) -> Arc<dyn RunStore>>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            adapters: Vec::new(),
            fallbacks: FallbackTable::default(),
            policy: RetryPolicy::immediate(2),
            tracer: TracerConfig {
                approval_threshold: 0.7,
                approval_timeout_seconds: 5,
            },
            circuit: CircuitBreakerConfig::default(),
            wrap_store: None,
        }
    }

    pub fn provider(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapters.push(adapter);
        self
    }

    pub fn fallback(mut self, provider: &str, chain: &[&str]) -> Self {
        self.fallbacks = self.fallbacks.with_chain(provider, chain).unwrap();
        self
    }

    pub fn default_model(mut self, provider: &str, model: &str) -> Self {
        self.fallbacks = self.fallbacks.with_default_model(provider, model);
        self
    }

    pub fn retries(mut self, max_retries: u32) -> Self {
        self.policy = RetryPolicy::immediate(max_retries);
        self
    }

    pub fn approval_timeout_seconds(mut self, seconds: u64) -> Self {
        self.tracer.approval_timeout_seconds = seconds;
        self
    }

    pub fn approval_threshold(mut self, threshold: f64) -> Self {
        self.tracer.approval_threshold = threshold;
        self
    }

    /// Put `wrap` between the orchestrator and the in-memory store.
    /// `Harness::store` stays the inner store for inspection.
    pub fn wrap_store(mut self, wrap: fn(Arc<MemoryStore>) -> Arc<dyn RunStore>) -> Self {
        self.wrap_store = Some(wrap);
        self
    }

    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.circuit.failure_threshold = threshold;
        self
    }

    pub fn build(self) -> Harness {
        let providers = Arc::new(ProviderSet::new());
        for adapter in self.adapters {
            providers.insert(adapter);
        }
        let circuits = Arc::new(CircuitBreakerRegistry::new(self.circuit));
        let router = Arc::new(Router::new(
            Arc::clone(&providers),
            Arc::clone(&circuits),
            self.fallbacks,
            self.policy,
        ));

        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(MemoryVault::new());
        let ledger = Arc::new(MemoryLedger::new());
        let events = Arc::new(BroadcastSink::default());
        let backing: Arc<dyn RunStore> = match self.wrap_store {
            Some(wrap) => wrap(Arc::clone(&store)),
            None => store.clone(),
        };
        let tracer = Arc::new(DecisionTracer::new(
            &self.tracer,
            Arc::clone(&backing),
            events.clone(),
        ));

        let orchestrator = Arc::new(Orchestrator::new(
            router,
            Arc::clone(&tracer),
            Collaborators {
                store: backing,
                vault: vault.clone(),
                ledger: ledger.clone(),
                events: events.clone(),
            },
        ));

        Harness {
            providers,
            circuits,
            store,
            vault,
            ledger,
            events,
            tracer,
            orchestrator,
        }
    }
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self::new()
    }
}
