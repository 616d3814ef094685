//! Provider adapter layer.
//!
//! This module provides the `ProviderAdapter` trait and supporting types that
//! hide vendor-specific HTTP protocols behind one uniform call.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

pub mod anthropic;
pub mod error;
pub mod factory;
pub mod openai;
pub mod pricing;

pub use error::{is_retryable_message, ErrorClass, ProviderError};
pub use pricing::PricingTable;

/// Canonical provider name.
///
/// Construction trims and lowercases the input, so `"OpenAI"` and
/// `" openai "` resolve to the same breaker, fallback chain and default model.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct ProviderId(String);

impl ProviderId {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_ascii_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ProviderId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for ProviderId {
    fn from(name: String) -> Self {
        Self::new(&name)
    }
}

impl From<&ProviderId> for ProviderId {
    fn from(id: &ProviderId) -> Self {
        id.clone()
    }
}

impl From<ProviderId> for String {
    fn from(id: ProviderId) -> Self {
        id.0
    }
}

/// One prompt sent to one provider/model.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRequest {
    pub prompt: String,
    pub model: String,
    /// Per-request API key from the credential vault. Overrides the
    /// adapter's configured key when present.
    pub api_key: Option<String>,
}

/// Token usage reported by a provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }
}

/// Successful provider reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub content: String,
    /// Model that actually served the request.
    pub model: String,
    pub usage: Option<TokenUsage>,
}

/// Uniform interface to a single AI vendor.
///
/// This trait is object-safe and designed to be used as
/// `Arc<dyn ProviderAdapter>`. Implementations enforce their own request
/// timeout and report it as [`ProviderError::Timeout`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync + 'static {
    /// Canonical provider name this adapter serves.
    fn id(&self) -> &ProviderId;

    /// Send one prompt and wait for the complete reply.
    ///
    /// # Returns
    ///
    /// - `Ok(ProviderResponse)` on success
    /// - `Err(ProviderError::NotConfigured)` if no API key is available
    /// - `Err(ProviderError::RateLimited)` / `Upstream` for error statuses
    /// - `Err(ProviderError::Timeout)` / `Network` for transport failures
    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError>;
}

/// Adapters indexed by provider name.
///
/// A provider missing from the set answers every call with
/// [`ProviderError::NotConfigured`].
#[derive(Default)]
pub struct ProviderSet {
    adapters: DashMap<ProviderId, Arc<dyn ProviderAdapter>>,
}

impl ProviderSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same provider.
    pub fn insert(&self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.id().clone(), adapter);
    }

    pub fn get(&self, provider: &ProviderId) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(provider).map(|entry| Arc::clone(entry.value()))
    }

    pub fn contains(&self, provider: &ProviderId) -> bool {
        self.adapters.contains_key(provider)
    }

    /// Registered provider names, sorted.
    pub fn names(&self) -> Vec<ProviderId> {
        let mut names: Vec<ProviderId> =
            self.adapters.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }

    /// Call the adapter registered for `provider`.
    pub async fn call(
        &self,
        provider: &ProviderId,
        request: &ProviderRequest,
    ) -> Result<ProviderResponse, ProviderError> {
        match self.get(provider) {
            Some(adapter) => adapter.call(request).await,
            None => Err(ProviderError::NotConfigured(provider.to_string())),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{ok, ScriptedProvider};
    use super::*;

    #[test]
    fn provider_id_normalizes_case_and_whitespace() {
        assert_eq!(ProviderId::new("OpenAI"), ProviderId::new("openai"));
        assert_eq!(ProviderId::new("  Anthropic "), ProviderId::new("anthropic"));
        assert_eq!(ProviderId::new("OpenAI").as_str(), "openai");
    }

    #[test]
    fn provider_id_serde_normalizes() {
        let id: ProviderId = serde_json::from_str("\"MISTRAL\"").unwrap();
        assert_eq!(id.as_str(), "mistral");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"mistral\"");
    }

    #[tokio::test]
    async fn provider_set_missing_adapter_is_not_configured() {
        let set = ProviderSet::new();
        let request = ProviderRequest {
            prompt: "hi".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
        };
        let result = set.call(&ProviderId::new("openai"), &request).await;
        assert!(matches!(result, Err(ProviderError::NotConfigured(ref p)) if p == "openai"));
    }

    #[tokio::test]
    async fn provider_set_dispatches_by_normalized_name() {
        let set = ProviderSet::new();
        let adapter = ScriptedProvider::new("openai", vec![ok("hello")]);
        set.insert(adapter.clone());

        let request = ProviderRequest {
            prompt: "hi".to_string(),
            model: "gpt-4".to_string(),
            api_key: None,
        };
        let response = set.call(&ProviderId::new("OPENAI"), &request).await.unwrap();
        assert_eq!(response.content, "hello");
        assert_eq!(adapter.calls(), 1);
        assert_eq!(set.names(), vec![ProviderId::new("openai")]);
    }
}
