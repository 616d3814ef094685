//! Provider factory for creating adapter trait objects from configuration.

use super::{
    anthropic::AnthropicProvider, openai::OpenAIProvider, ProviderAdapter, ProviderId, ProviderSet,
};
use crate::config::{ProviderConfig, ProviderKind};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

/// Create an adapter from provider configuration.
///
/// The API key is read from `api_key_env`. A missing variable is not an
/// error: the adapter is still registered and answers "not configured"
/// unless a vault credential arrives with the request.
///
/// # Examples
///
/// ```
/// use relay::config::{ProviderConfig, ProviderKind};
/// use relay::provider::factory::create_provider;
/// use reqwest::Client;
/// use std::sync::Arc;
///
/// let config = ProviderConfig {
///     name: "OpenAI".to_string(),
///     kind: ProviderKind::OpenAI,
///     base_url: "https://api.openai.com".to_string(),
///     api_key_env: None,
///     timeout_seconds: 30,
/// };
/// let adapter = create_provider(&config, Arc::new(Client::new()));
/// assert_eq!(adapter.id().as_str(), "openai");
/// ```
pub fn create_provider(config: &ProviderConfig, client: Arc<Client>) -> Arc<dyn ProviderAdapter> {
    let id = ProviderId::new(&config.name);
    let api_key = config.api_key_env.as_deref().and_then(|var| {
        match std::env::var(var) {
            Ok(key) if !key.trim().is_empty() => Some(key),
            _ => {
                tracing::debug!(provider = %id, env = %var, "API key variable not set");
                None
            }
        }
    });
    let timeout = Duration::from_secs(config.timeout_seconds);

    match config.kind {
        ProviderKind::OpenAI => Arc::new(OpenAIProvider::new(
            id,
            config.base_url.clone(),
            api_key,
            timeout,
            client,
        )),
        ProviderKind::Anthropic => Arc::new(AnthropicProvider::new(
            id,
            config.base_url.clone(),
            api_key,
            timeout,
            client,
        )),
    }
}

/// Build the provider set for every configured provider, sharing one HTTP client.
pub fn build_provider_set(configs: &[ProviderConfig]) -> ProviderSet {
    let client = Arc::new(Client::new());
    let set = ProviderSet::new();
    for config in configs {
        let adapter = create_provider(config, Arc::clone(&client));
        tracing::info!(
            provider = %adapter.id(),
            kind = ?config.kind,
            base_url = %config.base_url,
            "Registered provider"
        );
        set.insert(adapter);
    }
    set
}
