//! Routing configuration

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::config::error::ConfigError;
use crate::provider::ProviderId;

/// Routing configuration: fallback chains and per-provider default models.
///
/// Provider names are normalized (trimmed, lowercased) when the router is
/// built, so `"OpenAI"` and `"openai"` keys are the same entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoutingConfig {
    /// Fallback chains (provider → [fallback1, fallback2, ...])
    pub fallbacks: HashMap<String, Vec<String>>,
    /// Model used when a provider is reached through fallback or no model
    /// was requested.
    pub default_models: HashMap<String, String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        let fallbacks = [
            ("openai", vec!["anthropic", "mistral"]),
            ("anthropic", vec!["openai", "mistral"]),
            ("mistral", vec!["openai", "anthropic"]),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.into_iter().map(String::from).collect()))
        .collect();

        let default_models = [
            ("openai", "gpt-4o-mini"),
            ("anthropic", "claude-3-5-sonnet-20241022"),
            ("mistral", "mistral-large-latest"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            fallbacks,
            default_models,
        }
    }
}

/// Validate fallback chains for self-loops.
///
/// Chains are flat lists, so rejecting a provider that names itself is
/// enough to guarantee the router visits each candidate at most once.
pub fn validate_fallbacks(fallbacks: &HashMap<String, Vec<String>>) -> Result<(), ConfigError> {
    for (provider, chain) in fallbacks {
        let id = ProviderId::new(provider);
        if id.as_str().is_empty() {
            return Err(ConfigError::Validation {
                field: "routing.fallbacks".to_string(),
                message: "provider name cannot be empty".to_string(),
            });
        }
        if chain.iter().any(|fallback| ProviderId::new(fallback) == id) {
            return Err(ConfigError::SelfFallback {
                provider: id.to_string(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_routing_config_defaults() {
        let config = RoutingConfig::default();
        assert_eq!(config.fallbacks["openai"], vec!["anthropic", "mistral"]);
        assert_eq!(config.default_models["anthropic"], "claude-3-5-sonnet-20241022");
        assert!(validate_fallbacks(&config.fallbacks).is_ok());
    }

    #[test]
    fn validates_direct_self_loop() {
        let mut fallbacks = HashMap::new();
        fallbacks.insert("openai".to_string(), vec!["openai".to_string()]);

        let result = validate_fallbacks(&fallbacks);
        match result {
            Err(ConfigError::SelfFallback { provider }) => assert_eq!(provider, "openai"),
            other => panic!("Expected SelfFallback error, got {:?}", other),
        }
    }

    #[test]
    fn validates_self_loop_across_spellings() {
        let mut fallbacks = HashMap::new();
        fallbacks.insert(
            "OpenAI".to_string(),
            vec!["anthropic".to_string(), " openai ".to_string()],
        );

        assert!(matches!(
            validate_fallbacks(&fallbacks),
            Err(ConfigError::SelfFallback { .. })
        ));
    }

    #[test]
    fn validates_mutual_fallbacks() {
        // a → b and b → a is fine: each chain is flat
        let mut fallbacks = HashMap::new();
        fallbacks.insert("a".to_string(), vec!["b".to_string()]);
        fallbacks.insert("b".to_string(), vec!["a".to_string()]);

        assert!(validate_fallbacks(&fallbacks).is_ok());
    }

    #[test]
    fn validates_empty_fallbacks() {
        assert!(validate_fallbacks(&HashMap::new()).is_ok());
    }

    #[test]
    fn rejects_empty_provider_name() {
        let mut fallbacks = HashMap::new();
        fallbacks.insert("  ".to_string(), vec!["openai".to_string()]);

        assert!(matches!(
            validate_fallbacks(&fallbacks),
            Err(ConfigError::Validation { .. })
        ));
    }
}
