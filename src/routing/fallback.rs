//! Static fallback chains and default models

use crate::config::{ConfigError, RoutingConfig};
use crate::config::routing::validate_fallbacks;
use crate::provider::ProviderId;
use std::collections::HashMap;

/// Normalized fallback chains plus the model each provider uses when it is
/// reached without an explicit model.
#[derive(Debug, Clone, Default)]
pub struct FallbackTable {
    chains: HashMap<ProviderId, Vec<ProviderId>>,
    default_models: HashMap<ProviderId, String>,
}

impl FallbackTable {
    /// Build from configuration, rejecting self-loops.
    pub fn from_config(config: &RoutingConfig) -> Result<Self, ConfigError> {
        validate_fallbacks(&config.fallbacks)?;

        let mut table = Self::default();
        for (provider, chain) in &config.fallbacks {
            table
                .chains
                .entry(ProviderId::new(provider))
                .or_default()
                .extend(chain.iter().map(|name| ProviderId::new(name)));
        }
        for (provider, model) in &config.default_models {
            table
                .default_models
                .insert(ProviderId::new(provider), model.clone());
        }
        Ok(table)
    }

    /// Add or replace one chain.
    pub fn with_chain(mut self, provider: &str, chain: &[&str]) -> Result<Self, ConfigError> {
        let id = ProviderId::new(provider);
        let chain: Vec<ProviderId> = chain.iter().map(|name| ProviderId::new(name)).collect();
        if chain.contains(&id) {
            return Err(ConfigError::SelfFallback {
                provider: id.to_string(),
            });
        }
        self.chains.insert(id, chain);
        Ok(self)
    }

    pub fn with_default_model(mut self, provider: &str, model: &str) -> Self {
        self.default_models
            .insert(ProviderId::new(provider), model.to_string());
        self
    }

    /// Configured chain for `provider`, empty if none.
    pub fn chain(&self, provider: &ProviderId) -> &[ProviderId] {
        self.chains.get(provider).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn default_model(&self, provider: &ProviderId) -> Option<&str> {
        self.default_models.get(provider).map(String::as_str)
    }

    /// `[primary] + chain`, in order, each provider at most once.
    pub fn candidates(&self, primary: &ProviderId) -> Vec<ProviderId> {
        let mut candidates = vec![primary.clone()];
        for fallback in self.chain(primary) {
            if !candidates.contains(fallback) {
                candidates.push(fallback.clone());
            }
        }
        candidates
    }
}
