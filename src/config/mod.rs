//! Configuration module for Relay
//!
//! Provides layered configuration loading from files, environment variables, and defaults.
//!
//! # Configuration Precedence
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`RELAY_*`)
//! 3. Configuration file (TOML)
//! 4. Default values (lowest priority)
//!
//! # Example
//!
//! ```rust
//! use relay::config::RelayConfig;
//!
//! let config = RelayConfig::default();
//! assert_eq!(config.circuit_breaker.failure_threshold, 5);
//!
//! let toml = r#"
//! [queue]
//! concurrency = 4
//! "#;
//! let config: RelayConfig = toml::from_str(toml).unwrap();
//! assert_eq!(config.queue.concurrency, 4);
//! ```

pub mod circuit;
pub mod error;
pub mod logging;
pub mod provider;
pub mod queue;
pub mod retry;
pub mod routing;
pub mod tracer;

pub use circuit::CircuitBreakerConfig;
pub use error::ConfigError;
pub use logging::{LogFormat, LoggingConfig};
pub use provider::{ProviderConfig, ProviderKind};
pub use queue::QueueConfig;
pub use retry::RetryConfig;
pub use routing::RoutingConfig;
pub use tracer::TracerConfig;

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Unified configuration for the orchestrator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct RelayConfig {
    /// Per-provider breaker thresholds
    pub circuit_breaker: CircuitBreakerConfig,
    /// Retry and backoff policy
    pub retry: RetryConfig,
    /// Fallback chains and default models
    pub routing: RoutingConfig,
    /// Approval gate
    pub tracer: TracerConfig,
    /// Task queue
    pub queue: QueueConfig,
    /// Provider adapter definitions
    pub providers: Vec<ProviderConfig>,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl RelayConfig {
    /// Load configuration from a TOML file
    ///
    /// If path is None, returns default configuration.
    /// If path doesn't exist, returns NotFound error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(p) => {
                if !p.exists() {
                    return Err(ConfigError::NotFound(p.to_path_buf()));
                }
                let content = std::fs::read_to_string(p)?;
                toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply environment variable overrides
    ///
    /// Supports RELAY_* environment variables for common settings.
    /// Invalid values are silently ignored (defaults are kept).
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(level) = std::env::var("RELAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("RELAY_LOG_FORMAT") {
            if let Ok(f) = format.parse() {
                self.logging.format = f;
            }
        }
        if let Ok(concurrency) = std::env::var("RELAY_CONCURRENCY") {
            if let Ok(c) = concurrency.parse() {
                self.queue.concurrency = c;
            }
        }
        if let Ok(retries) = std::env::var("RELAY_MAX_RETRIES") {
            if let Ok(r) = retries.parse() {
                self.retry.max_retries = r;
            }
        }
        if let Ok(threshold) = std::env::var("RELAY_APPROVAL_THRESHOLD") {
            if let Ok(t) = threshold.parse() {
                self.tracer.approval_threshold = t;
            }
        }

        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.circuit_breaker.failure_threshold == 0 {
            return Err(ConfigError::Validation {
                field: "circuit_breaker.failure_threshold".to_string(),
                message: "threshold must be at least 1".to_string(),
            });
        }

        if self.retry.backoff_multiplier < 1.0 || !self.retry.backoff_multiplier.is_finite() {
            return Err(ConfigError::Validation {
                field: "retry.backoff_multiplier".to_string(),
                message: "multiplier must be a finite number >= 1.0".to_string(),
            });
        }
        if self.retry.base_delay_ms > self.retry.max_delay_ms {
            return Err(ConfigError::Validation {
                field: "retry.base_delay_ms".to_string(),
                message: "base delay cannot exceed max_delay_ms".to_string(),
            });
        }

        let threshold = self.tracer.approval_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::Validation {
                field: "tracer.approval_threshold".to_string(),
                message: format!("{} is outside 0.0..=1.0", threshold),
            });
        }

        if self.queue.concurrency == 0 {
            return Err(ConfigError::Validation {
                field: "queue.concurrency".to_string(),
                message: "concurrency must be at least 1".to_string(),
            });
        }

        for (i, provider) in self.providers.iter().enumerate() {
            if provider.name.trim().is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("providers[{}].name", i),
                    message: "name cannot be empty".to_string(),
                });
            }
            if provider.base_url.is_empty() {
                return Err(ConfigError::Validation {
                    field: format!("providers[{}].base_url", i),
                    message: "URL cannot be empty".to_string(),
                });
            }
        }

        routing::validate_fallbacks(&self.routing.fallbacks)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_relay_config_defaults() {
        let config = RelayConfig::default();
        assert_eq!(config.circuit_breaker.failure_threshold, 5);
        assert_eq!(config.tracer.approval_threshold, 0.7);
        assert_eq!(config.queue.concurrency, 2);
        assert!(config.providers.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_minimal_toml() {
        let toml = r#"
        [retry]
        max_retries = 1
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.retry.max_retries, 1);
        assert_eq!(config.retry.base_delay_ms, 1000); // Default
    }

    #[test]
    fn test_config_parse_example_file() {
        let toml = include_str!("../../relay.example.toml");
        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.providers.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_parse_providers_array() {
        let toml = r#"
        [[providers]]
        name = "openai"
        kind = "openai"
        base_url = "https://api.openai.com"

        [[providers]]
        name = "anthropic"
        kind = "anthropic"
        base_url = "https://api.anthropic.com"
        api_key_env = "ANTHROPIC_API_KEY"
        "#;

        let config: RelayConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.providers.len(), 2);
        assert_eq!(config.providers[1].kind, ProviderKind::Anthropic);
    }

    #[test]
    fn test_config_load_from_file() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[queue]\nconcurrency = 8").unwrap();

        let config = RelayConfig::load(Some(temp.path())).unwrap();
        assert_eq!(config.queue.concurrency, 8);
    }

    #[test]
    fn test_config_load_invalid_toml() {
        let temp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(temp.path(), "[queue\nconcurrency = ").unwrap();

        let result = RelayConfig::load(Some(temp.path()));
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_config_missing_file_error() {
        let result = RelayConfig::load(Some(Path::new("/nonexistent/relay.toml")));
        assert!(matches!(result, Err(ConfigError::NotFound(_))));
    }

    #[test]
    fn test_config_load_none_returns_defaults() {
        let config = RelayConfig::load(None).unwrap();
        assert_eq!(config.circuit_breaker.reset_seconds, 60);
    }

    // Env var tests touch process-global state; each uses a distinct variable.

    #[test]
    fn test_config_env_override_log_level() {
        std::env::set_var("RELAY_LOG_LEVEL", "debug");
        let config = RelayConfig::default().with_env_overrides();
        std::env::remove_var("RELAY_LOG_LEVEL");

        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_config_env_override_concurrency() {
        std::env::set_var("RELAY_CONCURRENCY", "6");
        let config = RelayConfig::default().with_env_overrides();
        std::env::remove_var("RELAY_CONCURRENCY");

        assert_eq!(config.queue.concurrency, 6);
    }

    #[test]
    fn test_config_env_invalid_value_ignored() {
        std::env::set_var("RELAY_APPROVAL_THRESHOLD", "very-high");
        let config = RelayConfig::default().with_env_overrides();
        std::env::remove_var("RELAY_APPROVAL_THRESHOLD");

        assert_eq!(config.tracer.approval_threshold, 0.7);
    }

    #[test]
    fn test_config_validation_zero_failure_threshold() {
        let mut config = RelayConfig::default();
        config.circuit_breaker.failure_threshold = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "circuit_breaker.failure_threshold"
        ));
    }

    #[test]
    fn test_config_validation_threshold_out_of_range() {
        let mut config = RelayConfig::default();
        config.tracer.approval_threshold = 1.5;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "tracer.approval_threshold"
        ));
    }

    #[test]
    fn test_config_validation_shrinking_backoff() {
        let mut config = RelayConfig::default();
        config.retry.backoff_multiplier = 0.5;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "retry.backoff_multiplier"
        ));
    }

    #[test]
    fn test_config_validation_zero_concurrency() {
        let mut config = RelayConfig::default();
        config.queue.concurrency = 0;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field == "queue.concurrency"
        ));
    }

    #[test]
    fn test_config_validation_empty_provider_url() {
        let mut config = RelayConfig::default();
        config.providers.push(ProviderConfig {
            name: "openai".to_string(),
            kind: ProviderKind::OpenAI,
            base_url: "".to_string(),
            api_key_env: None,
            timeout_seconds: 60,
        });

        assert!(matches!(
            config.validate(),
            Err(ConfigError::Validation { ref field, .. }) if field.contains("base_url")
        ));
    }

    #[test]
    fn test_config_validation_self_fallback() {
        let mut config = RelayConfig::default();
        config
            .routing
            .fallbacks
            .insert("anthropic".to_string(), vec!["Anthropic".to_string()]);

        assert!(matches!(
            config.validate(),
            Err(ConfigError::SelfFallback { .. })
        ));
    }
}
