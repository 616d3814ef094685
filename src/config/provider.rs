//! Provider configuration

use serde::{Deserialize, Serialize};

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI chat completions (also OpenAI-compatible vendors)
    OpenAI,
    /// Anthropic Messages API
    Anthropic,
}

/// Provider configuration
///
/// # Example
///
/// ```toml
/// [[providers]]
/// name = "openai"
/// kind = "openai"
/// base_url = "https://api.openai.com"
/// api_key_env = "OPENAI_API_KEY"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Environment variable holding the API key. A missing variable leaves
    /// the provider registered but answering "not configured".
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
}

fn default_timeout_seconds() -> u64 {
    60
}
