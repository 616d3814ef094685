//! Anthropic Claude provider adapter.
//!
//! Sends prompts through the Anthropic Messages API.

use super::{ProviderAdapter, ProviderError, ProviderId, ProviderRequest, ProviderResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Anthropic adapter.
///
/// Chat completion via POST /v1/messages with x-api-key header.
pub struct AnthropicProvider {
    /// Canonical provider name
    id: ProviderId,
    /// Base URL (e.g., "https://api.anthropic.com")
    base_url: String,
    /// Configured API key, if any
    api_key: Option<String>,
    /// Request timeout
    timeout: Duration,
    /// Shared HTTP client for connection pooling
    client: Arc<Client>,
}

impl AnthropicProvider {
    pub fn new(
        id: ProviderId,
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        client: Arc<Client>,
    ) -> Self {
        Self {
            id,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            timeout,
            client,
        }
    }
}

/// Anthropic request format
#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<MessageParam<'a>>,
}

#[derive(Debug, Serialize)]
struct MessageParam<'a> {
    role: &'a str,
    content: &'a str,
}

/// Anthropic response format
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    model: Option<String>,
    content: Vec<ContentBlock>,
    usage: Option<AnthropicUsage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    block_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

/// Anthropic error envelope: {"type":"error","error":{"type":"overloaded_error","message":"..."}}
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(rename = "type")]
    error_type: String,
    message: String,
}

/// Flatten the Anthropic error envelope so the error type ("overloaded_error")
/// takes part in retry classification.
fn describe_error(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", envelope.error.error_type, envelope.error.message),
        Err(_) => body.to_string(),
    }
}

#[async_trait]
impl ProviderAdapter for AnthropicProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let api_key = request
            .api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .ok_or_else(|| ProviderError::NotConfigured(self.id.to_string()))?;

        let url = format!("{}/v1/messages", self.base_url);
        let body = MessagesRequest {
            model: &request.model,
            max_tokens: DEFAULT_MAX_TOKENS,
            messages: vec![MessageParam {
                role: "user",
                content: &request.prompt,
            }],
        };
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = self
            .client
            .post(&url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("content-type", "application/json")
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                status.as_u16(),
                describe_error(&error_body),
            ));
        }

        let message: MessagesResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse messages response: {}", e))
        })?;

        let content = message
            .content
            .into_iter()
            .filter(|block| block.block_type == "text")
            .filter_map(|block| block.text)
            .collect::<Vec<_>>()
            .join("\n");

        if content.is_empty() {
            return Err(ProviderError::InvalidResponse(
                "message has no text content".to_string(),
            ));
        }

        Ok(ProviderResponse {
            content,
            model: message.model.unwrap_or_else(|| request.model.clone()),
            usage: message.usage.map(|u| TokenUsage {
                input_tokens: u.input_tokens,
                output_tokens: u.output_tokens,
            }),
        })
    }
}
