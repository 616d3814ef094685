//! OpenAI-compatible provider adapter.

use super::{ProviderAdapter, ProviderError, ProviderId, ProviderRequest, ProviderResponse, TokenUsage};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// OpenAI chat completions adapter.
///
/// Handles any OpenAI-compatible API with bearer authentication:
/// - Chat completion via POST /v1/chat/completions
///
/// The same adapter serves OpenAI-compatible vendors (Mistral, Groq, ...)
/// when pointed at their base URL.
pub struct OpenAIProvider {
    /// Canonical provider name
    id: ProviderId,
    /// Base URL (e.g., "https://api.openai.com")
    base_url: String,
    /// Configured API key, if any
    api_key: Option<String>,
    /// Request timeout
    timeout: Duration,
    /// Shared HTTP client for connection pooling
    client: Arc<Client>,
}

impl OpenAIProvider {
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

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[async_trait]
impl ProviderAdapter for OpenAIProvider {
    fn id(&self) -> &ProviderId {
        &self.id
    }

    async fn call(&self, request: &ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        // Vault credential wins over the configured key
        let api_key = request
            .api_key
            .as_deref()
            .or(self.api_key.as_deref())
            .ok_or_else(|| ProviderError::NotConfigured(self.id.to_string()))?;

        let url = format!("{}/v1/chat/completions", self.base_url);
        let body = ChatRequest {
            model: &request.model,
            messages: vec![ChatMessage {
                role: "user",
                content: &request.prompt,
            }],
        };
        let timeout_ms = self.timeout.as_millis() as u64;

        let response = self
            .client
            .post(&url)
            .header("authorization", format!("Bearer {}", api_key))
            .json(&body)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(e, timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::from_status(status.as_u16(), error_body));
        }

        let completion: ChatResponse = response.json().await.map_err(|e| {
            ProviderError::InvalidResponse(format!("Failed to parse completion response: {}", e))
        })?;

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                ProviderError::InvalidResponse("completion has no message content".to_string())
            })?;

        Ok(ProviderResponse {
            content,
            model: completion.model.unwrap_or_else(|| request.model.clone()),
            usage: completion.usage.map(|u| TokenUsage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            }),
        })
    }
}
