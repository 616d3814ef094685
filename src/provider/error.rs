//! Error types for provider calls.

use thiserror::Error;

/// Substrings that mark an error message as transient.
///
/// Matched case-insensitively against the rendered error.
pub const RETRYABLE_PATTERNS: &[&str] = &[
    "rate limit",
    "rate_limit",
    "too many requests",
    "timeout",
    "timed out",
    "server error",
    "temporarily unavailable",
    "overloaded",
    "capacity",
];

/// Errors that can occur while invoking a provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    /// No adapter or no credential is available for this provider.
    #[error("Provider '{0}' is not configured")]
    NotConfigured(String),

    /// Network connectivity error (DNS, connection refused, reset).
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded deadline.
    #[error("Request timeout after {0}ms")]
    Timeout(u64),

    /// Provider answered 429.
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Provider returned an error response (4xx, 5xx).
    #[error("Provider error {status}: {message}")]
    Upstream { status: u16, message: String },

    /// Response doesn't match the expected format.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// How the router should react to a provider error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Missing adapter or credential. Skip the provider, no breaker penalty.
    NotConfigured,
    /// Transient failure worth retrying and falling back.
    Retryable,
    /// The request itself is at fault. Stop immediately.
    Fatal,
}

impl ProviderError {
    /// Classify this error for retry and fallback decisions.
    pub fn class(&self) -> ErrorClass {
        match self {
            ProviderError::NotConfigured(_) => ErrorClass::NotConfigured,
            ProviderError::Timeout(_)
            | ProviderError::RateLimited(_)
            | ProviderError::Network(_) => ErrorClass::Retryable,
            ProviderError::Upstream { status, .. } if *status == 429 || *status >= 500 => {
                ErrorClass::Retryable
            }
            // The status is authoritative; only wording can still mark it transient
            ProviderError::Upstream { message, .. } => {
                if matches_retryable_pattern(message) {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Fatal
                }
            }
            other => {
                if is_retryable_message(&other.to_string()) {
                    ErrorClass::Retryable
                } else {
                    ErrorClass::Fatal
                }
            }
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Map a reqwest transport error onto a provider error.
    pub(crate) fn from_transport(err: reqwest::Error, timeout_ms: u64) -> Self {
        if err.is_timeout() {
            ProviderError::Timeout(timeout_ms)
        } else {
            ProviderError::Network(err.to_string())
        }
    }

    /// Map a non-success HTTP status and body onto a provider error.
    pub(crate) fn from_status(status: u16, body: String) -> Self {
        if status == 429 {
            ProviderError::RateLimited(body)
        } else {
            ProviderError::Upstream {
                status,
                message: body,
            }
        }
    }
}

/// Whether a free-form error message describes a transient failure.
///
/// Used for errors that carry no HTTP status, so a bare 5xx code in the text
/// ("502 Bad Gateway", "error 503") also counts.
pub fn is_retryable_message(message: &str) -> bool {
    if matches_retryable_pattern(message) {
        return true;
    }
    message
        .split(|c: char| !c.is_ascii_digit())
        .any(|tok| tok.len() == 3 && tok.starts_with('5'))
}

fn matches_retryable_pattern(message: &str) -> bool {
    let lower = message.to_lowercase();
    RETRYABLE_PATTERNS.iter().any(|p| lower.contains(p))
}
