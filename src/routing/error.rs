//! Error types for routing failures

use crate::provider::{ProviderError, ProviderId};
use thiserror::Error;

/// Why a routed request produced no response.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RouteError {
    /// A provider rejected the request itself. The chain is not continued.
    #[error("Provider '{provider}' failed with a non-retryable error: {source}")]
    NonRetryable {
        provider: ProviderId,
        source: ProviderError,
    },

    /// Every candidate was skipped or failed after retries.
    #[error("All providers in fallback chain failed ({chain:?}): {last_error}")]
    Exhausted {
        chain: Vec<ProviderId>,
        last_error: String,
    },
}

impl RouteError {
    /// Message of the last error observed, without the routing prefix.
    pub fn last_error(&self) -> String {
        match self {
            RouteError::NonRetryable { source, .. } => source.to_string(),
            RouteError::Exhausted { last_error, .. } => last_error.clone(),
        }
    }
}
