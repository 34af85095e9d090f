/*!
 * Clients for the language model services used as translation backends.
 *
 * - `openai`: OpenAI chat completions, also used for the OpenAI-compatible
 *   endpoints served by Ollama and LM Studio
 * - `anthropic`: Anthropic messages API
 * - `mock`: in-memory backend for tests
 */

use std::time::Duration;

use async_trait::async_trait;
use log::warn;
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use crate::errors::ProviderError;

/// Common trait for all LLM providers
///
/// This trait defines the interface that all provider implementations must follow,
/// allowing them to be used interchangeably by the translation backend.
#[async_trait]
pub trait Provider: Send + Sync + Debug {
    /// The request type for this provider
    type Request: Send + Sync;

    /// The response type for this provider
    type Response: Send + Sync;

    /// Complete a request using this provider
    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError>;

    /// Test the connection to the provider
    async fn test_connection(&self, model: &str) -> Result<(), ProviderError>;

    /// Extract text from the provider response
    fn extract_text(response: &Self::Response) -> String;
}

/// Retry behaviour shared by the HTTP clients
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Attempts after the first one
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub backoff_base_ms: u64,
    /// Optional rate limit in requests per minute
    pub rate_limit: Option<u32>,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, backoff_base_ms: u64, rate_limit: Option<u32>) -> Self {
        Self {
            max_retries,
            backoff_base_ms,
            rate_limit,
        }
    }

    /// Delay before retry number `attempt` (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let backoff = self.backoff_base_ms.saturating_mul(1u64 << (attempt.saturating_sub(1)).min(16));
        let rate_delay = self.rate_limit.filter(|rpm| *rpm > 0).map(|rpm| 60_000 / rpm as u64).unwrap_or(0);
        Duration::from_millis(backoff.max(rate_delay))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, 1000, None)
    }
}

/// Map a non-success HTTP status to a provider error
pub(crate) fn status_error(status_code: u16, message: String) -> ProviderError {
    match status_code {
        401 | 403 => ProviderError::AuthenticationError(message),
        429 => ProviderError::RateLimitExceeded(message),
        _ => ProviderError::ApiError { status_code, message },
    }
}

/// Whether a request failing with `error` is worth repeating
pub(crate) fn is_retryable(error: &ProviderError) -> bool {
    match error {
        ProviderError::RequestFailed(_) | ProviderError::RateLimitExceeded(_) => true,
        ProviderError::ApiError { status_code, .. } => *status_code >= 500,
        _ => false,
    }
}

/// Send a JSON request built by `build`, retrying transport failures, rate
/// limits and server errors with exponential backoff
pub(crate) async fn send_with_retry<T, F>(service: &str, policy: &RetryPolicy, build: F) -> Result<T, ProviderError>
where
    T: DeserializeOwned,
    F: Fn() -> reqwest::RequestBuilder,
{
    let mut attempt = 0;

    loop {
        if attempt > 0 {
            tokio::time::sleep(policy.delay_for(attempt)).await;
        }

        let error = match build().send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_success() {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| ProviderError::RequestFailed(format!("Failed to read {} response: {}", service, e)))?;
                    return serde_json::from_str::<T>(&body)
                        .map_err(|e| ProviderError::ParseError(format!("Invalid {} response: {}", service, e)));
                }
                let message = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Failed to get error response text".to_string());
                status_error(status.as_u16(), message)
            }
            Err(e) => ProviderError::RequestFailed(format!("Failed to send request to {}: {}", service, e)),
        };

        if !is_retryable(&error) || attempt >= policy.max_retries {
            return Err(error);
        }

        attempt += 1;
        warn!("{} request failed ({}), retrying ({}/{})", service, error, attempt, policy.max_retries);
    }
}

pub mod anthropic;
pub mod mock;
pub mod openai;
