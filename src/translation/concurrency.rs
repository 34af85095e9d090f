/*!
 * Provider-specific concurrency and batching defaults.
 */

use crate::app_config::TranslationProvider;

/// Tuned defaults for a provider
#[derive(Debug, Clone)]
pub struct ProviderProfile {
    /// Maximum concurrent requests
    pub max_concurrent_requests: usize,
    /// Recommended number of segments per batch
    pub recommended_batch_size: usize,
}

impl ProviderProfile {
    pub fn for_provider(provider: TranslationProvider) -> Self {
        match provider {
            // Local servers handle parallel requests well but have small contexts
            TranslationProvider::Ollama => Self {
                max_concurrent_requests: 8,
                recommended_batch_size: 10,
            },
            TranslationProvider::OpenAI => Self {
                max_concurrent_requests: 10,
                recommended_batch_size: 20,
            },
            TranslationProvider::Anthropic => Self {
                max_concurrent_requests: 5,
                recommended_batch_size: 30,
            },
            TranslationProvider::LMStudio => Self {
                max_concurrent_requests: 6,
                recommended_batch_size: 10,
            },
        }
    }

    /// Concurrent requests, respecting a user override
    pub fn effective_concurrent_requests(&self, user_override: Option<usize>) -> usize {
        user_override.filter(|n| *n > 0).unwrap_or(self.max_concurrent_requests)
    }
}
