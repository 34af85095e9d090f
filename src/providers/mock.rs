/*!
 * Mock provider for testing.
 *
 * `MockProvider` speaks the same `<<SEG_n>>` batch format as the real
 * language model clients, so tests exercise prompt building and response
 * parsing without a network:
 * - `MockProvider::working()` - prefixes every text with `[lang]`
 * - `MockProvider::identity()` - returns every text unchanged
 * - `MockProvider::failing()` - always fails with an error
 * - `MockProvider::partial_markers()` - drops markers from multi-text batches
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::ProviderError;
use crate::providers::Provider;
use crate::translation::core::TranslationBackend;
use crate::translation::prompts::{build_batch_prompt, parse_batch_response};
use crate::translation::segmenter::PLACEHOLDER_REGEX;

/// Mock request for testing
#[derive(Debug, Clone)]
pub struct MockRequest {
    /// Texts of one batch
    pub texts: Vec<String>,
    /// Target language
    pub target_language: String,
}

/// Mock response for testing
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Raw response in batch marker format
    pub text: String,
}

/// Behavior mode for the mock provider
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MockBehavior {
    /// Always succeeds with a proper translation
    Working,
    /// Returns the source texts unchanged
    Identity,
    /// Batches of more than one text come back with a marker missing
    PartialMarkers,
    /// Answers with one more segment than requested
    ExtraSegment,
    /// Translates but removes every placeholder token
    DropPlaceholders,
    /// Fails intermittently (every Nth request)
    Intermittent { fail_every: usize },
    /// Always fails with an error
    Failing,
    /// Returns responses without the END marker
    Truncated,
    /// Returns empty response
    Empty,
    /// Simulates slow response
    Slow { delay_ms: u64 },
}

/// Mock provider for testing translation behavior
#[derive(Debug)]
pub struct MockProvider {
    /// Behavior mode
    behavior: MockBehavior,
    /// Request counter, shared between clones
    request_count: Arc<AtomicUsize>,
    /// Requests currently being answered
    in_flight: Arc<AtomicUsize>,
    /// Highest number of simultaneous requests seen
    max_in_flight: Arc<AtomicUsize>,
    /// Every text received, in arrival order
    received: Arc<Mutex<Vec<String>>>,
    /// Custom per-text translation (text, target language)
    custom_response: Option<fn(&str, &str) -> String>,
}

impl MockProvider {
    /// Create a new mock provider with the specified behavior
    pub fn new(behavior: MockBehavior) -> Self {
        Self {
            behavior,
            request_count: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            received: Arc::new(Mutex::new(Vec::new())),
            custom_response: None,
        }
    }

    pub fn working() -> Self {
        Self::new(MockBehavior::Working)
    }

    pub fn identity() -> Self {
        Self::new(MockBehavior::Identity)
    }

    pub fn partial_markers() -> Self {
        Self::new(MockBehavior::PartialMarkers)
    }

    /// Create an intermittently failing mock provider
    pub fn intermittent(fail_every: usize) -> Self {
        Self::new(MockBehavior::Intermittent {
            fail_every: fail_every.max(1),
        })
    }

    pub fn failing() -> Self {
        Self::new(MockBehavior::Failing)
    }

    pub fn slow(delay_ms: u64) -> Self {
        Self::new(MockBehavior::Slow { delay_ms })
    }

    /// Set a custom per-text translation
    pub fn with_custom_response(mut self, generator: fn(&str, &str) -> String) -> Self {
        self.custom_response = Some(generator);
        self
    }

    /// Number of requests received so far
    pub fn request_count(&self) -> usize {
        self.request_count.load(Ordering::SeqCst)
    }

    /// Highest number of requests answered at the same time
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Texts received across all requests, in arrival order
    pub fn received_texts(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    fn translate_text(&self, text: &str, target_language: &str) -> String {
        match self.custom_response {
            Some(generator) => generator(text, target_language),
            None => format!("[{}] {}", target_language, text),
        }
    }

    fn respond(&self, request: &MockRequest, count: usize) -> Result<String, ProviderError> {
        let translate = |text: &String| self.translate_text(text, &request.target_language);

        match self.behavior {
            MockBehavior::Working | MockBehavior::Slow { .. } => {
                Ok(build_batch_prompt(&request.texts.iter().map(translate).collect::<Vec<_>>()))
            }

            MockBehavior::Identity => Ok(build_batch_prompt(&request.texts)),

            MockBehavior::PartialMarkers => {
                let translated: Vec<String> = request.texts.iter().map(translate).collect();
                let response = build_batch_prompt(&translated);
                if translated.len() > 1 {
                    Ok(response.replacen("<<SEG_1>>\n", "", 1))
                } else {
                    Ok(response)
                }
            }

            MockBehavior::ExtraSegment => {
                let mut translated: Vec<String> = request.texts.iter().map(translate).collect();
                translated.push("unexpected".to_string());
                Ok(build_batch_prompt(&translated))
            }

            MockBehavior::DropPlaceholders => {
                let translated: Vec<String> = request
                    .texts
                    .iter()
                    .map(|text| translate(&PLACEHOLDER_REGEX.replace_all(text, "").into_owned()))
                    .collect();
                Ok(build_batch_prompt(&translated))
            }

            MockBehavior::Intermittent { fail_every } => {
                if count % fail_every == fail_every - 1 {
                    Err(ProviderError::ApiError {
                        message: format!("Simulated intermittent failure (request #{})", count + 1),
                        status_code: 503,
                    })
                } else {
                    Ok(build_batch_prompt(&request.texts.iter().map(translate).collect::<Vec<_>>()))
                }
            }

            MockBehavior::Failing => Err(ProviderError::ApiError {
                message: "Simulated provider failure".to_string(),
                status_code: 500,
            }),

            MockBehavior::Truncated => {
                let response = build_batch_prompt(&request.texts.iter().map(translate).collect::<Vec<_>>());
                Ok(response.trim_end_matches("<<END>>").to_string())
            }

            MockBehavior::Empty => Ok(String::new()),
        }
    }
}

impl Clone for MockProvider {
    fn clone(&self) -> Self {
        Self {
            behavior: self.behavior,
            request_count: Arc::clone(&self.request_count),
            in_flight: Arc::clone(&self.in_flight),
            max_in_flight: Arc::clone(&self.max_in_flight),
            received: Arc::clone(&self.received),
            custom_response: self.custom_response,
        }
    }
}

#[async_trait]
impl Provider for MockProvider {
    type Request = MockRequest;
    type Response = MockResponse;

    async fn complete(&self, request: Self::Request) -> Result<Self::Response, ProviderError> {
        let count = self.request_count.fetch_add(1, Ordering::SeqCst);
        self.received.lock().extend(request.texts.iter().cloned());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if let MockBehavior::Slow { delay_ms } = self.behavior {
            tokio::time::sleep(tokio::time::Duration::from_millis(delay_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = self.respond(&request, count);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result.map(|text| MockResponse { text })
    }

    async fn test_connection(&self, _model: &str) -> Result<(), ProviderError> {
        match self.behavior {
            MockBehavior::Failing => Err(ProviderError::RequestFailed("Simulated connection failure".to_string())),
            _ => Ok(()),
        }
    }

    fn extract_text(response: &Self::Response) -> String {
        response.text.clone()
    }
}

#[async_trait]
impl TranslationBackend for MockProvider {
    async fn translate_batch(&self, texts: &[String], target_language: &str) -> Result<Vec<String>, ProviderError> {
        let request = MockRequest {
            texts: texts.to_vec(),
            target_language: target_language.to_string(),
        };
        let response = self.complete(request).await?;
        parse_batch_response(&Self::extract_text(&response), texts.len())
    }

    fn name(&self) -> String {
        format!("mock ({:?})", self.behavior)
    }
}
