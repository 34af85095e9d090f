/*!
 * Mock collaborators for testing
 *
 * In-memory stand-ins for the asset download source and the page extractor,
 * so tests never reach the network.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use transflow::bundle::AssetSource;
use transflow::errors::{AssetFetchError, ProviderError};
use transflow::extractor::{ExtractedPage, Extractor};

/// Response scripted for a URL
#[derive(Debug, Clone)]
pub enum MockAsset {
    /// Serve these bytes
    Bytes(Vec<u8>),
    /// Fail every attempt with this error
    Fail(AssetFetchError),
    /// Fail the first `n` attempts, then serve bytes
    Flaky(u32, Vec<u8>),
}

/// Asset source answering from a URL map; unknown URLs get a 404
#[derive(Debug, Default)]
pub struct MockAssetSource {
    responses: Mutex<HashMap<String, MockAsset>>,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay_ms: u64,
}

impl MockAssetSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold every response for `delay_ms` so concurrent calls overlap
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn serve(self, url: &str, bytes: &[u8]) -> Self {
        self.responses.lock().insert(url.to_string(), MockAsset::Bytes(bytes.to_vec()));
        self
    }

    pub fn fail(self, url: &str, error: AssetFetchError) -> Self {
        self.responses.lock().insert(url.to_string(), MockAsset::Fail(error));
        self
    }

    pub fn flaky(self, url: &str, failures: u32, bytes: &[u8]) -> Self {
        self.responses
            .lock()
            .insert(url.to_string(), MockAsset::Flaky(failures, bytes.to_vec()));
        self
    }

    pub fn into_arc(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Number of requests made for `url`
    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().iter().filter(|u| u.as_str() == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().len()
    }

    /// Highest number of simultaneous requests seen
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AssetSource for MockAssetSource {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AssetFetchError> {
        self.calls.lock().push(url.to_string());
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);

        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        } else {
            tokio::task::yield_now().await;
        }

        let result = {
            let mut responses = self.responses.lock();
            match responses.get_mut(url) {
                Some(MockAsset::Bytes(bytes)) => Ok(bytes.clone()),
                Some(MockAsset::Fail(error)) => Err(error.clone()),
                Some(MockAsset::Flaky(remaining, bytes)) => {
                    if *remaining > 0 {
                        *remaining -= 1;
                        Err(AssetFetchError::Status(503))
                    } else {
                        Ok(bytes.clone())
                    }
                }
                None => Err(AssetFetchError::Status(404)),
            }
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

/// Extractor returning a fixed page for any URL
#[derive(Debug)]
pub struct MockExtractor {
    pub markdown: String,
    pub title: String,
    pub fail: bool,
}

impl MockExtractor {
    pub fn new(title: &str, markdown: &str) -> Self {
        Self {
            markdown: markdown.to_string(),
            title: title.to_string(),
            fail: false,
        }
    }

    pub fn failing() -> Self {
        Self {
            markdown: String::new(),
            title: String::new(),
            fail: true,
        }
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedPage, ProviderError> {
        if self.fail {
            return Err(ProviderError::ApiError {
                status_code: 500,
                message: "Simulated extraction failure".to_string(),
            });
        }
        Ok(ExtractedPage {
            markdown: self.markdown.clone(),
            title: self.title.clone(),
            source_url: url.to_string(),
            fetched_at: Utc::now(),
        })
    }
}
