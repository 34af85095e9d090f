/*!
 * Batch planning and concurrent batch translation.
 *
 * Segments are grouped greedily, in document order, into batches that stay
 * under a character ceiling. Batches are then sent to the translation
 * backend concurrently; a batch whose response cannot be matched back to its
 * segments is retried one segment at a time.
 */

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use futures::stream::{self, StreamExt};
use log::{debug, error, warn};
use tokio::sync::Semaphore;

use crate::cancel::CancelFlag;
use crate::errors::{ProviderError, TranslationError};
use crate::translation::core::TranslationBackend;
use crate::translation::segmenter::{Segment, SegmentId};

/// Upper bounds for a single batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchLimits {
    /// Maximum summed segment size, in characters
    pub max_chars: usize,
    /// Maximum number of segments
    pub max_segments: usize,
}

impl BatchLimits {
    pub fn chars(max_chars: usize) -> Self {
        Self {
            max_chars,
            max_segments: usize::MAX,
        }
    }
}

/// Ordered group of segments sent in one request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    pub segment_ids: Vec<SegmentId>,
    /// Summed segment size, in characters
    pub size: usize,
    /// A single segment larger than the ceiling, sent alone
    pub oversized: bool,
}

impl Batch {
    fn new() -> Self {
        Self {
            segment_ids: Vec::new(),
            size: 0,
            oversized: false,
        }
    }

    pub fn len(&self) -> usize {
        self.segment_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segment_ids.is_empty()
    }
}

/// Group segments into batches under a character ceiling
pub fn batch(segments: &[Segment], limit: usize) -> Vec<Batch> {
    batch_with_limits(segments, BatchLimits::chars(limit))
}

/// Group segments into batches, closing a batch when either limit would be exceeded.
///
/// Order is preserved and every segment lands in exactly one batch. A segment
/// larger than `max_chars` forms a batch of its own, flagged `oversized`.
pub fn batch_with_limits(segments: &[Segment], limits: BatchLimits) -> Vec<Batch> {
    let max_segments = limits.max_segments.max(1);
    let mut batches = Vec::new();
    let mut current = Batch::new();

    for segment in segments {
        let size = segment.size();
        let would_overflow = current.size + size > limits.max_chars || current.len() >= max_segments;
        if !current.is_empty() && would_overflow {
            batches.push(std::mem::replace(&mut current, Batch::new()));
        }
        current.segment_ids.push(segment.id);
        current.size += size;
        if size > limits.max_chars {
            current.oversized = true;
        }
    }

    if !current.is_empty() {
        batches.push(current);
    }

    batches
}

/// One text sent for translation, tagged with the segment it stands for
#[derive(Debug, Clone)]
pub struct BatchItem {
    pub id: SegmentId,
    pub text: String,
}

/// Sends batches to a backend with bounded concurrency
pub struct BatchTranslator {
    backend: Arc<dyn TranslationBackend>,
    max_concurrent_requests: usize,
    retry_individual_entries: bool,
}

impl BatchTranslator {
    pub fn new(backend: Arc<dyn TranslationBackend>, max_concurrent_requests: usize) -> Self {
        Self {
            backend,
            max_concurrent_requests: max_concurrent_requests.max(1),
            retry_individual_entries: true,
        }
    }

    /// Disable the per-segment fallback when a batch response is unusable
    pub fn without_individual_retry(mut self) -> Self {
        self.retry_individual_entries = false;
        self
    }

    /// Translate every batch, returning translations in batch order.
    ///
    /// Batches not yet started when `cancel` is raised are skipped and the
    /// whole call fails with `TranslationError::Cancelled`.
    pub async fn translate_batches(
        &self,
        batches: Vec<Vec<BatchItem>>,
        target_language: &str,
        cancel: &CancelFlag,
        progress_callback: impl Fn(usize, usize) + Clone + Send + 'static,
    ) -> Result<Vec<(SegmentId, String)>, TranslationError> {
        let semaphore = Arc::new(Semaphore::new(self.max_concurrent_requests));
        let total_batches = batches.len();
        let processed_batches = Arc::new(AtomicUsize::new(0));

        let mut results = stream::iter(batches.into_iter().enumerate())
            .map(|(batch_index, items)| {
                let semaphore = semaphore.clone();
                let processed_batches = processed_batches.clone();
                let progress_callback = progress_callback.clone();

                async move {
                    let _permit = match semaphore.acquire().await {
                        Ok(permit) => permit,
                        Err(_) => return (batch_index, Err(TranslationError::Cancelled)),
                    };

                    if cancel.is_cancelled() {
                        return (batch_index, Err(TranslationError::Cancelled));
                    }

                    debug!("Processing batch {} of {} ({} segments)", batch_index + 1, total_batches, items.len());
                    let start_time = Instant::now();
                    let result = self.translate_batch_with_recovery(&items, target_language).await;

                    let current = processed_batches.fetch_add(1, Ordering::SeqCst) + 1;
                    progress_callback(current, total_batches);

                    match &result {
                        Ok(_) => debug!("Batch {} completed in {:?}", batch_index + 1, start_time.elapsed()),
                        Err(e) => error!("Batch {} failed: {}", batch_index + 1, e),
                    }

                    (batch_index, result.map_err(TranslationError::from))
                }
            })
            .buffer_unordered(self.max_concurrent_requests)
            .collect::<Vec<_>>()
            .await;

        results.sort_by_key(|(index, _)| *index);

        let mut translated = Vec::new();
        let mut first_error = None;
        for (_, result) in results {
            match result {
                Ok(pairs) => translated.extend(pairs),
                Err(TranslationError::Cancelled) => {
                    first_error.get_or_insert(TranslationError::Cancelled);
                }
                Err(e) => {
                    // Provider failures win over cancellation in the report
                    if matches!(first_error, None | Some(TranslationError::Cancelled)) {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(translated),
        }
    }

    /// Translate one batch, falling back to one request per segment when the
    /// batch response does not line up with its inputs
    pub async fn translate_batch_with_recovery(
        &self,
        items: &[BatchItem],
        target_language: &str,
    ) -> Result<Vec<(SegmentId, String)>, ProviderError> {
        if items.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = items.iter().map(|item| item.text.clone()).collect();
        let batch_result = self
            .backend
            .translate_batch(&texts, target_language)
            .await
            .and_then(|translated| check_count(texts.len(), translated));

        let recoverable = matches!(
            batch_result,
            Err(ProviderError::CountMismatch { .. }) | Err(ProviderError::ParseError(_))
        );
        if batch_result.is_ok() || !recoverable || !self.retry_individual_entries || items.len() == 1 {
            return batch_result.map(|translated| pair_up(items, translated));
        }

        if let Err(e) = &batch_result {
            warn!("Batch of {} segments could not be matched ({}), retrying individually", items.len(), e);
        }

        let mut pairs = Vec::with_capacity(items.len());
        for item in items {
            let single = vec![item.text.clone()];
            let mut translated = self
                .backend
                .translate_batch(&single, target_language)
                .await
                .and_then(|translated| check_count(1, translated))?;
            pairs.push((item.id, translated.remove(0)));
        }
        Ok(pairs)
    }
}

fn check_count(expected: usize, translated: Vec<String>) -> Result<Vec<String>, ProviderError> {
    if translated.len() == expected {
        Ok(translated)
    } else {
        Err(ProviderError::CountMismatch {
            expected,
            actual: translated.len(),
        })
    }
}

fn pair_up(items: &[BatchItem], translated: Vec<String>) -> Vec<(SegmentId, String)> {
    items.iter().map(|item| item.id).zip(translated).collect()
}
