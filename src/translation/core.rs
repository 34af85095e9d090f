/*!
 * Core translation service implementation.
 *
 * `TranslationService` turns a parsed document into a translated one:
 * segments are extracted, served from the cache where possible, grouped into
 * batches, sent to a `TranslationBackend` and merged back by the reassembler.
 */

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use log::{debug, info, warn};

use crate::app_config::{TranslationConfig, TranslationProvider};
use crate::cancel::CancelFlag;
use crate::document::Document;
use crate::errors::{ConfigError, ProviderError, TranslationError};
use crate::language_utils::get_language_name;
use crate::providers::Provider;
use crate::providers::anthropic::{Anthropic, AnthropicRequest};
use crate::providers::openai::{OpenAI, OpenAIRequest};
use crate::translation::batch::{BatchItem, BatchLimits, BatchTranslator, batch_with_limits};
use crate::translation::cache::TranslationCache;
use crate::translation::concurrency::ProviderProfile;
use crate::translation::prompts::{PromptTemplate, build_batch_prompt, parse_batch_response};
use crate::translation::reassembler::reassemble;
use crate::translation::segmenter::{Segment, SegmentId, placeholders_intact, segment};

/// A service able to translate an ordered batch of texts.
///
/// Implementations must return exactly one translation per input, in input
/// order.
#[async_trait]
pub trait TranslationBackend: Send + Sync {
    async fn translate_batch(&self, texts: &[String], target_language: &str) -> Result<Vec<String>, ProviderError>;

    /// Human readable backend name for logs
    fn name(&self) -> String;
}

/// Language model client variants
#[derive(Debug)]
enum LlmClient {
    /// OpenAI, Ollama and LM Studio all speak the chat completions API
    OpenAI(OpenAI),
    Anthropic(Anthropic),
}

/// Translation backend over a language model provider
#[derive(Debug)]
pub struct LlmBackend {
    client: LlmClient,
    provider: TranslationProvider,
    model: String,
    temperature: f32,
    prompt: PromptTemplate,
}

impl LlmBackend {
    /// Build the backend for the configured provider
    pub fn from_config(config: &TranslationConfig) -> Result<Self, ConfigError> {
        let provider = config.provider;
        let api_key = config.get_api_key();
        if provider.requires_api_key() && api_key.is_empty() {
            return Err(ConfigError::MissingApiKey(provider.display_name().to_string()));
        }

        let retry = config.retry_policy();
        let timeout_secs = config.get_timeout_secs();
        let client = match provider {
            TranslationProvider::Anthropic => {
                LlmClient::Anthropic(Anthropic::new_with_config(api_key, config.get_endpoint(), retry, timeout_secs))
            }
            TranslationProvider::OpenAI | TranslationProvider::Ollama | TranslationProvider::LMStudio => {
                // Local servers accept any key
                let api_key = if api_key.is_empty() && !provider.requires_api_key() {
                    provider.to_lowercase_string()
                } else {
                    api_key
                };
                LlmClient::OpenAI(OpenAI::new_with_config(api_key, config.get_endpoint(), retry, timeout_secs))
            }
        };

        let prompt = match &config.common.system_prompt {
            Some(template) if !template.trim().is_empty() => PromptTemplate::new(template),
            _ => PromptTemplate::default(),
        };

        Ok(Self {
            client,
            provider,
            model: config.get_model(),
            temperature: config.common.temperature,
            prompt,
        })
    }

    /// Check that the provider answers with the configured model
    pub async fn test_connection(&self) -> Result<(), ProviderError> {
        match &self.client {
            LlmClient::OpenAI(client) => client.test_connection(&self.model).await,
            LlmClient::Anthropic(client) => client.test_connection(&self.model).await,
        }
    }

    /// Output token budget for a batch of `input_chars` characters
    fn max_tokens_for(input_chars: usize) -> u32 {
        // Translations into CJK languages can need more than one token per source character
        (input_chars * 2 + 256).clamp(1024, 8192) as u32
    }
}

#[async_trait]
impl TranslationBackend for LlmBackend {
    async fn translate_batch(&self, texts: &[String], target_language: &str) -> Result<Vec<String>, ProviderError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let language_name = get_language_name(target_language).unwrap_or_else(|_| target_language.to_string());
        let system_prompt = self.prompt.render(&language_name);
        let user_prompt = build_batch_prompt(texts);
        let max_tokens = Self::max_tokens_for(texts.iter().map(|t| t.chars().count()).sum());
        let start_time = Instant::now();

        let response = match &self.client {
            LlmClient::OpenAI(client) => {
                let request = OpenAIRequest::new(&self.model)
                    .add_message("system", system_prompt)
                    .add_message("user", user_prompt)
                    .temperature(self.temperature)
                    .max_tokens(max_tokens);
                let response = client.complete(request).await?;
                if let Some(usage) = &response.usage {
                    debug!("Token usage: {} prompt, {} completion", usage.prompt_tokens, usage.completion_tokens);
                }
                OpenAI::extract_text(&response)
            }
            LlmClient::Anthropic(client) => {
                let request = AnthropicRequest::new(&self.model, max_tokens)
                    .system(system_prompt)
                    .add_message("user", user_prompt)
                    .temperature(self.temperature);
                let response = client.complete(request).await?;
                debug!(
                    "Token usage: {} prompt, {} completion",
                    response.usage.input_tokens, response.usage.output_tokens
                );
                Anthropic::extract_text(&response)
            }
        };

        debug!("{} answered {} texts in {:?}", self.name(), texts.len(), start_time.elapsed());
        parse_batch_response(&response, texts.len())
    }

    fn name(&self) -> String {
        format!("{} ({})", self.provider.display_name(), self.model)
    }
}

/// Translation options for customizing the translation process
#[derive(Debug, Clone)]
pub struct TranslationOptions {
    /// Character ceiling of one batch
    pub max_chars_per_batch: usize,

    /// Segment ceiling of one batch
    pub max_segments_per_batch: usize,

    /// Maximum number of concurrent requests
    pub max_concurrent_requests: usize,

    /// Whether to retry segments individually when a batch response is unusable
    pub retry_individual_entries: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            max_chars_per_batch: 4000,
            max_segments_per_batch: 40,
            max_concurrent_requests: 3,
            retry_individual_entries: true,
        }
    }
}

/// A segment prepared for sending: surrounding whitespace is kept aside and
/// put back after translation
struct PreparedSegment {
    id: SegmentId,
    leading: String,
    core: String,
    trailing: String,
    placeholders: usize,
}

impl PreparedSegment {
    fn new(segment: &Segment) -> Self {
        let text = segment.text.as_str();
        let trimmed_start = text.trim_start();
        let core = trimmed_start.trim_end();
        Self {
            id: segment.id,
            leading: text[..text.len() - trimmed_start.len()].to_string(),
            core: core.to_string(),
            trailing: trimmed_start[core.len()..].to_string(),
            placeholders: segment.protected.len(),
        }
    }

    fn wrap(&self, translated: &str) -> String {
        format!("{}{}{}", self.leading, translated, self.trailing)
    }

    /// Clean up a raw translation, or `None` when it cannot be used
    fn accept(&self, translated: &str) -> Option<String> {
        let mut cleaned = translated.trim().to_string();
        // A single-line source must stay on one line or the block structure changes
        if !self.core.contains('\n') && cleaned.contains('\n') {
            cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
        }
        if cleaned.is_empty() || !placeholders_intact(&cleaned, self.placeholders) {
            return None;
        }
        Some(cleaned)
    }
}

/// Main translation service for Markdown documents
pub struct TranslationService {
    backend: Arc<dyn TranslationBackend>,

    /// Translation options
    pub options: TranslationOptions,

    /// Translation cache shared by every document this service translates
    pub cache: TranslationCache,
}

impl TranslationService {
    pub fn new(backend: Arc<dyn TranslationBackend>, options: TranslationOptions) -> Self {
        Self {
            backend,
            options,
            cache: TranslationCache::new(true),
        }
    }

    /// Create a service backed by the configured language model provider
    pub fn from_config(config: &TranslationConfig) -> Result<Self, ConfigError> {
        let backend = LlmBackend::from_config(config)?;
        Ok(Self::from_config_with_backend(config, Arc::new(backend)))
    }

    /// Batch limits and concurrency from `config`, translations from `backend`
    pub fn from_config_with_backend(config: &TranslationConfig, backend: Arc<dyn TranslationBackend>) -> Self {
        let profile = ProviderProfile::for_provider(config.provider);
        let options = TranslationOptions {
            max_chars_per_batch: config.get_max_chars_per_request(),
            max_segments_per_batch: profile.recommended_batch_size,
            max_concurrent_requests: profile
                .effective_concurrent_requests(config.get_active_provider_config().map(|p| p.concurrent_requests)),
            retry_individual_entries: true,
        };
        Self::new(backend, options)
    }

    /// Replace the cache, e.g. to share one between services
    pub fn with_cache(mut self, cache: TranslationCache) -> Self {
        self.cache = cache;
        self
    }

    pub fn backend_name(&self) -> String {
        self.backend.name()
    }

    /// Translate a document into `target_language`
    pub async fn translate(
        &self,
        doc: &Document,
        target_language: &str,
        cancel: &CancelFlag,
    ) -> Result<Document, TranslationError> {
        self.translate_with_progress(doc, target_language, cancel, |_, _| {}).await
    }

    /// Translate a document, reporting `(completed, total)` batches
    pub async fn translate_with_progress(
        &self,
        doc: &Document,
        target_language: &str,
        cancel: &CancelFlag,
        progress_callback: impl Fn(usize, usize) + Clone + Send + 'static,
    ) -> Result<Document, TranslationError> {
        let start_time = Instant::now();
        let segments = segment(doc);
        if segments.is_empty() {
            info!("Document has no translatable text");
            return Ok(doc.clone());
        }

        let prepared: Vec<PreparedSegment> = segments.iter().map(PreparedSegment::new).collect();
        let mut translations: HashMap<SegmentId, String> = HashMap::with_capacity(prepared.len());

        // Identical texts are sent once; the first segment carrying a text represents it
        let mut sharing: HashMap<&str, Vec<usize>> = HashMap::new();
        let mut unique: Vec<Segment> = Vec::new();
        for (index, item) in prepared.iter().enumerate() {
            if let Some(cached) = self.cache.get(&item.core, target_language) {
                translations.insert(item.id, item.wrap(&cached));
                continue;
            }
            let group = sharing.entry(item.core.as_str()).or_default();
            if group.is_empty() {
                unique.push(Segment {
                    text: item.core.clone(),
                    ..segments[index].clone()
                });
            }
            group.push(index);
        }

        let limits = BatchLimits {
            max_chars: self.options.max_chars_per_batch,
            max_segments: self.options.max_segments_per_batch,
        };
        let batches = batch_with_limits(&unique, limits);
        let texts_by_id: HashMap<SegmentId, &str> = unique.iter().map(|s| (s.id, s.text.as_str())).collect();

        info!(
            "Translating {} segments ({} unique, {} cached) in {} batches with {}",
            prepared.len(),
            unique.len(),
            translations.len(),
            batches.len(),
            self.backend.name()
        );
        for oversized in batches.iter().filter(|b| b.oversized) {
            debug!("Segment {:?} exceeds the batch ceiling and is sent alone", oversized.segment_ids);
        }

        let work: Vec<Vec<BatchItem>> = batches
            .iter()
            .map(|b| {
                b.segment_ids
                    .iter()
                    .map(|id| BatchItem {
                        id: *id,
                        text: texts_by_id.get(id).map(|t| t.to_string()).unwrap_or_default(),
                    })
                    .collect()
            })
            .collect();

        let mut translator = BatchTranslator::new(self.backend.clone(), self.options.max_concurrent_requests);
        if !self.options.retry_individual_entries {
            translator = translator.without_individual_retry();
        }
        let results = translator
            .translate_batches(work, target_language, cancel, progress_callback)
            .await?;

        let representative: HashMap<SegmentId, &str> = unique.iter().map(|s| (s.id, s.text.as_str())).collect();
        let mut rejected = 0;
        for (id, translated) in results {
            let Some(group) = representative.get(&id).and_then(|core| sharing.get(core)) else {
                continue;
            };
            let accepted = prepared[group[0]].accept(&translated);
            match &accepted {
                Some(text) => self.cache.store(&prepared[group[0]].core, target_language, text),
                None => {
                    rejected += 1;
                    warn!(
                        "Translation of segment {} lost protected content, keeping source text",
                        prepared[group[0]].id
                    );
                }
            }
            for index in group {
                let item = &prepared[*index];
                let text = accepted.as_deref().unwrap_or(&item.core);
                translations.insert(item.id, item.wrap(text));
            }
        }

        let translated = reassemble(doc, &translations)?;
        let (hits, misses, _) = self.cache.stats();
        info!(
            "Translated {} segments in {:?} ({} kept in source language; cache {} hits, {} misses)",
            prepared.len(),
            start_time.elapsed(),
            rejected,
            hits,
            misses
        );
        Ok(translated)
    }
}
