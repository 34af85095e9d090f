use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::app_config::Config;
use crate::bundle::{AssetSource, BundleManifest, BundleRequest, Bundler, HttpAssetSource};
use crate::cancel::CancelFlag;
use crate::document::{Document, parse, parse_bytes, render};
use crate::errors::{AppError, ConfigError};
use crate::extractor::{Extractor, FirecrawlExtractor, validate_url};
use crate::file_utils::FileManager;
use crate::language_utils;
use crate::providers::RetryPolicy;
use crate::translation::{TranslationBackend, TranslationService};

// @module: Application controller for the download, translate and bundle pipeline

/// Main application controller
pub struct Controller {
    // @field: App configuration
    config: Config,

    // @field: Raised on interrupt; shared with every running stage
    cancel: CancelFlag,

    // @field: Collaborator overrides, built from config when absent
    backend: Option<Arc<dyn TranslationBackend>>,
    asset_source: Option<Arc<dyn AssetSource>>,
    extractor: Option<Arc<dyn Extractor>>,
}

impl Controller {
    /// Create a new controller for test purposes with default configuration
    pub fn new_for_test() -> Self {
        Self::with_config(Config::default())
    }

    // @method: Create a new controller with the given configuration
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            cancel: CancelFlag::new(),
            backend: None,
            asset_source: None,
            extractor: None,
        }
    }

    /// Use `backend` instead of the configured language model
    pub fn with_backend(mut self, backend: Arc<dyn TranslationBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Download assets from `source` instead of over HTTP
    pub fn with_asset_source(mut self, source: Arc<dyn AssetSource>) -> Self {
        self.asset_source = Some(source);
        self
    }

    /// Extract pages with `extractor` instead of the configured service
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Flag that stops new work when raised
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Fetch `url` as Markdown and save it with a frontmatter header.
    ///
    /// `output` may be a file or an existing directory; without it the file
    /// is named after the URL in the current directory.
    pub async fn download(&self, url: &str, output: Option<PathBuf>) -> Result<PathBuf, AppError> {
        let markdown = self.fetch_markdown(url).await?;

        let output_path = match output {
            Some(path) if path.is_dir() => path.join(FileManager::filename_from_url(url)),
            Some(path) => path,
            None => PathBuf::from(FileManager::filename_from_url(url)),
        };

        FileManager::write_atomic(&output_path, &markdown)?;
        info!("Saved to: {}", output_path.display());
        Ok(output_path)
    }

    /// Translate a Markdown file; the default output is `<stem>.<lang>.md`
    /// next to the input
    pub async fn translate_file(
        &self,
        input: &Path,
        output: Option<PathBuf>,
        target_language: Option<&str>,
    ) -> Result<PathBuf, AppError> {
        let language = self.resolve_language(target_language)?;
        let doc = self.read_document(input)?;

        let output_path = output.unwrap_or_else(|| {
            let dir = input.parent().unwrap_or_else(|| Path::new("."));
            FileManager::generate_output_path(input, dir, &language)
        });

        let translated = self.translate_document(&doc, &language).await?;
        FileManager::write_atomic(&output_path, &render(&translated))?;
        info!("Translation written to: {}", output_path.display());
        Ok(output_path)
    }

    /// Bundle a Markdown file with its remote assets under `output_root`
    pub async fn bundle_file(
        &self,
        input: &Path,
        output_root: &Path,
        folder_pattern: Option<&str>,
        target_language: Option<&str>,
    ) -> Result<(PathBuf, BundleManifest), AppError> {
        let doc = self.read_document(input)?;
        let fallback_title = input
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());

        let language = target_language.map(|lang| self.resolve_language(Some(lang))).transpose()?;
        self.bundle_document(&doc, output_root, folder_pattern, fallback_title, language)
            .await
    }

    /// Complete pipeline: download, translate, bundle. Intermediate documents
    /// stay in memory; only the bundle is written.
    pub async fn run(
        &self,
        url: &str,
        output_root: &Path,
        target_language: Option<&str>,
    ) -> Result<(PathBuf, BundleManifest), AppError> {
        let start_time = Instant::now();
        let language = self.resolve_language(target_language)?;

        let markdown = self.fetch_markdown(url).await?;
        let doc = parse(&markdown)?;
        let translated = self.translate_document(&doc, &language).await?;

        let fallback_title = FileManager::filename_from_url(url).trim_end_matches(".md").to_string();
        let result = self
            .bundle_document(&translated, output_root, None, fallback_title, Some(language))
            .await?;

        info!("Pipeline completed in {}", Self::format_duration(start_time.elapsed()));
        Ok(result)
    }

    /// Check the connection to the configured language model
    pub async fn test_connection(&self) -> Result<(), AppError> {
        let backend = crate::translation::LlmBackend::from_config(&self.config.translation)?;
        backend.test_connection().await?;
        Ok(())
    }

    async fn fetch_markdown(&self, url: &str) -> Result<String, AppError> {
        validate_url(url)?;
        if self.cancel.is_cancelled() {
            return Err(AppError::Unknown("Download cancelled".to_string()));
        }

        let extractor: Arc<dyn Extractor> = match &self.extractor {
            Some(extractor) => Arc::clone(extractor),
            None => {
                let retry = RetryPolicy::new(self.config.translation.common.retry_count, 1000, None);
                Arc::new(FirecrawlExtractor::from_config(&self.config.extraction, retry)?)
            }
        };

        let page = extractor.extract(url).await?;
        page.to_markdown()
            .map_err(|e| AppError::Unknown(format!("Failed to render frontmatter: {}", e)))
    }

    async fn translate_document(&self, doc: &Document, language: &str) -> Result<Document, AppError> {
        let service = match &self.backend {
            Some(backend) => TranslationService::from_config_with_backend(&self.config.translation, Arc::clone(backend)),
            None => TranslationService::from_config(&self.config.translation)?,
        };

        info!(
            "Translating to {} with {}",
            language_utils::get_language_name(language).unwrap_or_else(|_| language.to_string()),
            service.backend_name()
        );

        let progress_bar = ProgressBar::new(0);
        progress_bar.set_style(Self::bar_style("batches"));
        progress_bar.set_message("Translating");
        let bar = progress_bar.clone();

        let start_time = Instant::now();
        let result = service
            .translate_with_progress(doc, language, &self.cancel, move |done, total| {
                bar.set_length(total as u64);
                bar.set_position(done as u64);
            })
            .await;

        match &result {
            Ok(_) => progress_bar.finish_with_message("Translated"),
            Err(_) => progress_bar.abandon_with_message("Translation failed"),
        }
        debug!("Translation took {}", Self::format_duration(start_time.elapsed()));

        let (hits, misses, _) = service.cache.stats();
        if hits > 0 {
            debug!("Translation cache: {} hits, {} misses", hits, misses);
        }

        Ok(result?)
    }

    async fn bundle_document(
        &self,
        doc: &Document,
        output_root: &Path,
        folder_pattern: Option<&str>,
        fallback_title: String,
        language: Option<String>,
    ) -> Result<(PathBuf, BundleManifest), AppError> {
        let bundle_config = &self.config.bundle;
        let pattern = folder_pattern.unwrap_or(&bundle_config.folder_pattern);
        crate::bundle::naming::validate_pattern(pattern)?;

        let source: Arc<dyn AssetSource> = match &self.asset_source {
            Some(source) => Arc::clone(source),
            None => Arc::new(HttpAssetSource::new(bundle_config.timeout_secs, &bundle_config.user_agent)?),
        };

        let mut request = BundleRequest::from_config(bundle_config, fallback_title);
        if let Some(language) = language {
            request = request.with_target_language(language);
        }

        let spinner = ProgressBar::new_spinner();
        spinner.set_message("Downloading assets");
        spinner.enable_steady_tick(Duration::from_millis(120));

        let result = Bundler::new(source)
            .bundle(doc, output_root, pattern, &request, &self.cancel)
            .await;
        spinner.finish_and_clear();

        let (path, manifest) = result?;
        if manifest.failed_count > 0 {
            warn!(
                "{} of {} assets could not be downloaded; see {}",
                manifest.failed_count,
                manifest.asset_count,
                path.join(crate::bundle::MANIFEST_FILE).display()
            );
        }
        Ok((path, manifest))
    }

    fn read_document(&self, input: &Path) -> Result<Document, AppError> {
        if !input.is_file() {
            return Err(AppError::File(format!("Input file does not exist: {}", input.display())));
        }
        let bytes = FileManager::read_bytes(input)?;
        Ok(parse_bytes(&bytes)?)
    }

    fn resolve_language(&self, language: Option<&str>) -> Result<String, AppError> {
        let language = language.unwrap_or(&self.config.target_language).trim().to_string();
        language_utils::validate_language_code(&language).map_err(|e| ConfigError::invalid("lang", e.to_string()))?;
        Ok(language)
    }

    fn bar_style(unit: &str) -> ProgressStyle {
        ProgressStyle::default_bar()
            .template(&format!(
                "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {} ({{percent}}%) {{msg}} {{eta}}",
                unit
            ))
            .or_else(|_| ProgressStyle::default_bar().template("{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} ({percent}%) {msg}"))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓▒░")
    }

    fn format_duration(duration: Duration) -> String {
        let total_seconds = duration.as_secs();
        let hours = total_seconds / 3600;
        let minutes = (total_seconds % 3600) / 60;
        let seconds = total_seconds % 60;

        if hours > 0 {
            format!("{}h {}m {}s", hours, minutes, seconds)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}.{:03}s", seconds, duration.subsec_millis())
        }
    }
}
