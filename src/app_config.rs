use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use log::{LevelFilter, warn};
use serde::{Deserialize, Serialize};

use crate::bundle::naming::validate_pattern;
use crate::errors::ConfigError;
use crate::language_utils::validate_language_code;
use crate::providers::RetryPolicy;

/// Prefix of every environment variable read by `apply_env_overrides`
pub const ENV_PREFIX: &str = "TRANSFLOW_";

/// Application configuration module
/// This module handles the application configuration including loading,
/// validating and saving configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Target language code (ISO 639-1/2, optional region)
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Translation config
    #[serde(default)]
    pub translation: TranslationConfig,

    /// Bundling config
    #[serde(default)]
    pub bundle: BundleConfig,

    /// Content extraction service config
    #[serde(default)]
    pub extraction: ExtractionConfig,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Translation provider type
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TranslationProvider {
    // @provider: OpenAI
    #[default]
    OpenAI,
    // @provider: Anthropic
    Anthropic,
    // @provider: Ollama (OpenAI-compatible endpoint)
    Ollama,
    // @provider: LM Studio (OpenAI-compatible local server)
    LMStudio,
}

impl TranslationProvider {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::Ollama => "Ollama",
            Self::OpenAI => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::LMStudio => "LM Studio",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn to_lowercase_string(&self) -> String {
        match self {
            Self::Ollama => "ollama".to_string(),
            Self::OpenAI => "openai".to_string(),
            Self::Anthropic => "anthropic".to_string(),
            Self::LMStudio => "lmstudio".to_string(),
        }
    }

    /// Hosted services need a key; local servers do not
    pub fn requires_api_key(&self) -> bool {
        matches!(self, Self::OpenAI | Self::Anthropic)
    }
}

impl std::fmt::Display for TranslationProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_lowercase_string())
    }
}

impl std::str::FromStr for TranslationProvider {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "anthropic" => Ok(Self::Anthropic),
            "lmstudio" => Ok(Self::LMStudio),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration wrapper
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type")]
    pub provider_type: String,

    // @field: Model name
    #[serde(default = "String::new")]
    pub model: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: Max concurrent requests
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,

    // @field: Max segment characters per request
    #[serde(default = "default_max_chars_per_request")]
    pub max_chars_per_request: usize,

    // @field: Timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Rate limit (requests per minute)
    #[serde(default)]
    pub rate_limit: Option<u32>,
}

impl ProviderConfig {
    // @param provider_type: Provider enum
    // @returns: Provider config with defaults
    pub fn new(provider_type: TranslationProvider) -> Self {
        Self {
            provider_type: provider_type.to_lowercase_string(),
            model: default_model_for(provider_type),
            api_key: String::new(),
            endpoint: default_endpoint_for(provider_type),
            concurrent_requests: default_concurrent_requests(),
            max_chars_per_request: default_max_chars_per_request(),
            timeout_secs: match provider_type {
                TranslationProvider::Ollama | TranslationProvider::LMStudio => default_local_timeout_secs(),
                _ => default_timeout_secs(),
            },
            rate_limit: default_rate_limit_for(provider_type),
        }
    }
}

/// Translation service configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationConfig {
    /// Translation provider to use
    #[serde(default)]
    pub provider: TranslationProvider,

    /// Available translation providers
    #[serde(default)]
    pub available_providers: Vec<ProviderConfig>,

    /// Common translation settings
    #[serde(default)]
    pub common: TranslationCommonConfig,
}

/// Common translation settings applicable to all providers
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct TranslationCommonConfig {
    /// Custom system prompt; `{target_language}` is replaced by the language name
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Retry count for failed requests
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Temperature parameter for text generation
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl Default for TranslationCommonConfig {
    fn default() -> Self {
        Self {
            system_prompt: None,
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            temperature: default_temperature(),
        }
    }
}

/// Bundle output and asset download settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BundleConfig {
    /// Folder naming pattern, relative to the output root
    #[serde(default = "default_folder_pattern")]
    pub folder_pattern: String,

    /// Maximum simultaneous asset downloads (1-20)
    #[serde(default = "default_concurrent_downloads")]
    pub concurrent_downloads: usize,

    /// Attempts per asset, including the first one
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_bundle_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Upper bound of a single backoff delay
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Also localize links that point straight at image files
    #[serde(default = "default_true")]
    pub include_asset_links: bool,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for BundleConfig {
    fn default() -> Self {
        Self {
            folder_pattern: default_folder_pattern(),
            concurrent_downloads: default_concurrent_downloads(),
            max_attempts: default_max_attempts(),
            retry_backoff_ms: default_bundle_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            timeout_secs: default_timeout_secs(),
            include_asset_links: true,
            user_agent: default_user_agent(),
        }
    }
}

/// Content extraction (Firecrawl) settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ExtractionConfig {
    #[serde(default = "String::new")]
    pub api_key: String,

    #[serde(default = "default_extraction_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            endpoint: default_extraction_endpoint(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> LevelFilter {
        match self {
            Self::Error => LevelFilter::Error,
            Self::Warn => LevelFilter::Warn,
            Self::Info => LevelFilter::Info,
            Self::Debug => LevelFilter::Debug,
            Self::Trace => LevelFilter::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(anyhow!("Invalid log level: {}", s)),
        }
    }
}

fn default_target_language() -> String {
    "zh".to_string()
}

fn default_concurrent_requests() -> usize {
    4
}

fn default_max_chars_per_request() -> usize {
    4000
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_local_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000 // 1 second base backoff time, doubled on each retry
}

fn default_temperature() -> f32 {
    0.3
}

fn default_true() -> bool {
    true
}

fn default_folder_pattern() -> String {
    "{year}/{date}-{slug}".to_string()
}

fn default_concurrent_downloads() -> usize {
    5
}

fn default_max_attempts() -> u32 {
    3
}

fn default_bundle_backoff_ms() -> u64 {
    2000
}

fn default_max_backoff_ms() -> u64 {
    10_000
}

fn default_user_agent() -> String {
    format!("transflow/{}", env!("CARGO_PKG_VERSION"))
}

fn default_extraction_endpoint() -> String {
    "https://api.firecrawl.dev/v1".to_string()
}

fn default_model_for(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::OpenAI => "gpt-4o",
        TranslationProvider::Anthropic => "claude-3-5-haiku-latest",
        TranslationProvider::Ollama => "llama3.2:3b",
        // Placeholder; users should set to the loaded model name in LM Studio
        TranslationProvider::LMStudio => "local-model",
    }
    .to_string()
}

fn default_endpoint_for(provider: TranslationProvider) -> String {
    match provider {
        TranslationProvider::OpenAI => "https://api.openai.com/v1",
        TranslationProvider::Anthropic => "https://api.anthropic.com",
        TranslationProvider::Ollama => "http://localhost:11434/v1",
        TranslationProvider::LMStudio => "http://localhost:1234/v1",
    }
    .to_string()
}

fn default_rate_limit_for(provider: TranslationProvider) -> Option<u32> {
    match provider {
        TranslationProvider::OpenAI => Some(60),
        // Slightly below Anthropic's standard 50 requests per minute
        TranslationProvider::Anthropic => Some(45),
        TranslationProvider::Ollama | TranslationProvider::LMStudio => None,
    }
}

impl Config {
    /// Load the configuration file, creating it with defaults when missing
    pub fn load_or_create(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            let file = File::open(config_path)
                .with_context(|| format!("Failed to open config file: {}", config_path.display()))?;
            let reader = BufReader::new(file);
            return serde_json::from_reader(reader)
                .with_context(|| format!("Failed to parse config file: {}", config_path.display()));
        }

        warn!("Config file not found at '{}', creating default config.", config_path.display());
        let config = Config::default();
        let config_json = serde_json::to_string_pretty(&config).context("Failed to serialize default config to JSON")?;
        std::fs::write(config_path, config_json)
            .with_context(|| format!("Failed to write default config to file: {}", config_path.display()))?;
        Ok(config)
    }

    /// Apply `TRANSFLOW_*` overrides, reading variables through `lookup`
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name)).filter(|v| !v.trim().is_empty());
        let number = |name: &str| -> Result<Option<u64>, ConfigError> {
            var(name)
                .map(|v| {
                    v.trim()
                        .parse::<u64>()
                        .map_err(|_| ConfigError::invalid(&format!("{}{}", ENV_PREFIX, name), format!("'{}' is not a number", v)))
                })
                .transpose()
        };

        if let Some(key) = var("OPENAI_API_KEY") {
            self.translation.provider_config_mut(TranslationProvider::OpenAI).api_key = key;
        }
        if let Some(url) = var("OPENAI_BASE_URL") {
            self.translation.provider_config_mut(TranslationProvider::OpenAI).endpoint = url;
        }
        if let Some(key) = var("ANTHROPIC_API_KEY") {
            self.translation.provider_config_mut(TranslationProvider::Anthropic).api_key = key;
        }
        if let Some(provider) = var("PROVIDER") {
            self.translation.provider = provider
                .parse()
                .map_err(|e: anyhow::Error| ConfigError::invalid("TRANSFLOW_PROVIDER", e.to_string()))?;
        }
        if let Some(model) = var("DEFAULT_MODEL") {
            self.translation.set_model(model);
        }
        if let Some(language) = var("TARGET_LANGUAGE").or_else(|| var("DEFAULT_LANGUAGE")) {
            self.target_language = language;
        }
        if let Some(key) = var("FIRECRAWL_API_KEY") {
            self.extraction.api_key = key;
        }
        if let Some(url) = var("FIRECRAWL_BASE_URL") {
            self.extraction.endpoint = url;
        }
        if let Some(timeout) = number("FIRECRAWL_TIMEOUT")? {
            self.extraction.timeout_secs = timeout;
        }
        if let Some(timeout) = number("HTTP_TIMEOUT")? {
            self.bundle.timeout_secs = timeout;
        }
        if let Some(retries) = number("HTTP_MAX_RETRIES")? {
            self.bundle.max_attempts = retries as u32;
        }
        if let Some(downloads) = number("HTTP_CONCURRENT_DOWNLOADS")? {
            self.bundle.concurrent_downloads = downloads as usize;
        }
        if let Some(level) = var("LOG_LEVEL") {
            self.log_level = level
                .parse()
                .map_err(|e: anyhow::Error| ConfigError::invalid("TRANSFLOW_LOG_LEVEL", e.to_string()))?;
        }
        Ok(())
    }

    /// Validate the configuration for consistency and usable values.
    ///
    /// API keys are checked where they are needed, so a bundle-only run does
    /// not require translation credentials.
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_language_code(&self.target_language)
            .map_err(|e| ConfigError::invalid("target_language", e.to_string()))?;

        let translation = &self.translation;
        if translation.get_max_chars_per_request() == 0 {
            return Err(ConfigError::invalid("max_chars_per_request", "must be greater than 0"));
        }
        if translation.get_timeout_secs() == 0 {
            return Err(ConfigError::invalid("translation timeout_secs", "must be greater than 0"));
        }
        if !(0.0..=2.0).contains(&translation.common.temperature) {
            return Err(ConfigError::invalid("temperature", "must be between 0.0 and 2.0"));
        }

        let bundle = &self.bundle;
        if !(1..=20).contains(&bundle.concurrent_downloads) {
            return Err(ConfigError::invalid("concurrent_downloads", "must be between 1 and 20"));
        }
        if bundle.max_attempts == 0 {
            return Err(ConfigError::invalid("max_attempts", "must be at least 1"));
        }
        if bundle.timeout_secs == 0 {
            return Err(ConfigError::invalid("bundle timeout_secs", "must be greater than 0"));
        }
        if bundle.max_backoff_ms < bundle.retry_backoff_ms {
            return Err(ConfigError::invalid("max_backoff_ms", "must not be smaller than retry_backoff_ms"));
        }
        validate_pattern(&bundle.folder_pattern)?;

        if self.extraction.timeout_secs == 0 {
            return Err(ConfigError::invalid("extraction timeout_secs", "must be greater than 0"));
        }
        url::Url::parse(&self.extraction.endpoint)
            .map_err(|e| ConfigError::invalid("extraction endpoint", e.to_string()))?;

        Ok(())
    }

    /// Credentials that are missing for the configured services
    pub fn missing_credentials(&self) -> Vec<ConfigError> {
        let mut missing = Vec::new();
        let provider = self.translation.provider;
        if provider.requires_api_key() && self.translation.get_api_key().is_empty() {
            missing.push(ConfigError::MissingApiKey(provider.display_name().to_string()));
        }
        if self.extraction.api_key.is_empty() {
            missing.push(ConfigError::MissingApiKey("Firecrawl".to_string()));
        }
        missing
    }

    /// Pretty JSON with every API key masked
    pub fn to_masked_json(&self) -> Result<String> {
        let mut masked = self.clone();
        for provider in &mut masked.translation.available_providers {
            provider.api_key = mask_secret(&provider.api_key);
        }
        masked.extraction.api_key = mask_secret(&masked.extraction.api_key);
        serde_json::to_string_pretty(&masked).context("Failed to serialize config")
    }
}

/// Keep the first and last characters of a secret
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n <= 8 => "*".repeat(n),
        n => format!(
            "{}...{}",
            chars[..4].iter().collect::<String>(),
            chars[n - 4..].iter().collect::<String>()
        ),
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            target_language: default_target_language(),
            translation: TranslationConfig::default(),
            bundle: BundleConfig::default(),
            extraction: ExtractionConfig::default(),
            log_level: LogLevel::default(),
        }
    }
}

impl TranslationConfig {
    /// Get the active provider configuration from the available_providers array
    pub fn get_active_provider_config(&self) -> Option<&ProviderConfig> {
        self.get_provider_config(&self.provider)
    }

    /// Get a specific provider configuration by type
    pub fn get_provider_config(&self, provider_type: &TranslationProvider) -> Option<&ProviderConfig> {
        let provider_str = provider_type.to_lowercase_string();
        self.available_providers.iter().find(|p| p.provider_type == provider_str)
    }

    /// Provider entry for `provider_type`, created with defaults when absent
    pub fn provider_config_mut(&mut self, provider_type: TranslationProvider) -> &mut ProviderConfig {
        let provider_str = provider_type.to_lowercase_string();
        let index = match self.available_providers.iter().position(|p| p.provider_type == provider_str) {
            Some(index) => index,
            None => {
                self.available_providers.push(ProviderConfig::new(provider_type));
                self.available_providers.len() - 1
            }
        };
        &mut self.available_providers[index]
    }

    /// Override the model of the active provider
    pub fn set_model(&mut self, model: impl Into<String>) {
        let provider = self.provider;
        self.provider_config_mut(provider).model = model.into();
    }

    /// Get the model for the active provider
    pub fn get_model(&self) -> String {
        match self.get_active_provider_config() {
            Some(provider_config) if !provider_config.model.is_empty() => provider_config.model.clone(),
            _ => default_model_for(self.provider),
        }
    }

    /// Get the API key for the active provider
    pub fn get_api_key(&self) -> String {
        self.get_active_provider_config()
            .map(|p| p.api_key.clone())
            .unwrap_or_default()
    }

    /// Get the endpoint for the active provider
    pub fn get_endpoint(&self) -> String {
        match self.get_active_provider_config() {
            Some(provider_config) if !provider_config.endpoint.is_empty() => provider_config.endpoint.clone(),
            _ => default_endpoint_for(self.provider),
        }
    }

    /// Get the max chars per request for the active provider
    pub fn get_max_chars_per_request(&self) -> usize {
        self.get_active_provider_config()
            .map(|p| p.max_chars_per_request)
            .unwrap_or_else(default_max_chars_per_request)
    }

    pub fn get_timeout_secs(&self) -> u64 {
        self.get_active_provider_config()
            .map(|p| p.timeout_secs)
            .unwrap_or_else(default_timeout_secs)
    }

    /// Get the rate limit for the active provider
    pub fn get_rate_limit(&self) -> Option<u32> {
        match self.get_active_provider_config() {
            Some(provider_config) => provider_config.rate_limit,
            None => default_rate_limit_for(self.provider),
        }
    }

    /// Retry behaviour for provider clients
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.common.retry_count, self.common.retry_backoff_ms, self.get_rate_limit())
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            provider: TranslationProvider::default(),
            available_providers: vec![
                ProviderConfig::new(TranslationProvider::OpenAI),
                ProviderConfig::new(TranslationProvider::Anthropic),
                ProviderConfig::new(TranslationProvider::Ollama),
                ProviderConfig::new(TranslationProvider::LMStudio),
            ],
            common: TranslationCommonConfig::default(),
        }
    }
}
