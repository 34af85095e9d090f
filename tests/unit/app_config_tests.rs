/*!
 * Tests for app configuration functionality
 */

use std::collections::HashMap;
use std::fs;

use anyhow::Result;
use transflow::app_config::{Config, LogLevel, TranslationProvider, mask_secret};
use transflow::errors::ConfigError;

use crate::common;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    move |name: &str| map.get(name).cloned()
}

/// Test that a missing config file is created with defaults
#[test]
fn test_load_or_create_withMissingFile_shouldWriteDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("conf.json");

    let config = Config::load_or_create(&path)?;
    assert!(path.exists());
    assert_eq!(config.target_language, "zh");

    let reloaded = Config::load_or_create(&path)?;
    assert_eq!(reloaded.translation.provider, TranslationProvider::OpenAI);
    assert_eq!(reloaded.bundle.folder_pattern, config.bundle.folder_pattern);
    Ok(())
}

/// Test that a partial config file is completed with defaults
#[test]
fn test_load_or_create_withPartialFile_shouldFillDefaults() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{
            "target_language": "ja",
            "translation": { "provider": "anthropic" },
            "bundle": { "folder_pattern": "{date}-{slug}", "concurrent_downloads": 2 },
            "log_level": "debug"
        }"#,
    )?;

    let config = Config::load_or_create(&path)?;
    assert_eq!(config.target_language, "ja");
    assert_eq!(config.translation.provider, TranslationProvider::Anthropic);
    assert_eq!(config.translation.get_model(), "claude-3-5-haiku-latest");
    assert_eq!(config.translation.get_endpoint(), "https://api.anthropic.com");
    assert_eq!(config.bundle.folder_pattern, "{date}-{slug}");
    assert_eq!(config.bundle.concurrent_downloads, 2);
    assert_eq!(config.bundle.max_attempts, 3);
    assert_eq!(config.log_level, LogLevel::Debug);
    assert!(config.validate().is_ok());
    Ok(())
}

/// Test that malformed JSON is reported with the file name
#[test]
fn test_load_or_create_withMalformedFile_shouldFail() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let path = common::create_test_file(temp_dir.path(), "conf.json", "{ not json")?;

    let err = Config::load_or_create(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("Failed to parse config file"));
    Ok(())
}

/// Test that TARGET_LANGUAGE wins over DEFAULT_LANGUAGE
#[test]
fn test_env_overrides_targetLanguage_shouldTakePrecedence() {
    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[
            ("TRANSFLOW_DEFAULT_LANGUAGE", "ja"),
            ("TRANSFLOW_TARGET_LANGUAGE", "ko"),
        ]))
        .unwrap();
    assert_eq!(config.target_language, "ko");
}

/// Test provider, model and endpoint overrides
#[test]
fn test_env_overrides_providerAndModel() {
    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[
            ("TRANSFLOW_PROVIDER", "ollama"),
            ("TRANSFLOW_DEFAULT_MODEL", "qwen2.5:7b"),
            ("TRANSFLOW_FIRECRAWL_BASE_URL", "http://localhost:3002/v1"),
            ("TRANSFLOW_LOG_LEVEL", "warn"),
        ]))
        .unwrap();

    assert_eq!(config.translation.provider, TranslationProvider::Ollama);
    assert_eq!(config.translation.get_model(), "qwen2.5:7b");
    assert_eq!(config.translation.get_endpoint(), "http://localhost:11434/v1");
    assert_eq!(config.extraction.endpoint, "http://localhost:3002/v1");
    assert_eq!(config.log_level, LogLevel::Warn);
}

/// Test that blank variables are ignored
#[test]
fn test_env_overrides_withBlankValues_shouldKeepConfig() {
    let mut config = Config::default();
    config
        .apply_env_overrides(env(&[("TRANSFLOW_TARGET_LANGUAGE", "  "), ("TRANSFLOW_OPENAI_API_KEY", "")]))
        .unwrap();
    assert_eq!(config.target_language, "zh");
    assert!(config.translation.get_api_key().is_empty());
}

/// Test that an unknown provider name is a configuration error
#[test]
fn test_env_overrides_withUnknownProvider_shouldFail() {
    let mut config = Config::default();
    let err = config
        .apply_env_overrides(env(&[("TRANSFLOW_PROVIDER", "babelfish")]))
        .unwrap_err();
    assert!(matches!(err, ConfigError::InvalidValue { ref field, .. } if field == "TRANSFLOW_PROVIDER"));
}

/// Test validation of individual fields
#[test]
fn test_validate_withInvalidFields_shouldFail() {
    let mut config = Config::default();
    config.target_language = "klingon".to_string();
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.translation.common.temperature = 3.5;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.bundle.max_attempts = 0;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.bundle.max_backoff_ms = 10;
    assert!(config.validate().is_err());

    let mut config = Config::default();
    config.bundle.folder_pattern = "../{slug}".to_string();
    assert!(matches!(config.validate(), Err(ConfigError::UnsafePath(_))));

    let mut config = Config::default();
    config.extraction.endpoint = "not a url".to_string();
    assert!(config.validate().is_err());
}

/// Test that local providers need no API key
#[test]
fn test_missing_credentials_withLocalProvider_shouldOnlyReportExtraction() {
    let mut config = Config::default();
    config.translation.provider = TranslationProvider::LMStudio;
    let missing = config.missing_credentials();
    assert_eq!(missing, vec![ConfigError::MissingApiKey("Firecrawl".to_string())]);
}

/// Test secret masking
#[test]
fn test_mask_secret() {
    assert_eq!(mask_secret(""), "");
    assert_eq!(mask_secret("short"), "*****");
    assert_eq!(mask_secret("fc-0123456789"), "fc-0...6789");
}

/// Test provider name parsing and display
#[test]
fn test_translation_provider_parsingAndDisplay() {
    assert_eq!("LMStudio".parse::<TranslationProvider>().unwrap(), TranslationProvider::LMStudio);
    assert!("gpt".parse::<TranslationProvider>().is_err());
    assert_eq!(TranslationProvider::Anthropic.to_string(), "anthropic");
    assert_eq!(TranslationProvider::LMStudio.display_name(), "LM Studio");
    assert!(!TranslationProvider::Ollama.requires_api_key());
}

/// Test that saved configs serialize provider types in lowercase
#[test]
fn test_config_serialization_shouldUseLowercaseNames() -> Result<()> {
    let json = serde_json::to_string(&Config::default())?;
    assert!(json.contains("\"provider\":\"openai\""));
    assert!(json.contains("\"type\":\"lmstudio\""));
    let temp_dir = common::create_temp_dir()?;
    let path = temp_dir.path().join("saved.json");
    fs::write(&path, json)?;
    assert_eq!(Config::load_or_create(&path)?.target_language, "zh");
    Ok(())
}
