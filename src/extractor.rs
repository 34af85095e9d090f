/*!
 * Web page extraction.
 *
 * Turns a URL into Markdown through a remote extraction service and prefixes
 * it with a frontmatter block carrying `title`, `source_url` and `fetched_at`.
 */

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use log::info;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::app_config::ExtractionConfig;
use crate::document::render_page_header;
use crate::errors::{ConfigError, ProviderError};
use crate::providers::{RetryPolicy, send_with_retry};

pub const DEFAULT_FIRECRAWL_ENDPOINT: &str = "https://api.firecrawl.dev/v1";

/// Title used when the service reports none
const UNTITLED: &str = "Untitled";

/// A fetched page converted to Markdown
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPage {
    pub markdown: String,
    pub title: String,
    pub source_url: String,
    pub fetched_at: DateTime<Utc>,
}

impl ExtractedPage {
    /// Markdown body preceded by its frontmatter block
    pub fn to_markdown(&self) -> Result<String, serde_yaml::Error> {
        let header = render_page_header(
            &self.title,
            &self.source_url,
            &self.fetched_at.to_rfc3339_opts(SecondsFormat::Secs, true),
        )?;
        Ok(format!("{}\n{}", header, self.markdown))
    }
}

#[async_trait]
pub trait Extractor: Send + Sync {
    async fn extract(&self, url: &str) -> Result<ExtractedPage, ProviderError>;
}

/// Accepts absolute http(s) URLs with a host
pub fn validate_url(url: &str) -> Result<Url, ConfigError> {
    let parsed = Url::parse(url).map_err(|e| ConfigError::invalid("url", format!("{}: {}", url, e)))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(ConfigError::invalid(
            "url",
            format!("unsupported scheme '{}', must be http or https", parsed.scheme()),
        ));
    }
    if parsed.host_str().is_none_or(str::is_empty) {
        return Err(ConfigError::invalid("url", format!("{} has no host", url)));
    }
    Ok(parsed)
}

#[derive(Debug, Serialize)]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
}

#[derive(Debug, Deserialize)]
struct ScrapeResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    data: Option<ScrapeData>,
}

#[derive(Debug, Deserialize)]
struct ScrapeData {
    #[serde(default)]
    markdown: String,
    #[serde(default)]
    metadata: Option<ScrapeMetadata>,
}

#[derive(Debug, Deserialize)]
struct ScrapeMetadata {
    #[serde(default)]
    title: Option<String>,
}

/// Firecrawl `/scrape` client
#[derive(Debug)]
pub struct FirecrawlExtractor {
    client: Client,
    api_key: String,
    endpoint: String,
    retry: RetryPolicy,
}

impl FirecrawlExtractor {
    pub fn new(api_key: impl Into<String>, endpoint: impl Into<String>, timeout_secs: u64, retry: RetryPolicy) -> Self {
        let endpoint = endpoint.into();
        Self {
            client: Client::builder()
                .timeout(Duration::from_secs(timeout_secs))
                .build()
                .unwrap_or_default(),
            api_key: api_key.into(),
            endpoint: if endpoint.is_empty() {
                DEFAULT_FIRECRAWL_ENDPOINT.to_string()
            } else {
                endpoint.trim_end_matches('/').to_string()
            },
            retry,
        }
    }

    pub fn from_config(config: &ExtractionConfig, retry: RetryPolicy) -> Result<Self, ConfigError> {
        if config.api_key.trim().is_empty() {
            return Err(ConfigError::MissingApiKey("Firecrawl".to_string()));
        }
        Ok(Self::new(&config.api_key, &config.endpoint, config.timeout_secs, retry))
    }

    fn scrape_url(&self) -> String {
        format!("{}/scrape", self.endpoint)
    }
}

fn page_from_response(response: ScrapeResponse, url: &str) -> Result<ExtractedPage, ProviderError> {
    if !response.success {
        return Err(ProviderError::ParseError(format!(
            "Firecrawl returned error: {}",
            response.error.as_deref().unwrap_or("Unknown error")
        )));
    }

    let data = response
        .data
        .ok_or_else(|| ProviderError::ParseError("Firecrawl response has no data".to_string()))?;
    if data.markdown.trim().is_empty() {
        return Err(ProviderError::ParseError("Firecrawl returned empty content".to_string()));
    }

    let title = data
        .metadata
        .and_then(|m| m.title)
        .filter(|t| !t.trim().is_empty())
        .unwrap_or_else(|| UNTITLED.to_string());

    Ok(ExtractedPage {
        markdown: data.markdown,
        title,
        source_url: url.to_string(),
        fetched_at: Utc::now(),
    })
}

#[async_trait]
impl Extractor for FirecrawlExtractor {
    async fn extract(&self, url: &str) -> Result<ExtractedPage, ProviderError> {
        info!("Fetching content from: {}", url);
        let api_url = self.scrape_url();
        let body = ScrapeRequest {
            url,
            formats: ["markdown"],
        };

        let response: ScrapeResponse = send_with_retry("Firecrawl", &self.retry, || {
            self.client.post(&api_url).bearer_auth(&self.api_key).json(&body)
        })
        .await?;

        let page = page_from_response(response, url)?;
        info!("Successfully fetched content (title: {})", page.title);
        Ok(page)
    }
}
