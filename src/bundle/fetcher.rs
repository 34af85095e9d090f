/*!
 * Concurrent asset downloads.
 *
 * At most `concurrency` downloads run at once. Each asset retries on its own
 * with capped exponential backoff; an asset that runs out of attempts is
 * marked failed and never stops the others.
 */

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use log::{debug, warn};
use rand::Rng;
use reqwest::Client;
use reqwest::redirect::Policy;
use url::Url;

use crate::app_config::BundleConfig;
use crate::bundle::{Asset, AssetStatus};
use crate::cancel::CancelFlag;
use crate::errors::{AssetFetchError, BundleError};

/// Where asset bytes come from
#[async_trait]
pub trait AssetSource: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AssetFetchError>;
}

/// Downloads assets over HTTP
pub struct HttpAssetSource {
    client: Client,
}

impl HttpAssetSource {
    pub fn new(timeout_secs: u64, user_agent: &str) -> Result<Self, BundleError> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(timeout_secs.min(10)))
            .redirect(Policy::limited(10))
            .build()
            .map_err(|e| BundleError::Client(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetSource for HttpAssetSource {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AssetFetchError> {
        let parsed = Url::parse(url).map_err(|e| AssetFetchError::InvalidUrl(format!("{}: {}", url, e)))?;

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| AssetFetchError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AssetFetchError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AssetFetchError::Transport(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Download limits, derived from the bundle configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOptions {
    /// Maximum downloads in flight
    pub concurrency: usize,
    /// Attempts per asset, including the first
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            concurrency: 5,
            max_attempts: 3,
            backoff_base_ms: 2000,
            max_backoff_ms: 10000,
        }
    }
}

impl FetchOptions {
    pub fn from_config(config: &BundleConfig) -> Self {
        Self {
            concurrency: config.concurrent_downloads,
            max_attempts: config.max_attempts,
            backoff_base_ms: config.retry_backoff_ms,
            max_backoff_ms: config.max_backoff_ms,
        }
    }

    /// Delay before retry number `attempt` (1-based): exponential, capped,
    /// with up to 25% random jitter on top of the uncapped part
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let base = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        let jitter = if base > 0 {
            rand::rng().random_range(0..=base / 4)
        } else {
            0
        };
        Duration::from_millis(base.saturating_add(jitter).min(self.max_backoff_ms))
    }
}

/// Download every pending asset into `assets_dir`.
///
/// Returns the assets in their input order, each in a terminal state.
/// Once `cancel` is raised no new download or retry starts and pending
/// backoff waits end at once; assets not yet fetched are marked failed.
pub async fn fetch(
    assets: Vec<Asset>,
    options: &FetchOptions,
    source: &dyn AssetSource,
    assets_dir: &Path,
    cancel: &CancelFlag,
) -> Vec<Asset> {
    let concurrency = options.concurrency.max(1);

    let mut results: Vec<(usize, Asset)> = stream::iter(assets.into_iter().enumerate())
        .map(|(index, asset)| async move { (index, fetch_one(asset, options, source, assets_dir, cancel).await) })
        .buffer_unordered(concurrency)
        .collect()
        .await;

    results.sort_by_key(|(index, _)| *index);
    results.into_iter().map(|(_, asset)| asset).collect()
}

async fn fetch_one(
    mut asset: Asset,
    options: &FetchOptions,
    source: &dyn AssetSource,
    assets_dir: &Path,
    cancel: &CancelFlag,
) -> Asset {
    if asset.status.is_terminal() {
        return asset;
    }

    let url = asset.fetch_url();
    let max_attempts = options.max_attempts.max(1);
    let mut last_error = AssetFetchError::Cancelled;

    for attempt in 1..=max_attempts {
        if cancel.is_cancelled() {
            break;
        }

        debug!("Downloading {} (attempt {}/{})", url, attempt, max_attempts);
        match source.fetch_bytes(&url).await {
            Ok(bytes) => {
                let path = assets_dir.join(&asset.local_filename);
                match tokio::fs::write(&path, &bytes).await {
                    Ok(()) => {
                        asset.status = AssetStatus::Fetched;
                        return asset;
                    }
                    Err(e) => {
                        let _ = tokio::fs::remove_file(&path).await;
                        last_error = AssetFetchError::Write(e.to_string());
                        break;
                    }
                }
            }
            Err(e) => {
                let retry = e.is_retryable() && attempt < max_attempts;
                last_error = e;
                if !retry {
                    break;
                }
                let delay = options.backoff_delay(attempt);
                debug!("Retrying {} in {:?}: {}", url, delay, last_error);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {},
                    _ = cancel.cancelled() => {
                        debug!("Retry of {} abandoned on cancel", url);
                        break;
                    }
                }
            }
        }
    }

    warn!("Failed to download {}: {}", url, last_error);
    asset.status = AssetStatus::Failed(last_error.to_string());
    asset
}
