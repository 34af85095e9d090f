/*!
 * Self-contained bundles: a localized document with its remote assets.
 *
 * - `resolver`: finds remote asset references and assigns local filenames
 * - `fetcher`: downloads assets concurrently with per-asset retry
 * - `rewriter`: points references at the downloaded copies
 * - `manifest`: the `meta.yaml` sidecar
 * - `naming`: bundle folder naming patterns
 */

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use log::{debug, info, warn};
use tokio::fs;

use crate::app_config::BundleConfig;
use crate::cancel::CancelFlag;
use crate::document::{Document, NodeId, render};
use crate::errors::BundleError;

pub mod fetcher;
pub mod manifest;
pub mod naming;
pub mod resolver;
pub mod rewriter;

pub use self::fetcher::{AssetSource, FetchOptions, HttpAssetSource, fetch};
pub use self::manifest::{BundleManifest, ManifestAsset, ManifestStatus};
pub use self::naming::{NamingContext, resolve_pattern, slugify, unique_path};
pub use self::resolver::{ResolveOptions, resolve};
pub use self::rewriter::rewrite;

/// Name of the rendered document inside a bundle
pub const README_FILE: &str = "README.md";
/// Name of the manifest inside a bundle
pub const MANIFEST_FILE: &str = "meta.yaml";
/// Directory holding downloaded assets inside a bundle
pub const ASSETS_DIR: &str = "assets";

/// Download state of an asset
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetStatus {
    Pending,
    Fetched,
    /// Gave up; the reason is kept for the manifest
    Failed(String),
}

impl AssetStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Fetched => write!(f, "fetched"),
            Self::Failed(_) => write!(f, "failed"),
        }
    }
}

/// A remote resource referenced by the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    /// URL exactly as written in the document
    pub source_url: String,
    /// First node referencing the URL
    pub node: NodeId,
    /// File name under `assets/`, unique within the bundle
    pub local_filename: String,
    pub status: AssetStatus,
}

impl Asset {
    /// URL to download; protocol-relative references are fetched over https
    pub fn fetch_url(&self) -> String {
        if self.source_url.starts_with("//") {
            format!("https:{}", self.source_url)
        } else {
            self.source_url.clone()
        }
    }

    /// Path written into the document once the asset is fetched
    pub fn local_path(&self) -> String {
        format!("{}/{}", ASSETS_DIR, self.local_filename)
    }
}

/// Everything a single bundle run needs besides the document
#[derive(Debug, Clone)]
pub struct BundleRequest {
    /// Title used when the document has none
    pub fallback_title: String,
    /// Language the document is written in, when known
    pub target_language: Option<String>,
    /// Date used by the naming pattern
    pub date: NaiveDate,
    pub resolve: ResolveOptions,
    pub fetch: FetchOptions,
}

impl BundleRequest {
    pub fn from_config(config: &BundleConfig, fallback_title: impl Into<String>) -> Self {
        Self {
            fallback_title: fallback_title.into(),
            target_language: None,
            date: Local::now().date_naive(),
            resolve: ResolveOptions {
                include_asset_links: config.include_asset_links,
            },
            fetch: FetchOptions::from_config(config),
        }
    }

    pub fn with_target_language(mut self, language: impl Into<String>) -> Self {
        self.target_language = Some(language.into());
        self
    }
}

/// Builds bundle folders
pub struct Bundler {
    source: Arc<dyn AssetSource>,
}

impl Bundler {
    pub fn new(source: Arc<dyn AssetSource>) -> Self {
        Self { source }
    }

    /// Bundler downloading over HTTP with the configured timeout and user agent
    pub fn from_config(config: &BundleConfig) -> Result<Self, BundleError> {
        let source = HttpAssetSource::new(config.timeout_secs, &config.user_agent)?;
        Ok(Self::new(Arc::new(source)))
    }

    /// Build a bundle for `doc` under `output_root`.
    ///
    /// The bundle is assembled in a hidden staging directory next to its final
    /// location and moved into place only once README.md and meta.yaml are
    /// written, so a failed run leaves nothing behind. Assets that cannot be
    /// downloaded are recorded as failed and keep their remote URL.
    pub async fn bundle(
        &self,
        doc: &Document,
        output_root: &Path,
        pattern: &str,
        request: &BundleRequest,
        cancel: &CancelFlag,
    ) -> Result<(PathBuf, BundleManifest), BundleError> {
        if cancel.is_cancelled() {
            return Err(BundleError::Cancelled);
        }

        let title = doc.title().unwrap_or_else(|| request.fallback_title.clone());
        let relative = resolve_pattern(pattern, &NamingContext::new(&title, request.date))?;
        let target = unique_path(&output_root.join(relative));
        let parent = target.parent().unwrap_or(output_root).to_path_buf();
        fs::create_dir_all(&parent).await?;

        let staging = tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix(".transflow-").tempdir_in(parent)
        })
        .await
        .map_err(std::io::Error::other)??;
        let assets_dir = staging.path().join(ASSETS_DIR);
        fs::create_dir_all(&assets_dir).await?;

        let assets = resolve(doc, &request.resolve);
        info!("Found {} remote assets to download", assets.len());

        let assets = fetch(assets, &request.fetch, self.source.as_ref(), &assets_dir, cancel).await;
        let fetched = assets.iter().filter(|a| a.status == AssetStatus::Fetched).count();
        if fetched < assets.len() {
            warn!("Downloaded {}/{} assets; failed ones keep their remote URL", fetched, assets.len());
        } else {
            info!("Downloaded {}/{} assets", fetched, assets.len());
        }

        let localized = rewrite(doc, &assets, &request.resolve);
        let manifest = BundleManifest::build(doc, &title, request.target_language.clone(), &assets, Local::now())?;

        fs::write(staging.path().join(README_FILE), render(&localized)).await?;
        fs::write(staging.path().join(MANIFEST_FILE), manifest.to_yaml()?).await?;

        debug!("Publishing bundle from {} to {}", staging.path().display(), target.display());
        fs::rename(staging.path(), &target).await?;
        // The staging directory no longer exists; dropping it is a no-op

        info!("Bundle created at: {}", target.display());
        Ok((target, manifest))
    }
}
