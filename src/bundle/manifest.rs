/*!
 * The `meta.yaml` manifest written next to a bundled document.
 *
 * It records where the document came from, when it was bundled and the final
 * state of every asset, so a partially downloaded bundle says exactly which
 * references still point at the network.
 */

use chrono::{DateTime, Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use crate::bundle::{Asset, AssetStatus};
use crate::document::Document;
use crate::errors::BundleError;

/// Final state of an asset as recorded in the manifest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestStatus {
    Fetched,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestAsset {
    pub source_url: String,
    /// Path relative to the bundle root, present when fetched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_path: Option<String>,
    pub status: ManifestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleManifest {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<String>,
    /// RFC 3339 timestamp of the bundle run
    pub bundled_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_language: Option<String>,
    /// Number of distinct remote assets found
    pub asset_count: usize,
    pub fetched_count: usize,
    pub failed_count: usize,
    pub assets: Vec<ManifestAsset>,
}

impl BundleManifest {
    /// Manifest for `doc` and its assets. Every asset must be in a terminal state.
    pub fn build(
        doc: &Document,
        title: &str,
        target_language: Option<String>,
        assets: &[Asset],
        bundled_at: DateTime<Local>,
    ) -> Result<Self, BundleError> {
        let mut entries = Vec::with_capacity(assets.len());
        for asset in assets {
            let entry = match &asset.status {
                AssetStatus::Pending => {
                    return Err(BundleError::Manifest(format!(
                        "asset {} has no final status",
                        asset.source_url
                    )));
                }
                AssetStatus::Fetched => ManifestAsset {
                    source_url: asset.source_url.clone(),
                    local_path: Some(asset.local_path()),
                    status: ManifestStatus::Fetched,
                    reason: None,
                },
                AssetStatus::Failed(reason) => ManifestAsset {
                    source_url: asset.source_url.clone(),
                    local_path: None,
                    status: ManifestStatus::Failed,
                    reason: Some(reason.clone()),
                },
            };
            entries.push(entry);
        }

        let fetched_count = entries.iter().filter(|e| e.status == ManifestStatus::Fetched).count();
        let frontmatter = doc.frontmatter.as_ref();

        Ok(Self {
            title: title.to_string(),
            source_url: frontmatter.and_then(|fm| fm.source_url()).map(str::to_string),
            fetched_at: frontmatter.and_then(|fm| fm.fetched_at()).map(str::to_string),
            bundled_at: bundled_at.to_rfc3339_opts(SecondsFormat::Secs, false),
            target_language,
            asset_count: entries.len(),
            fetched_count,
            failed_count: entries.len() - fetched_count,
            assets: entries,
        })
    }

    /// Whether every asset was downloaded
    pub fn is_complete(&self) -> bool {
        self.failed_count == 0
    }

    pub fn to_yaml(&self) -> Result<String, BundleError> {
        serde_yaml::to_string(self).map_err(|e| BundleError::Manifest(e.to_string()))
    }

    pub fn from_yaml(text: &str) -> Result<Self, BundleError> {
        serde_yaml::from_str(text).map_err(|e| BundleError::Manifest(e.to_string()))
    }
}
