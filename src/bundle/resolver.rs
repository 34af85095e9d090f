/*!
 * Finds remote assets referenced by a document.
 *
 * Images are always considered; links pointing straight at an image file are
 * included when `include_asset_links` is set. Relative paths and `data:` URIs
 * are already local and are skipped.
 */

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};
use url::Url;

use crate::bundle::{Asset, AssetStatus};
use crate::document::{Document, NodeKind};

static UNSAFE_FILENAME_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\-.]").expect("Invalid filename regex"));

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "svg", "bmp", "avif", "ico", "tif", "tiff"];

/// Extension given to assets whose URL has no usable file name
const FALLBACK_EXTENSION: &str = "jpg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    pub include_asset_links: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self {
            include_asset_links: true,
        }
    }
}

/// http(s) and protocol-relative references
pub fn is_remote(url: &str) -> bool {
    let lower = url.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://") || url.starts_with("//")
}

/// Whether the URL path ends in a known image extension
pub fn has_image_extension(url: &str) -> bool {
    basename(url)
        .and_then(|name| name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase()))
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

/// Remote assets in document order, one per distinct URL.
///
/// The first occurrence of a URL decides its node and file name; later
/// occurrences share them.
pub fn resolve(doc: &Document, options: &ResolveOptions) -> Vec<Asset> {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut used_names: HashMap<String, String> = HashMap::new();
    let mut assets = Vec::new();

    for id in doc.walk() {
        let url = match doc.kind(id) {
            NodeKind::Image { url, .. } => url,
            NodeKind::Link { url, .. } if options.include_asset_links && has_image_extension(url) => url,
            _ => continue,
        };
        let url = url.trim();
        if !is_remote(url) || !seen.insert(url) {
            continue;
        }

        let local_filename = local_filename(url, &mut used_names);
        assets.push(Asset {
            source_url: url.to_string(),
            node: id,
            local_filename,
            status: AssetStatus::Pending,
        });
    }

    assets
}

fn local_filename(url: &str, used: &mut HashMap<String, String>) -> String {
    let hash = short_hash(url);
    let name = match basename(url).filter(|name| name.contains('.') && !name.starts_with('.')) {
        Some(name) => UNSAFE_FILENAME_CHARS.replace_all(&name, "_").into_owned(),
        None => format!("image_{}.{}", hash, FALLBACK_EXTENSION),
    };

    let name = match used.get(&name) {
        Some(owner) if owner != url => match name.rsplit_once('.') {
            Some((stem, ext)) => format!("{}-{}.{}", stem, hash, ext),
            None => format!("{}-{}", name, hash),
        },
        _ => name,
    };
    used.insert(name.clone(), url.to_string());
    name
}

/// Last non-empty path segment of the URL
fn basename(url: &str) -> Option<String> {
    let absolute = if url.starts_with("//") {
        format!("https:{}", url)
    } else {
        url.to_string()
    };
    let parsed = Url::parse(&absolute).ok()?;
    parsed
        .path_segments()?
        .filter(|segment| !segment.is_empty())
        .last()
        .map(str::to_string)
}

/// First 8 hex digits of the SHA-256 of the URL
fn short_hash(url: &str) -> String {
    let digest = Sha256::digest(url.as_bytes());
    digest.iter().take(4).map(|b| format!("{:02x}", b)).collect()
}
