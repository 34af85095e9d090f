//! Points image and asset-link references at their downloaded copies.

use std::collections::HashMap;

use crate::bundle::{Asset, AssetStatus, ResolveOptions};
use crate::document::{Document, NodeKind};

/// Copy of `doc` where every reference to a fetched asset uses its local path.
///
/// References to failed or unknown assets keep their remote URL. Link
/// destinations are only rewritten when `options.include_asset_links` is set,
/// even if an image with the same URL was fetched. Only the destination
/// changes: alt text, titles and bracket style are untouched.
pub fn rewrite(doc: &Document, assets: &[Asset], options: &ResolveOptions) -> Document {
    let local: HashMap<&str, String> = assets
        .iter()
        .filter(|asset| asset.status == AssetStatus::Fetched)
        .map(|asset| (asset.source_url.as_str(), asset.local_path()))
        .collect();

    let mut out = doc.clone();
    if local.is_empty() {
        return out;
    }

    for id in doc.walk() {
        let url = match out.kind_mut(id) {
            NodeKind::Image { url, .. } => url,
            NodeKind::Link { url, .. } if options.include_asset_links => url,
            _ => continue,
        };
        if let Some(path) = local.get(url.trim()) {
            *url = path.clone();
        }
    }

    out
}
