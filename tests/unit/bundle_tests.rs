/*!
 * Tests for asset resolution, download and link rewriting
 */

use std::fs;

use anyhow::Result;
use chrono::{Local, TimeZone};
use transflow::bundle::resolver::{has_image_extension, is_remote};
use transflow::bundle::{
    AssetStatus, BundleManifest, FetchOptions, ManifestStatus, ResolveOptions, fetch, resolve, rewrite,
};
use transflow::cancel::CancelFlag;
use transflow::document::{parse, render};
use transflow::errors::AssetFetchError;

use crate::common::{self, mock_collaborators::MockAssetSource};

fn fast_options(concurrency: usize) -> FetchOptions {
    FetchOptions {
        concurrency,
        max_attempts: 3,
        backoff_base_ms: 1,
        max_backoff_ms: 2,
    }
}

/// Test remote reference detection
#[test]
fn test_is_remote_and_image_extension() {
    assert!(is_remote("https://x.test/a.png"));
    assert!(is_remote("HTTP://x.test/a"));
    assert!(is_remote("//cdn.test/a.png"));
    assert!(!is_remote("assets/a.png"));
    assert!(!is_remote("data:image/png;base64,AA"));

    assert!(has_image_extension("https://x.test/photo.JPG?size=large"));
    assert!(has_image_extension("https://x.test/icon.svg#frag"));
    assert!(!has_image_extension("https://x.test/paper.pdf"));
    assert!(!has_image_extension("https://x.test/"));
}

/// Test that the two scenario URLs become two distinct assets
#[test]
fn test_resolve_withImageAndImageLink_shouldFindBoth() {
    let doc = parse("# Hi\n\n[see](http://x/a.png)\n\n![img](http://x/b.png)\n").unwrap();
    let assets = resolve(&doc, &ResolveOptions::default());
    let names: Vec<&str> = assets.iter().map(|a| a.local_filename.as_str()).collect();
    assert_eq!(names, vec!["a.png", "b.png"]);
    assert!(assets.iter().all(|a| a.status == AssetStatus::Pending));

    let images_only = resolve(&doc, &ResolveOptions { include_asset_links: false });
    assert_eq!(images_only.len(), 1);
    assert_eq!(images_only[0].source_url, "http://x/b.png");
}

/// Test that plain page links are never treated as assets
#[test]
fn test_resolve_shouldIgnorePageLinks() {
    let doc = parse("[home](https://example.com/) and [doc](https://example.com/guide.html)\n").unwrap();
    assert!(resolve(&doc, &ResolveOptions::default()).is_empty());
}

/// Test partial failure: failed assets keep their remote URL
#[tokio::test]
async fn test_fetch_withSomeFailures_shouldMarkEachAsset() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let doc = parse(
        "![a](https://img.test/a.png)\n\n![b](https://img.test/b.png)\n\n![c](https://img.test/c.gif)\n",
    )?;
    let source = MockAssetSource::new()
        .serve("https://img.test/a.png", b"AAA")
        .fail("https://img.test/b.png", AssetFetchError::Status(404))
        .flaky("https://img.test/c.gif", 2, b"GIF");

    let assets = resolve(&doc, &ResolveOptions::default());
    let assets = fetch(assets, &fast_options(2), &source, temp_dir.path(), &CancelFlag::new()).await;

    let statuses: Vec<String> = assets.iter().map(|a| a.status.to_string()).collect();
    assert_eq!(statuses, vec!["fetched", "failed", "fetched"]);
    assert_eq!(source.calls_for("https://img.test/b.png"), 1);
    assert_eq!(source.calls_for("https://img.test/c.gif"), 3);
    assert_eq!(fs::read(temp_dir.path().join("a.png"))?, b"AAA".to_vec());
    assert_eq!(fs::read(temp_dir.path().join("c.gif"))?, b"GIF".to_vec());
    assert!(!temp_dir.path().join("b.png").exists());

    let rendered = render(&rewrite(&doc, &assets, &ResolveOptions::default()));
    assert_eq!(
        rendered,
        "![a](assets/a.png)\n\n![b](https://img.test/b.png)\n\n![c](assets/c.gif)\n"
    );
    Ok(())
}

/// Test that retries stop at the attempt limit
#[tokio::test]
async fn test_fetch_withPersistentServerError_shouldExhaustAttempts() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let doc = parse("![x](https://img.test/x.png)\n")?;
    let source = MockAssetSource::new().fail("https://img.test/x.png", AssetFetchError::Transport("reset".into()));

    let assets = fetch(
        resolve(&doc, &ResolveOptions::default()),
        &fast_options(1),
        &source,
        temp_dir.path(),
        &CancelFlag::new(),
    )
    .await;

    assert_eq!(source.calls_for("https://img.test/x.png"), 3);
    assert!(matches!(&assets[0].status, AssetStatus::Failed(reason) if reason.contains("reset")));
    Ok(())
}

/// Test the concurrency bound of the download pool
#[tokio::test]
async fn test_fetch_withManyAssets_shouldRespectConcurrencyLimit() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let markdown: String = (0..12)
        .map(|i| format!("![{}](https://img.test/{}.png)\n\n", i, i))
        .collect();
    let doc = parse(&markdown)?;
    let mut source = MockAssetSource::new().with_delay(15);
    for i in 0..12 {
        source = source.serve(&format!("https://img.test/{}.png", i), b"png");
    }

    let assets = fetch(
        resolve(&doc, &ResolveOptions::default()),
        &fast_options(3),
        &source,
        temp_dir.path(),
        &CancelFlag::new(),
    )
    .await;

    assert_eq!(assets.len(), 12);
    assert!(assets.iter().all(|a| a.status == AssetStatus::Fetched));
    assert!(source.max_in_flight() <= 3);
    assert!(source.max_in_flight() >= 2);
    // Results keep document order regardless of completion order
    let names: Vec<String> = assets.iter().map(|a| a.local_filename.clone()).collect();
    let expected: Vec<String> = (0..12).map(|i| format!("{}.png", i)).collect();
    assert_eq!(names, expected);
    Ok(())
}

/// Test that a cancelled run fetches nothing and fails every asset
#[tokio::test]
async fn test_fetch_whenCancelled_shouldFailWithoutRequests() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let doc = parse("![a](https://img.test/a.png) ![b](https://img.test/b.png)\n")?;
    let source = MockAssetSource::new().serve("https://img.test/a.png", b"a");
    let cancel = CancelFlag::new();
    cancel.cancel();

    let assets = fetch(resolve(&doc, &ResolveOptions::default()), &fast_options(2), &source, temp_dir.path(), &cancel).await;
    assert_eq!(source.total_calls(), 0);
    assert!(assets.iter().all(|a| matches!(a.status, AssetStatus::Failed(_))));
    Ok(())
}

/// Test that one download serves every reference to the same URL
#[tokio::test]
async fn test_fetch_withDuplicateReferences_shouldDownloadOnce() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let doc = parse("![one](https://img.test/a.png)\n\n![two](https://img.test/a.png)\n\n[raw](https://img.test/a.png)\n")?;
    let source = MockAssetSource::new().serve("https://img.test/a.png", b"a");

    let assets = fetch(resolve(&doc, &ResolveOptions::default()), &fast_options(2), &source, temp_dir.path(), &CancelFlag::new()).await;
    assert_eq!(source.total_calls(), 1);

    let rendered = render(&rewrite(&doc, &assets, &ResolveOptions::default()));
    assert_eq!(rendered, "![one](assets/a.png)\n\n![two](assets/a.png)\n\n[raw](assets/a.png)\n");
    Ok(())
}

/// Test manifest counts and YAML layout
#[test]
fn test_manifest_shouldCountFetchedAndFailed() -> Result<()> {
    let doc = parse("---\ntitle: T\nsource-url: https://example.com/t\nfetched-at: 2026-01-14T09:00:00Z\n---\n![a](https://i.test/a.png) ![b](https://i.test/b.png)\n")?;
    let mut assets = resolve(&doc, &ResolveOptions::default());
    assets[0].status = AssetStatus::Fetched;
    assets[1].status = AssetStatus::Failed("HTTP status 404".to_string());

    let bundled_at = Local.with_ymd_and_hms(2026, 1, 14, 12, 0, 0).unwrap();
    let manifest = BundleManifest::build(&doc, "T", Some("zh".to_string()), &assets, bundled_at)?;
    assert_eq!(manifest.asset_count, 2);
    assert_eq!(manifest.fetched_count, 1);
    assert_eq!(manifest.failed_count, 1);
    assert!(!manifest.is_complete());
    assert_eq!(manifest.source_url.as_deref(), Some("https://example.com/t"));
    assert_eq!(manifest.fetched_at.as_deref(), Some("2026-01-14T09:00:00Z"));
    assert_eq!(manifest.assets[0].local_path.as_deref(), Some("assets/a.png"));
    assert_eq!(manifest.assets[1].status, ManifestStatus::Failed);

    let yaml = manifest.to_yaml()?;
    assert!(yaml.contains("target_language: zh"));
    assert!(yaml.contains("status: failed"));
    assert!(yaml.contains("reason: HTTP status 404"));
    assert_eq!(BundleManifest::from_yaml(&yaml)?, manifest);
    Ok(())
}

/// Test that pending assets cannot be written to a manifest
#[test]
fn test_manifest_withPendingAsset_shouldFail() {
    let doc = parse("![a](https://i.test/a.png)\n").unwrap();
    let assets = resolve(&doc, &ResolveOptions::default());
    assert!(BundleManifest::build(&doc, "T", None, &assets, Local::now()).is_err());
}
