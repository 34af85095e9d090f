/*!
 * Full app lifecycle tests: download, translate and bundle through the controller
 */

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use transflow::app_config::Config;
use transflow::app_controller::Controller;
use transflow::bundle::{BundleManifest, MANIFEST_FILE, README_FILE};
use transflow::document::parse;
use transflow::errors::{AppError, ConfigError};
use transflow::providers::mock::MockProvider;

use crate::common::{
    self,
    mock_collaborators::{MockAssetSource, MockExtractor},
};

const PAGE: &str = "# Widgets 101\n\nWidgets are small.\n\n![diagram](https://cdn.test/diagram.png)\n\n```sh\nwidget --help\n```\n";

fn fast_config(language: &str) -> Config {
    let mut config = Config::default();
    config.target_language = language.to_string();
    config.bundle.retry_backoff_ms = 1;
    config.bundle.max_backoff_ms = 2;
    config
}

/// Test that a download writes the page with a frontmatter header
#[tokio::test]
async fn test_download_shouldWriteFrontmatterAndMarkdown() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::new_for_test().with_extractor(Arc::new(MockExtractor::new("Widgets 101", PAGE)));

    let path = controller
        .download("https://blog.test/posts/widgets-101.html", Some(temp_dir.path().to_path_buf()))
        .await?;
    assert_eq!(path, temp_dir.path().join("widgets-101.md"));

    let doc = parse(&fs::read_to_string(&path)?)?;
    let frontmatter = doc.frontmatter.as_ref().expect("frontmatter");
    assert_eq!(frontmatter.title(), Some("Widgets 101"));
    assert_eq!(frontmatter.source_url(), Some("https://blog.test/posts/widgets-101.html"));
    assert!(frontmatter.fetched_at().is_some());
    assert!(fs::read_to_string(&path)?.ends_with(PAGE));
    Ok(())
}

/// Test that an explicit output file is used as is
#[tokio::test]
async fn test_download_withOutputFile_shouldWriteThere() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let target = temp_dir.path().join("raw.md");
    let controller = Controller::new_for_test().with_extractor(Arc::new(MockExtractor::new("T", "Body\n")));

    let path = controller.download("https://blog.test/", Some(target.clone())).await?;
    assert_eq!(path, target);
    assert!(fs::read_to_string(&target)?.starts_with("---\n"));
    Ok(())
}

/// Test that invalid URLs are rejected before the extractor is called
#[tokio::test]
async fn test_download_withInvalidUrl_shouldFailWithConfigError() {
    let controller = Controller::new_for_test().with_extractor(Arc::new(MockExtractor::failing()));
    for url in ["ftp://files.test/a", "not a url", "https://"] {
        let err = controller.download(url, None).await.unwrap_err();
        assert_eq!(err.exit_code(), 2, "{} should be a config error", url);
    }
}

/// Test that extractor failures are provider errors and write nothing
#[tokio::test]
async fn test_download_withFailingExtractor_shouldNotWrite() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::new_for_test().with_extractor(Arc::new(MockExtractor::failing()));

    let err = controller
        .download("https://blog.test/post", Some(temp_dir.path().to_path_buf()))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));
    assert!(common::list_dir(temp_dir.path()).is_empty());
    Ok(())
}

/// Test that a missing extraction key is reported when no extractor is injected
#[tokio::test]
async fn test_download_withoutApiKey_shouldFailWithMissingKey() {
    let controller = Controller::new_for_test();
    let err = controller.download("https://blog.test/post", None).await.unwrap_err();
    assert!(matches!(err, AppError::Config(ConfigError::MissingApiKey(ref name)) if name == "Firecrawl"));
}

/// Test the whole pipeline in one call
#[tokio::test]
async fn test_run_shouldDownloadTranslateAndBundle() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let source = MockAssetSource::new().serve("https://cdn.test/diagram.png", b"png").into_arc();
    let controller = Controller::with_config(fast_config("ja"))
        .with_extractor(Arc::new(MockExtractor::new("Widgets 101", PAGE)))
        .with_backend(Arc::new(MockProvider::working()))
        .with_asset_source(source.clone());

    let (path, manifest) = controller.run("https://blog.test/posts/widgets", temp_dir.path(), None).await?;

    // Frontmatter titles are never translated, so the slug keeps the source title
    assert!(path.starts_with(temp_dir.path()));
    assert!(path.to_string_lossy().ends_with("-widgets-101"));
    assert_eq!(manifest.target_language.as_deref(), Some("ja"));
    assert_eq!(manifest.source_url.as_deref(), Some("https://blog.test/posts/widgets"));
    assert_eq!(manifest.fetched_count, 1);

    let readme = fs::read_to_string(path.join(README_FILE))?;
    assert!(readme.starts_with("---\n"));
    assert!(readme.contains("# [ja] Widgets 101\n"));
    assert!(readme.contains("[ja] Widgets are small.\n"));
    assert!(readme.contains("![diagram](assets/diagram.png)"));
    assert!(readme.contains("```sh\nwidget --help\n```\n"));
    assert_eq!(fs::read(path.join("assets/diagram.png"))?, b"png".to_vec());

    let on_disk = BundleManifest::from_yaml(&fs::read_to_string(path.join(MANIFEST_FILE))?)?;
    assert_eq!(on_disk, manifest);

    // Intermediate documents are never written next to the bundle
    let year_dir = path.parent().unwrap();
    assert_eq!(common::list_dir(temp_dir.path()).len(), 1);
    assert_eq!(common::list_dir(year_dir).len(), 1);
    Ok(())
}

/// Test that a translation failure leaves no bundle behind
#[tokio::test]
async fn test_run_withFailingProvider_shouldNotBundle() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let source = MockAssetSource::new().into_arc();
    let controller = Controller::with_config(fast_config("fr"))
        .with_extractor(Arc::new(MockExtractor::new("T", PAGE)))
        .with_backend(Arc::new(MockProvider::failing()))
        .with_asset_source(source.clone());

    let err = controller.run("https://blog.test/post", temp_dir.path(), Some("de")).await.unwrap_err();
    assert!(matches!(err, AppError::Translation(_)));
    assert_eq!(err.exit_code(), 1);
    assert!(common::list_dir(temp_dir.path()).is_empty());
    assert_eq!(source.total_calls(), 0);
    Ok(())
}

/// Test that raising the cancel flag stops the pipeline early
#[tokio::test]
async fn test_run_whenCancelled_shouldStopBeforeWork() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let provider = Arc::new(MockProvider::working());
    let controller = Controller::with_config(fast_config("fr"))
        .with_extractor(Arc::new(MockExtractor::new("T", PAGE)))
        .with_backend(provider.clone())
        .with_asset_source(MockAssetSource::new().into_arc());
    controller.cancel_flag().cancel();

    assert!(controller.run("https://blog.test/post", temp_dir.path(), None).await.is_err());
    assert_eq!(provider.request_count(), 0);
    assert!(common::list_dir(temp_dir.path()).is_empty());
    Ok(())
}

/// Test download, translate and bundle as separate steps
#[tokio::test]
async fn test_stepwise_pipeline_shouldMatchSingleRun() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let controller = Controller::with_config(fast_config("ko"))
        .with_extractor(Arc::new(MockExtractor::new("Widgets 101", PAGE)))
        .with_backend(Arc::new(MockProvider::working()))
        .with_asset_source(MockAssetSource::new().serve("https://cdn.test/diagram.png", b"png").into_arc());

    let raw = controller
        .download("https://blog.test/widgets", Some(temp_dir.path().join("raw.md")))
        .await?;
    let translated = controller
        .translate_file(&raw, Some(temp_dir.path().join("trans.md")), None)
        .await?;
    let (path, manifest) = controller
        .bundle_file(&translated, &temp_dir.path().join("out"), Some("{slug}"), Some("ko"))
        .await?;

    assert_eq!(path, temp_dir.path().join("out/widgets-101"));
    assert!(manifest.is_complete());
    assert_eq!(
        fs::read_to_string(path.join(README_FILE))?,
        fs::read_to_string(&translated)?.replace("https://cdn.test/diagram.png", "assets/diagram.png")
    );
    Ok(())
}

/// Test a controller built from a config file on disk
#[test]
fn test_controller_fromConfigFile_shouldHonourSettings() -> Result<()> {
    common::init_test_logging();
    let temp_dir = common::create_temp_dir()?;
    let config_path = common::create_test_file(
        temp_dir.path(),
        "conf.json",
        r#"{ "target_language": "it", "bundle": { "folder_pattern": "{slug}", "retry_backoff_ms": 1, "max_backoff_ms": 1 } }"#,
    )?;
    let config = Config::load_or_create(&config_path)?;
    config.validate()?;

    let input = common::create_test_file(temp_dir.path(), "in.md", "# Ciao\n")?;
    let controller = Controller::with_config(config)
        .with_backend(Arc::new(MockProvider::identity()))
        .with_asset_source(MockAssetSource::new().into_arc());
    assert_eq!(controller.config().target_language, "it");

    let (output, bundle) = tokio_test::block_on(async {
        let output = controller.translate_file(&input, None, None).await?;
        let (bundle, _) = controller.bundle_file(&output, &temp_dir.path().join("b"), None, None).await?;
        Ok::<_, AppError>((output, bundle))
    })?;

    assert_eq!(output, temp_dir.path().join("in.it.md"));
    assert_eq!(fs::read_to_string(&output)?, "# Ciao\n");
    assert_eq!(bundle, temp_dir.path().join("b/ciao"));
    Ok(())
}
