/*!
 * End-to-end tests for document translation
 */

use std::fs;
use std::sync::Arc;

use anyhow::Result;
use transflow::app_controller::Controller;
use transflow::bundle::{ResolveOptions, resolve};
use transflow::cancel::CancelFlag;
use transflow::document::{NodeKind, parse, render};
use transflow::errors::AppError;
use transflow::providers::mock::MockProvider;
use transflow::translation::{TranslationOptions, TranslationService};

use crate::common::{self, SAMPLE_ARTICLE};

/// Collect every protected literal and destination of a document
fn protected_content(markdown: &str) -> Vec<String> {
    let doc = parse(markdown).unwrap();
    let mut found = Vec::new();
    for id in doc.walk() {
        match doc.kind(id) {
            NodeKind::CodeBlock { literal, .. }
            | NodeKind::HtmlBlock { literal }
            | NodeKind::Raw { literal }
            | NodeKind::InlineCode { literal }
            | NodeKind::Autolink { literal }
            | NodeKind::InlineHtml { literal } => found.push(literal.clone()),
            NodeKind::Link { url, rest, .. } => found.push(format!("{}{}", url, rest)),
            NodeKind::Image { url, alt, rest, .. } => found.push(format!("{}|{}|{}", alt, url, rest)),
            _ => {}
        }
    }
    if let Some(frontmatter) = doc.frontmatter {
        found.push(frontmatter.raw);
    }
    found
}

/// Test the heading, link, image and code scenario end to end
#[tokio::test]
async fn test_translate_scenario_shouldOnlyTouchProse() -> Result<()> {
    let input = "# Hi\n\n[see](http://x/a.png)\n\n![img](http://x/b.png)\n\n```py\nprint('привет')\n```";
    let provider = Arc::new(MockProvider::working());
    let service = TranslationService::new(provider.clone(), TranslationOptions::default());

    let doc = parse(input)?;
    let translated = service.translate(&doc, "zh", &CancelFlag::new()).await?;
    let output = render(&translated);

    // Only the heading and the link label reach the backend
    assert_eq!(provider.received_texts(), vec!["Hi".to_string(), "see".to_string()]);
    assert_eq!(
        output,
        "# [zh] Hi\n\n[[zh] see](http://x/a.png)\n\n![img](http://x/b.png)\n\n```py\nprint('привет')\n```"
    );
    assert_eq!(protected_content(&output), protected_content(input));

    let assets = resolve(&translated, &ResolveOptions::default());
    let urls: Vec<&str> = assets.iter().map(|a| a.source_url.as_str()).collect();
    assert_eq!(urls, vec!["http://x/a.png", "http://x/b.png"]);
    Ok(())
}

/// Test that a document opening with a thematic break is translated, not rejected
#[tokio::test]
async fn test_translate_withLeadingRule_shouldTranslateBody() -> Result<()> {
    let provider = Arc::new(MockProvider::working());
    let service = TranslationService::new(provider.clone(), TranslationOptions::default());

    let doc = parse("---\n\n# Title\n\n---\n\nBody\n")?;
    let output = render(&service.translate(&doc, "fr", &CancelFlag::new()).await?);

    assert_eq!(provider.received_texts(), vec!["Title".to_string(), "Body".to_string()]);
    assert_eq!(output, "---\n\n# [fr] Title\n\n---\n\n[fr] Body\n");
    Ok(())
}

/// Test that code, URLs, markup and frontmatter survive a full translation
#[tokio::test]
async fn test_translate_sampleArticle_shouldPreserveProtectedContent() -> Result<()> {
    let service = TranslationService::new(Arc::new(MockProvider::working()), TranslationOptions::default());
    let doc = parse(SAMPLE_ARTICLE)?;
    let output = render(&service.translate(&doc, "fr", &CancelFlag::new()).await?);

    assert_eq!(protected_content(&output), protected_content(SAMPLE_ARTICLE));
    assert!(output.contains("# [fr] Getting Started with Widgets\n"));
    assert!(output.contains("1. [fr] Open the *settings* panel.\n"));
    assert!(output.contains("> [fr] Tip: read the [[fr] manual](https://docs.example.com/manual) [fr] before you begin."));
    assert!(output.ends_with("[fr] Thanks for reading!\n"));
    assert_eq!(output.lines().count(), SAMPLE_ARTICLE.lines().count());
    Ok(())
}

/// Test translating a file through the controller
#[tokio::test]
async fn test_translate_file_shouldWriteLanguageSuffixedOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_sample_article(temp_dir.path())?;
    let controller = Controller::new_for_test().with_backend(Arc::new(MockProvider::working()));

    let output = controller.translate_file(&input, None, Some("de")).await?;
    assert_eq!(output, temp_dir.path().join("raw.de.md"));

    let translated = fs::read_to_string(&output)?;
    assert!(translated.contains("# [de] Getting Started with Widgets"));
    assert_eq!(fs::read_to_string(&input)?, SAMPLE_ARTICLE);
    Ok(())
}

/// Test that the configured target language is the default
#[tokio::test]
async fn test_translate_file_withoutLanguage_shouldUseConfiguredLanguage() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "note.md", "Hello\n")?;
    let explicit = temp_dir.path().join("out/translated.md");
    let controller = Controller::new_for_test().with_backend(Arc::new(MockProvider::working()));

    let output = controller.translate_file(&input, Some(explicit.clone()), None).await?;
    assert_eq!(output, explicit);
    assert_eq!(fs::read_to_string(&explicit)?, "[zh] Hello\n");
    Ok(())
}

/// Test that a failed translation writes nothing
#[tokio::test]
async fn test_translate_file_withFailingProvider_shouldNotWriteOutput() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "raw.md", "Hello\n")?;
    let controller = Controller::new_for_test().with_backend(Arc::new(MockProvider::failing()));

    let err = controller.translate_file(&input, None, Some("fr")).await.unwrap_err();
    assert!(matches!(err, AppError::Translation(_)));
    assert_eq!(err.exit_code(), 1);
    assert_eq!(common::list_dir(temp_dir.path()), vec!["raw.md"]);
    assert_eq!(fs::read_to_string(&input)?, "Hello\n");
    Ok(())
}

/// Test that malformed input is rejected with exit code 2
#[tokio::test]
async fn test_translate_file_withInvalidUtf8_shouldFailWithParseError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = temp_dir.path().join("raw.md");
    fs::write(&input, b"# Title\n\nBody \xff\n")?;
    let provider = Arc::new(MockProvider::working());
    let controller = Controller::new_for_test().with_backend(provider.clone());

    let err = controller.translate_file(&input, None, Some("fr")).await.unwrap_err();
    assert!(matches!(err, AppError::Parse(_)));
    assert_eq!(err.exit_code(), 2);
    assert_eq!(provider.request_count(), 0);
    assert_eq!(common::list_dir(temp_dir.path()), vec!["raw.md"]);
    Ok(())
}

/// Test that an invalid language is rejected before any request
#[tokio::test]
async fn test_translate_file_withInvalidLanguage_shouldFailWithConfigError() -> Result<()> {
    let temp_dir = common::create_temp_dir()?;
    let input = common::create_test_file(temp_dir.path(), "raw.md", "Hello\n")?;
    let controller = Controller::new_for_test().with_backend(Arc::new(MockProvider::working()));

    let err = controller.translate_file(&input, None, Some("elvish")).await.unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
    assert_eq!(err.exit_code(), 2);
    Ok(())
}

/// Test a missing input file
#[tokio::test]
async fn test_translate_file_withMissingInput_shouldFail() {
    let controller = Controller::new_for_test().with_backend(Arc::new(MockProvider::working()));
    let err = controller
        .translate_file(std::path::Path::new("/no/such/file.md"), None, Some("fr"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::File(_)));
}
