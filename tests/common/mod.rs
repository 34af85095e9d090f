/*!
 * Common test utilities for the transflow test suite
 */

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tempfile::TempDir;

// Re-export the mock collaborators module
pub mod mock_collaborators;

/// Route library logs to the test output; safe to call from every test
pub fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Creates a temporary directory for test files
pub fn create_temp_dir() -> Result<TempDir> {
    Ok(TempDir::new()?)
}

/// Creates a test file with the given content in the specified directory
pub fn create_test_file(dir: &Path, filename: &str, content: &str) -> Result<PathBuf> {
    let file_path = dir.join(filename);
    fs::write(&file_path, content)?;
    Ok(file_path)
}

/// An article exercising every construct the translator must leave alone
pub const SAMPLE_ARTICLE: &str = r#"---
title: Getting Started with Widgets
source_url: https://blog.example.com/widgets
fetched_at: 2026-01-13T10:00:00Z
---

# Getting Started with Widgets

Widgets are small. Install them with `cargo add widget` first.

![Widget diagram](https://cdn.example.com/img/diagram.png "Overview")

> Tip: read the [manual](https://docs.example.com/manual) before you begin.

1. Open the *settings* panel.
2. Press **Save**.

```rust
fn main() {
    println!("Hello, world!");
}
```

| Column | Value |
|--------|-------|
| a      | 1     |

Visit <https://example.com> or https://example.org/page for more.

<div class="note">Raw HTML block</div>

---

Thanks for reading!
"#;

/// Same content without frontmatter or remote assets
pub const PLAIN_ARTICLE: &str = "# Title\n\nFirst paragraph.\n\nSecond paragraph with `code`.\n";

/// Writes the sample article into `dir` and returns its path
pub fn create_sample_article(dir: &Path) -> Result<PathBuf> {
    create_test_file(dir, "raw.md", SAMPLE_ARTICLE)
}

/// Files directly under `dir`, sorted, as names
pub fn list_dir(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .map(|e| e.file_name().to_string_lossy().to_string())
                .collect()
        })
        .unwrap_or_default();
    names.sort();
    names
}
