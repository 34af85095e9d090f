/*!
 * YAML frontmatter detection and decoding.
 */

use std::collections::BTreeMap;

use log::debug;
use serde::Serialize;
use serde_yaml::Value;

use crate::document::model::Frontmatter;
use crate::document::parser::Line;

fn is_delimiter(body: &str) -> bool {
    body.trim_end() == "---"
}

fn is_closing(body: &str) -> bool {
    let trimmed = body.trim_end();
    trimmed == "---" || trimmed == "..."
}

/// Split a leading frontmatter block off `lines`.
///
/// Returns the decoded block and the number of lines it spans. A leading
/// `---` only opens frontmatter when a closing `---` or `...` line follows
/// and the lines between them are empty or a YAML mapping. Anything else
/// yields `None`, and the `---` is parsed as an ordinary thematic break.
pub(crate) fn split(lines: &[Line<'_>]) -> Option<(Frontmatter, usize)> {
    let first = lines.first()?;
    if !is_delimiter(first.body) {
        return None;
    }

    let close = lines
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, line)| is_closing(line.body))
        .map(|(index, _)| index)?;

    let yaml: String = lines[1..close].iter().map(Line::raw).collect();
    let fields = decode(&yaml)?;
    let raw: String = lines[..=close].iter().map(Line::raw).collect();

    Some((Frontmatter { raw, fields }, close + 1))
}

fn decode(yaml: &str) -> Option<BTreeMap<String, String>> {
    if yaml.trim().is_empty() {
        return Some(BTreeMap::new());
    }

    match serde_yaml::from_str::<Value>(yaml) {
        Ok(Value::Mapping(mapping)) => Some(
            mapping
                .into_iter()
                .filter_map(|(key, value)| Some((scalar(&key)?, scalar(&value)?)))
                .collect(),
        ),
        Ok(other) => {
            debug!("Leading block is not a YAML mapping ({:?}), keeping it as Markdown", other);
            None
        }
        Err(e) => {
            debug!("Leading block is not valid YAML ({}), keeping it as Markdown", e);
            None
        }
    }
}

fn scalar(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null => Some(String::new()),
        Value::Tagged(tagged) => scalar(&tagged.value),
        Value::Sequence(_) | Value::Mapping(_) => None,
    }
}

#[derive(Serialize)]
struct PageHeader<'a> {
    title: &'a str,
    source_url: &'a str,
    fetched_at: &'a str,
}

/// Render the frontmatter block written in front of downloaded pages
pub fn render_page_header(title: &str, source_url: &str, fetched_at: &str) -> Result<String, serde_yaml::Error> {
    let yaml = serde_yaml::to_string(&PageHeader {
        title,
        source_url,
        fetched_at,
    })?;
    Ok(format!("---\n{}---\n", yaml))
}
