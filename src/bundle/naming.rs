/*!
 * Bundle folder naming.
 *
 * A pattern such as `{year}/{date}-{slug}` is resolved against the bundle
 * date and title. Supported tokens: `{year}`, `{month}`, `{day}`,
 * `{date}` (YYYYMMDD) and `{slug}`.
 */

use std::path::{Component, Path, PathBuf};

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::ConfigError;

/// Default cap on slug length, in characters
pub const MAX_SLUG_LENGTH: usize = 50;

/// Slug used when a title has no usable characters
pub const FALLBACK_SLUG: &str = "untitled";

static TOKEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([^{}]*)\}").expect("Invalid token regex"));

/// Values available to a naming pattern
#[derive(Debug, Clone)]
pub struct NamingContext {
    pub title: String,
    pub date: NaiveDate,
}

impl NamingContext {
    pub fn new(title: impl Into<String>, date: NaiveDate) -> Self {
        Self {
            title: title.into(),
            date,
        }
    }

    fn token_value(&self, token: &str) -> Option<String> {
        match token {
            "year" => Some(format!("{:04}", self.date.year())),
            "month" => Some(format!("{:02}", self.date.month())),
            "day" => Some(format!("{:02}", self.date.day())),
            "date" => Some(self.date.format("%Y%m%d").to_string()),
            "slug" => Some(slugify(&self.title, MAX_SLUG_LENGTH)),
            _ => None,
        }
    }
}

/// Check a pattern without resolving it
pub fn validate_pattern(pattern: &str) -> Result<(), ConfigError> {
    let context = NamingContext::new("pattern check", NaiveDate::default());
    resolve_pattern(pattern, &context).map(|_| ())
}

/// Substitute every token of `pattern`.
///
/// The result is a relative path; unknown tokens, absolute results and
/// results climbing out with `..` are rejected.
pub fn resolve_pattern(pattern: &str, context: &NamingContext) -> Result<PathBuf, ConfigError> {
    if pattern.trim().is_empty() {
        return Err(ConfigError::invalid("folder_pattern", "must not be empty"));
    }

    let mut resolved = String::with_capacity(pattern.len() + MAX_SLUG_LENGTH);
    let mut cursor = 0;
    for caps in TOKEN_REGEX.captures_iter(pattern) {
        let (Some(whole), Some(token)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = context
            .token_value(token.as_str())
            .ok_or_else(|| ConfigError::UnknownToken(token.as_str().to_string()))?;
        resolved.push_str(&pattern[cursor..whole.start()]);
        resolved.push_str(&value);
        cursor = whole.end();
    }
    resolved.push_str(&pattern[cursor..]);

    let path = PathBuf::from(&resolved);
    let safe = path.components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe || path.components().next().is_none() {
        return Err(ConfigError::UnsafePath(resolved));
    }
    Ok(path)
}

/// Fold a character to its closest ASCII spelling, if there is one
fn transliterate(c: char) -> Option<&'static str> {
    let folded = match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' | 'ā' | 'ą' => "a",
        'æ' => "ae",
        'ç' | 'ć' | 'č' => "c",
        'ď' | 'đ' => "d",
        'è' | 'é' | 'ê' | 'ë' | 'ē' | 'ę' | 'ě' => "e",
        'ğ' => "g",
        'ì' | 'í' | 'î' | 'ï' | 'ī' | 'ı' => "i",
        'ł' | 'ľ' => "l",
        'ñ' | 'ń' | 'ň' => "n",
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' | 'ø' | 'ō' | 'ő' => "o",
        'œ' => "oe",
        'ř' => "r",
        'ś' | 'š' | 'ş' => "s",
        'ß' => "ss",
        'ť' | 'ţ' => "t",
        'ù' | 'ú' | 'û' | 'ü' | 'ū' | 'ů' | 'ű' => "u",
        'ý' | 'ÿ' => "y",
        'ź' | 'ż' | 'ž' => "z",
        'þ' => "th",
        _ => return None,
    };
    Some(folded)
}

/// Lowercase ASCII slug of `text`, at most `max_len` characters.
///
/// Latin letters with diacritics are folded to ASCII. Every run of other
/// characters, non-ASCII letters included, becomes a single hyphen.
pub fn slugify(text: &str, max_len: usize) -> String {
    let mut result = String::new();
    let mut last_was_dash = true; // Prevents leading dash

    for c in text.trim().chars().flat_map(char::to_lowercase) {
        if c.is_ascii_alphanumeric() {
            result.push(c);
            last_was_dash = false;
        } else if let Some(folded) = transliterate(c) {
            result.push_str(folded);
            last_was_dash = false;
        } else if !last_was_dash {
            result.push('-');
            last_was_dash = true;
        }
    }

    result.truncate(max_len);
    let trimmed = result.trim_matches('-');
    if trimmed.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `path` itself when free, otherwise the first free `path-2`, `path-3`, ...
pub fn unique_path(path: &Path) -> PathBuf {
    if !path.exists() {
        return path.to_path_buf();
    }

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_SLUG.to_string());
    (2..)
        .map(|n| path.with_file_name(format!("{}-{}", name, n)))
        .find(|candidate| !candidate.exists())
        .unwrap_or_else(|| path.to_path_buf())
}
