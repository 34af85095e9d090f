//! Language utilities for target language codes
//!
//! Accepts ISO 639-1 (2-letter) and ISO 639-2 (3-letter) codes, optionally
//! followed by a region or script subtag (`zh-CN`, `pt_BR`, `zh-Hant`).

use anyhow::{Result, anyhow};
use isolang::Language;

/// ISO 639-2/B codes that differ from their 639-2/T form
const BIBLIOGRAPHIC_CODES: &[(&str, &str)] = &[
    ("alb", "sqi"),
    ("arm", "hye"),
    ("baq", "eus"),
    ("bur", "mya"),
    ("chi", "zho"),
    ("cze", "ces"),
    ("dut", "nld"),
    ("fre", "fra"),
    ("geo", "kat"),
    ("ger", "deu"),
    ("gre", "ell"),
    ("ice", "isl"),
    ("mac", "mkd"),
    ("may", "msa"),
    ("per", "fas"),
    ("rum", "ron"),
    ("slo", "slk"),
    ("wel", "cym"),
];

/// Language code type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LanguageCodeType {
    /// ISO 639-1 (2-letter) code
    Part1,
    /// ISO 639-2/T (3-letter) code
    Part2T,
    /// ISO 639-2/B (3-letter) code
    Part2B,
}

/// Split `zh-CN` into (`zh`, Some(`CN`))
fn split_subtag(code: &str) -> (String, Option<String>) {
    let trimmed = code.trim();
    match trimmed.split_once(['-', '_']) {
        Some((primary, subtag)) => (primary.to_lowercase(), Some(subtag.to_string())),
        None => (trimmed.to_lowercase(), None),
    }
}

fn terminology_code(bibliographic: &str) -> Option<&'static str> {
    BIBLIOGRAPHIC_CODES
        .iter()
        .find(|(b, _)| *b == bibliographic)
        .map(|(_, t)| *t)
}

fn lookup(primary: &str) -> Option<(Language, LanguageCodeType)> {
    match primary.len() {
        2 => Language::from_639_1(primary).map(|lang| (lang, LanguageCodeType::Part1)),
        3 => Language::from_639_3(primary)
            .map(|lang| (lang, LanguageCodeType::Part2T))
            .or_else(|| {
                terminology_code(primary)
                    .and_then(Language::from_639_3)
                    .map(|lang| (lang, LanguageCodeType::Part2B))
            }),
        _ => None,
    }
}

fn subtag_is_valid(subtag: &str) -> bool {
    (2..=8).contains(&subtag.len()) && subtag.chars().all(|c| c.is_ascii_alphanumeric())
}

/// Validate if a language code is a valid ISO 639-1 or ISO 639-2 code
pub fn validate_language_code(code: &str) -> Result<LanguageCodeType> {
    let (primary, subtag) = split_subtag(code);
    if let Some(subtag) = &subtag {
        if !subtag_is_valid(subtag) {
            return Err(anyhow!("Invalid language subtag in '{}'", code));
        }
    }
    lookup(&primary)
        .map(|(_, kind)| kind)
        .ok_or_else(|| anyhow!("Invalid language code: {}", code))
}

/// Normalize a language code to ISO 639-1 when one exists, else ISO 639-2/T.
///
/// Region subtags are kept: `ZH_cn` becomes `zh-CN`.
pub fn normalize_to_part1_or_part2t(code: &str) -> Result<String> {
    validate_language_code(code)?;
    let (primary, subtag) = split_subtag(code);
    let (lang, _) = lookup(&primary).ok_or_else(|| anyhow!("Cannot normalize invalid language code: {}", code))?;

    let base = lang
        .to_639_1()
        .map(str::to_string)
        .unwrap_or_else(|| lang.to_639_3().to_string());

    Ok(match subtag {
        Some(subtag) if subtag.len() == 2 => format!("{}-{}", base, subtag.to_uppercase()),
        Some(subtag) => format!("{}-{}", base, subtag),
        None => base,
    })
}

/// Check if two language codes name the same language, ignoring subtags
pub fn language_codes_match(code1: &str, code2: &str) -> bool {
    let (primary1, _) = split_subtag(code1);
    let (primary2, _) = split_subtag(code2);
    match (lookup(&primary1), lookup(&primary2)) {
        (Some((a, _)), Some((b, _))) => a == b,
        _ => false,
    }
}

/// English name of a language, used in translation prompts
pub fn get_language_name(code: &str) -> Result<String> {
    let (primary, subtag) = split_subtag(code);
    let (lang, _) = lookup(&primary).ok_or_else(|| anyhow!("Invalid language code: {}", code))?;

    Ok(match subtag {
        Some(subtag) => format!("{} ({})", lang.to_name(), subtag),
        None => lang.to_name().to_string(),
    })
}
