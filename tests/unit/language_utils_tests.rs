/*!
 * Tests for language code utilities
 */

use transflow::language_utils::{
    LanguageCodeType, get_language_name, language_codes_match, normalize_to_part1_or_part2t, validate_language_code,
};

/// Test validation of the supported code forms
#[test]
fn test_validate_language_code_withSupportedForms_shouldReturnType() {
    assert_eq!(validate_language_code("en").unwrap(), LanguageCodeType::Part1);
    assert_eq!(validate_language_code("FR").unwrap(), LanguageCodeType::Part1);
    assert_eq!(validate_language_code("deu").unwrap(), LanguageCodeType::Part2T);
    assert_eq!(validate_language_code("ger").unwrap(), LanguageCodeType::Part2B);
    assert_eq!(validate_language_code("zh-Hant").unwrap(), LanguageCodeType::Part1);
}

/// Test rejection of malformed codes
#[test]
fn test_validate_language_code_withInvalidCodes_shouldFail() {
    for code in ["", "e", "english", "zz", "en-", "en-!!", "zh-CN-extra-long-tag"] {
        assert!(validate_language_code(code).is_err(), "{} should be rejected", code);
    }
}

/// Test normalization prefers the two-letter form and keeps region subtags
#[test]
fn test_normalize_to_part1_or_part2t() {
    assert_eq!(normalize_to_part1_or_part2t("fra").unwrap(), "fr");
    assert_eq!(normalize_to_part1_or_part2t("chi").unwrap(), "zh");
    assert_eq!(normalize_to_part1_or_part2t("pt_br").unwrap(), "pt-BR");
    assert_eq!(normalize_to_part1_or_part2t("zh-Hans").unwrap(), "zh-Hans");
    assert!(normalize_to_part1_or_part2t("xx").is_err());
}

/// Test matching across code forms
#[test]
fn test_language_codes_match_acrossForms() {
    assert!(language_codes_match("de", "ger"));
    assert!(language_codes_match("zh-CN", "zho"));
    assert!(!language_codes_match("en", "fr"));
    assert!(!language_codes_match("xx", "xx"));
}

/// Test English names used in prompts
#[test]
fn test_get_language_name() {
    assert_eq!(get_language_name("ja").unwrap(), "Japanese");
    assert_eq!(get_language_name("pt-BR").unwrap(), "Portuguese (BR)");
    assert!(get_language_name("xx-BR").is_err());
}
