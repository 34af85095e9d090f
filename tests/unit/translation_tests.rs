/*!
 * Tests for segmenting, batching and reassembly
 */

use std::collections::HashMap;

use transflow::document::{parse, render};
use transflow::errors::ReassemblyError;
use transflow::translation::{Segment, SegmentId, batch, reassemble, segment};

use crate::common::SAMPLE_ARTICLE;

fn identity(segments: &[Segment]) -> HashMap<SegmentId, String> {
    segments.iter().map(|s| (s.id, s.text.clone())).collect()
}

/// Test that nothing protected ends up in a segment
#[test]
fn test_segment_sampleArticle_shouldExcludeProtectedContent() {
    let doc = parse(SAMPLE_ARTICLE).unwrap();
    let segments = segment(&doc);
    assert!(!segments.is_empty());

    for seg in &segments {
        for forbidden in ["https://", "println!", "cargo add", "<div", "Column", "title:"] {
            assert!(!seg.text.contains(forbidden), "segment {:?} leaked {}", seg.text, forbidden);
        }
    }

    let texts: Vec<&str> = segments.iter().map(|s| s.text.as_str()).collect();
    assert!(texts.contains(&"Getting Started with Widgets"));
    assert!(texts.contains(&"Thanks for reading!"));
    assert!(texts.iter().any(|t| t.contains("Install them with ⟦0⟧ first.")));
}

/// Test that identity reassembly reproduces the source exactly
#[test]
fn test_reassemble_withIdentityTranslation_shouldReproduceSource() {
    for input in [SAMPLE_ARTICLE, "# Hi\n\nA `b` c [d](e) f\n", "> one\n> two\n", "plain"] {
        let doc = parse(input).unwrap();
        let out = reassemble(&doc, &identity(&segment(&doc))).unwrap();
        assert_eq!(render(&out), input);
    }
}

/// Test that translations land in the right blocks and keep layout
#[test]
fn test_reassemble_shouldKeepPrefixesAndProtectedSpans() {
    let input = "- Run `make` now\n> Quote line\n";
    let doc = parse(input).unwrap();
    let segments = segment(&doc);
    assert_eq!(segments.len(), 2);

    let mut translations = HashMap::new();
    translations.insert(segments[0].id, "Lancez ⟦0⟧ maintenant".to_string());
    translations.insert(segments[1].id, "Ligne citée".to_string());

    let out = reassemble(&doc, &translations).unwrap();
    assert_eq!(render(&out), "- Lancez `make` maintenant\n> Ligne citée\n");
}

/// Test that a multi-line translation keeps the blockquote prefix on every line
#[test]
fn test_reassemble_multiLineQuote_shouldRepeatPrefix() {
    let doc = parse("> first\n> second\n").unwrap();
    let segments = segment(&doc);
    assert_eq!(segments.len(), 1);

    let mut translations = HashMap::new();
    translations.insert(segments[0].id, "premier\nsecond".to_string());
    let out = reassemble(&doc, &translations).unwrap();
    assert_eq!(render(&out), "> premier\n> second\n");
}

/// Test mismatch errors
#[test]
fn test_reassemble_withMismatchedTranslations_shouldFail() {
    let doc = parse("Use `x` here.\n\nSecond.\n").unwrap();
    let segments = segment(&doc);

    let mut translations = identity(&segments);
    translations.remove(&segments[1].id);
    assert_eq!(
        reassemble(&doc, &translations).unwrap_err(),
        ReassemblyError::MissingSegment(segments[1].id.0)
    );

    let mut translations = identity(&segments);
    translations.insert(segments[0].id, "Utilisez ici.".to_string());
    assert_eq!(
        reassemble(&doc, &translations).unwrap_err(),
        ReassemblyError::PlaceholderMismatch { id: segments[0].id.0 }
    );
}

/// Test the batching invariant across a range of limits
#[test]
fn test_batch_forAllLimits_shouldRespectCeilingAndOrder() {
    let doc = parse(SAMPLE_ARTICLE).unwrap();
    let segments = segment(&doc);
    let sizes: HashMap<SegmentId, usize> = segments.iter().map(|s| (s.id, s.size())).collect();
    let order: Vec<SegmentId> = segments.iter().map(|s| s.id).collect();

    for limit in [1, 5, 10, 20, 40, 80, 1000] {
        let batches = batch(&segments, limit);
        let flattened: Vec<SegmentId> = batches.iter().flat_map(|b| b.segment_ids.clone()).collect();
        assert_eq!(flattened, order, "order broken for limit {}", limit);

        for b in &batches {
            let total: usize = b.segment_ids.iter().map(|id| sizes[id]).sum();
            assert_eq!(total, b.size);
            assert!(total <= limit || b.len() == 1, "batch {:?} exceeds {}", b, limit);
        }
    }
}
