/*!
 * Merging translated segment text back into a document tree.
 */

use std::collections::{HashMap, HashSet};

use log::debug;

use crate::document::{Document, NodeId, NodeKind};
use crate::errors::ReassemblyError;
use crate::translation::segmenter::{PLACEHOLDER_REGEX, Segment, SegmentId, placeholders_intact, segment};

/// Build a translated copy of `doc`.
///
/// The segments are recomputed from `doc`; `translations` must hold exactly
/// one entry per segment id. Every node outside a segment is carried over
/// unchanged, and every protected span comes back at the position its
/// placeholder takes in the translated text.
pub fn reassemble(doc: &Document, translations: &HashMap<SegmentId, String>) -> Result<Document, ReassemblyError> {
    let segments = segment(doc);

    let known: HashSet<SegmentId> = segments.iter().map(|s| s.id).collect();
    if let Some(unknown) = translations.keys().filter(|id| !known.contains(*id)).min() {
        return Err(ReassemblyError::UnknownSegment(unknown.0));
    }

    let mut output = doc.clone();

    // Later segments first, so splicing never shifts the indices of an
    // earlier segment sharing the same parent
    for seg in segments.iter().rev() {
        let translated = translations
            .get(&seg.id)
            .ok_or(ReassemblyError::MissingSegment(seg.id.0))?;
        splice(&mut output, seg, translated)?;
    }

    debug!("Reassembled {} segments", segments.len());
    Ok(output)
}

fn splice(doc: &mut Document, seg: &Segment, translated: &str) -> Result<(), ReassemblyError> {
    if !placeholders_intact(translated, seg.protected.len()) {
        return Err(ReassemblyError::PlaceholderMismatch { id: seg.id.0 });
    }

    let path = seg.path;
    if path.parent.index() >= doc.arena_len()
        || path.start > path.end
        || path.end > doc.children(path.parent).len()
    {
        return Err(ReassemblyError::InvalidPath { id: seg.id.0 });
    }

    let mut replacement: Vec<NodeId> = Vec::new();
    let mut cursor = 0;
    for caps in PLACEHOLDER_REGEX.captures_iter(translated) {
        let (Some(whole), Ok(index)) = (caps.get(0), caps[1].parse::<usize>()) else {
            return Err(ReassemblyError::PlaceholderMismatch { id: seg.id.0 });
        };
        if whole.start() > cursor {
            replacement.push(doc.add_node(NodeKind::Text(translated[cursor..whole.start()].to_string()), vec![]));
        }
        replacement.push(seg.protected[index]);
        cursor = whole.end();
    }
    if cursor < translated.len() {
        replacement.push(doc.add_node(NodeKind::Text(translated[cursor..].to_string()), vec![]));
    }

    doc.children_mut(path.parent).splice(path.start..path.end, replacement);
    Ok(())
}
