/*!
 * Extraction of translatable text segments from a document.
 *
 * A segment is a maximal run of adjacent inline siblings that contains
 * prose. Inline code, autolinks and inline HTML may sit inside a run; they are
 * replaced by numbered placeholders so a translator sees `Run ⟦0⟧ first` and
 * cannot alter the protected text. Links end a run and their labels become
 * runs of their own, so link destinations never enter a segment. Images end
 * a run as well; alt text is kept verbatim.
 */

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::document::{Document, NodeId, NodeKind};

pub const PLACEHOLDER_OPEN: char = '⟦';
pub const PLACEHOLDER_CLOSE: char = '⟧';

pub(crate) static PLACEHOLDER_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"⟦(\d+)⟧").expect("Invalid placeholder regex"));

/// Stable identifier of a segment within one document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub usize);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Location of a segment: children `start..end` of `parent`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePath {
    pub parent: NodeId,
    pub start: usize,
    pub end: usize,
}

/// A unit of translatable text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub id: SegmentId,
    /// Source text with protected spans replaced by placeholders
    pub text: String,
    pub path: NodePath,
    /// Protected inline nodes, indexed by placeholder number
    pub protected: Vec<NodeId>,
}

impl Segment {
    /// Size used for batching, in characters
    pub fn size(&self) -> usize {
        self.text.chars().count()
    }
}

/// Render the placeholder standing for protected span `index`
pub fn placeholder(index: usize) -> String {
    format!("{}{}{}", PLACEHOLDER_OPEN, index, PLACEHOLDER_CLOSE)
}

/// Whether `text` holds every placeholder `0..count` exactly once and no other
pub fn placeholders_intact(text: &str, count: usize) -> bool {
    let mut seen = vec![0usize; count];
    for caps in PLACEHOLDER_REGEX.captures_iter(text) {
        match caps[1].parse::<usize>() {
            Ok(index) if index < count => seen[index] += 1,
            _ => return false,
        }
    }
    seen.iter().all(|n| *n == 1)
}

/// Extract segments in document order.
///
/// Ids are assigned sequentially, so running the segmenter twice on the same
/// document yields identical output.
pub fn segment(doc: &Document) -> Vec<Segment> {
    let mut segments = Vec::new();
    for root in doc.roots() {
        if doc.kind(*root).holds_prose() {
            collect_runs(doc, *root, &mut segments);
        }
    }
    segments
}

#[derive(Default)]
struct Run {
    start: Option<usize>,
    text: String,
    protected: Vec<NodeId>,
}

impl Run {
    fn push_text(&mut self, index: usize, text: &str) {
        self.start.get_or_insert(index);
        self.text.push_str(text);
    }

    fn push_protected(&mut self, index: usize, id: NodeId) {
        self.start.get_or_insert(index);
        self.text.push_str(&placeholder(self.protected.len()));
        self.protected.push(id);
    }

    fn close(&mut self, parent: NodeId, end: usize, segments: &mut Vec<Segment>) {
        let run = std::mem::take(self);
        let Some(start) = run.start else {
            return;
        };
        // Runs without letters (pure punctuation, numbers, placeholders) stay as they are
        if !run.text.chars().any(char::is_alphabetic) {
            return;
        }
        segments.push(Segment {
            id: SegmentId(segments.len()),
            text: run.text,
            path: NodePath { parent, start, end },
            protected: run.protected,
        });
    }
}

fn collect_runs(doc: &Document, parent: NodeId, segments: &mut Vec<Segment>) {
    let children = doc.children(parent);
    let mut run = Run::default();

    for (index, child) in children.iter().enumerate() {
        match doc.kind(*child) {
            // Literal placeholder characters in the source would be confused
            // with real placeholders on the way back
            NodeKind::Text(text) if text.contains([PLACEHOLDER_OPEN, PLACEHOLDER_CLOSE]) => {
                run.close(parent, index, segments);
            }
            NodeKind::Text(text) => run.push_text(index, text),
            kind if kind.is_protected_inline() => run.push_protected(index, *child),
            NodeKind::Link { .. } => {
                run.close(parent, index, segments);
                collect_runs(doc, *child, segments);
            }
            _ => run.close(parent, index, segments),
        }
    }

    run.close(parent, children.len(), segments);
}
