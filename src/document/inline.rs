/*!
 * Inline structure of prose blocks.
 *
 * pulldown-cmark reports where code spans, links, images, autolinks and
 * inline HTML start and end. Those ranges are mapped from the source onto
 * the block's content (its lines with container prefixes removed) and cut
 * the content into nodes. Everything between them, emphasis markers and
 * escapes included, stays in plain text runs, so the rendered nodes always
 * concatenate back to the content unchanged. Bare `http(s)://` URLs are not
 * links in CommonMark and are picked out of the text runs separately.
 */

use std::ops::Range;

use once_cell::sync::Lazy;
use pulldown_cmark::{Event, LinkType, Tag};
use regex::Regex;

use crate::document::model::{Document, NodeId, NodeKind};

static BARE_URL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i:https?://)[^\s<>`]+").expect("Invalid bare url regex"));

/// A run of source text copied into a block's content
#[derive(Debug, Clone, Copy)]
struct Piece {
    source: usize,
    content: usize,
    len: usize,
}

/// Text of a prose block without its line prefixes, and where each piece of
/// it came from in the source
#[derive(Debug, Default)]
pub(crate) struct BlockContent {
    pub text: String,
    pieces: Vec<Piece>,
}

impl BlockContent {
    /// Append `source[range]` to the content
    pub fn push(&mut self, source: &str, range: Range<usize>) {
        self.pieces.push(Piece {
            source: range.start,
            content: self.text.len(),
            len: range.len(),
        });
        self.text.push_str(&source[range]);
    }

    /// Content offset of a source offset. Offsets inside a stripped prefix
    /// land on the start of the following piece.
    fn offset(&self, source: usize) -> usize {
        for piece in &self.pieces {
            if source < piece.source {
                return piece.content;
            }
            if source <= piece.source + piece.len {
                return piece.content + (source - piece.source);
            }
        }
        self.text.len()
    }

    fn range(&self, source: &Range<usize>) -> Range<usize> {
        self.offset(source.start)..self.offset(source.end)
    }
}

#[derive(Debug)]
enum SpanKind {
    Code,
    Html,
    Autolink,
    Link { label: Range<usize> },
    Image { label: Range<usize> },
}

/// A protected or structural inline construct, in content offsets
#[derive(Debug)]
struct Span {
    range: Range<usize>,
    kind: SpanKind,
    children: Vec<Span>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Link,
    Image,
    Autolink,
}

/// An open link or image while walking the events, in source offsets
struct Frame {
    kind: FrameKind,
    range: Range<usize>,
    /// End of the furthest event seen inside the label
    child_end: usize,
    children: Vec<Span>,
}

fn frame_kind(tag: &Tag<'_>) -> Option<FrameKind> {
    match tag {
        Tag::Link { link_type, .. } => match link_type {
            LinkType::Inline => Some(FrameKind::Link),
            LinkType::Autolink | LinkType::Email => Some(FrameKind::Autolink),
            _ => None,
        },
        Tag::Image {
            link_type: LinkType::Inline,
            ..
        } => Some(FrameKind::Image),
        _ => None,
    }
}

/// Build the inline nodes of a prose block from the pulldown-cmark events of
/// its leaf.
pub(crate) fn build_inline(
    doc: &mut Document,
    source: &str,
    content: &BlockContent,
    events: &[(Event<'_>, Range<usize>)],
) -> Vec<NodeId> {
    let spans = collect_spans(source, content, events);
    emit(doc, &content.text, 0..content.text.len(), spans)
}

fn collect_spans(source: &str, content: &BlockContent, events: &[(Event<'_>, Range<usize>)]) -> Vec<Span> {
    let mut root = Vec::new();
    let mut frames: Vec<Frame> = Vec::new();
    // One entry per open inline tag: whether it opened a frame
    let mut opened: Vec<bool> = Vec::new();

    for (event, range) in events {
        if !matches!(event, Event::End(_)) {
            if let Some(top) = frames.last_mut() {
                top.child_end = top.child_end.max(range.end);
            }
        }

        match event {
            Event::Start(tag) => match frame_kind(tag) {
                Some(kind) => {
                    let label_start = match kind {
                        FrameKind::Link => range.start + 1,
                        FrameKind::Image => range.start + 2,
                        FrameKind::Autolink => range.start,
                    };
                    frames.push(Frame {
                        kind,
                        range: range.clone(),
                        child_end: label_start,
                        children: Vec::new(),
                    });
                    opened.push(true);
                }
                None => opened.push(false),
            },
            Event::End(_) => {
                if opened.pop() == Some(true) {
                    if let Some(frame) = frames.pop() {
                        let finished = finish_frame(source, content, frame);
                        match frames.last_mut() {
                            Some(parent) => parent.children.extend(finished),
                            None => root.extend(finished),
                        }
                    }
                }
            }
            Event::Code(_) | Event::InlineHtml(_) | Event::Html(_) => {
                let span = Span {
                    range: content.range(range),
                    kind: if matches!(event, Event::Code(_)) { SpanKind::Code } else { SpanKind::Html },
                    children: Vec::new(),
                };
                match frames.last_mut() {
                    Some(parent) => parent.children.push(span),
                    None => root.push(span),
                }
            }
            _ => {}
        }
    }

    // Frames left open by a truncated event stream give up their structure
    while let Some(frame) = frames.pop() {
        match frames.last_mut() {
            Some(parent) => parent.children.extend(frame.children),
            None => root.extend(frame.children),
        }
    }

    root
}

/// Turn a closed frame into a span, or hand its children to the parent when
/// the source does not have the expected `[label](destination)` shape
fn finish_frame(source: &str, content: &BlockContent, frame: Frame) -> Vec<Span> {
    let range = frame.range;
    if frame.kind == FrameKind::Autolink {
        // The span always includes its angle brackets
        let start = if source[..range.start].ends_with('<') { range.start - 1 } else { range.start };
        let end = if source[range.end..].starts_with('>') { range.end + 1 } else { range.end };
        return vec![Span {
            range: content.range(&(start..end)),
            kind: SpanKind::Autolink,
            children: Vec::new(),
        }];
    }

    let search_from = frame.child_end.min(range.end);
    let label_end = source[search_from..range.end].find("](").map(|pos| search_from + pos);
    let closed = source[..range.end].ends_with(')');
    let Some(label_end) = label_end.filter(|_| closed) else {
        return frame.children;
    };

    let label_start = if frame.kind == FrameKind::Image { range.start + 2 } else { range.start + 1 };
    let label = content.offset(label_start)..content.offset(label_end);
    match frame.kind {
        FrameKind::Image => vec![Span {
            range: content.range(&range),
            kind: SpanKind::Image { label },
            children: Vec::new(),
        }],
        _ => vec![Span {
            range: content.range(&range),
            kind: SpanKind::Link { label },
            children: frame.children,
        }],
    }
}

/// Split `(destination rest)` into the destination and everything after it
fn split_destination(inner: &str) -> (&str, bool, &str) {
    if let Some(after) = inner.strip_prefix('<') {
        if let Some(gt) = after.find('>') {
            return (&after[..gt], true, &after[gt + 1..]);
        }
    }

    let bytes = inner.as_bytes();
    let mut depth = 0usize;
    let mut end = bytes.len();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => {
                i += 2;
                continue;
            }
            b'(' => depth += 1,
            b')' if depth == 0 => {
                end = i;
                break;
            }
            b')' => depth -= 1,
            b if b.is_ascii_whitespace() => {
                end = i;
                break;
            }
            _ => {}
        }
        i += 1;
    }
    (&inner[..end], false, &inner[end..])
}

fn emit(doc: &mut Document, text: &str, bounds: Range<usize>, spans: Vec<Span>) -> Vec<NodeId> {
    let mut nodes = Vec::new();
    let mut cursor = bounds.start;

    for span in spans {
        let range = span.range.clone();
        if range.start < cursor || range.end > bounds.end || range.start >= range.end {
            continue;
        }
        push_text(doc, &text[cursor..range.start], &mut nodes);
        cursor = range.end;

        let literal = text[range.clone()].to_string();
        let kind = match span.kind {
            SpanKind::Code => NodeKind::InlineCode { literal },
            SpanKind::Html => NodeKind::InlineHtml { literal },
            SpanKind::Autolink => NodeKind::Autolink { literal },
            SpanKind::Link { label } | SpanKind::Image { label }
                if label.end + 2 > range.end - 1 || label.start > label.end =>
            {
                push_text(doc, &literal, &mut nodes);
                continue;
            }
            SpanKind::Link { label } => {
                let (url, bracketed, rest) = split_destination(&text[label.end + 2..range.end - 1]);
                let (url, rest) = (url.to_string(), rest.to_string());
                let children = emit(doc, text, label, span.children);
                nodes.push(doc.add_node(NodeKind::Link { url, bracketed, rest }, children));
                continue;
            }
            SpanKind::Image { label } => {
                let (url, bracketed, rest) = split_destination(&text[label.end + 2..range.end - 1]);
                NodeKind::Image {
                    url: url.to_string(),
                    alt: text[label].to_string(),
                    bracketed,
                    rest: rest.to_string(),
                }
            }
        };
        nodes.push(doc.add_node(kind, vec![]));
    }

    push_text(doc, &text[cursor..bounds.end], &mut nodes);
    nodes
}

/// Push a text run, splitting out bare URLs as autolinks
fn push_text(doc: &mut Document, text: &str, nodes: &mut Vec<NodeId>) {
    let mut start = 0;
    for found in BARE_URL.find_iter(text) {
        if found.start() < start || !at_word_start(text, found.start()) {
            continue;
        }
        let Some(len) = trimmed_url_len(found.as_str()) else {
            continue;
        };
        if start < found.start() {
            nodes.push(doc.add_node(NodeKind::Text(text[start..found.start()].to_string()), vec![]));
        }
        let end = found.start() + len;
        nodes.push(doc.add_node(
            NodeKind::Autolink {
                literal: text[found.start()..end].to_string(),
            },
            vec![],
        ));
        start = end;
    }
    if start < text.len() {
        nodes.push(doc.add_node(NodeKind::Text(text[start..].to_string()), vec![]));
    }
}

fn at_word_start(text: &str, i: usize) -> bool {
    text[..i]
        .chars()
        .next_back()
        .is_none_or(|c| !c.is_alphanumeric())
}

/// Length of a bare URL once trailing punctuation is dropped
fn trimmed_url_len(found: &str) -> Option<usize> {
    let mut url = found;
    while let Some(last) = url.chars().next_back() {
        let unbalanced_paren = last == ')' && url.matches(')').count() > url.matches('(').count();
        if ".,;:!?'\"*_~".contains(last) || unbalanced_paren {
            url = &url[..url.len() - last.len_utf8()];
        } else {
            break;
        }
    }
    let scheme_len = if url.len() >= 8 && url[..8].eq_ignore_ascii_case("https://") { 8 } else { 7 };
    (url.len() > scheme_len).then_some(url.len())
}
