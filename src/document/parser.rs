/*!
 * Markdown block parser built on pulldown-cmark.
 *
 * pulldown-cmark decides the block and inline structure. The byte ranges of
 * its events are mapped back onto source lines so every node keeps the text
 * it came from:
 *
 * - Prose leaves (paragraphs, headings, the text of list items and
 *   blockquotes) become nodes with inline children. A leaf nested in lists
 *   or quotes is its own node; the container markers of each of its lines
 *   live in the node's `LineLayout`.
 * - Top-level code and HTML blocks keep their literal.
 * - Every other line (thematic breaks, tables, link reference definitions,
 *   code nested in containers) is emitted verbatim as `Raw` or `Blank`.
 *
 * Parsing never fails on odd Markdown. The only hard failure is input that
 * is not UTF-8.
 */

use std::ops::Range;

use log::trace;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

use crate::document::frontmatter;
use crate::document::inline::{BlockContent, build_inline};
use crate::document::model::{Document, LineLayout, NodeKind};
use crate::errors::ParseError;

/// One source line split into content and terminator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Line<'a> {
    /// Byte offset of the line in the text it was split from
    pub start: usize,
    full: &'a str,
    pub body: &'a str,
    pub eol: &'a str,
}

impl<'a> Line<'a> {
    /// The line exactly as it appears in the source, terminator included
    pub fn raw(&self) -> &'a str {
        self.full
    }

    fn body_end(&self) -> usize {
        self.start + self.body.len()
    }

    fn end(&self) -> usize {
        self.start + self.full.len()
    }

    fn is_blank(&self) -> bool {
        self.body.trim().is_empty()
    }
}

pub(crate) fn split_lines(input: &str) -> Vec<Line<'_>> {
    let mut start = 0;
    input
        .split_inclusive('\n')
        .map(|full| {
            let body_len = if full.ends_with("\r\n") {
                full.len() - 2
            } else if full.ends_with('\n') {
                full.len() - 1
            } else {
                full.len()
            };
            let line = Line {
                start,
                full,
                body: &full[..body_len],
                eol: &full[body_len..],
            };
            start += full.len();
            line
        })
        .collect()
}

fn markdown_options() -> Options {
    Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH | Options::ENABLE_TASKLISTS
}

/// Parse UTF-8 Markdown text into a document tree
pub fn parse(input: &str) -> Result<Document, ParseError> {
    let mut doc = Document::new();

    let lines = split_lines(input);
    let mut body_start = 0;
    if let Some((fm, consumed)) = frontmatter::split(&lines) {
        body_start = lines.get(consumed).map_or(input.len(), |line| line.start);
        doc.frontmatter = Some(fm);
    }

    let body = &input[body_start..];
    let table = LineTable {
        source: body,
        lines: split_lines(body),
    };

    let units = Walker::new(&table).run();
    trace!("Parsed {} lines into {} structural units", table.lines.len(), units.len());
    assemble(&mut doc, &table, units);

    Ok(doc)
}

/// Parse raw bytes, rejecting anything that is not UTF-8
pub fn parse_bytes(bytes: &[u8]) -> Result<Document, ParseError> {
    let text = std::str::from_utf8(bytes).map_err(|e| ParseError::InvalidUtf8 {
        offset: e.valid_up_to(),
    })?;
    parse(text)
}

struct LineTable<'a> {
    source: &'a str,
    lines: Vec<Line<'a>>,
}

impl<'a> LineTable<'a> {
    /// Index of the line holding byte `offset`
    fn line_of(&self, offset: usize) -> usize {
        self.lines
            .partition_point(|line| line.start <= offset)
            .saturating_sub(1)
    }

    /// Lines touched by a non-empty byte range, as an inclusive pair
    fn lines_of(&self, range: &Range<usize>) -> (usize, usize) {
        let first = self.line_of(range.start);
        let last = self.line_of(range.end.saturating_sub(1).max(range.start));
        (first, last.max(first))
    }

    /// Source text of lines `first..=last`
    fn text(&self, first: usize, last: usize) -> &'a str {
        &self.source[self.lines[first].start..self.lines[last].end()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Quote,
    Item,
}

/// Open block-level element while walking the event stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Frame {
    Container(Container),
    Leaf,
    Other,
}

/// A block whose inline events make up one prose node
struct Leaf<'a> {
    heading: Option<u8>,
    /// Innermost list item or blockquote around the leaf
    container: Option<Container>,
    in_quote: bool,
    /// Text directly inside a tight list item, closed by the next block event
    implicit: bool,
    block: Option<Range<usize>>,
    events: Vec<(Event<'a>, Range<usize>)>,
}

/// Prose node ready to be allocated, with its inline events
struct Prose<'a> {
    heading: Option<u8>,
    container: Option<Container>,
    layout: LineLayout,
    underline: Option<String>,
    content: BlockContent,
    events: Vec<(Event<'a>, Range<usize>)>,
}

enum UnitKind<'a> {
    Prose(Box<Prose<'a>>),
    Code { language: String },
    Html,
    Raw,
}

/// Lines `first..=last` of the body claimed by one node
struct Unit<'a> {
    first: usize,
    last: usize,
    kind: UnitKind<'a>,
}

fn heading_level(level: HeadingLevel) -> u8 {
    match level {
        HeadingLevel::H1 => 1,
        HeadingLevel::H2 => 2,
        HeadingLevel::H3 => 3,
        HeadingLevel::H4 => 4,
        HeadingLevel::H5 => 5,
        HeadingLevel::H6 => 6,
    }
}

/// Events that belong to the inline content of a leaf
fn is_inline(event: &Event<'_>) -> bool {
    match event {
        Event::Start(tag) => matches!(
            tag,
            Tag::Emphasis | Tag::Strong | Tag::Strikethrough | Tag::Link { .. } | Tag::Image { .. }
        ),
        Event::End(tag) => matches!(
            tag,
            TagEnd::Emphasis | TagEnd::Strong | TagEnd::Strikethrough | TagEnd::Link | TagEnd::Image
        ),
        Event::Rule => false,
        _ => true,
    }
}

struct Walker<'a, 't> {
    table: &'t LineTable<'a>,
    frames: Vec<Frame>,
    leaf: Option<Leaf<'a>>,
    units: Vec<Unit<'a>>,
}

impl<'a, 't> Walker<'a, 't> {
    fn new(table: &'t LineTable<'a>) -> Self {
        Self {
            table,
            frames: Vec::new(),
            leaf: None,
            units: Vec::new(),
        }
    }

    fn run(mut self) -> Vec<Unit<'a>> {
        let parser = Parser::new_ext(self.table.source, markdown_options());
        for (event, range) in parser.into_offset_iter() {
            if is_inline(&event) {
                self.inline(event, range);
                continue;
            }
            match event {
                Event::Start(tag) => self.open_block(tag, range),
                Event::End(_) => self.close_block(),
                Event::Rule => {
                    self.close_implicit();
                    if self.frames.is_empty() {
                        self.push_verbatim(UnitKind::Raw, &range);
                    }
                }
                _ => {}
            }
        }
        self.close_implicit();

        self.units.sort_by_key(|unit| unit.first);
        self.units
    }

    fn new_leaf(&self, heading: Option<u8>, block: Option<Range<usize>>, implicit: bool) -> Leaf<'a> {
        let container = self.frames.iter().rev().find_map(|frame| match frame {
            Frame::Container(container) => Some(*container),
            _ => None,
        });
        Leaf {
            heading,
            container,
            in_quote: self.frames.contains(&Frame::Container(Container::Quote)),
            implicit,
            block,
            events: Vec::new(),
        }
    }

    fn inline(&mut self, event: Event<'a>, range: Range<usize>) {
        if self.leaf.is_none() && self.frames.last() == Some(&Frame::Container(Container::Item)) {
            self.leaf = Some(self.new_leaf(None, None, true));
        }
        // Text of code blocks, HTML blocks and table cells is never prose
        if let Some(leaf) = self.leaf.as_mut() {
            leaf.events.push((event, range));
        }
    }

    fn open_block(&mut self, tag: Tag<'a>, range: Range<usize>) {
        self.close_implicit();
        let top_level = self.frames.is_empty();

        let frame = match tag {
            Tag::Paragraph => {
                self.leaf = Some(self.new_leaf(None, Some(range), false));
                Frame::Leaf
            }
            Tag::Heading { level, .. } => {
                self.leaf = Some(self.new_leaf(Some(heading_level(level)), Some(range), false));
                Frame::Leaf
            }
            Tag::BlockQuote(_) => Frame::Container(Container::Quote),
            Tag::Item => Frame::Container(Container::Item),
            Tag::List(_) => Frame::Other,
            Tag::CodeBlock(kind) => {
                if top_level {
                    let language = match kind {
                        CodeBlockKind::Fenced(info) => info.split_whitespace().next().unwrap_or_default().to_string(),
                        CodeBlockKind::Indented => String::new(),
                    };
                    self.push_verbatim(UnitKind::Code { language }, &range);
                }
                Frame::Other
            }
            Tag::HtmlBlock => {
                if top_level {
                    self.push_verbatim(UnitKind::Html, &range);
                }
                Frame::Other
            }
            _ => {
                if top_level {
                    self.push_verbatim(UnitKind::Raw, &range);
                }
                Frame::Other
            }
        };
        self.frames.push(frame);
    }

    fn close_block(&mut self) {
        self.close_implicit();
        if self.frames.pop() == Some(Frame::Leaf) {
            if let Some(leaf) = self.leaf.take() {
                self.finish_leaf(leaf);
            }
        }
    }

    fn close_implicit(&mut self) {
        if self.leaf.as_ref().is_some_and(|leaf| leaf.implicit) {
            if let Some(leaf) = self.leaf.take() {
                self.finish_leaf(leaf);
            }
        }
    }

    fn push_verbatim(&mut self, kind: UnitKind<'a>, range: &Range<usize>) {
        if self.table.lines.is_empty() {
            return;
        }
        let (first, last) = self.table.lines_of(range);
        self.units.push(Unit { first, last, kind });
    }

    fn finish_leaf(&mut self, leaf: Leaf<'a>) {
        if let Some(unit) = prepare_prose(self.table, leaf) {
            self.units.push(unit);
        }
    }
}

/// Where the prose of a leaf starts and ends in the source
fn content_bounds(table: &LineTable<'_>, leaf: &Leaf<'_>) -> Option<(usize, usize)> {
    let mut ranges = leaf
        .events
        .iter()
        .filter(|(event, _)| !matches!(event, Event::End(_) | Event::TaskListMarker(_)))
        .map(|(_, range)| range);

    if let Some(first) = ranges.next() {
        let (start, end) = ranges.fold((first.start, first.end), |(s, e), r| (s.min(r.start), e.max(r.end)));
        return Some((start, end));
    }

    // An empty heading or task item: the whole line is prefix
    let anchor = leaf
        .block
        .as_ref()
        .map(|block| block.start)
        .or_else(|| leaf.events.first().map(|(_, range)| range.start))?;
    let end = table.lines.get(table.line_of(anchor))?.body_end();
    Some((end, end))
}

/// Offset where the content of a continuation line starts when no inline
/// event begins on it: after the indentation and, inside quotes, the `>`s
fn fallback_content_start(line: &Line<'_>, in_quote: bool) -> usize {
    let rest = line
        .body
        .trim_start_matches(|c: char| c == ' ' || c == '\t' || (in_quote && c == '>'));
    line.body_end() - rest.len()
}

/// Prefix used for lines a translation adds beyond the source ones
fn continuation_for(first_prefix: &str, heading: bool) -> String {
    if heading {
        return first_prefix.to_string();
    }
    first_prefix
        .chars()
        .map(|c| if c == '>' || c.is_whitespace() { c } else { ' ' })
        .collect()
}

fn prepare_prose<'a>(table: &LineTable<'a>, leaf: Leaf<'a>) -> Option<Unit<'a>> {
    let (content_start, content_end) = content_bounds(table, &leaf)?;
    let first = table.line_of(content_start);
    let last = if content_end > content_start { table.line_of(content_end - 1) } else { first };
    let lines = &table.lines;

    // Content may not swallow the last line's terminator
    let content_end = content_end.min(lines[last].body_end());
    let content_end = if first == last { content_end.max(content_start) } else { content_end };

    let mut line_starts: Vec<Option<usize>> = vec![None; last - first + 1];
    for (event, range) in &leaf.events {
        if matches!(event, Event::End(_) | Event::TaskListMarker(_)) {
            continue;
        }
        let line = table.line_of(range.start);
        if line > first && line <= last {
            let slot = &mut line_starts[line - first];
            *slot = Some(slot.map_or(range.start, |s| s.min(range.start)));
        }
    }

    let mut prefixes = Vec::with_capacity(last - first + 1);
    let mut content = BlockContent::default();
    let mut tail = content_end;
    for index in first..=last {
        let line = &lines[index];
        let start = if index == first {
            content_start
        } else {
            line_starts[index - first]
                .unwrap_or_else(|| fallback_content_start(line, leaf.in_quote))
                .clamp(line.start, line.body_end())
        };
        let end = if index == last { content_end.max(start) } else { line.end() };
        prefixes.push(table.source[line.start..start].to_string());
        content.push(table.source, start..end);
        tail = end;
    }

    let suffix = table.source[tail..lines[last].body_end()].to_string();
    let continuation = continuation_for(&prefixes[0], leaf.heading.is_some());
    let layout = LineLayout::new(prefixes, continuation, lines[last].eol).with_suffix(suffix);

    // Setext underline: heading lines past the content
    let block_last = leaf
        .block
        .as_ref()
        .map_or(last, |block| table.lines_of(block).1)
        .max(last);
    let underline = (leaf.heading.is_some() && block_last > last).then(|| table.text(last + 1, block_last).to_string());
    let unit_last = if underline.is_some() { block_last } else { last };

    Some(Unit {
        first,
        last: unit_last,
        kind: UnitKind::Prose(Box::new(Prose {
            heading: leaf.heading,
            container: leaf.container,
            layout,
            underline,
            content,
            events: leaf.events,
        })),
    })
}

/// Allocate nodes for the units in line order and fill the lines between
/// them with `Blank` and `Raw` nodes
fn assemble(doc: &mut Document, table: &LineTable<'_>, units: Vec<Unit<'_>>) {
    let mut next_line = 0;
    for unit in units {
        if unit.first < next_line {
            trace!("Skipping unit at line {} overlapping earlier content", unit.first);
            continue;
        }
        push_gap(doc, table, next_line, unit.first);
        next_line = unit.last + 1;

        let kind = match unit.kind {
            UnitKind::Prose(prose) => {
                let prose = *prose;
                let children = build_inline(doc, table.source, &prose.content, &prose.events);
                let kind = match (prose.heading, prose.container) {
                    (Some(level), _) => NodeKind::Heading {
                        level,
                        layout: prose.layout,
                        underline: prose.underline,
                    },
                    (None, Some(Container::Quote)) => NodeKind::Blockquote { layout: prose.layout },
                    (None, Some(Container::Item)) => NodeKind::ListItem { layout: prose.layout },
                    (None, None) => NodeKind::Paragraph { layout: prose.layout },
                };
                let id = doc.add_node(kind, children);
                doc.push_root(id);
                continue;
            }
            UnitKind::Code { language } => NodeKind::CodeBlock {
                language,
                literal: table.text(unit.first, unit.last).to_string(),
            },
            UnitKind::Html => NodeKind::HtmlBlock {
                literal: table.text(unit.first, unit.last).to_string(),
            },
            UnitKind::Raw => NodeKind::Raw {
                literal: table.text(unit.first, unit.last).to_string(),
            },
        };
        let id = doc.add_node(kind, vec![]);
        doc.push_root(id);
    }
    push_gap(doc, table, next_line, table.lines.len());
}

/// Lines `from..to` that no node claimed, grouped into blank and raw runs
fn push_gap(doc: &mut Document, table: &LineTable<'_>, from: usize, to: usize) {
    let mut start = from;
    while start < to {
        let blank = table.lines[start].is_blank();
        let mut end = start + 1;
        while end < to && table.lines[end].is_blank() == blank {
            end += 1;
        }
        let literal = table.text(start, end - 1).to_string();
        let kind = if blank { NodeKind::Blank { literal } } else { NodeKind::Raw { literal } };
        let id = doc.add_node(kind, vec![]);
        doc.push_root(id);
        start = end;
    }
}
