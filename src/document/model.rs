/*!
 * Arena-backed Markdown document tree.
 *
 * Nodes live in a flat `Vec` and refer to their children by index. A node
 * is reachable from exactly one parent (or from the root list), so cloning a
 * document is a plain `Vec` clone and no node can ever point back up the tree.
 *
 * Every node keeps the raw syntax it was parsed from (list markers, quote
 * prefixes, fences, link titles, line terminators), which is what lets
 * `render(parse(text)) == text` hold for any input.
 */

use std::collections::BTreeMap;

/// Index of a node inside its document's arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in the arena
    pub fn index(self) -> usize {
        self.0
    }
}

/// Per-line prefixes of a block that holds inline content.
///
/// The inline children of a block see the block's text with these prefixes
/// stripped: a two-line blockquote `> a\n> b` has inline content `a\nb` and
/// prefixes `["> ", "> "]`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LineLayout {
    /// Prefix of each source line, in order
    pub prefixes: Vec<String>,
    /// Prefix used for lines beyond the ones present in the source
    pub continuation: String,
    /// Text after the inline content on the last line: trailing whitespace
    /// or the closing `#` sequence of an ATX heading
    pub suffix: String,
    /// Terminator of the block's last line (`"\n"`, `"\r\n"` or empty at EOF)
    pub eol: String,
}

impl LineLayout {
    pub fn new(prefixes: Vec<String>, continuation: impl Into<String>, eol: impl Into<String>) -> Self {
        Self {
            prefixes,
            continuation: continuation.into(),
            suffix: String::new(),
            eol: eol.into(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    /// Prefix to emit before the given content line
    pub fn prefix_for(&self, line: usize) -> &str {
        self.prefixes
            .get(line)
            .map(String::as_str)
            .unwrap_or(&self.continuation)
    }
}

/// Closed set of node kinds.
///
/// Block kinds own inline children only when they hold prose (paragraph,
/// heading, list item, blockquote). Everything carrying a `literal` is
/// emitted verbatim by the renderer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Paragraph {
        layout: LineLayout,
    },
    Heading {
        level: u8,
        layout: LineLayout,
        /// Underline line (with its terminator) of setext headings
        underline: Option<String>,
    },
    ListItem {
        layout: LineLayout,
    },
    Blockquote {
        layout: LineLayout,
    },
    CodeBlock {
        language: String,
        literal: String,
    },
    HtmlBlock {
        literal: String,
    },
    /// Block the parser keeps verbatim: thematic breaks, tables, link
    /// reference definitions, containers with nested block syntax
    Raw {
        literal: String,
    },
    /// Run of blank lines between blocks
    Blank {
        literal: String,
    },
    Text(String),
    InlineCode {
        literal: String,
    },
    /// `<scheme:...>` autolinks and bare `http(s)://` URLs
    Autolink {
        literal: String,
    },
    InlineHtml {
        literal: String,
    },
    Link {
        url: String,
        /// Destination was written as `<url>`
        bracketed: bool,
        /// Everything between the destination and the closing `)`, e.g. a title
        rest: String,
    },
    Image {
        url: String,
        /// Raw alt text between `![` and `]`
        alt: String,
        bracketed: bool,
        rest: String,
    },
}

impl NodeKind {
    /// Blocks whose inline children carry translatable prose
    pub fn holds_prose(&self) -> bool {
        matches!(
            self,
            Self::Paragraph { .. } | Self::Heading { .. } | Self::ListItem { .. } | Self::Blockquote { .. }
        )
    }

    /// Inline kinds that are never translated but may sit inside a prose run
    pub fn is_protected_inline(&self) -> bool {
        matches!(
            self,
            Self::InlineCode { .. } | Self::Autolink { .. } | Self::InlineHtml { .. }
        )
    }

    /// Short lowercase name used in logs and diagnostics
    pub fn name(&self) -> &'static str {
        match self {
            Self::Paragraph { .. } => "paragraph",
            Self::Heading { .. } => "heading",
            Self::ListItem { .. } => "list-item",
            Self::Blockquote { .. } => "blockquote",
            Self::CodeBlock { .. } => "code-block",
            Self::HtmlBlock { .. } => "html-block",
            Self::Raw { .. } => "raw",
            Self::Blank { .. } => "blank",
            Self::Text(_) => "text",
            Self::InlineCode { .. } => "inline-code",
            Self::Autolink { .. } => "autolink",
            Self::InlineHtml { .. } => "inline-html",
            Self::Link { .. } => "link",
            Self::Image { .. } => "image",
        }
    }
}

/// A node and the ordered ids of its children
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) children: Vec<NodeId>,
}

impl Node {
    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }
}

/// Leading YAML block of a document.
///
/// `raw` is the exact source text including both `---` delimiter lines;
/// `fields` holds the scalar entries of the mapping as strings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frontmatter {
    pub raw: String,
    pub fields: BTreeMap<String, String>,
}

impl Frontmatter {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    fn first_of(&self, keys: &[&str]) -> Option<&str> {
        keys.iter()
            .filter_map(|key| self.get(key))
            .find(|value| !value.trim().is_empty())
    }

    pub fn title(&self) -> Option<&str> {
        self.first_of(&["title"])
    }

    pub fn source_url(&self) -> Option<&str> {
        self.first_of(&["source_url", "source-url", "source"])
    }

    pub fn fetched_at(&self) -> Option<&str> {
        self.first_of(&["fetched_at", "fetched-at"])
    }
}

/// Parsed Markdown document
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub frontmatter: Option<Frontmatter>,
    nodes: Vec<Node>,
    roots: Vec<NodeId>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node in the arena and return its id
    pub fn add_node(&mut self, kind: NodeKind, children: Vec<NodeId>) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node { kind, children });
        id
    }

    /// Append a node to the top-level sequence
    pub fn push_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id.0].kind
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub(crate) fn kind_mut(&mut self, id: NodeId) -> &mut NodeKind {
        &mut self.nodes[id.0].kind
    }

    pub(crate) fn children_mut(&mut self, id: NodeId) -> &mut Vec<NodeId> {
        &mut self.nodes[id.0].children
    }

    /// Number of nodes allocated, including detached ones
    pub fn arena_len(&self) -> usize {
        self.nodes.len()
    }

    /// Ids of every node reachable from the roots, in document order
    pub fn walk(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.roots.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.children(id).iter().rev().copied());
        }
        order
    }

    /// Title from frontmatter, falling back to the first heading's text
    pub fn title(&self) -> Option<String> {
        if let Some(title) = self.frontmatter.as_ref().and_then(Frontmatter::title) {
            return Some(title.trim().to_string());
        }

        self.walk()
            .into_iter()
            .find(|id| matches!(self.kind(*id), NodeKind::Heading { .. }))
            .map(|id| self.plain_text(id).trim().to_string())
            .filter(|title| !title.is_empty())
    }

    /// Readable text of a subtree: prose, code contents and link labels
    pub fn plain_text(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        match self.kind(id) {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::InlineCode { literal } => out.push_str(literal.trim_matches('`').trim()),
            NodeKind::Image { alt, .. } => out.push_str(alt),
            _ => {
                for child in self.children(id) {
                    self.collect_text(*child, out);
                }
            }
        }
    }
}
