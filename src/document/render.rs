/*!
 * Serialisation of a document tree back to Markdown text.
 */

use crate::document::model::{Document, LineLayout, NodeId, NodeKind};

/// Render a document to Markdown.
///
/// For a document produced by `parse`, the output is byte-identical to the
/// parsed input.
pub fn render(doc: &Document) -> String {
    let mut out = String::new();
    if let Some(fm) = &doc.frontmatter {
        out.push_str(&fm.raw);
    }
    for root in doc.roots() {
        render_block(doc, *root, &mut out);
    }
    out
}

fn render_block(doc: &Document, id: NodeId, out: &mut String) {
    match doc.kind(id) {
        NodeKind::Paragraph { layout } | NodeKind::ListItem { layout } | NodeKind::Blockquote { layout } => {
            render_lines(doc, id, layout, out);
        }
        NodeKind::Heading { layout, underline, .. } => {
            render_lines(doc, id, layout, out);
            if let Some(underline) = underline {
                out.push_str(underline);
            }
        }
        NodeKind::CodeBlock { literal, .. }
        | NodeKind::HtmlBlock { literal }
        | NodeKind::Raw { literal }
        | NodeKind::Blank { literal } => out.push_str(literal),
        _ => render_inline(doc, &[id], out),
    }
}

/// Emit the inline content of a block with its per-line prefixes, then the
/// last line's suffix and terminator
fn render_lines(doc: &Document, id: NodeId, layout: &LineLayout, out: &mut String) {
    let mut content = String::new();
    render_inline(doc, doc.children(id), &mut content);

    for (index, line) in content.split('\n').enumerate() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(layout.prefix_for(index));
        out.push_str(line);
    }
    out.push_str(&layout.suffix);
    out.push_str(&layout.eol);
}

/// Render inline nodes in order
pub fn render_inline(doc: &Document, nodes: &[NodeId], out: &mut String) {
    for id in nodes {
        match doc.kind(*id) {
            NodeKind::Text(text) => out.push_str(text),
            NodeKind::InlineCode { literal } | NodeKind::Autolink { literal } | NodeKind::InlineHtml { literal } => {
                out.push_str(literal)
            }
            NodeKind::Link { url, bracketed, rest } => {
                out.push('[');
                render_inline(doc, doc.children(*id), out);
                out.push_str("](");
                push_destination(url, *bracketed, out);
                out.push_str(rest);
                out.push(')');
            }
            NodeKind::Image {
                url,
                alt,
                bracketed,
                rest,
            } => {
                out.push_str("![");
                out.push_str(alt);
                out.push_str("](");
                push_destination(url, *bracketed, out);
                out.push_str(rest);
                out.push(')');
            }
            _ => render_block(doc, *id, out),
        }
    }
}

fn push_destination(url: &str, bracketed: bool, out: &mut String) {
    if bracketed {
        out.push('<');
        out.push_str(url);
        out.push('>');
    } else {
        out.push_str(url);
    }
}
