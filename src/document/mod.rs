/*!
 * Markdown document model.
 *
 * - `model`: arena tree of blocks and inlines
 * - `parser`: text to tree, keeping every byte of the source
 * - `inline`: inline constructs inside prose blocks
 * - `render`: tree back to text
 * - `frontmatter`: leading YAML metadata block
 */

pub mod frontmatter;
pub mod inline;
pub mod model;
pub mod parser;
pub mod render;

pub use frontmatter::render_page_header;
pub use model::{Document, Frontmatter, LineLayout, Node, NodeId, NodeKind};
pub use parser::{parse, parse_bytes};
pub use render::{render, render_inline};
