/*!
 * Structure-preserving translation of Markdown documents.
 *
 * - `segmenter`: extracts translatable runs and masks protected spans
 * - `batch`: groups segments under a size ceiling and sends them concurrently
 * - `core`: backend trait and the document translation service
 * - `reassembler`: merges translated runs back into the tree
 * - `cache`: in-memory translation cache
 * - `prompts`: batch prompt format
 * - `concurrency`: per-provider defaults
 */

pub use self::batch::{Batch, BatchLimits, BatchTranslator, batch, batch_with_limits};
pub use self::core::{LlmBackend, TranslationBackend, TranslationOptions, TranslationService};
pub use self::prompts::PromptTemplate;
pub use self::reassembler::reassemble;
pub use self::segmenter::{NodePath, Segment, SegmentId, segment};

pub mod batch;
pub mod cache;
pub mod concurrency;
pub mod core;
pub mod prompts;
pub mod reassembler;
pub mod segmenter;
