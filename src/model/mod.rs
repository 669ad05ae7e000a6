//! Data model shared by the pipeline stages.
//!
//! ```text
//! SourceDocument ──▶ (linearize) ──▶ prompt ──▶ model ──▶ MarkupBlock ──▶ StyledDocument
//! ```

pub mod markup;
pub mod source;
pub mod styled;

pub use markup::{flatten, plain_text, Inline, ListBlock, ListEntry, MarkupBlock, Span, SpanStyle};
pub use source::{BodyElement, SourceCell, SourceDocument, SourceTable};
pub use styled::{StyledCell, StyledDocument, StyledTable, StyledUnit};
