//! Pipeline stages for document fusion.
//!
//! Each submodule implements exactly one transformation step and can be
//! tested on its own.
//!
//! ## Data Flow
//!
//! ```text
//! docx_reader ──▶ linearize ──▶ assemble ──▶ llm ──▶ normalize ──▶ parse ──▶ build
//!  (zip+xml)      (sentinels)   (prompt)    (HTTP)   (cleanup)   (blocks)  (styled)
//! ```
//!
//! 1. [`docx_reader`]: read `word/document.xml` into paragraphs and tables
//! 2. [`linearize`]: flatten one document to text, tables as sentinel rows
//! 3. [`assemble`]: join all documents, the instruction, and the format
//!    directive into one prompt
//! 4. [`llm`]: the single completion call; the only stage with
//!    network I/O
//! 5. [`normalize`]: deterministic cleanup of the model's Markdown
//! 6. [`parse`]: Markdown into the closed block vocabulary
//! 7. [`build`]: blocks into a styled document, skipping malformed ones
//!
//! Writing the styled document out is the job of [`crate::sink`].

pub mod assemble;
pub mod build;
pub mod docx_reader;
pub mod linearize;
pub mod llm;
pub mod normalize;
pub mod parse;
