//! # docfuse
//!
//! Merge several Word documents into one with a language model.
//!
//! ## Why this crate?
//!
//! Merging reports by hand means copying paragraphs and rebuilding tables
//! until the result reads like one document. This crate reads each `.docx`
//! in body order, hands the text (tables included, as delimited rows) to a
//! chat-completion model with instructions to fuse them, and rebuilds the
//! model's Markdown as a styled HTML page or Word document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! *.docx
//!  │
//!  ├─ 1. Read       ZIP + word/document.xml, paragraphs and tables in order
//!  ├─ 2. Linearize  one text stream per document, tables between sentinels
//!  ├─ 3. Assemble   numbered document headers + instruction + format rules
//!  ├─ 4. Complete   one chat-completion call (HTTP or edgequake-llm)
//!  ├─ 5. Normalize  deterministic Markdown cleanup
//!  ├─ 6. Parse      Markdown → headings, paragraphs, lists, tables
//!  ├─ 7. Build      blocks → styled units, malformed blocks skipped
//!  └─ 8. Write      HTML or .docx, atomically
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docfuse::{fuse, EndpointConfig, FusionConfig, OutputFormat};
//! use std::path::PathBuf;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = FusionConfig::builder()
//!         .endpoint(EndpointConfig::new("https://api.openai.com/v1", "sk-...", "gpt-4o-mini"))
//!         .output_format(OutputFormat::Docx)
//!         .instruction("按时间顺序合并")
//!         .build()?;
//!     let inputs = vec![PathBuf::from("a.docx"), PathBuf::from("b.docx")];
//!     let output = fuse(&inputs, "merged.docx", &config).await?;
//!     eprintln!("{} units, {} skipped", output.stats.units, output.stats.skipped_blocks);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docfuse` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docfuse = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod fuse;
pub mod model;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{
    Alignment, EndpointConfig, FusionConfig, FusionConfigBuilder, OutputFormat, PageSetup,
    StyleConfig,
};
pub use error::{BlockError, FusionError};
pub use fuse::{fuse, fuse_sync, prepare_prompt, render_markdown, PreparedPrompt};
pub use output::{DocumentSummary, FusionOutput, FusionStats};
pub use pipeline::llm::{Completion, CompletionRequest, CompletionService};
pub use progress::{FusionProgressCallback, NoopProgressCallback, ProgressCallback};
