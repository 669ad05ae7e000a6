//! Error types for the docfuse library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`FusionError`]: **Fatal**: the job cannot produce a document (missing
//!   input, unreachable model endpoint, empty response, unwritable output).
//!   Returned as `Err(FusionError)` from [`crate::fuse()`] and friends.
//!
//! * [`BlockError`]: **Non-fatal**: one block of the model's response could
//!   not be rendered. Recorded in [`crate::pipeline::build::BuildReport`];
//!   the remaining blocks are still written.

use crate::model::markup::Malformation;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the docfuse library.
#[derive(Debug, Error)]
pub enum FusionError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The job was started without any input documents.
    #[error("No input documents given.\nPass one or more .docx files with -i.")]
    NoInputs,

    /// One or more input documents do not exist. Every missing path is listed.
    #[error("Input document(s) not found: {}", display_paths(.paths))]
    InputNotFound { paths: Vec<PathBuf> },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists but is not a readable Word document.
    #[error("'{path}' is not a valid .docx document: {detail}")]
    InvalidDocument { path: PathBuf, detail: String },

    // ── Upstream errors ───────────────────────────────────────────────────
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The completion call failed at the transport or status level, timed
    /// out, or its payload could not be understood.
    #[error("Upstream model unavailable: {detail}")]
    UpstreamUnavailable { detail: String },

    /// The completion call succeeded but returned nothing usable.
    #[error("Upstream model returned empty content")]
    EmptyUpstreamContent,

    /// The answer had text, but none of it maps onto a heading, paragraph,
    /// list or table (an HTML-only answer, a lone rule, an empty fence).
    /// The normalized text is kept in `content`.
    #[error(
        "Model answer has no renderable content ({skipped} node(s) skipped).\n\
         Ask for Markdown headings, paragraphs, lists and tables."
    )]
    NoRenderableContent { skipped: usize, content: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write the output file. The generated Markdown is
    /// kept in `content` so the caller can still save it elsewhere.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
        content: String,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl FusionError {
    /// Generated content that survived a failed write, if any.
    pub fn recovered_content(&self) -> Option<&str> {
        match self {
            FusionError::OutputWriteFailed { content, .. }
            | FusionError::NoRenderableContent { content, .. } => Some(content),
            _ => None,
        }
    }
}

fn display_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// A non-fatal error for a single block of the response.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum BlockError {
    /// The block does not have a renderable shape and was skipped.
    #[error("Block {index} ({kind}) skipped: {reason}")]
    MalformedBlock {
        index: usize,
        kind: String,
        reason: Malformation,
    },
}
