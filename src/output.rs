//! Result types returned by a fusion job.

use crate::config::OutputFormat;
use crate::pipeline::build::BuildReport;
use crate::pipeline::linearize::LinearizeReport;
use crate::pipeline::parse::ParseReport;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Everything a finished job produced besides the output file itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionOutput {
    /// The normalized Markdown the output file was built from.
    pub markdown: String,

    /// Where the styled document was written.
    pub output_path: PathBuf,

    pub format: OutputFormat,

    /// One entry per input document, in prompt order.
    pub documents: Vec<DocumentSummary>,

    pub parse: ParseReport,

    pub build: BuildReport,

    pub stats: FusionStats,
}

/// What was read from one input document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentSummary {
    /// Name used in the prompt header.
    pub name: String,
    pub path: PathBuf,
    /// Character count of the linearized text.
    pub chars: usize,
    pub report: LinearizeReport,
}

/// Job-level counters and timings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FusionStats {
    pub documents: usize,
    pub prompt_chars: usize,
    pub response_chars: usize,
    pub input_tokens: usize,
    pub output_tokens: usize,
    /// Styled units written.
    pub units: usize,
    pub skipped_blocks: usize,
    pub llm_duration_ms: u64,
    pub total_duration_ms: u64,
}
