//! Job driver: the strict read → prompt → model → rebuild → write sequence.
//!
//! A job is all-or-nothing up to the write. Input and upstream failures
//! abort before any file is touched; blocks the builder cannot render are
//! skipped and reported; a failed write still hands back the Markdown.

use crate::config::{FusionConfig, OutputFormat, StyleConfig};
use crate::error::{BlockError, FusionError};
use crate::output::{DocumentSummary, FusionOutput, FusionStats};
use crate::pipeline::assemble::{assemble_prompt, PromptDocument};
use crate::pipeline::build::{build_document, BuildReport};
use crate::pipeline::llm::{resolve_service, CompletionRequest};
use crate::pipeline::parse::{parse_markup, ParseReport};
use crate::pipeline::{docx_reader, linearize, normalize};
use crate::sink;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// The assembled prompt and what went into it.
#[derive(Debug, Clone)]
pub struct PreparedPrompt {
    pub prompt: String,
    pub documents: Vec<DocumentSummary>,
}

/// Fuse `inputs` into one document at `output`.
///
/// Documents appear in the prompt in the order given. The output container
/// is `config.output_format`.
///
/// # Errors
/// - [`FusionError::NoInputs`] / [`FusionError::InputNotFound`] before any
///   document is read; every missing path is listed at once
/// - [`FusionError::InvalidDocument`] for a file that is not a `.docx`
/// - [`FusionError::ProviderNotConfigured`] / [`FusionError::UpstreamUnavailable`]
///   when the model cannot be reached
/// - [`FusionError::EmptyUpstreamContent`] when the answer is blank; no file
///   is written
/// - [`FusionError::NoRenderableContent`] when nothing in the answer maps
///   onto a block; no file is written
/// - [`FusionError::OutputWriteFailed`] carrying the Markdown
pub async fn fuse(
    inputs: &[PathBuf],
    output: impl AsRef<Path>,
    config: &FusionConfig,
) -> Result<FusionOutput, FusionError> {
    let total_start = Instant::now();
    let output = output.as_ref();
    info!("Starting fusion of {} document(s) into {}", inputs.len(), output.display());

    // ── Step 1: Read and linearize every input ───────────────────────────
    let prepared = prepare_prompt(inputs, config)?;
    let prompt_chars = prepared.prompt.chars().count();

    // ── Step 2: Resolve the completion service ───────────────────────────
    let service = resolve_service(config)?;
    info!("Using {}", service.describe());

    // ── Step 3: One completion call ──────────────────────────────────────
    if let Some(ref cb) = config.progress_callback {
        cb.on_completion_start(prompt_chars);
    }
    let request = CompletionRequest::from_config(config, prepared.prompt);
    let llm_start = Instant::now();
    let completion = service.complete(&request).await?;
    let llm_duration_ms = llm_start.elapsed().as_millis() as u64;

    if completion.content.trim().is_empty() {
        warn!("Model returned empty content after {}ms", llm_duration_ms);
        return Err(FusionError::EmptyUpstreamContent);
    }
    let response_chars = completion.content.chars().count();
    info!(
        "Model answered in {}ms ({} chars, {} in / {} out tokens)",
        llm_duration_ms, response_chars, completion.input_tokens, completion.output_tokens
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_completion_done(response_chars, llm_duration_ms);
    }

    // ── Step 4: Normalize, parse, build, write ───────────────────────────
    let rendered = render_to_file(&completion.content, output, config.output_format, &config.style)?;

    if let Some(ref cb) = config.progress_callback {
        for skipped in &rendered.build.skipped {
            let BlockError::MalformedBlock { index, .. } = skipped;
            cb.on_block_skipped(*index, &skipped.to_string());
        }
        cb.on_job_complete(rendered.build.units, rendered.build.skipped.len());
    }

    let stats = FusionStats {
        documents: prepared.documents.len(),
        prompt_chars,
        response_chars,
        input_tokens: completion.input_tokens,
        output_tokens: completion.output_tokens,
        units: rendered.build.units,
        skipped_blocks: rendered.build.skipped.len(),
        llm_duration_ms,
        total_duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Fusion complete: {} units, {} skipped blocks, {}ms total",
        stats.units, stats.skipped_blocks, stats.total_duration_ms
    );

    Ok(FusionOutput {
        markdown: rendered.markdown,
        output_path: output.to_path_buf(),
        format: config.output_format,
        documents: prepared.documents,
        parse: rendered.parse,
        build: rendered.build,
        stats,
    })
}

/// Synchronous wrapper around [`fuse`].
///
/// Creates a temporary tokio runtime internally.
pub fn fuse_sync(
    inputs: &[PathBuf],
    output: impl AsRef<Path>,
    config: &FusionConfig,
) -> Result<FusionOutput, FusionError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| FusionError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(fuse(inputs, output, config))
}

/// Read, linearize, and assemble the prompt without calling any model.
///
/// Fires `on_job_start` and `on_document_loaded` progress events.
pub fn prepare_prompt(inputs: &[PathBuf], config: &FusionConfig) -> Result<PreparedPrompt, FusionError> {
    validate_inputs(inputs)?;

    if let Some(ref cb) = config.progress_callback {
        cb.on_job_start(inputs.len());
    }

    let total = inputs.len();
    let mut prompt_documents = Vec::with_capacity(total);
    let mut documents = Vec::with_capacity(total);

    for (idx, path) in inputs.iter().enumerate() {
        let source = docx_reader::read_docx(path)?;
        let linearized = linearize::linearize(&source);
        let name = display_name(path);
        let chars = linearized.text.chars().count();

        debug!(
            "{}: {} paragraphs, {} tables, {} blank, {} skipped markers",
            name,
            linearized.report.paragraphs,
            linearized.report.tables,
            linearized.report.blank_paragraphs,
            linearized.report.skipped_markers
        );
        if linearized.report.skipped_markers > 0 {
            warn!(
                "{}: {} structure(s) could not be placed in body order and were left out",
                name, linearized.report.skipped_markers
            );
        }
        if let Some(ref cb) = config.progress_callback {
            cb.on_document_loaded(idx + 1, total, &name, chars);
        }

        prompt_documents.push(PromptDocument::new(name.clone(), linearized.text));
        documents.push(DocumentSummary {
            name,
            path: path.clone(),
            chars,
            report: linearized.report,
        });
    }

    let prompt = assemble_prompt(&prompt_documents, config.instruction.as_deref());
    Ok(PreparedPrompt { prompt, documents })
}

/// Rebuild an existing Markdown text as a styled document, with no model
/// call. Useful to restyle a previous job's Markdown.
pub fn render_markdown(
    markdown: &str,
    output: impl AsRef<Path>,
    format: OutputFormat,
    style: &StyleConfig,
) -> Result<FusionOutput, FusionError> {
    let start = Instant::now();
    let output = output.as_ref();
    let rendered = render_to_file(markdown, output, format, style)?;
    let stats = FusionStats {
        response_chars: markdown.chars().count(),
        units: rendered.build.units,
        skipped_blocks: rendered.build.skipped.len(),
        total_duration_ms: start.elapsed().as_millis() as u64,
        ..FusionStats::default()
    };
    Ok(FusionOutput {
        markdown: rendered.markdown,
        output_path: output.to_path_buf(),
        format,
        documents: Vec::new(),
        parse: rendered.parse,
        build: rendered.build,
        stats,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

struct Rendered {
    markdown: String,
    parse: ParseReport,
    build: BuildReport,
}

fn render_to_file(
    raw: &str,
    output: &Path,
    format: OutputFormat,
    style: &StyleConfig,
) -> Result<Rendered, FusionError> {
    let markdown = normalize::normalize_markdown(raw);
    let parsed = parse_markup(&markdown)?;
    debug!(
        "Parsed {} blocks ({} nodes skipped)",
        parsed.report.blocks, parsed.report.skipped
    );

    let (doc, build) = build_document(&parsed.blocks, style);
    if build.units == 0 {
        let skipped = parsed.report.skipped + build.skipped.len();
        warn!(
            "Nothing renderable in {} chars of Markdown ({} skipped)",
            markdown.chars().count(),
            skipped
        );
        return Err(FusionError::NoRenderableContent {
            skipped,
            content: markdown,
        });
    }

    match sink::write_document(&doc, output, format) {
        Ok(bytes) => info!("Wrote {} ({} bytes)", output.display(), bytes),
        Err(source) => {
            return Err(FusionError::OutputWriteFailed {
                path: output.to_path_buf(),
                source,
                content: markdown,
            })
        }
    }

    Ok(Rendered {
        markdown,
        parse: parsed.report,
        build,
    })
}

/// All missing paths are reported together.
fn validate_inputs(inputs: &[PathBuf]) -> Result<(), FusionError> {
    if inputs.is_empty() {
        return Err(FusionError::NoInputs);
    }
    let missing: Vec<PathBuf> = inputs.iter().filter(|p| !p.exists()).cloned().collect();
    if !missing.is_empty() {
        return Err(FusionError::InputNotFound { paths: missing });
    }
    Ok(())
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
