//! CLI binary for docfuse.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `FusionConfig`, discovers default inputs, and prints a summary.

use anyhow::{Context, Result};
use clap::Parser;
use docfuse::{
    fuse, prepare_prompt, render_markdown, EndpointConfig, FusionConfig, FusionProgressCallback,
    OutputFormat, ProgressCallback, StyleConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

/// Default output name, extension added per format.
const DEFAULT_OUTPUT_STEM: &str = "融合文档";

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Spinner for the one long wait (the model call) plus a log line per
/// document read.
struct CliProgressCallback {
    bar: ProgressBar,
    skipped: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Reading");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            skipped: AtomicUsize::new(0),
        })
    }
}

impl FusionProgressCallback for CliProgressCallback {
    fn on_job_start(&self, total_documents: usize) {
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Fusing {total_documents} document(s)…"))
        ));
    }

    fn on_document_loaded(&self, index: usize, total: usize, name: &str, chars: usize) {
        self.bar.println(format!(
            "  {} {:>2}/{:<2} {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(&format!("{chars} chars"))
        ));
    }

    fn on_completion_start(&self, prompt_chars: usize) {
        self.bar.set_prefix("Waiting");
        self.bar
            .set_message(format!("model is writing ({prompt_chars} prompt chars)"));
    }

    fn on_completion_done(&self, response_chars: usize, duration_ms: u64) {
        self.bar.set_prefix("Building");
        self.bar.println(format!(
            "  {} answer received  {}",
            green("✓"),
            dim(&format!("{response_chars} chars, {:.1}s", duration_ms as f64 / 1000.0))
        ));
    }

    fn on_block_skipped(&self, _index: usize, reason: &str) {
        self.skipped.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!("  {} {}", red("✗"), reason));
    }

    fn on_job_complete(&self, units: usize, skipped_blocks: usize) {
        self.bar.finish_and_clear();
        let mark = if skipped_blocks == 0 { green("✔") } else { cyan("⚠") };
        eprintln!("{} {} units written  ({} skipped)", mark, bold(&units.to_string()), skipped_blocks);
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Fuse every .docx in the current directory into 融合文档.html
  docfuse

  # Explicit inputs and a Word output
  docfuse -i 报告A.docx 报告B.docx -o 合并.docx

  # Steer the merge
  docfuse -i a.docx b.docx --instruction "按时间顺序合并，保留所有数字"

  # Any OpenAI-compatible endpoint
  docfuse --base-url http://localhost:8000/v1 --api-key sk-... --model qwen-max

  # Inspect the prompt without calling a model
  docfuse -i a.docx b.docx --dump-prompt

  # Restyle Markdown from an earlier run (no model call)
  docfuse --render fused.md -o fused.docx --style style.json

ENVIRONMENT VARIABLES:
  DOCFUSE_BASE_URL        OpenAI-compatible base URL (…/v1)
  DOCFUSE_API_KEY         Bearer key for DOCFUSE_BASE_URL
  DOCFUSE_MODEL           Model id for DOCFUSE_BASE_URL (default gpt-4o-mini)
  EDGEQUAKE_LLM_PROVIDER  Provider name (openai, anthropic, gemini, ollama)
  EDGEQUAKE_MODEL         Model id for EDGEQUAKE_LLM_PROVIDER
  OPENAI_API_KEY          Auto-detected when nothing else is configured
  ANTHROPIC_API_KEY       Auto-detected when nothing else is configured
  RUST_LOG                Log filter (overrides -v / -q)
"#;

/// Merge several Word documents into one with a language model.
#[derive(Parser, Debug)]
#[command(
    name = "docfuse",
    version,
    about = "Merge several Word documents into one with a language model",
    long_about = "Read .docx files (paragraphs and tables in body order), ask a language model \
to fuse them into one Markdown document, and write the result as styled HTML or .docx.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input .docx files. Default: every .docx in the current directory.
    #[arg(short, long, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output file. Default: 融合文档.html (or .docx with --format docx).
    #[arg(short, long, env = "DOCFUSE_OUTPUT")]
    output: Option<PathBuf>,

    /// Output format: html or docx. Default: from the output extension.
    #[arg(long, env = "DOCFUSE_FORMAT", value_parser = parse_format)]
    format: Option<OutputFormat>,

    /// Extra instruction appended to the prompt.
    #[arg(long, env = "DOCFUSE_INSTRUCTION")]
    instruction: Option<String>,

    /// Path to a text file containing a custom system prompt.
    #[arg(long, env = "DOCFUSE_SYSTEM_PROMPT")]
    system_prompt: Option<PathBuf>,

    /// OpenAI-compatible base URL, e.g. https://api.openai.com/v1.
    #[arg(long, env = "DOCFUSE_BASE_URL")]
    base_url: Option<String>,

    /// Bearer key for --base-url.
    #[arg(long, env = "DOCFUSE_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model id.
    #[arg(long, env = "DOCFUSE_MODEL")]
    model: Option<String>,

    /// edgequake-llm provider: openai, anthropic, gemini, ollama, azure.
    #[arg(long, env = "EDGEQUAKE_PROVIDER")]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "DOCFUSE_TEMPERATURE", default_value_t = 0.3)]
    temperature: f32,

    /// Max output tokens.
    #[arg(long, env = "DOCFUSE_MAX_TOKENS", default_value_t = 4000)]
    max_tokens: usize,

    /// Model call timeout in seconds.
    #[arg(long, env = "DOCFUSE_API_TIMEOUT", default_value_t = 300)]
    api_timeout: u64,

    /// JSON file overriding fonts, sizes, and spacing.
    #[arg(long, env = "DOCFUSE_STYLE")]
    style: Option<PathBuf>,

    /// Prefix headings with 1. / 1.1. section numbers.
    #[arg(long)]
    heading_numbering: bool,

    /// Render this Markdown file instead of calling a model.
    #[arg(long, conflicts_with_all = ["inputs", "dump_prompt"])]
    render: Option<PathBuf>,

    /// Print the assembled prompt and exit.
    #[arg(long)]
    dump_prompt: bool,

    /// Print the job summary (FusionOutput) as JSON on stdout.
    #[arg(long)]
    json: bool,

    /// Disable the progress spinner.
    #[arg(long, env = "DOCFUSE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

fn parse_format(s: &str) -> std::result::Result<OutputFormat, String> {
    s.parse::<OutputFormat>().map_err(|e| e.to_string())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.dump_prompt;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let style = match cli.style {
        Some(ref path) => StyleConfig::from_json_file(path).context("Failed to load style")?,
        None => StyleConfig::default(),
    };
    let format = resolve_format(cli.format, cli.output.as_deref());
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{DEFAULT_OUTPUT_STEM}.{}", format.extension())));

    // ── Render-only mode ─────────────────────────────────────────────────
    if let Some(ref markdown_path) = cli.render {
        let markdown = tokio::fs::read_to_string(markdown_path)
            .await
            .with_context(|| format!("Failed to read {}", markdown_path.display()))?;
        let mut style = style;
        style.heading_numbering |= cli.heading_numbering;
        let result = render_markdown(&markdown, &output, format, &style).context("Render failed")?;
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&result).context("Failed to serialise output")?);
        } else if !cli.quiet {
            eprintln!(
                "{}  {} units  →  {}",
                green("✔"),
                result.stats.units,
                bold(&output.display().to_string())
            );
        }
        return Ok(());
    }

    let inputs = if cli.inputs.is_empty() {
        discover_inputs(Path::new(".")).context("Failed to list the current directory")?
    } else {
        cli.inputs.clone()
    };

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn FusionProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, style, format, progress_cb).await?;

    // ── Prompt-only mode ─────────────────────────────────────────────────
    if cli.dump_prompt {
        let prepared = prepare_prompt(&inputs, &config).context("Failed to prepare prompt")?;
        println!("{}", prepared.prompt);
        return Ok(());
    }

    // ── Run fusion ───────────────────────────────────────────────────────
    let result = match fuse(&inputs, &output, &config).await {
        Ok(result) => result,
        Err(err) => {
            if let Some(markdown) = err.recovered_content() {
                let rescue = output.with_extension("md");
                if std::fs::write(&rescue, markdown).is_ok() {
                    eprintln!("{} Markdown saved to {}", cyan("⚠"), rescue.display());
                }
            }
            return Err(err).context("Fusion failed");
        }
    };

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&result).context("Failed to serialise output")?);
    } else if !cli.quiet {
        eprintln!(
            "{}  {} documents  {}ms  →  {}",
            if result.stats.skipped_blocks == 0 { green("✔") } else { cyan("⚠") },
            result.stats.documents,
            result.stats.total_duration_ms,
            bold(&output.display().to_string()),
        );
        eprintln!(
            "   {} tokens in  /  {} tokens out",
            dim(&result.stats.input_tokens.to_string()),
            dim(&result.stats.output_tokens.to_string()),
        );
    }

    Ok(())
}

/// Explicit `--format` wins, then the output extension, then HTML.
fn resolve_format(explicit: Option<OutputFormat>, output: Option<&Path>) -> OutputFormat {
    explicit
        .or_else(|| output.and_then(OutputFormat::from_path))
        .unwrap_or_default()
}

/// Every `.docx` in `dir`, sorted by name. Word lock files (`~$…`) are
/// left out.
fn discover_inputs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        let is_docx = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("docx"));
        let is_lock = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("~$"));
        if is_docx && !is_lock && path.is_file() {
            found.push(path);
        }
    }
    found.sort();
    Ok(found)
}

/// Map CLI args to `FusionConfig`.
async fn build_config(
    cli: &Cli,
    style: StyleConfig,
    format: OutputFormat,
    progress: Option<ProgressCallback>,
) -> Result<FusionConfig> {
    let mut builder = FusionConfig::builder()
        .temperature(cli.temperature)
        .max_tokens(cli.max_tokens)
        .api_timeout_secs(cli.api_timeout)
        .output_format(format)
        .style(style);

    if cli.heading_numbering {
        builder = builder.heading_numbering(true);
    }
    if let Some(ref path) = cli.system_prompt {
        let prompt = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read system prompt from {:?}", path))?;
        builder = builder.system_prompt(prompt);
    }
    if let Some(ref instruction) = cli.instruction {
        builder = builder.instruction(instruction.clone());
    }
    if let Some(ref model) = cli.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref base_url) = cli.base_url {
        let api_key = cli
            .api_key
            .clone()
            .context("--base-url needs --api-key (or DOCFUSE_API_KEY)")?;
        let model = cli.model.clone().unwrap_or_else(|| "gpt-4o-mini".to_string());
        builder = builder.endpoint(EndpointConfig::new(base_url.clone(), api_key, model));
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}
