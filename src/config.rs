//! Configuration types for a document fusion job.
//!
//! All job behaviour is controlled through [`FusionConfig`], built via its
//! [`FusionConfigBuilder`]. Output styling lives in [`StyleConfig`], which is
//! plain serde data so it can be loaded from JSON and shared with
//! [`crate::render_markdown`].

use crate::error::FusionError;
use crate::pipeline::llm::CompletionService;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Configuration for a fusion job.
///
/// Built via [`FusionConfig::builder()`] or using [`FusionConfig::default()`].
///
/// # Example
/// ```rust
/// use docfuse::{FusionConfig, OutputFormat};
///
/// let config = FusionConfig::builder()
///     .model("gpt-4.1-mini")
///     .instruction("Merge both reports into one executive summary")
///     .output_format(OutputFormat::Docx)
///     .build()
///     .unwrap();
/// assert_eq!(config.max_tokens, 4000);
/// ```
#[derive(Clone)]
pub struct FusionConfig {
    /// Explicit OpenAI-compatible endpoint. Takes precedence over
    /// `provider_name` and environment detection, but not over `service`.
    pub endpoint: Option<EndpointConfig>,

    /// LLM model identifier, e.g. "gpt-4o-mini". If None, uses the
    /// endpoint's or provider's default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "openai", "anthropic", "ollama").
    /// If None along with `provider`, uses `ProviderFactory::from_env()`.
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Pre-constructed completion service. Takes precedence over everything
    /// else; tests inject fakes here.
    pub service: Option<Arc<dyn CompletionService>>,

    /// Sampling temperature. Default: 0.3.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4000.
    ///
    /// The whole fused document comes back in one response, so this caps the
    /// output length. Long merges need a higher value.
    pub max_tokens: usize,

    /// Custom system persona. If None, uses [`crate::prompts::DEFAULT_SYSTEM_PROMPT`].
    pub system_prompt: Option<String>,

    /// Extra instruction appended to the prompt as `额外说明`.
    pub instruction: Option<String>,

    /// Output container. Default: [`OutputFormat::Html`].
    pub output_format: OutputFormat,

    /// Per-call timeout for the completion request in seconds. Default: 300.
    pub api_timeout_secs: u64,

    /// Formatting applied when rebuilding the document.
    pub style: StyleConfig,

    /// Optional progress observer.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: None,
            provider_name: None,
            provider: None,
            service: None,
            temperature: 0.3,
            max_tokens: 4000,
            system_prompt: None,
            instruction: None,
            output_format: OutputFormat::default(),
            api_timeout_secs: 300,
            style: StyleConfig::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for FusionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusionConfig")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field(
                "service",
                &self.service.as_ref().map(|_| "<dyn CompletionService>"),
            )
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("instruction", &self.instruction)
            .field("output_format", &self.output_format)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .finish()
    }
}

impl FusionConfig {
    /// Create a new builder for `FusionConfig`.
    pub fn builder() -> FusionConfigBuilder {
        FusionConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`FusionConfig`].
#[derive(Debug)]
pub struct FusionConfigBuilder {
    config: FusionConfig,
}

impl FusionConfigBuilder {
    pub fn endpoint(mut self, endpoint: EndpointConfig) -> Self {
        self.config.endpoint = Some(endpoint);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn service(mut self, service: Arc<dyn CompletionService>) -> Self {
        self.config.service = Some(service);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.config.instruction = Some(instruction.into());
        self
    }

    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.config.output_format = format;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn style(mut self, style: StyleConfig) -> Self {
        self.config.style = style;
        self
    }

    pub fn heading_numbering(mut self, on: bool) -> Self {
        self.config.style.heading_numbering = on;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<FusionConfig, FusionError> {
        let c = &self.config;
        if c.max_tokens == 0 {
            return Err(FusionError::InvalidConfig(
                "max_tokens must be ≥ 1".into(),
            ));
        }
        if c.api_timeout_secs == 0 {
            return Err(FusionError::InvalidConfig(
                "api_timeout_secs must be ≥ 1".into(),
            ));
        }
        if let Some(endpoint) = &c.endpoint {
            endpoint.validate()?;
        }
        c.style.validate()?;
        Ok(self.config)
    }
}

// ── Endpoint ─────────────────────────────────────────────────────────────

/// An OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    /// Base URL without the `/chat/completions` suffix,
    /// e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Bearer credential.
    pub api_key: String,
    /// Model identifier sent in the request body.
    pub model: String,
}

impl EndpointConfig {
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
        }
    }

    /// Read `DOCFUSE_BASE_URL`, `DOCFUSE_API_KEY` and `DOCFUSE_MODEL`.
    ///
    /// Returns `None` unless both the base URL and the key are set.
    /// `DOCFUSE_MODEL` falls back to `gpt-4o-mini`.
    pub fn from_env() -> Option<Self> {
        let base_url = non_empty_env("DOCFUSE_BASE_URL")?;
        let api_key = non_empty_env("DOCFUSE_API_KEY")?;
        let model = non_empty_env("DOCFUSE_MODEL").unwrap_or_else(|| "gpt-4o-mini".to_string());
        Some(Self::new(base_url, api_key, model))
    }

    /// Full URL of the completions route.
    pub fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn validate(&self) -> Result<(), FusionError> {
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(FusionError::InvalidConfig(format!(
                "endpoint base URL must start with http:// or https://, got '{}'",
                self.base_url
            )));
        }
        if self.model.trim().is_empty() {
            return Err(FusionError::InvalidConfig(
                "endpoint model must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for EndpointConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EndpointConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Container the fused document is written as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Standalone HTML file with inline CSS. (default)
    #[default]
    Html,
    /// Word `.docx` container.
    Docx,
}

impl OutputFormat {
    /// Infer the format from a file extension (`.docx`, `.html`, `.htm`).
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "docx" => Some(OutputFormat::Docx),
            "html" | "htm" => Some(OutputFormat::Html),
            _ => None,
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Html => "html",
            OutputFormat::Docx => "docx",
        }
    }
}

impl std::str::FromStr for OutputFormat {
    type Err = FusionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "html" | "htm" => Ok(OutputFormat::Html),
            "docx" | "word" => Ok(OutputFormat::Docx),
            other => Err(FusionError::InvalidConfig(format!(
                "unknown output format '{other}' (expected html or docx)"
            ))),
        }
    }
}

/// Paragraph alignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Left,
    Center,
    Right,
    Justify,
}

impl Alignment {
    /// CSS `text-align` value.
    pub fn css(self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Justify => "justify",
        }
    }
}

// ── Style ────────────────────────────────────────────────────────────────

/// Page geometry in inches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PageSetup {
    pub width_in: f32,
    pub height_in: f32,
    pub margin_top_in: f32,
    pub margin_bottom_in: f32,
    pub margin_left_in: f32,
    pub margin_right_in: f32,
}

impl Default for PageSetup {
    /// A4 with 1.0in top/bottom and 1.25in left/right margins.
    fn default() -> Self {
        Self {
            width_in: 8.27,
            height_in: 11.69,
            margin_top_in: 1.0,
            margin_bottom_in: 1.0,
            margin_left_in: 1.25,
            margin_right_in: 1.25,
        }
    }
}

/// Formatting applied to the rebuilt document.
///
/// Sizes are in points. Missing fields in a JSON file fall back to the
/// defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StyleConfig {
    /// Body font family.
    pub body_font: String,
    pub body_size_pt: f32,
    /// Line spacing multiple for body paragraphs.
    pub line_spacing: f32,
    pub first_line_indent_pt: f32,
    pub paragraph_space_after_pt: f32,
    pub body_align: Alignment,

    /// Heading sizes for levels 1 through 6.
    pub heading_sizes_pt: [f32; 6],
    /// Space after headings for levels 1 through 6.
    pub heading_space_after_pt: [f32; 6],
    pub heading_space_before_pt: f32,
    pub heading_line_spacing: f32,
    pub heading_bold: bool,
    pub heading_align: Alignment,
    /// RGB hex without `#`.
    pub heading_color: String,
    /// Prefix headings with `1.`, `1.1.` style section numbers.
    pub heading_numbering: bool,

    pub code_font: String,
    pub code_size_pt: f32,
    /// RGB hex without `#`.
    pub link_color: String,

    pub page: PageSetup,
}

impl Default for StyleConfig {
    fn default() -> Self {
        Self {
            body_font: "宋体".to_string(),
            body_size_pt: 11.0,
            line_spacing: 1.5,
            first_line_indent_pt: 22.0,
            paragraph_space_after_pt: 0.0,
            body_align: Alignment::Left,
            heading_sizes_pt: [20.0, 17.0, 15.0, 13.0, 11.0, 11.0],
            heading_space_after_pt: [12.0, 10.0, 8.0, 6.0, 5.0, 5.0],
            heading_space_before_pt: 12.0,
            heading_line_spacing: 1.2,
            heading_bold: false,
            heading_align: Alignment::Left,
            heading_color: "000000".to_string(),
            heading_numbering: false,
            code_font: "Consolas".to_string(),
            code_size_pt: 10.0,
            link_color: "0000FF".to_string(),
            page: PageSetup::default(),
        }
    }
}

impl StyleConfig {
    /// Load a style from a JSON file; absent keys keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self, FusionError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            FusionError::InvalidConfig(format!("cannot read style file {}: {e}", path.display()))
        })?;
        let style: StyleConfig = serde_json::from_str(&raw).map_err(|e| {
            FusionError::InvalidConfig(format!("invalid style file {}: {e}", path.display()))
        })?;
        style.validate()?;
        Ok(style)
    }

    /// Heading size for `level` (1-based, clamped to 1..=6).
    pub fn heading_size(&self, level: u8) -> f32 {
        self.heading_sizes_pt[heading_index(level)]
    }

    /// Space after a heading at `level` (1-based, clamped to 1..=6).
    pub fn heading_space_after(&self, level: u8) -> f32 {
        self.heading_space_after_pt[heading_index(level)]
    }

    fn validate(&self) -> Result<(), FusionError> {
        let mut sizes = self
            .heading_sizes_pt
            .iter()
            .chain([&self.body_size_pt, &self.code_size_pt]);
        if sizes.any(|s| s.is_nan() || *s <= 0.0) {
            return Err(FusionError::InvalidConfig(
                "font sizes must be positive".into(),
            ));
        }
        let spacing_ok = |v: f32| v.is_finite() && v > 0.0;
        if !spacing_ok(self.line_spacing) || !spacing_ok(self.heading_line_spacing) {
            return Err(FusionError::InvalidConfig(
                "line spacing must be positive".into(),
            ));
        }
        for (name, color) in [
            ("heading_color", &self.heading_color),
            ("link_color", &self.link_color),
        ] {
            if color.len() != 6 || !color.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(FusionError::InvalidConfig(format!(
                    "{name} must be a 6-digit hex colour, got '{color}'"
                )));
            }
        }
        Ok(())
    }
}

fn heading_index(level: u8) -> usize {
    usize::from(level.clamp(1, 6)) - 1
}
