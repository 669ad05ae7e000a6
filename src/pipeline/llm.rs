//! The completion call: one system persona, one user prompt, one answer.
//!
//! [`CompletionService`] is the seam between the job driver and whatever
//! answers the prompt. Two implementations ship with the crate:
//!
//! * [`HttpCompletionService`]: any OpenAI-compatible `/chat/completions`
//!   endpoint, configured by an explicit [`EndpointConfig`]
//! * [`ProviderCompletionService`]: an `edgequake_llm` provider, named or
//!   auto-detected from API-key variables
//!
//! The call is a single request/response. There is no retry; any transport
//! failure, non-success status, timeout, or unreadable payload surfaces as
//! [`FusionError::UpstreamUnavailable`].

use crate::config::{EndpointConfig, FusionConfig};
use crate::error::FusionError;
use crate::prompts::DEFAULT_SYSTEM_PROMPT;
use async_trait::async_trait;
use edgequake_llm::{ChatMessage, CompletionOptions, LLMProvider, ProviderFactory};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Default model when a provider is named without one.
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Everything one completion call needs.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    /// System persona.
    pub system: String,
    /// Assembled user prompt.
    pub user: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout: Duration,
}

impl CompletionRequest {
    /// Build a request for `prompt` from the job configuration.
    pub fn from_config(config: &FusionConfig, prompt: impl Into<String>) -> Self {
        Self {
            system: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            user: prompt.into(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout: Duration::from_secs(config.api_timeout_secs),
        }
    }
}

/// The model's answer. `content` is trimmed and may be empty; the caller
/// decides whether empty is an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
    pub input_tokens: usize,
    pub output_tokens: usize,
}

/// Answers one prompt.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Human-readable description used in logs, e.g. `openai/gpt-4o-mini`.
    fn describe(&self) -> String;

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, FusionError>;
}

// ── OpenAI-compatible HTTP endpoint ──────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequestBody<'a> {
    model: &'a str,
    messages: [WireMessage<'a>; 2],
    temperature: f32,
    max_tokens: usize,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponseBody {
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct WireChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: usize,
    #[serde(default)]
    completion_tokens: usize,
}

#[derive(Debug, Deserialize)]
struct WireErrorBody {
    error: WireError,
}

#[derive(Debug, Deserialize)]
struct WireError {
    message: String,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct HttpCompletionService {
    endpoint: EndpointConfig,
    client: reqwest::Client,
}

impl HttpCompletionService {
    pub fn new(endpoint: EndpointConfig) -> Result<Self, FusionError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| FusionError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { endpoint, client })
    }

    /// Use a preconfigured client (proxy, TLS roots, default headers).
    pub fn with_client(endpoint: EndpointConfig, client: reqwest::Client) -> Self {
        Self { endpoint, client }
    }

    pub fn endpoint(&self) -> &EndpointConfig {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionService for HttpCompletionService {
    fn describe(&self) -> String {
        format!("{} ({})", self.endpoint.model, self.endpoint.base_url)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, FusionError> {
        let body = ChatRequestBody {
            model: &self.endpoint.model,
            messages: [
                WireMessage {
                    role: "system",
                    content: &request.system,
                },
                WireMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let url = self.endpoint.completions_url();
        debug!("POST {} ({} prompt chars)", url, request.user.chars().count());

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.endpoint.api_key)
            .timeout(request.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| transport_error(e, request.timeout))?;

        if !status.is_success() {
            let detail = match serde_json::from_str::<WireErrorBody>(&text) {
                Ok(err) => format!("HTTP {}: {}", status.as_u16(), err.error.message),
                Err(_) => format!("HTTP {}: {}", status.as_u16(), truncate(&text, 200)),
            };
            return Err(FusionError::UpstreamUnavailable { detail });
        }

        let parsed: ChatResponseBody =
            serde_json::from_str(&text).map_err(|e| FusionError::UpstreamUnavailable {
                detail: format!("unparsable response: {e}"),
            })?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| FusionError::UpstreamUnavailable {
                detail: "response has no choices".into(),
            })?;

        let (input_tokens, output_tokens) = parsed
            .usage
            .map(|u| (u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Ok(Completion {
            content: choice.message.content.unwrap_or_default().trim().to_string(),
            input_tokens,
            output_tokens,
        })
    }
}

fn transport_error(e: reqwest::Error, timeout: Duration) -> FusionError {
    let detail = if e.is_timeout() {
        format!("request timed out after {}s", timeout.as_secs())
    } else {
        e.to_string()
    };
    FusionError::UpstreamUnavailable { detail }
}

fn truncate(s: &str, max_chars: usize) -> String {
    let mut out: String = s.chars().take(max_chars).collect();
    if s.chars().count() > max_chars {
        out.push('…');
    }
    out
}

// ── edgequake-llm provider ───────────────────────────────────────────────

/// Adapter from an `edgequake_llm` provider to [`CompletionService`].
pub struct ProviderCompletionService {
    provider: Arc<dyn LLMProvider>,
    label: String,
}

impl ProviderCompletionService {
    pub fn new(provider: Arc<dyn LLMProvider>, label: impl Into<String>) -> Self {
        Self {
            provider,
            label: label.into(),
        }
    }
}

#[async_trait]
impl CompletionService for ProviderCompletionService {
    fn describe(&self) -> String {
        self.label.clone()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<Completion, FusionError> {
        let messages = vec![
            ChatMessage::system(request.system.as_str()),
            ChatMessage::user_with_images(request.user.as_str(), Vec::new()),
        ];
        let options = CompletionOptions {
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = tokio::time::timeout(request.timeout, self.provider.chat(&messages, Some(&options)))
            .await
            .map_err(|_| FusionError::UpstreamUnavailable {
                detail: format!("request timed out after {}s", request.timeout.as_secs()),
            })?
            .map_err(|e| FusionError::UpstreamUnavailable {
                detail: e.to_string(),
            })?;

        debug!(
            "{}: {} input tokens, {} output tokens",
            self.label, response.prompt_tokens, response.completion_tokens
        );

        Ok(Completion {
            content: response.content.trim().to_string(),
            input_tokens: response.prompt_tokens as usize,
            output_tokens: response.completion_tokens as usize,
        })
    }
}

// ── Resolution ───────────────────────────────────────────────────────────

fn create_provider(provider_name: &str, model: &str) -> Result<Arc<dyn LLMProvider>, FusionError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        FusionError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the completion service, from most-specific to least-specific:
///
/// 1. `config.service`: injected as-is (tests, custom middleware)
/// 2. `config.endpoint`: explicit OpenAI-compatible endpoint
/// 3. `config.provider`: pre-built `edgequake_llm` provider
/// 4. `config.provider_name`: named provider, key read from its env var
/// 5. `DOCFUSE_BASE_URL` + `DOCFUSE_API_KEY` (+ `DOCFUSE_MODEL`)
/// 6. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`
/// 7. `ProviderFactory::from_env()` auto-detection
pub fn resolve_service(config: &FusionConfig) -> Result<Arc<dyn CompletionService>, FusionError> {
    if let Some(service) = &config.service {
        return Ok(Arc::clone(service));
    }

    if let Some(endpoint) = &config.endpoint {
        let mut endpoint = endpoint.clone();
        if let Some(model) = &config.model {
            endpoint.model = model.clone();
        }
        return Ok(Arc::new(HttpCompletionService::new(endpoint)?));
    }

    if let Some(provider) = &config.provider {
        let label = config.model.clone().unwrap_or_else(|| "custom provider".into());
        return Ok(Arc::new(ProviderCompletionService::new(Arc::clone(provider), label)));
    }

    if let Some(name) = &config.provider_name {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        let provider = create_provider(name, model)?;
        return Ok(Arc::new(ProviderCompletionService::new(
            provider,
            format!("{name}/{model}"),
        )));
    }

    if let Some(mut endpoint) = EndpointConfig::from_env() {
        if let Some(model) = &config.model {
            endpoint.model = model.clone();
        }
        info!("Using endpoint from DOCFUSE_BASE_URL: {}", endpoint.base_url);
        return Ok(Arc::new(HttpCompletionService::new(endpoint)?));
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            let provider = create_provider(&prov, &model)?;
            return Ok(Arc::new(ProviderCompletionService::new(
                provider,
                format!("{prov}/{model}"),
            )));
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| FusionError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No completion endpoint or LLM provider could be detected.\n\
                Set DOCFUSE_BASE_URL and DOCFUSE_API_KEY, or OPENAI_API_KEY / ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(Arc::new(ProviderCompletionService::new(
        llm_provider,
        "auto-detected provider",
    )))
}
