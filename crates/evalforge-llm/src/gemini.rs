//! Gemini HTTP backend with structured-output enforcement.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use evalforge_config::GeminiConfig;

use crate::error::LlmError;
use crate::hash::sha256_hex;
use crate::retry::RetryPolicy;
use crate::types::{LlmBackend, LlmRequest, LlmResponse, UsageMetrics};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// HTTP backend for Gemini `generateContent`.
///
/// Construction performs no network I/O; the `reqwest::Client` is built
/// lazily on first use so services can be constructed (and health-checked)
/// before credentials are exercised.
#[derive(Debug)]
pub struct GeminiBackend {
    api_key: String,
    model: String,
    base_url: String,
    retry: RetryPolicy,
    client: std::sync::OnceLock<reqwest::Client>,
}

impl GeminiBackend {
    /// Build from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Misconfiguration`] if the API key is absent.
    pub fn from_config(config: &GeminiConfig) -> Result<Self, LlmError> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::Misconfiguration(
                "Gemini API key not found; set GEMINI_API_KEY".to_string(),
            )
        })?;
        Ok(Self::new(api_key, config.model.clone()))
    }

    #[must_use]
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            client: std::sync::OnceLock::new(),
        }
    }

    /// Override the API base URL (test servers, regional endpoints).
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(reqwest::Client::new)
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        )
    }

    async fn call_once(&self, body: &GenerateContentRequest, timeout: std::time::Duration) -> Result<GenerateContentResponse, LlmError> {
        let response = self
            .client()
            .post(self.endpoint())
            .timeout(timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout(timeout.as_secs())
                } else {
                    LlmError::Transport(format!("request failed: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            let message = truncate(&message, 300);
            return Err(match status.as_u16() {
                429 => LlmError::RateLimited(message),
                500 | 502 | 503 | 504 => LlmError::Transport(format!("HTTP {status}: {message}")),
                code => LlmError::Api {
                    status: code,
                    message,
                },
            });
        }

        response
            .json()
            .await
            .map_err(|e| LlmError::Transport(format!("failed to decode response body: {e}")))
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

#[async_trait]
impl LlmBackend for GeminiBackend {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = GenerateContentRequest {
            contents: vec![Content {
                parts: vec![Part {
                    text: request.prompt.clone(),
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_output_tokens,
                response_mime_type: "application/json".to_string(),
                response_schema: request.response_schema.clone(),
            },
        };

        debug!(
            model = %self.model,
            temperature = request.temperature,
            timeout_secs = request.timeout.as_secs(),
            "invoking Gemini generateContent"
        );

        let response = self
            .retry
            .run(
                || self.call_once(&body, request.timeout),
                LlmError::is_retryable,
            )
            .await?;

        let raw_text = response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.clone())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| LlmError::Parse("empty response from Gemini".to_string()))?;

        let parsed: Value = serde_json::from_str(&raw_text)
            .map_err(|e| LlmError::Parse(format!("invalid JSON in response: {e}")))?;

        let usage = response
            .usage_metadata
            .map(|u| UsageMetrics {
                prompt_tokens: u.prompt_token_count,
                candidates_tokens: u.candidates_token_count,
                total_tokens: u.total_token_count,
            })
            .unwrap_or_default();

        debug!(
            model = %self.model,
            prompt_tokens = ?usage.prompt_tokens,
            candidates_tokens = ?usage.candidates_tokens,
            "Gemini invocation completed"
        );

        Ok(LlmResponse {
            prompt_sha256: sha256_hex(&request.prompt),
            response_sha256: sha256_hex(&raw_text),
            raw_text,
            parsed,
            usage,
            model: self.model.clone(),
        })
    }
}

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f64,
    max_output_tokens: i64,
    response_mime_type: String,
    response_schema: Value,
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Content,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    prompt_token_count: Option<u64>,
    candidates_token_count: Option<u64>,
    total_token_count: Option<u64>,
}
