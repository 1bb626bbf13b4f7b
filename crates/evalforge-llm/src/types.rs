//! Core request/response types for the LLM backend abstraction.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::error::LlmError;

/// Input to one structured-output LLM call.
#[derive(Debug, Clone)]
pub struct LlmRequest {
    /// The fully assembled prompt (single string).
    pub prompt: String,
    /// JSON schema for the expected output shape, passed to the provider's
    /// structured-output mode.
    pub response_schema: Value,
    pub temperature: f64,
    pub max_output_tokens: i64,
    /// Wall-clock budget for this call, honored by the transport.
    pub timeout: Duration,
}

impl LlmRequest {
    #[must_use]
    pub fn new(prompt: impl Into<String>, response_schema: Value) -> Self {
        Self {
            prompt: prompt.into(),
            response_schema,
            temperature: 0.2,
            max_output_tokens: 8192,
            timeout: Duration::from_secs(45),
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_max_output_tokens(mut self, max_output_tokens: i64) -> Self {
        self.max_output_tokens = max_output_tokens;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Token accounting reported by the provider, when available.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageMetrics {
    pub prompt_tokens: Option<u64>,
    pub candidates_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Result of one LLM call: the raw text, its parse, and the hashes that
/// make the call reproducible in `generator_meta`.
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub raw_text: String,
    pub parsed: Value,
    pub prompt_sha256: String,
    pub response_sha256: String,
    pub usage: UsageMetrics,
    pub model: String,
}

/// Trait for LLM backends.
///
/// The pipeline services depend on this seam, not on a concrete provider;
/// tests swap in deterministic mocks the same way.
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Invoke the model with structured output enforced.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError`] classified per §error: transport/rate-limit
    /// failures have already been retried by the implementation.
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError>;
}
