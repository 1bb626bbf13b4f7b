//! Semantic embedding client with batching and content-hash caching.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Mutex;
use thiserror::Error;
use tracing::debug;

use evalforge_config::EmbeddingConfig;

use crate::hash::sha256_hex;
use crate::retry::RetryPolicy;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Provider limit: texts per batch call.
pub const EMBEDDING_BATCH_LIMIT: usize = 5;

/// Embedding failures.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding rate limited: {0}")]
    RateLimited(String),

    #[error("embedding API error: {0}")]
    Api(String),

    #[error("embedding misconfiguration: {0}")]
    Misconfiguration(String),
}

impl EmbeddingError {
    fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_))
    }
}

/// Trait seam for embedding providers; tests swap in a deterministic stub.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text. Implementations may serve from cache.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts, preserving input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;
}

/// Gemini embedding client.
///
/// Keeps an in-process cache keyed by `sha256(text)`; a race that computes
/// the same embedding twice is tolerated (last write wins, values are
/// identical). Rate limits retry with exponential backoff; other errors
/// surface immediately.
pub struct GeminiEmbeddings {
    api_key: String,
    model: String,
    base_url: String,
    output_dimensionality: usize,
    retry: RetryPolicy,
    cache: Mutex<HashMap<String, Vec<f32>>>,
    client: std::sync::OnceLock<reqwest::Client>,
}

impl GeminiEmbeddings {
    /// Build from configuration plus the shared Gemini API key.
    ///
    /// # Errors
    ///
    /// Returns [`EmbeddingError::Misconfiguration`] when the key is absent.
    pub fn from_config(
        config: &EmbeddingConfig,
        api_key: Option<String>,
    ) -> Result<Self, EmbeddingError> {
        let api_key = api_key.ok_or_else(|| {
            EmbeddingError::Misconfiguration(
                "Gemini API key not found; set GEMINI_API_KEY".to_string(),
            )
        })?;
        Ok(Self::new(api_key, config.model.clone(), config.output_dimensionality))
    }

    #[must_use]
    pub fn new(api_key: String, model: String, output_dimensionality: usize) -> Self {
        Self {
            api_key,
            model,
            base_url: DEFAULT_BASE_URL.to_string(),
            output_dimensionality,
            retry: RetryPolicy::default(),
            cache: Mutex::new(HashMap::new()),
            client: std::sync::OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Number of cached embeddings.
    #[must_use]
    pub fn cache_size(&self) -> usize {
        self.cache.lock().expect("embedding cache poisoned").len()
    }

    /// Drop all cached embeddings; returns the number cleared.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock().expect("embedding cache poisoned");
        let count = cache.len();
        cache.clear();
        count
    }

    fn cache_get(&self, text: &str) -> Option<Vec<f32>> {
        self.cache
            .lock()
            .expect("embedding cache poisoned")
            .get(&sha256_hex(text))
            .cloned()
    }

    fn cache_put(&self, text: &str, embedding: Vec<f32>) {
        self.cache
            .lock()
            .expect("embedding cache poisoned")
            .insert(sha256_hex(text), embedding);
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(reqwest::Client::new)
    }

    async fn call_api(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        let url = format!(
            "{}/models/{}:batchEmbedContents?key={}",
            self.base_url, self.model, self.api_key
        );
        let body = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: format!("models/{}", self.model),
                    content: Content {
                        parts: vec![Part { text: text.clone() }],
                    },
                    task_type: "SEMANTIC_SIMILARITY".to_string(),
                    output_dimensionality: self.output_dimensionality,
                })
                .collect(),
        };

        let response = self
            .retry
            .run(
                || async {
                    let response = self
                        .client()
                        .post(&url)
                        .json(&body)
                        .send()
                        .await
                        .map_err(|e| EmbeddingError::Api(format!("request failed: {e}")))?;
                    let status = response.status();
                    if status.as_u16() == 429 {
                        let message = response.text().await.unwrap_or_default();
                        return Err(EmbeddingError::RateLimited(message));
                    }
                    if !status.is_success() {
                        let message = response.text().await.unwrap_or_default();
                        return Err(EmbeddingError::Api(format!("HTTP {status}: {message}")));
                    }
                    response
                        .json::<BatchEmbedResponse>()
                        .await
                        .map_err(|e| EmbeddingError::Api(format!("decode failed: {e}")))
                },
                EmbeddingError::is_retryable,
            )
            .await?;

        Ok(response.embeddings.into_iter().map(|e| e.values).collect())
    }

    /// The embedding as a plain numeric array for the similarity engine.
    pub async fn embedding_as_array(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed(text).await
    }
}

#[async_trait]
impl Embedder for GeminiEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if let Some(cached) = self.cache_get(text) {
            debug!(text_len = text.len(), "embedding cache hit");
            return Ok(cached);
        }
        let mut embeddings = self.call_api(std::slice::from_ref(&text.to_string())).await?;
        let embedding = embeddings
            .pop()
            .ok_or_else(|| EmbeddingError::Api("empty embedding response".to_string()))?;
        self.cache_put(text, embedding.clone());
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let mut results: Vec<Option<Vec<f32>>> = vec![None; texts.len()];
        let mut to_fetch: Vec<(usize, String)> = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            match self.cache_get(text) {
                Some(cached) => results[i] = Some(cached),
                None => to_fetch.push((i, text.clone())),
            }
        }

        for chunk in to_fetch.chunks(EMBEDDING_BATCH_LIMIT) {
            let batch_texts: Vec<String> = chunk.iter().map(|(_, t)| t.clone()).collect();
            let embeddings = self.call_api(&batch_texts).await?;
            if embeddings.len() != chunk.len() {
                return Err(EmbeddingError::Api(format!(
                    "expected {} embeddings, got {}",
                    chunk.len(),
                    embeddings.len()
                )));
            }
            for ((index, text), embedding) in chunk.iter().zip(embeddings) {
                self.cache_put(text, embedding.clone());
                results[*index] = Some(embedding);
            }
        }

        Ok(results.into_iter().map(|r| r.expect("all slots filled")).collect())
    }
}

#[derive(Debug, Serialize)]
struct BatchEmbedRequest {
    requests: Vec<EmbedRequest>,
}

#[derive(Debug, Serialize)]
struct EmbedRequest {
    model: String,
    content: Content,
    #[serde(rename = "taskType")]
    task_type: String,
    #[serde(rename = "outputDimensionality")]
    output_dimensionality: usize,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Debug, Deserialize)]
struct BatchEmbedResponse {
    #[serde(default)]
    embeddings: Vec<ContentEmbedding>,
}

#[derive(Debug, Deserialize)]
struct ContentEmbedding {
    values: Vec<f32>,
}
