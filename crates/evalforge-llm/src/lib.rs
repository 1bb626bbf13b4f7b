//! LLM and embedding clients for EvalForge.
//!
//! Both clients speak to Gemini over HTTP. The generation client enforces
//! structured output through the provider's `responseMimeType` +
//! `responseSchema` mechanism; the embedding client batches requests and
//! caches by content hash. Retry policy lives here and nowhere else —
//! application code above this layer never retries.

mod embeddings;
mod error;
mod gemini;
mod hash;
mod retry;
mod types;

pub use embeddings::{Embedder, EmbeddingError, GeminiEmbeddings, EMBEDDING_BATCH_LIMIT};
pub use error::LlmError;
pub use gemini::GeminiBackend;
pub use hash::sha256_hex;
pub use retry::RetryPolicy;
pub use types::{LlmBackend, LlmRequest, LlmResponse, UsageMetrics};
