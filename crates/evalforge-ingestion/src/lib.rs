//! Ingestion: polls the observability provider for failing LLM spans,
//! strips PII, and persists normalized failure captures. Re-ingestion is
//! idempotent because the capture's document id is the trace id.

mod datadog;
mod http;
mod service;

pub use datadog::{DatadogSpansClient, ProviderError, RateLimitSnapshot, TraceProvider};
pub use http::router;
pub use service::{deduplicate_by_trace_id, IngestionHealth, IngestionService};
