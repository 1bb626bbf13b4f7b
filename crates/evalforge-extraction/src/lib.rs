//! Failure-pattern extraction: reads unprocessed traces, prompts the LLM
//! for a structured pattern, validates, persists, and marks the trace
//! processed. The document store is the only coupling to neighboring
//! stages.

mod http;
mod prompt;
mod service;
mod trace_utils;

pub use http::router;
pub use prompt::{build_extraction_prompt, prompt_sha256};
pub use service::{ExtractionHealth, ExtractionService};
pub use trace_utils::{
    prepare_trace_for_extraction, validate_trace_required_fields, PrepMetadata,
    MAX_PAYLOAD_SIZE_BYTES,
};
