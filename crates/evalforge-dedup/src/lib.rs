//! Deduplication: clusters freshly extracted failure patterns into
//! suggestions by embedding similarity. A pattern either merges into an
//! existing suggestion's lineage or seeds a new pending suggestion.

mod http;
mod service;

pub use http::router;
pub use service::{embedding_text, DedupHealth, DedupService};
