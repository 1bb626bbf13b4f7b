//! Store-level error type.

use thiserror::Error;

/// Errors from document-store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("document not found: {collection}/{doc_id}")]
    NotFound { collection: String, doc_id: String },

    /// A transactional update lost its optimistic-concurrency race and
    /// exhausted its retries.
    #[error("transaction conflict on {collection}/{doc_id}")]
    Conflict { collection: String, doc_id: String },

    /// The transform closure refused the update (e.g. a status-machine
    /// precondition). Carries the application reason verbatim.
    #[error("transaction aborted: {0}")]
    Aborted(String),

    #[error("store transport error: {0}")]
    Transport(String),

    #[error("store serialization error: {0}")]
    Serde(String),
}

impl StoreError {
    #[must_use]
    pub fn not_found(collection: &str, doc_id: &str) -> Self {
        Self::NotFound {
            collection: collection.to_string(),
            doc_id: doc_id.to_string(),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serde(err.to_string())
    }
}
