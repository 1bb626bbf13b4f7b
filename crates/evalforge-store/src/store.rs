//! The `DocumentStore` trait and query types.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StoreError;

/// Equality filter on a document field.
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

impl Filter {
    #[must_use]
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }
}

/// A paginated list query.
///
/// Ordering is always `created_at` descending when `order_by_created_at`
/// is set; the cursor is the document id of the last item of the previous
/// page.
#[derive(Debug, Clone, Default)]
pub struct ListQuery {
    pub filters: Vec<Filter>,
    pub limit: usize,
    pub cursor: Option<String>,
    pub order_by_created_at: bool,
}

/// One page of results, each item paired with its document id.
#[derive(Debug, Clone)]
pub struct Page {
    pub docs: Vec<(String, Value)>,
    pub next_cursor: Option<String>,
}

/// Closure applied atomically to one document.
///
/// Receives the current document (None if absent) and returns the full new
/// document to write, or an error to abort without writing. `FnMut` rather
/// than `FnOnce`: optimistic-concurrency backends re-read and re-apply the
/// closure when a commit loses its race.
pub type TransformFn = Box<dyn FnMut(Option<Value>) -> Result<Value, StoreError> + Send>;

/// Uniform CRUD over a document store.
///
/// Contract:
/// - `get` is an eventually-consistent single-document fetch;
/// - `set` is last-writer-wins;
/// - `transform` is a read-then-update transaction — concurrent transforms
///   of the same document serialize, so history appends never lose entries;
/// - `list` uses cursor pagination (the id of the last document of the
///   previous page);
/// - `count` uses aggregation when the backend has it, stream-count
///   otherwise.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, collection: &str, doc_id: &str) -> Result<Option<Value>, StoreError>;

    async fn set(&self, collection: &str, doc_id: &str, doc: Value) -> Result<(), StoreError>;

    async fn transform(
        &self,
        collection: &str,
        doc_id: &str,
        f: TransformFn,
    ) -> Result<Value, StoreError>;

    async fn list(&self, collection: &str, query: ListQuery) -> Result<Page, StoreError>;

    async fn count(&self, collection: &str, filters: &[Filter]) -> Result<usize, StoreError>;

    async fn delete(&self, collection: &str, doc_id: &str) -> Result<(), StoreError>;
}
