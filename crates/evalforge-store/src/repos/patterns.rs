//! Repository for extracted failure patterns.

use std::sync::Arc;

use serde_json::json;

use evalforge_types::FailurePattern;

use crate::collections::Collections;
use crate::error::StoreError;
use crate::store::{DocumentStore, Filter, ListQuery};

/// Failure-pattern collection access. Extraction writes patterns;
/// deduplication toggles `processed`.
///
/// The document id is the source trace id — the one identifier scheme for
/// patterns. `pattern_id` is a derived display name.
#[derive(Clone)]
pub struct PatternRepository {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl PatternRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    fn collection(&self) -> String {
        self.collections.failure_patterns()
    }

    /// Idempotent write: re-extraction overwrites the same document.
    pub async fn upsert_pattern(&self, pattern: &FailurePattern) -> Result<(), StoreError> {
        self.store
            .set(
                &self.collection(),
                &pattern.source_trace_id,
                serde_json::to_value(pattern)?,
            )
            .await
    }

    pub async fn get_by_trace_id(
        &self,
        source_trace_id: &str,
    ) -> Result<Option<FailurePattern>, StoreError> {
        let doc = self.store.get(&self.collection(), source_trace_id).await?;
        Ok(doc.and_then(|d| serde_json::from_value(d).ok()))
    }

    /// Fetch the patterns behind a suggestion's lineage.
    pub async fn get_by_trace_ids(
        &self,
        source_trace_ids: &[String],
    ) -> Result<Vec<FailurePattern>, StoreError> {
        let mut patterns = Vec::new();
        for id in source_trace_ids {
            if let Some(pattern) = self.get_by_trace_id(id).await? {
                patterns.push(pattern);
            }
        }
        Ok(patterns)
    }

    /// Patterns deduplication has not yet consumed.
    pub async fn get_unprocessed(&self, limit: usize) -> Result<Vec<FailurePattern>, StoreError> {
        let page = self
            .store
            .list(
                &self.collection(),
                ListQuery {
                    filters: vec![Filter::eq("processed", false)],
                    limit,
                    cursor: None,
                    order_by_created_at: false,
                },
            )
            .await?;
        Ok(page
            .docs
            .into_iter()
            .filter_map(|(_, doc)| serde_json::from_value(doc).ok())
            .collect())
    }

    pub async fn mark_processed(&self, source_trace_id: &str) -> Result<(), StoreError> {
        let id = source_trace_id.to_string();
        self.store
            .transform(
                &self.collection(),
                source_trace_id,
                Box::new(move |doc| {
                    let mut doc =
                        doc.ok_or_else(|| StoreError::Aborted(format!("pattern {id} not found")))?;
                    doc["processed"] = json!(true);
                    Ok(doc)
                }),
            )
            .await?;
        Ok(())
    }

    /// Number of patterns awaiting deduplication.
    pub async fn backlog_size(&self) -> Result<usize, StoreError> {
        self.store
            .count(&self.collection(), &[Filter::eq("processed", false)])
            .await
    }
}
