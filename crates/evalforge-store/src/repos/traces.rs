//! Repository for raw failure captures.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use evalforge_types::FailureCapture;

use crate::collections::Collections;
use crate::error::StoreError;
use crate::store::{DocumentStore, Filter, ListQuery};
use crate::value::array_union;

/// Raw-traces collection access. Ingestion writes captures; extraction
/// toggles `processed`; approval export stamps export fields.
#[derive(Clone)]
pub struct TraceRepository {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl TraceRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    fn collection(&self) -> String {
        self.collections.raw_traces()
    }

    /// Upsert a capture, preserving approval-owned fields when the trace
    /// was seen before.
    pub async fn upsert_capture(&self, mut capture: FailureCapture) -> Result<(), StoreError> {
        let collection = self.collection();
        if let Some(existing) = self.store.get(&collection, &capture.trace_id).await? {
            if let Ok(existing) = serde_json::from_value::<FailureCapture>(existing) {
                capture.preserve_from(&existing);
            }
        }
        let doc_id = capture.trace_id.clone();
        self.store
            .set(&collection, &doc_id, serde_json::to_value(&capture)?)
            .await
    }

    pub async fn get(&self, trace_id: &str) -> Result<Option<FailureCapture>, StoreError> {
        let doc = self.store.get(&self.collection(), trace_id).await?;
        Ok(doc.and_then(|d| serde_json::from_value(d).ok()))
    }

    /// Unprocessed traces for an extraction batch. When explicit ids are
    /// given they win over the processed filter, matching manual re-runs.
    pub async fn get_unprocessed(
        &self,
        limit: usize,
        trace_ids: Option<&[String]>,
    ) -> Result<Vec<FailureCapture>, StoreError> {
        if let Some(ids) = trace_ids {
            let mut captures = Vec::new();
            for id in ids.iter().take(limit) {
                if let Some(capture) = self.get(id).await? {
                    captures.push(capture);
                }
            }
            return Ok(captures);
        }
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

    /// Mark a trace consumed by extraction.
    pub async fn mark_processed(&self, trace_id: &str) -> Result<(), StoreError> {
        let collection = self.collection();
        let trace_id_owned = trace_id.to_string();
        self.store
            .transform(
                &collection,
                trace_id,
                Box::new(move |doc| {
                    let mut doc = doc.ok_or_else(|| {
                        StoreError::Aborted(format!("trace {trace_id_owned} not found"))
                    })?;
                    doc["processed"] = json!(true);
                    Ok(doc)
                }),
            )
            .await?;
        Ok(())
    }

    /// Stamp a successful approval export onto the source trace.
    pub async fn mark_exported(
        &self,
        trace_id: &str,
        destination: &str,
        reference: &str,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let collection = self.collection();
        let destination = destination.to_string();
        let reference = reference.to_string();
        self.store
            .transform(
                &collection,
                trace_id,
                Box::new(move |doc| {
                    let mut doc = doc.unwrap_or_else(|| json!({}));
                    doc["status"] = json!("exported");
                    doc["export_status"] = json!("succeeded");
                    doc["export_destination"] = json!(destination.clone());
                    doc["export_reference"] = json!(reference.clone());
                    array_union(
                        &mut doc,
                        "status_history",
                        vec![json!({
                            "status": "exported",
                            "actor": "approval",
                            "timestamp": now,
                        })],
                    );
                    Ok(doc)
                }),
            )
            .await?;
        Ok(())
    }

    /// Number of traces extraction has not yet consumed.
    pub async fn backlog_size(&self) -> Result<usize, StoreError> {
        self.store
            .count(&self.collection(), &[Filter::eq("processed", false)])
            .await
    }

    /// Total captures (health reporting).
    pub async fn total(&self) -> Result<usize, StoreError> {
        self.store.count(&self.collection(), &[]).await
    }

    /// Raw document access for pipelines that need fields beyond the type.
    pub async fn get_raw(&self, trace_id: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(&self.collection(), trace_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use evalforge_types::CaptureStatus;

    fn repo() -> TraceRepository {
        TraceRepository::new(
            Arc::new(MemoryStore::new()),
            Collections::new("evalforge_"),
        )
    }

    fn capture(trace_id: &str, recurrence: u64) -> FailureCapture {
        FailureCapture {
            trace_id: trace_id.to_string(),
            fetched_at: Utc::now(),
            failure_type: "hallucination".to_string(),
            trace_payload: json!({"prompt": "[redacted]"}),
            service_name: "chat".to_string(),
            severity: "high".to_string(),
            status_code: None,
            quality_score: Some(0.3),
            user_hash: None,
            processed: false,
            recurrence_count: recurrence,
            status: CaptureStatus::New,
            status_history: Vec::new(),
            export_status: None,
            export_destination: None,
            export_reference: None,
        }
        .with_initial_history(Utc::now())
    }

    #[tokio::test]
    async fn upsert_is_idempotent_by_trace_id() {
        let repo = repo();
        repo.upsert_capture(capture("t1", 1)).await.unwrap();
        repo.upsert_capture(capture("t1", 2)).await.unwrap();
        assert_eq!(repo.total().await.unwrap(), 1);
        let stored = repo.get("t1").await.unwrap().unwrap();
        assert_eq!(stored.recurrence_count, 2);
    }

    #[tokio::test]
    async fn upsert_preserves_export_state() {
        let repo = repo();
        repo.upsert_capture(capture("t1", 1)).await.unwrap();
        repo.mark_exported("t1", "deepeval", "exp_9", Utc::now())
            .await
            .unwrap();

        repo.upsert_capture(capture("t1", 5)).await.unwrap();
        let stored = repo.get("t1").await.unwrap().unwrap();
        assert_eq!(stored.status, CaptureStatus::Exported);
        assert_eq!(stored.export_reference.as_deref(), Some("exp_9"));
        assert_eq!(stored.recurrence_count, 5);
        // History: initial "new" + exported entry, preserved across upsert.
        assert_eq!(stored.status_history.len(), 2);
    }

    #[tokio::test]
    async fn unprocessed_excludes_marked_traces() {
        let repo = repo();
        repo.upsert_capture(capture("t1", 1)).await.unwrap();
        repo.upsert_capture(capture("t2", 1)).await.unwrap();
        assert_eq!(repo.backlog_size().await.unwrap(), 2);

        repo.mark_processed("t1").await.unwrap();
        let remaining = repo.get_unprocessed(10, None).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].trace_id, "t2");
        assert_eq!(repo.backlog_size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn explicit_trace_ids_bypass_processed_filter() {
        let repo = repo();
        repo.upsert_capture(capture("t1", 1)).await.unwrap();
        repo.mark_processed("t1").await.unwrap();
        let ids = vec!["t1".to_string(), "missing".to_string()];
        let found = repo.get_unprocessed(10, Some(&ids)).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].trace_id, "t1");
    }
}
