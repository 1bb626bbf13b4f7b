//! Repository for run summaries and diagnostic error records.

use std::sync::Arc;

use serde_json::Value;

use evalforge_types::{DedupRunSummary, ErrorRecord, ExtractionRunSummary, GeneratorRunSummary};

use crate::collections::Collections;
use crate::error::StoreError;
use crate::store::DocumentStore;

/// Writes one run-summary document per batch and one error document per
/// failed item, into the owning stage's collections.
#[derive(Clone)]
pub struct RunRepository {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl RunRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    pub async fn save_extraction_summary(
        &self,
        summary: &ExtractionRunSummary,
    ) -> Result<(), StoreError> {
        self.store
            .set(
                &self.collections.runs_for("extraction"),
                &summary.run_id,
                serde_json::to_value(summary)?,
            )
            .await
    }

    pub async fn save_dedup_summary(&self, summary: &DedupRunSummary) -> Result<(), StoreError> {
        self.store
            .set(
                &self.collections.runs_for("dedup"),
                &summary.run_id,
                serde_json::to_value(summary)?,
            )
            .await
    }

    /// `stage` is the generator's collection stem: `eval_test`,
    /// `guardrail`, or `runbook`.
    pub async fn save_generator_summary(
        &self,
        stage: &str,
        summary: &GeneratorRunSummary,
    ) -> Result<(), StoreError> {
        self.store
            .set(
                &self.collections.runs_for(stage),
                &summary.run_id,
                serde_json::to_value(summary)?,
            )
            .await
    }

    pub async fn save_error(&self, stage: &str, record: &ErrorRecord) -> Result<(), StoreError> {
        self.store
            .set(
                &self.collections.errors_for(stage),
                &record.doc_id(),
                serde_json::to_value(record)?,
            )
            .await
    }

    /// Raw summary fetch for health endpoints.
    pub async fn get_summary(&self, stage: &str, run_id: &str) -> Result<Option<Value>, StoreError> {
        self.store.get(&self.collections.runs_for(stage), run_id).await
    }
}
