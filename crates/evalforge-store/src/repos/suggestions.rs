//! Repository for suggestions: creation, merging, drafts, and the
//! approval state machine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use evalforge_types::{SourceTraceRef, Suggestion, SuggestionStatus, SuggestionType};

use crate::collections::Collections;
use crate::error::StoreError;
use crate::store::{DocumentStore, Filter, ListQuery};
use crate::value::array_union;

/// Filters accepted by the listing endpoint.
#[derive(Debug, Clone, Default)]
pub struct SuggestionFilter {
    pub status: Option<SuggestionStatus>,
    pub suggestion_type: Option<SuggestionType>,
}

/// One page of suggestions.
#[derive(Debug, Clone)]
pub struct SuggestionPage {
    pub suggestions: Vec<Suggestion>,
    pub next_cursor: Option<String>,
    pub has_more: bool,
}

/// Suggestions collection access.
#[derive(Clone)]
pub struct SuggestionRepository {
    store: Arc<dyn DocumentStore>,
    collections: Collections,
}

impl SuggestionRepository {
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self { store, collections }
    }

    fn collection(&self) -> String {
        self.collections.suggestions()
    }

    pub async fn create(&self, suggestion: &Suggestion) -> Result<(), StoreError> {
        self.store
            .set(
                &self.collection(),
                &suggestion.suggestion_id,
                serde_json::to_value(suggestion)?,
            )
            .await
    }

    pub async fn get(&self, suggestion_id: &str) -> Result<Option<Suggestion>, StoreError> {
        let doc = self.store.get(&self.collection(), suggestion_id).await?;
        match doc {
            None => Ok(None),
            Some(doc) => serde_json::from_value(doc)
                .map(Some)
                .map_err(|e| StoreError::Serde(e.to_string())),
        }
    }

    /// Every `(suggestion_id, embedding)` pair, loaded once per dedup batch
    /// as the in-memory candidate set.
    pub async fn all_embeddings(&self) -> Result<Vec<(String, Vec<f32>)>, StoreError> {
        let page = self
            .store
            .list(&self.collection(), ListQuery::default())
            .await?;
        Ok(page
            .docs
            .into_iter()
            .filter_map(|(id, doc)| {
                let embedding: Vec<f32> = doc
                    .get("embedding")?
                    .as_array()?
                    .iter()
                    .filter_map(|v| v.as_f64().map(|f| f as f32))
                    .collect();
                (!embedding.is_empty()).then_some((id, embedding))
            })
            .collect())
    }

    /// Merge a pattern into an existing suggestion's lineage.
    ///
    /// Idempotent by trace id: if the trace is already present, the
    /// document is returned unchanged and no entry is appended.
    pub async fn merge_source_trace(
        &self,
        suggestion_id: &str,
        entry: SourceTraceRef,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, StoreError> {
        let suggestion_id_owned = suggestion_id.to_string();
        let updated = self
            .store
            .transform(
                &self.collection(),
                suggestion_id,
                Box::new(move |doc| {
                    let mut doc = doc.ok_or_else(|| {
                        StoreError::Aborted(format!("suggestion {suggestion_id_owned} not found"))
                    })?;
                    let already_present = doc["source_traces"]
                        .as_array()
                        .is_some_and(|traces| {
                            traces
                                .iter()
                                .any(|t| t["trace_id"].as_str() == Some(entry.trace_id.as_str()))
                        });
                    if already_present {
                        return Ok(doc);
                    }
                    array_union(
                        &mut doc,
                        "source_traces",
                        vec![serde_json::to_value(&entry)?],
                    );
                    doc["updated_at"] = json!(now);
                    Ok(doc)
                }),
            )
            .await?;
        serde_json::from_value(updated).map_err(|e| StoreError::Serde(e.to_string()))
    }

    /// Atomic status transition: pending → approved.
    pub async fn approve(
        &self,
        suggestion_id: &str,
        actor: &str,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, StoreError> {
        self.transition(suggestion_id, "approved", actor, notes, None, now)
            .await
    }

    /// Atomic status transition: pending → rejected. Reason required by
    /// the HTTP layer.
    pub async fn reject(
        &self,
        suggestion_id: &str,
        actor: &str,
        reason: String,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, StoreError> {
        self.transition(
            suggestion_id,
            "rejected",
            actor,
            Some(reason.clone()),
            Some(reason),
            now,
        )
        .await
    }

    async fn transition(
        &self,
        suggestion_id: &str,
        target: &str,
        actor: &str,
        notes: Option<String>,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, StoreError> {
        let collection = self.collection();
        let suggestion_id_owned = suggestion_id.to_string();
        let target = target.to_string();
        let actor = actor.to_string();
        let updated = self
            .store
            .transform(
                &collection,
                suggestion_id,
                Box::new(move |doc| {
                    let mut doc = doc.ok_or_else(|| {
                        StoreError::not_found("suggestions", &suggestion_id_owned)
                    })?;
                    let current = doc["status"].as_str().unwrap_or("unknown").to_string();
                    if current != "pending" {
                        return Err(StoreError::Aborted(format!(
                            "invalid_transition: cannot move from '{current}' to '{target}'"
                        )));
                    }

                    let history_entry = json!({
                        "status": target.clone(),
                        "timestamp": now,
                        "actor": actor.clone(),
                        "notes": notes.clone(),
                    });
                    let mut approval_metadata = json!({
                        "actor": actor.clone(),
                        "action": target.clone(),
                        "timestamp": now,
                    });
                    if let Some(notes) = &notes {
                        approval_metadata["notes"] = json!(notes);
                    }
                    if let Some(reason) = &reason {
                        approval_metadata["reason"] = json!(reason);
                    }

                    doc["status"] = json!(target.clone());
                    doc["updated_at"] = json!(now);
                    doc["approval_metadata"] = approval_metadata;
                    array_union(&mut doc, "version_history", vec![history_entry]);
                    Ok(doc)
                }),
            )
            .await?;
        serde_json::from_value(updated).map_err(|e| StoreError::Serde(e.to_string()))
    }

    /// Write a generated draft into `suggestion_content.<slot>`.
    ///
    /// Refuses with `overwrite_blocked` when the existing draft is
    /// human-edited and the force flag is absent — the check runs inside
    /// the transaction so a racing human edit cannot be lost.
    pub async fn write_draft(
        &self,
        suggestion_id: &str,
        slot: &str,
        draft: Value,
        force_overwrite: bool,
        now: DateTime<Utc>,
    ) -> Result<Suggestion, StoreError> {
        let suggestion_id_owned = suggestion_id.to_string();
        let slot = slot.to_string();
        let updated = self
            .store
            .transform(
                &self.collection(),
                suggestion_id,
                Box::new(move |doc| {
                    let mut doc = doc.ok_or_else(|| {
                        StoreError::not_found("suggestions", &suggestion_id_owned)
                    })?;
                    let existing_edit_source = doc["suggestion_content"][slot.as_str()]
                        ["edit_source"]
                        .as_str()
                        .map(str::to_string);
                    if existing_edit_source.as_deref() == Some("human") && !force_overwrite {
                        return Err(StoreError::Aborted("overwrite_blocked".to_string()));
                    }
                    if !doc["suggestion_content"].is_object() {
                        doc["suggestion_content"] = json!({});
                    }
                    doc["suggestion_content"][slot.as_str()] = draft.clone();
                    doc["updated_at"] = json!(now);
                    Ok(doc)
                }),
            )
            .await?;
        serde_json::from_value(updated).map_err(|e| StoreError::Serde(e.to_string()))
    }

    /// Pending suggestions of one type, for generator batch pickup.
    pub async fn pending_of_type(
        &self,
        suggestion_type: SuggestionType,
        limit: usize,
    ) -> Result<Vec<Suggestion>, StoreError> {
        let page = self
            .store
            .list(
                &self.collection(),
                ListQuery {
                    filters: vec![
                        Filter::eq("status", "pending"),
                        Filter::eq("type", suggestion_type.as_str()),
                    ],
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

    /// Listing with filters and cursor pagination.
    pub async fn list(
        &self,
        filter: &SuggestionFilter,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<SuggestionPage, StoreError> {
        let mut filters = Vec::new();
        if let Some(status) = filter.status {
            filters.push(Filter::eq("status", status.as_str()));
        }
        if let Some(suggestion_type) = filter.suggestion_type {
            filters.push(Filter::eq("type", suggestion_type.as_str()));
        }
        let page = self
            .store
            .list(
                &self.collection(),
                ListQuery {
                    filters,
                    limit,
                    cursor,
                    order_by_created_at: true,
                },
            )
            .await?;
        let has_more = page.next_cursor.is_some();
        Ok(SuggestionPage {
            suggestions: page
                .docs
                .into_iter()
                .filter_map(|(_, doc)| serde_json::from_value(doc).ok())
                .collect(),
            next_cursor: page.next_cursor,
            has_more,
        })
    }

    pub async fn count_by_status(&self, status: SuggestionStatus) -> Result<usize, StoreError> {
        self.store
            .count(&self.collection(), &[Filter::eq("status", status.as_str())])
            .await
    }

    pub async fn count_by_type(&self, t: SuggestionType) -> Result<usize, StoreError> {
        self.store
            .count(&self.collection(), &[Filter::eq("type", t.as_str())])
            .await
    }

    pub async fn count_by_severity(&self, severity: &str) -> Result<usize, StoreError> {
        self.store
            .count(&self.collection(), &[Filter::eq("severity", severity)])
            .await
    }

    /// Approved eval-type suggestions, for the coverage metric.
    pub async fn count_approved_evals(&self) -> Result<usize, StoreError> {
        self.store
            .count(
                &self.collection(),
                &[Filter::eq("status", "approved"), Filter::eq("type", "eval")],
            )
            .await
    }

    pub async fn total(&self) -> Result<usize, StoreError> {
        self.store.count(&self.collection(), &[]).await
    }

    /// Timestamp of the most recent approval, for health reporting.
    pub async fn last_approval_at(&self) -> Result<Option<String>, StoreError> {
        let page = self
            .store
            .list(
                &self.collection(),
                ListQuery {
                    filters: vec![Filter::eq("status", "approved")],
                    limit: 0,
                    cursor: None,
                    order_by_created_at: false,
                },
            )
            .await?;
        Ok(page
            .docs
            .iter()
            .filter_map(|(_, doc)| doc.get("updated_at").and_then(Value::as_str))
            .max()
            .map(str::to_string))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use evalforge_types::{
        Evidence, FailurePattern, FailureType, ReproductionContext, Severity,
    };

    fn repo() -> SuggestionRepository {
        SuggestionRepository::new(
            Arc::new(MemoryStore::new()),
            Collections::new("evalforge_"),
        )
    }

    fn pattern(trace_id: &str, failure_type: FailureType) -> FailurePattern {
        FailurePattern {
            pattern_id: FailurePattern::derive_pattern_id(trace_id),
            source_trace_id: trace_id.to_string(),
            title: "t".to_string(),
            failure_type,
            trigger_condition: "trigger".to_string(),
            summary: "summary".to_string(),
            root_cause_hypothesis: "h".to_string(),
            evidence: Evidence {
                signals: vec!["s".to_string()],
                excerpt: None,
            },
            recommended_actions: vec!["a".to_string()],
            reproduction_context: ReproductionContext::default(),
            severity: Severity::Medium,
            confidence: 0.8,
            confidence_rationale: "r".to_string(),
            extracted_at: Utc::now(),
            processed: false,
        }
    }

    fn suggestion(id: &str) -> Suggestion {
        Suggestion::from_pattern(
            id.to_string(),
            &pattern("t1", FailureType::Hallucination),
            vec![1.0, 0.0],
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn approve_transitions_and_appends_history() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();

        let now = Utc::now();
        let approved = repo
            .approve("sugg_1", "alice", Some("lgtm".to_string()), now)
            .await
            .unwrap();
        assert_eq!(approved.status, SuggestionStatus::Approved);
        let meta = approved.approval_metadata.as_ref().unwrap();
        assert_eq!(meta.actor, "alice");
        assert_eq!(meta.action, "approved");
        assert_eq!(approved.version_history.len(), 1);
        assert_eq!(approved.version_history.last().unwrap().status, "approved");
        // Audit completeness: updated_at matches the approval timestamp.
        assert_eq!(approved.updated_at, meta.timestamp);
    }

    #[tokio::test]
    async fn second_approve_is_invalid_transition() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();
        repo.approve("sugg_1", "alice", None, Utc::now()).await.unwrap();

        let err = repo
            .approve("sugg_1", "bob", None, Utc::now())
            .await
            .unwrap_err();
        match err {
            StoreError::Aborted(reason) => assert!(reason.contains("invalid_transition")),
            other => panic!("expected Aborted, got {other:?}"),
        }
        // Status unchanged, history unchanged.
        let stored = repo.get("sugg_1").await.unwrap().unwrap();
        assert_eq!(stored.status, SuggestionStatus::Approved);
        assert_eq!(stored.version_history.len(), 1);
    }

    #[tokio::test]
    async fn reject_records_reason() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();
        let rejected = repo
            .reject("sugg_1", "bob", "duplicate of sugg_0".to_string(), Utc::now())
            .await
            .unwrap();
        assert_eq!(rejected.status, SuggestionStatus::Rejected);
        assert_eq!(
            rejected.approval_metadata.unwrap().reason.as_deref(),
            Some("duplicate of sugg_0")
        );
    }

    #[tokio::test]
    async fn approve_missing_suggestion_is_not_found() {
        let err = repo()
            .approve("nope", "alice", None, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn merge_is_idempotent_by_trace_id() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();

        let entry = SourceTraceRef {
            trace_id: "t2".to_string(),
            pattern_id: "pattern_t2".to_string(),
            added_at: Utc::now(),
            similarity_score: Some(0.91),
        };
        let merged = repo
            .merge_source_trace("sugg_1", entry.clone(), Utc::now())
            .await
            .unwrap();
        assert_eq!(merged.source_traces.len(), 2);

        // Second merge of the same trace id: no-op even with a different
        // score/timestamp.
        let entry_again = SourceTraceRef {
            similarity_score: Some(0.99),
            added_at: Utc::now(),
            ..entry
        };
        let merged_again = repo
            .merge_source_trace("sugg_1", entry_again, Utc::now())
            .await
            .unwrap();
        assert_eq!(merged_again.source_traces.len(), 2);
    }

    #[tokio::test]
    async fn write_draft_blocks_human_edits_without_force() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();

        let generated = json!({"eval_test_id": "eval_1", "edit_source": "generated"});
        repo.write_draft("sugg_1", "eval_test", generated, false, Utc::now())
            .await
            .unwrap();

        // A human takes over the draft.
        let human = json!({"eval_test_id": "eval_1", "edit_source": "human"});
        repo.write_draft("sugg_1", "eval_test", human, true, Utc::now())
            .await
            .unwrap();

        let regenerated = json!({"eval_test_id": "eval_2", "edit_source": "generated"});
        let err = repo
            .write_draft("sugg_1", "eval_test", regenerated.clone(), false, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Aborted(reason) if reason == "overwrite_blocked"));

        // Force flag overrides.
        let forced = repo
            .write_draft("sugg_1", "eval_test", regenerated, true, Utc::now())
            .await
            .unwrap();
        assert!(forced.suggestion_content.eval_test.is_some());
    }

    #[tokio::test]
    async fn listing_filters_and_reports_has_more() {
        let repo = repo();
        for i in 0..5 {
            let mut s = suggestion(&format!("sugg_{i}"));
            s.created_at = Utc::now() + chrono::Duration::seconds(i);
            s.updated_at = s.created_at;
            repo.create(&s).await.unwrap();
        }

        let page = repo
            .list(
                &SuggestionFilter {
                    status: Some(SuggestionStatus::Pending),
                    suggestion_type: Some(SuggestionType::Eval),
                },
                2,
                None,
            )
            .await
            .unwrap();
        assert_eq!(page.suggestions.len(), 2);
        assert!(page.has_more);

        let page2 = repo
            .list(&SuggestionFilter::default(), 10, page.next_cursor)
            .await
            .unwrap();
        assert_eq!(page2.suggestions.len(), 3);
        assert!(!page2.has_more);
    }

    #[tokio::test]
    async fn counts_and_last_approval() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();
        repo.create(&suggestion("sugg_2")).await.unwrap();
        assert_eq!(
            repo.count_by_status(SuggestionStatus::Pending).await.unwrap(),
            2
        );
        assert_eq!(repo.count_approved_evals().await.unwrap(), 0);
        assert!(repo.last_approval_at().await.unwrap().is_none());

        repo.approve("sugg_1", "alice", None, Utc::now()).await.unwrap();
        assert_eq!(repo.count_approved_evals().await.unwrap(), 1);
        assert!(repo.last_approval_at().await.unwrap().is_some());
    }

    #[tokio::test]
    async fn all_embeddings_returns_stored_vectors() {
        let repo = repo();
        repo.create(&suggestion("sugg_1")).await.unwrap();
        let embeddings = repo.all_embeddings().await.unwrap();
        assert_eq!(embeddings.len(), 1);
        assert_eq!(embeddings[0].0, "sugg_1");
        assert_eq!(embeddings[0].1, vec![1.0, 0.0]);
    }
}
