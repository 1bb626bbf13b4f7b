//! Approval business logic over the suggestion repository.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{info, warn};

use evalforge_store::{
    Collections, DocumentStore, StoreError, SuggestionFilter, SuggestionPage,
    SuggestionRepository, TraceRepository,
};
use evalforge_types::{Suggestion, SuggestionStatus, SuggestionType};

use crate::exporters::{export_suggestion, ExportError, ExportFormat};
use crate::webhook::WebhookNotifier;

/// Approval-layer errors, mapped to HTTP statuses by the router.
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("suggestion {0} not found")]
    NotFound(String),

    #[error("invalid_transition: {0}")]
    InvalidTransition(String),

    #[error("reason is required to reject a suggestion")]
    ReasonRequired,

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("store error: {0}")]
    Store(String),
}

impl From<StoreError> for ApprovalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { doc_id, .. } => Self::NotFound(doc_id),
            StoreError::Aborted(reason) if reason.starts_with("invalid_transition") => {
                Self::InvalidTransition(reason)
            }
            other => Self::Store(other.to_string()),
        }
    }
}

/// Approval workflow service.
pub struct ApprovalService {
    suggestions: SuggestionRepository,
    traces: TraceRepository,
    store: Arc<dyn DocumentStore>,
    collections: Collections,
    notifier: Arc<WebhookNotifier>,
    api_key: Option<String>,
}

impl ApprovalService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        collections: Collections,
        notifier: Arc<WebhookNotifier>,
        api_key: Option<String>,
    ) -> Self {
        Self {
            suggestions: SuggestionRepository::new(store.clone(), collections.clone()),
            traces: TraceRepository::new(store.clone(), collections.clone()),
            store,
            collections,
            notifier,
            api_key,
        }
    }

    pub fn suggestions(&self) -> &SuggestionRepository {
        &self.suggestions
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Approve a pending suggestion; returns the updated document.
    /// The webhook is scheduled by the HTTP layer after this returns.
    pub async fn approve(
        &self,
        suggestion_id: &str,
        actor: &str,
        notes: Option<String>,
    ) -> Result<Suggestion, ApprovalError> {
        let updated = self
            .suggestions
            .approve(suggestion_id, actor, notes.clone(), Utc::now())
            .await?;
        info!(
            event = "audit",
            actor,
            action = "approve_suggestion",
            target = suggestion_id,
            status = "approved",
            "suggestion approved"
        );
        Ok(updated)
    }

    /// Reject a pending suggestion; reason is mandatory.
    pub async fn reject(
        &self,
        suggestion_id: &str,
        actor: &str,
        reason: String,
    ) -> Result<Suggestion, ApprovalError> {
        if reason.trim().is_empty() {
            return Err(ApprovalError::ReasonRequired);
        }
        let updated = self
            .suggestions
            .reject(suggestion_id, actor, reason.clone(), Utc::now())
            .await?;
        info!(
            event = "audit",
            actor,
            action = "reject_suggestion",
            target = suggestion_id,
            status = "rejected",
            reason = %reason,
            "suggestion rejected"
        );
        Ok(updated)
    }

    /// Fire-and-forget webhook for a completed transition. Spawned onto
    /// the runtime so the HTTP response never waits on it.
    pub fn notify(&self, suggestion: &Suggestion, notes: Option<String>, reason: Option<String>) {
        let notifier = Arc::clone(&self.notifier);
        let suggestion_id = suggestion.suggestion_id.clone();
        let action = suggestion.status.as_str().to_string();
        let suggestion_type = suggestion.suggestion_type.as_str().to_string();
        let actor = suggestion
            .approval_metadata
            .as_ref()
            .map(|m| m.actor.clone())
            .unwrap_or_else(|| "api".to_string());
        tokio::spawn(async move {
            notifier
                .send_approval_notification(
                    &suggestion_id,
                    &action,
                    &actor,
                    Some(&suggestion_type),
                    notes.as_deref(),
                    reason.as_deref(),
                )
                .await;
        });
    }

    pub async fn get(&self, suggestion_id: &str) -> Result<Option<Suggestion>, ApprovalError> {
        Ok(self.suggestions.get(suggestion_id).await?)
    }

    pub async fn list(
        &self,
        status: Option<SuggestionStatus>,
        suggestion_type: Option<SuggestionType>,
        limit: usize,
        cursor: Option<String>,
    ) -> Result<SuggestionPage, ApprovalError> {
        Ok(self
            .suggestions
            .list(
                &SuggestionFilter {
                    status,
                    suggestion_type,
                },
                limit.clamp(1, 100),
                cursor,
            )
            .await?)
    }

    /// Export an approved suggestion; stamps source traces as exported
    /// and records the export document.
    pub async fn export(
        &self,
        suggestion_id: &str,
        format: ExportFormat,
    ) -> Result<(String, &'static str), ApprovalError> {
        let suggestion = self
            .suggestions
            .get(suggestion_id)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(suggestion_id.to_string()))?;

        let (content, content_type) = export_suggestion(&suggestion, format)?;

        let destination = match format {
            ExportFormat::Deepeval => "deepeval",
            ExportFormat::Pytest => "pytest",
            ExportFormat::Yaml => "yaml",
        };
        let now = Utc::now();
        let export_reference = format!("export_{suggestion_id}_{destination}");
        let export_doc = serde_json::json!({
            "export_reference": export_reference,
            "suggestion_id": suggestion_id,
            "destination": destination,
            "exported_at": now,
            "source_trace_ids": suggestion
                .source_traces
                .iter()
                .map(|s| s.trace_id.clone())
                .collect::<Vec<_>>(),
        });
        if let Err(err) = self
            .store
            .set(&self.collections.exports(), &export_reference, export_doc)
            .await
        {
            warn!(event = "export_record_failed", error = %err, "failed to record export");
        }

        // Source captures move new → exported.
        for source in &suggestion.source_traces {
            if let Err(err) = self
                .traces
                .mark_exported(&source.trace_id, destination, &export_reference, now)
                .await
            {
                warn!(
                    event = "trace_export_stamp_failed",
                    trace_id = %source.trace_id,
                    error = %err,
                    "failed to stamp trace export"
                );
            }
        }

        info!(
            event = "audit",
            actor = "api",
            action = "export_suggestion",
            target = suggestion_id,
            status = "succeeded",
            format = destination,
            "suggestion exported"
        );
        Ok((content, content_type))
    }

    /// Health statistics for the approval surface.
    pub async fn health_stats(&self) -> Result<serde_json::Value, ApprovalError> {
        let pending = self.suggestions.count_by_status(SuggestionStatus::Pending).await?;
        let last_approval = self.suggestions.last_approval_at().await?;
        Ok(serde_json::json!({
            "pendingCount": pending,
            "lastApprovalAt": last_approval,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalforge_store::MemoryStore;
    use evalforge_types::{
        CaptureStatus, DraftSource, DraftStatus, EditSource, EvalTestDraft, Evidence,
        FailureCapture, FailurePattern, FailureType, ReproductionContext, Severity,
    };
    use serde_json::json;

    fn pattern() -> FailurePattern {
        FailurePattern {
            pattern_id: "pattern_t1".to_string(),
            source_trace_id: "t1".to_string(),
            title: "t".to_string(),
            failure_type: FailureType::Hallucination,
            trigger_condition: "trigger".to_string(),
            summary: "summary".to_string(),
            root_cause_hypothesis: "h".to_string(),
            evidence: Evidence {
                signals: vec!["s".to_string()],
                excerpt: None,
            },
            recommended_actions: vec!["a".to_string()],
            reproduction_context: ReproductionContext::default(),
            severity: Severity::High,
            confidence: 0.9,
            confidence_rationale: "r".to_string(),
            extracted_at: Utc::now(),
            processed: false,
        }
    }

    fn eval_draft() -> EvalTestDraft {
        EvalTestDraft {
            eval_test_id: "eval_1".to_string(),
            test_name: "test".to_string(),
            description: "d".to_string(),
            input_prompt: "p".to_string(),
            expected_behavior: "e".to_string(),
            failure_condition: "f".to_string(),
            assertions: vec!["a".to_string()],
            tags: vec![],
            source: DraftSource {
                trace_ids: vec!["t1".to_string()],
                pattern_ids: vec!["pattern_t1".to_string()],
                canonical_trace_id: "t1".to_string(),
                canonical_pattern_id: "pattern_t1".to_string(),
            },
            status: DraftStatus::Draft,
            reason: None,
            edit_source: EditSource::Generated,
            generated_at: Utc::now(),
            updated_at: Utc::now(),
            generator_meta: None,
        }
    }

    async fn service() -> (ApprovalService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let service = ApprovalService::new(
            store.clone() as Arc<dyn DocumentStore>,
            Collections::new("evalforge_"),
            Arc::new(WebhookNotifier::new(None)),
            Some("k-123".to_string()),
        );
        let mut suggestion =
            Suggestion::from_pattern("sugg_1".to_string(), &pattern(), vec![], Utc::now());
        suggestion.suggestion_content.eval_test = Some(eval_draft());
        service.suggestions().create(&suggestion).await.unwrap();
        (service, store)
    }

    #[tokio::test]
    async fn approve_then_reapprove_fails_with_invalid_transition() {
        let (service, _) = service().await;
        let approved = service
            .approve("sugg_1", "alice", Some("ship it".to_string()))
            .await
            .unwrap();
        assert_eq!(approved.status, SuggestionStatus::Approved);
        assert_eq!(approved.approval_metadata.as_ref().unwrap().actor, "alice");
        assert_eq!(approved.version_history.len(), 1);

        let err = service.approve("sugg_1", "bob", None).await.unwrap_err();
        assert!(matches!(err, ApprovalError::InvalidTransition(_)));
    }

    #[tokio::test]
    async fn reject_requires_reason() {
        let (service, _) = service().await;
        let err = service
            .reject("sugg_1", "bob", "   ".to_string())
            .await
            .unwrap_err();
        assert!(matches!(err, ApprovalError::ReasonRequired));

        let rejected = service
            .reject("sugg_1", "bob", "not actionable".to_string())
            .await
            .unwrap();
        assert_eq!(rejected.status, SuggestionStatus::Rejected);
    }

    #[tokio::test]
    async fn approve_missing_suggestion_is_not_found() {
        let (service, _) = service().await;
        let err = service.approve("sugg_x", "alice", None).await.unwrap_err();
        assert!(matches!(err, ApprovalError::NotFound(_)));
    }

    #[tokio::test]
    async fn export_requires_approved_status() {
        let (service, _) = service().await;
        let err = service
            .export("sugg_1", ExportFormat::Deepeval)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ApprovalError::Export(ExportError::NotApproved(_))
        ));
    }

    #[tokio::test]
    async fn export_stamps_traces_and_records_document() {
        let (service, store) = service().await;

        // Seed the source capture so the stamp has a target.
        let capture = FailureCapture {
            trace_id: "t1".to_string(),
            fetched_at: Utc::now(),
            failure_type: "hallucination".to_string(),
            trace_payload: json!({"prompt": "[redacted]"}),
            service_name: "chat".to_string(),
            severity: "high".to_string(),
            status_code: None,
            quality_score: None,
            user_hash: None,
            processed: true,
            recurrence_count: 1,
            status: CaptureStatus::New,
            status_history: Vec::new(),
            export_status: None,
            export_destination: None,
            export_reference: None,
        };
        service.traces.upsert_capture(capture).await.unwrap();

        service.approve("sugg_1", "alice", None).await.unwrap();
        let (content, content_type) = service
            .export("sugg_1", ExportFormat::Deepeval)
            .await
            .unwrap();
        assert_eq!(content_type, "application/json");
        assert!(serde_json::from_str::<serde_json::Value>(&content).is_ok());

        let exports = store.dump("evalforge_exports").await;
        assert_eq!(exports.len(), 1);

        let traces = store.dump("evalforge_raw_traces").await;
        assert_eq!(traces[0].1["status"], "exported");
        assert_eq!(traces[0].1["export_destination"], "deepeval");
    }

    #[tokio::test]
    async fn listing_and_health_stats() {
        let (service, _) = service().await;
        let page = service.list(None, None, 10, None).await.unwrap();
        assert_eq!(page.suggestions.len(), 1);
        assert!(!page.has_more);

        let stats = service.health_stats().await.unwrap();
        assert_eq!(stats["pendingCount"], 1);
        assert!(stats["lastApprovalAt"].is_null());

        service.approve("sugg_1", "alice", None).await.unwrap();
        let stats = service.health_stats().await.unwrap();
        assert_eq!(stats["pendingCount"], 0);
        assert!(stats["lastApprovalAt"].is_string());
    }
}
