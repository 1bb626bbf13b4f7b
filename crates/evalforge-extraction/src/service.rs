//! The extraction pipeline: unprocessed traces → validated patterns.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use evalforge_config::{BatchConfig, GeminiConfig};
use evalforge_llm::{LlmBackend, LlmError, LlmRequest};
use evalforge_redaction::PiiRedactor;
use evalforge_store::{
    Collections, DocumentStore, PatternRepository, RunRepository, TraceRepository,
};
use evalforge_types::{
    new_run_id, schema, ErrorRecord, Evidence, ExtractionRunSummary, FailurePattern, FailureType,
    OutcomeStatus, PipelineErrorType, ReproductionContext, RunItemOutcome, RunOnceRequest,
    Severity,
};

use crate::prompt::{build_extraction_prompt, prompt_sha256};
use crate::trace_utils::{prepare_trace_for_extraction, validate_trace_required_fields};

const EXCERPT_REDACTION_LIMIT: usize = 500;
const ERROR_EXCERPT_LIMIT: usize = 200;

/// In-memory snapshot served by `/health`, written at the end of a batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExtractionHealth {
    pub last_run_id: Option<String>,
    pub last_run_at: Option<String>,
    pub last_stored_count: usize,
    pub last_error_count: usize,
    pub last_error: Option<String>,
}

/// Extraction stage service.
pub struct ExtractionService {
    llm: Arc<dyn LlmBackend>,
    traces: TraceRepository,
    patterns: PatternRepository,
    runs: RunRepository,
    redactor: PiiRedactor,
    batch: BatchConfig,
    gemini: GeminiConfig,
    health: RwLock<ExtractionHealth>,
}

/// Fields the LLM fills in; everything else on a pattern is derived here.
#[derive(Debug, Deserialize)]
struct ExtractedFields {
    title: String,
    failure_type: FailureType,
    trigger_condition: String,
    summary: String,
    root_cause_hypothesis: String,
    evidence: Evidence,
    #[serde(default)]
    recommended_actions: Vec<String>,
    #[serde(default)]
    reproduction_context: ReproductionContext,
    severity: Severity,
    confidence: f64,
    confidence_rationale: String,
}

impl ExtractionService {
    pub fn new(
        llm: Arc<dyn LlmBackend>,
        store: Arc<dyn DocumentStore>,
        collections: Collections,
        redactor: PiiRedactor,
        batch: BatchConfig,
        gemini: GeminiConfig,
    ) -> Self {
        Self {
            llm,
            traces: TraceRepository::new(store.clone(), collections.clone()),
            patterns: PatternRepository::new(store.clone(), collections.clone()),
            runs: RunRepository::new(store, collections),
            redactor,
            batch,
            gemini,
            health: RwLock::new(ExtractionHealth::default()),
        }
    }

    pub fn traces(&self) -> &TraceRepository {
        &self.traces
    }

    pub async fn health(&self) -> ExtractionHealth {
        self.health.read().await.clone()
    }

    /// Non-secret configuration echoed by `/health`.
    pub fn config_summary(&self) -> Value {
        serde_json::json!({
            "batch_size": self.batch.batch_size,
            "per_item_timeout_sec": self.batch.per_item_timeout.as_secs(),
            "worker_count": self.batch.worker_count,
            "model": &self.gemini.model,
        })
    }

    /// Execute one extraction batch.
    pub async fn run(self: &Arc<Self>, request: RunOnceRequest) -> ExtractionRunSummary {
        let run_id = new_run_id();
        let started_at = Utc::now();
        let batch_size = request.effective_batch_size(self.batch.batch_size);
        let dry_run = request.dry_run();
        let triggered_by = request.triggered_by();

        info!(
            event = "extraction_run_started",
            run_id = %run_id,
            batch_size,
            triggered_by = triggered_by.as_str(),
            dry_run,
            model = %self.gemini.model,
            "starting extraction run"
        );

        let traces = match self
            .traces
            .get_unprocessed(batch_size, request.trace_ids.as_deref())
            .await
        {
            Ok(traces) => traces,
            Err(err) => {
                warn!(event = "traces_fetch_failed", run_id = %run_id, error = %err, "failed to fetch traces");
                let summary = ExtractionRunSummary::from_outcomes(
                    run_id.clone(),
                    started_at,
                    Utc::now(),
                    triggered_by,
                    batch_size,
                    Vec::new(),
                );
                self.finish_run(&summary, dry_run, Some(err.to_string())).await;
                return summary;
            }
        };

        info!(
            event = "traces_fetched",
            run_id = %run_id,
            picked_up_count = traces.len(),
            "fetched unprocessed traces"
        );

        // Bounded worker pool: at most `worker_count` traces in flight.
        let semaphore = Arc::new(Semaphore::new(self.batch.worker_count));
        let mut join_set = JoinSet::new();
        for capture in traces {
            let service = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let run_id = run_id.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");
                let trace = serde_json::to_value(&capture).unwrap_or(Value::Null);
                service.process_single(&trace, &run_id, dry_run).await
            });
        }

        let mut outcomes = Vec::new();
        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(outcome) => outcomes.push(outcome),
                Err(err) => {
                    outcomes.push(
                        RunItemOutcome::new("unknown", OutcomeStatus::Error)
                            .with_error(format!("worker panicked: {err}")),
                    );
                }
            }
        }

        let summary = ExtractionRunSummary::from_outcomes(
            run_id,
            started_at,
            Utc::now(),
            triggered_by,
            batch_size,
            outcomes,
        );
        self.finish_run(&summary, dry_run, None).await;
        summary
    }

    async fn finish_run(
        &self,
        summary: &ExtractionRunSummary,
        dry_run: bool,
        fetch_error: Option<String>,
    ) {
        if !dry_run {
            if let Err(err) = self.runs.save_extraction_summary(summary).await {
                warn!(event = "run_summary_write_failed", run_id = %summary.run_id, error = %err, "failed to persist run summary");
            }
        }
        {
            let mut health = self.health.write().await;
            health.last_run_id = Some(summary.run_id.clone());
            health.last_run_at = Some(summary.finished_at.to_rfc3339());
            health.last_stored_count = summary.stored_count;
            health.last_error_count =
                summary.error_count + summary.validation_failed_count + summary.timed_out_count;
            health.last_error = fetch_error;
        }
        info!(
            event = "extraction_run_completed",
            run_id = %summary.run_id,
            picked_up_count = summary.picked_up_count,
            stored_count = summary.stored_count,
            validation_failed_count = summary.validation_failed_count,
            error_count = summary.error_count,
            timed_out_count = summary.timed_out_count,
            duration_ms =
                (summary.finished_at - summary.started_at).num_milliseconds(),
            "extraction run completed"
        );
    }

    async fn process_single(&self, trace: &Value, run_id: &str, dry_run: bool) -> RunItemOutcome {
        let trace_id = trace
            .get("trace_id")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let start = Instant::now();

        info!(
            event = "trace_picked_up",
            run_id,
            source_trace_id = %trace_id,
            "processing trace"
        );

        if let Err(reason) = validate_trace_required_fields(trace) {
            warn!(
                event = "trace_invalid",
                run_id,
                source_trace_id = %trace_id,
                reason = %reason,
                "skipping invalid trace"
            );
            return RunItemOutcome::new(trace_id, OutcomeStatus::Skipped).with_error(reason);
        }

        let (prepared, prep) = prepare_trace_for_extraction(trace);
        if prep.was_truncated {
            info!(
                event = "trace_truncated",
                run_id,
                source_trace_id = %trace_id,
                original_size = prep.original_size_bytes,
                final_size = prep.final_size_bytes,
                "payload truncated before extraction"
            );
        }

        let prompt = build_extraction_prompt(&prepared);
        let prompt_hash = prompt_sha256(&prompt);

        // Time budget gate before the model call.
        let budget = self.batch.per_item_timeout;
        if start.elapsed() >= budget {
            return self
                .record_timeout(&trace_id, run_id, dry_run, "budget exceeded before model call")
                .await;
        }
        let remaining = budget - start.elapsed();

        info!(
            event = "model_call_started",
            run_id,
            source_trace_id = %trace_id,
            prompt_sha256 = %prompt_hash,
            model = %self.gemini.model,
            temperature = self.gemini.temperature,
            "calling model"
        );

        let request = LlmRequest::new(prompt, schema::failure_pattern_schema())
            .with_temperature(self.gemini.temperature)
            .with_max_output_tokens(self.gemini.max_output_tokens)
            .with_timeout(remaining);

        let response = match self.llm.generate(request).await {
            Ok(response) => response,
            Err(LlmError::Timeout(secs)) => {
                return self
                    .record_timeout(
                        &trace_id,
                        run_id,
                        dry_run,
                        &format!("model call exceeded {secs}s"),
                    )
                    .await;
            }
            Err(LlmError::Parse(message)) => {
                return self
                    .record_error(
                        &trace_id,
                        run_id,
                        dry_run,
                        PipelineErrorType::InvalidJson,
                        &message,
                        None,
                        None,
                    )
                    .await;
            }
            Err(err) => {
                return self
                    .record_error(
                        &trace_id,
                        run_id,
                        dry_run,
                        PipelineErrorType::ModelError,
                        &err.to_string(),
                        None,
                        None,
                    )
                    .await;
            }
        };

        // Budget gate after the model call: late responses must not write.
        if start.elapsed() >= budget {
            return self
                .record_timeout(&trace_id, run_id, dry_run, "budget exceeded after model call")
                .await;
        }

        let pattern = match self.build_pattern(&trace_id, &response.parsed) {
            Ok(pattern) => pattern,
            Err(reason) => {
                warn!(
                    event = "schema_validation_failed",
                    run_id,
                    source_trace_id = %trace_id,
                    error = %reason,
                    "model output failed validation"
                );
                if !dry_run {
                    let record = ErrorRecord {
                        run_id: run_id.to_string(),
                        source_id: trace_id.clone(),
                        error_type: PipelineErrorType::SchemaValidation,
                        error_message: reason.clone(),
                        model_response_sha256: Some(response.response_sha256.clone()),
                        model_response_excerpt: Some(
                            self.redactor
                                .redact_and_truncate(&response.raw_text, ERROR_EXCERPT_LIMIT),
                        ),
                        recorded_at: Utc::now(),
                    };
                    if let Err(err) = self.runs.save_error("extraction", &record).await {
                        warn!(event = "error_record_write_failed", error = %err, "failed to persist error record");
                    }
                }
                return RunItemOutcome::new(trace_id, OutcomeStatus::ValidationFailed)
                    .with_error(reason);
            }
        };

        if !dry_run {
            if let Err(err) = self.patterns.upsert_pattern(&pattern).await {
                return RunItemOutcome::new(trace_id, OutcomeStatus::Error)
                    .with_error(format!("pattern write failed: {err}"));
            }
            if let Err(err) = self.traces.mark_processed(&trace_id).await {
                return RunItemOutcome::new(trace_id, OutcomeStatus::Error)
                    .with_error(format!("mark processed failed: {err}"));
            }
        }

        info!(
            event = "pattern_extracted",
            run_id,
            source_trace_id = %trace_id,
            pattern_id = %pattern.pattern_id,
            failure_type = %pattern.failure_type,
            confidence = pattern.confidence,
            duration_ms = start.elapsed().as_millis() as u64,
            dry_run,
            "stored failure pattern"
        );

        RunItemOutcome::new(trace_id, OutcomeStatus::Stored).with_produced(pattern.pattern_id)
    }

    /// Assemble and validate a pattern from model output.
    fn build_pattern(&self, trace_id: &str, parsed: &Value) -> Result<FailurePattern, String> {
        let fields: ExtractedFields =
            serde_json::from_value(parsed.clone()).map_err(|e| e.to_string())?;

        let excerpt = fields
            .evidence
            .excerpt
            .as_deref()
            .map(|e| self.redactor.redact_and_truncate(e, EXCERPT_REDACTION_LIMIT));

        let pattern = FailurePattern {
            pattern_id: FailurePattern::derive_pattern_id(trace_id),
            source_trace_id: trace_id.to_string(),
            title: fields.title,
            failure_type: fields.failure_type,
            trigger_condition: fields.trigger_condition,
            summary: fields.summary,
            root_cause_hypothesis: fields.root_cause_hypothesis,
            evidence: Evidence {
                signals: fields.evidence.signals,
                excerpt,
            },
            recommended_actions: fields.recommended_actions,
            reproduction_context: fields.reproduction_context,
            severity: fields.severity,
            confidence: fields.confidence,
            confidence_rationale: fields.confidence_rationale,
            extracted_at: Utc::now(),
            processed: false,
        };
        pattern.validate().map_err(|e| e.to_string())?;
        Ok(pattern)
    }

    async fn record_timeout(
        &self,
        trace_id: &str,
        run_id: &str,
        dry_run: bool,
        message: &str,
    ) -> RunItemOutcome {
        warn!(
            event = "trace_timed_out",
            run_id,
            source_trace_id = %trace_id,
            timeout_sec = self.batch.per_item_timeout.as_secs(),
            "per-trace budget exceeded"
        );
        if !dry_run {
            let record = ErrorRecord {
                run_id: run_id.to_string(),
                source_id: trace_id.to_string(),
                error_type: PipelineErrorType::Timeout,
                error_message: message.to_string(),
                model_response_sha256: None,
                model_response_excerpt: None,
                recorded_at: Utc::now(),
            };
            if let Err(err) = self.runs.save_error("extraction", &record).await {
                warn!(event = "error_record_write_failed", error = %err, "failed to persist error record");
            }
        }
        RunItemOutcome::new(trace_id, OutcomeStatus::TimedOut).with_error(message)
    }

    #[allow(clippy::too_many_arguments)]
    async fn record_error(
        &self,
        trace_id: &str,
        run_id: &str,
        dry_run: bool,
        error_type: PipelineErrorType,
        message: &str,
        response_sha256: Option<String>,
        response_excerpt: Option<String>,
    ) -> RunItemOutcome {
        warn!(
            event = "extraction_error",
            run_id,
            source_trace_id = %trace_id,
            error_type = error_type.as_str(),
            error = %message,
            "trace failed"
        );
        if !dry_run {
            let record = ErrorRecord {
                run_id: run_id.to_string(),
                source_id: trace_id.to_string(),
                error_type,
                error_message: message.to_string(),
                model_response_sha256: response_sha256,
                model_response_excerpt: response_excerpt,
                recorded_at: Utc::now(),
            };
            if let Err(err) = self.runs.save_error("extraction", &record).await {
                warn!(event = "error_record_write_failed", error = %err, "failed to persist error record");
            }
        }
        RunItemOutcome::new(trace_id, OutcomeStatus::Error).with_error(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use evalforge_config::Env;
    use evalforge_llm::LlmResponse;
    use evalforge_store::MemoryStore;
    use evalforge_types::{CaptureStatus, FailureCapture, TriggeredBy};
    use serde_json::json;
    use std::collections::HashMap;

    struct StubLlm {
        output: Value,
    }

    #[async_trait]
    impl LlmBackend for StubLlm {
        async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
            let raw = self.output.to_string();
            Ok(LlmResponse {
                prompt_sha256: evalforge_llm::sha256_hex(&request.prompt),
                response_sha256: evalforge_llm::sha256_hex(&raw),
                raw_text: raw,
                parsed: self.output.clone(),
                usage: Default::default(),
                model: "stub".to_string(),
            })
        }
    }

    struct FailingLlm {
        error: fn() -> LlmError,
    }

    #[async_trait]
    impl LlmBackend for FailingLlm {
        async fn generate(&self, _request: LlmRequest) -> Result<LlmResponse, LlmError> {
            Err((self.error)())
        }
    }

    fn good_output() -> Value {
        json!({
            "title": "Fabricated construction date",
            "failure_type": "hallucination",
            "trigger_condition": "User asks for a verifiable historical fact",
            "summary": "Model answered 1920 for the Eiffel Tower",
            "root_cause_hypothesis": "No retrieval grounding",
            "evidence": {
                "signals": ["contradicts ground truth"],
                "excerpt": "Q: What year was the Eiffel Tower built? A: 1920"
            },
            "recommended_actions": ["add grounding"],
            "reproduction_context": {
                "input_pattern": "What year was the Eiffel Tower built?",
                "tools_involved": []
            },
            "severity": "high",
            "confidence": 0.9,
            "confidence_rationale": "clear contradiction"
        })
    }

    fn capture(trace_id: &str) -> FailureCapture {
        FailureCapture {
            trace_id: trace_id.to_string(),
            fetched_at: Utc::now(),
            failure_type: "hallucination".to_string(),
            trace_payload: json!({
                "prompt": "[redacted]",
                "note": "response asserted 1920"
            }),
            service_name: "chat".to_string(),
            severity: "high".to_string(),
            status_code: None,
            quality_score: Some(0.1),
            user_hash: None,
            processed: false,
            recurrence_count: 1,
            status: CaptureStatus::New,
            status_history: Vec::new(),
            export_status: None,
            export_destination: None,
            export_reference: None,
        }
    }

    fn service_with(llm: Arc<dyn LlmBackend>) -> (Arc<ExtractionService>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let env = Env::from_map(HashMap::new());
        let batch = BatchConfig::load(&env, "EXTRACTION", 60).unwrap();
        let gemini = GeminiConfig::load(&env).unwrap();
        let service = Arc::new(ExtractionService::new(
            llm,
            store.clone() as Arc<dyn DocumentStore>,
            Collections::new("evalforge_"),
            PiiRedactor::new("salt"),
            batch,
            gemini,
        ));
        (service, store)
    }

    #[tokio::test]
    async fn hallucination_trace_produces_stored_pattern() {
        let (service, store) = service_with(Arc::new(StubLlm {
            output: good_output(),
        }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();

        let summary = service.run(RunOnceRequest::default()).await;
        assert_eq!(summary.picked_up_count, 1);
        assert_eq!(summary.stored_count, 1);
        assert_eq!(summary.trace_outcomes[0].status, OutcomeStatus::Stored);

        let patterns = store.dump("evalforge_failure_patterns").await;
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].0, "t1");
        assert_eq!(patterns[0].1["failure_type"], "hallucination");
        assert!(patterns[0].1["confidence"].as_f64().unwrap() >= 0.6);
        assert_eq!(patterns[0].1["pattern_id"], "pattern_t1");

        // Trace was marked processed; run summary persisted.
        let traces = store.dump("evalforge_raw_traces").await;
        assert_eq!(traces[0].1["processed"], true);
        assert_eq!(store.dump("evalforge_extraction_runs").await.len(), 1);
    }

    #[tokio::test]
    async fn reextraction_overwrites_same_pattern_document() {
        let (service, store) = service_with(Arc::new(StubLlm {
            output: good_output(),
        }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();
        service.run(RunOnceRequest::default()).await;

        // Force a re-run over the same trace id.
        let request = RunOnceRequest {
            trace_ids: Some(vec!["t1".to_string()]),
            ..Default::default()
        };
        let summary = service.run(request).await;
        assert_eq!(summary.stored_count, 1);
        assert_eq!(store.dump("evalforge_failure_patterns").await.len(), 1);
    }

    #[tokio::test]
    async fn out_of_range_confidence_records_validation_error() {
        let mut bad = good_output();
        bad["confidence"] = json!(1.5);
        let (service, store) = service_with(Arc::new(StubLlm { output: bad }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();

        let summary = service.run(RunOnceRequest::default()).await;
        assert_eq!(summary.validation_failed_count, 1);
        assert_eq!(summary.stored_count, 0);

        // Diagnostic record persisted; trace left unprocessed for retry.
        let errors = store.dump("evalforge_extraction_errors").await;
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].1["error_type"], "schema_validation");
        assert!(errors[0].1["model_response_sha256"].is_string());
        let traces = store.dump("evalforge_raw_traces").await;
        assert_eq!(traces[0].1["processed"], false);
    }

    #[tokio::test]
    async fn model_errors_are_classified() {
        let (service, store) = service_with(Arc::new(FailingLlm {
            error: || LlmError::Transport("503".to_string()),
        }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();
        let summary = service.run(RunOnceRequest::default()).await;
        assert_eq!(summary.error_count, 1);
        let errors = store.dump("evalforge_extraction_errors").await;
        assert_eq!(errors[0].1["error_type"], "model_error");
    }

    #[tokio::test]
    async fn timeout_produces_timeout_record_and_no_pattern() {
        let (service, store) = service_with(Arc::new(FailingLlm {
            error: || LlmError::Timeout(60),
        }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();
        let summary = service.run(RunOnceRequest::default()).await;
        assert_eq!(summary.timed_out_count, 1);
        assert!(store.dump("evalforge_failure_patterns").await.is_empty());
        let errors = store.dump("evalforge_extraction_errors").await;
        assert_eq!(errors[0].1["error_type"], "timeout");
    }

    #[tokio::test]
    async fn invalid_trace_is_skipped_with_reason() {
        let (service, _) = service_with(Arc::new(StubLlm {
            output: good_output(),
        }));
        let mut empty = capture("t-empty");
        empty.trace_payload = json!({});
        service.traces().upsert_capture(empty).await.unwrap();

        let summary = service.run(RunOnceRequest::default()).await;
        assert_eq!(summary.trace_outcomes[0].status, OutcomeStatus::Skipped);
        assert!(summary.trace_outcomes[0]
            .error_reason
            .as_ref()
            .unwrap()
            .contains("trace_payload"));
    }

    #[tokio::test]
    async fn dry_run_writes_nothing() {
        let (service, store) = service_with(Arc::new(StubLlm {
            output: good_output(),
        }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();
        let request = RunOnceRequest {
            dry_run: Some(true),
            triggered_by: Some(TriggeredBy::Manual),
            ..Default::default()
        };
        let summary = service.run(request).await;
        assert_eq!(summary.stored_count, 1);
        assert!(store.dump("evalforge_failure_patterns").await.is_empty());
        assert!(store.dump("evalforge_extraction_runs").await.is_empty());
        let traces = store.dump("evalforge_raw_traces").await;
        assert_eq!(traces[0].1["processed"], false);
    }

    #[tokio::test]
    async fn evidence_excerpt_is_redacted_before_persistence() {
        let mut output = good_output();
        output["evidence"]["excerpt"] = json!("user bob@example.com saw 1920");
        let (service, store) = service_with(Arc::new(StubLlm { output }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();
        service.run(RunOnceRequest::default()).await;

        let patterns = store.dump("evalforge_failure_patterns").await;
        let excerpt = patterns[0].1["evidence"]["excerpt"].as_str().unwrap();
        assert!(excerpt.contains("[EMAIL_REDACTED]"));
        assert!(!excerpt.contains("bob@example.com"));
    }

    #[tokio::test]
    async fn health_snapshot_updates_after_run() {
        let (service, _) = service_with(Arc::new(StubLlm {
            output: good_output(),
        }));
        service.traces().upsert_capture(capture("t1")).await.unwrap();
        service.run(RunOnceRequest::default()).await;
        let health = service.health().await;
        assert!(health.last_run_id.is_some());
        assert_eq!(health.last_stored_count, 1);
        assert_eq!(health.last_error_count, 0);
    }
}
