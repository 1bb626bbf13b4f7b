//! Shared control flow for the three artifact generators.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock, Semaphore};
use tokio::task::JoinSet;
use tracing::{info, warn};

use evalforge_config::{BatchConfig, GeminiConfig};
use evalforge_llm::{LlmBackend, LlmError, LlmRequest};
use evalforge_redaction::PiiRedactor;
use evalforge_store::{
    Collections, DocumentStore, PatternRepository, RunRepository, StoreError,
    SuggestionRepository,
};
use evalforge_types::{
    new_run_id, DraftSource, ErrorRecord, FailurePattern, GeneratorMeta, GeneratorRunSummary,
    OutcomeStatus, PipelineErrorType, RunItemOutcome, RunOnceRequest, Suggestion, SuggestionType,
};

use crate::cancel::CancelFlag;

/// Per-field cap applied when sanitizing prompt inputs and model outputs.
pub(crate) const FIELD_CAP: usize = 500;
const ERROR_EXCERPT_LIMIT: usize = 200;

/// Everything a generator needs to compose a draft.
pub struct DraftContext {
    pub suggestion: Suggestion,
    pub canonical: Option<FailurePattern>,
    pub source: DraftSource,
    pub run_id: String,
    /// The draft currently in the slot, if any. Composition preserves its
    /// id and `generated_at` so regeneration reads as an update.
    pub existing: Option<Value>,
    /// Set once the model call has happened.
    pub meta: Option<GeneratorMeta>,
}

/// Type-specific half of a generator: prompt, schema, and composition.
pub trait ArtifactGenerator: Send + Sync {
    /// Which suggestions this generator consumes.
    fn suggestion_type(&self) -> SuggestionType;

    /// Collection stem for runs/errors, e.g. `eval_test`.
    fn stage(&self) -> &'static str;

    /// Key inside `suggestion_content`.
    fn slot(&self) -> &'static str;

    /// Draft id field inside the composed value.
    fn id_field(&self) -> &'static str;

    fn response_schema(&self) -> Value;

    fn build_prompt(&self, suggestion: &Suggestion, canonical: &FailurePattern) -> String;

    /// Compose the draft from validated model output. Errors are treated
    /// as schema-validation failures.
    fn compose_draft(
        &self,
        ctx: &DraftContext,
        parsed: &Value,
        redactor: &PiiRedactor,
    ) -> Result<Value, String>;

    /// Deterministic fallback draft, `status = needs_human_input`.
    fn template_draft(&self, ctx: &DraftContext, reason: &str) -> Value;
}

/// Outcome of one item, before HTTP/summary mapping.
#[derive(Debug)]
pub(crate) enum ItemResult {
    Stored {
        draft: Value,
        charged: f64,
    },
    /// Template fallback stored with a reason.
    TemplateStored {
        draft: Value,
        reason: String,
    },
    Skipped {
        reason: &'static str,
    },
    NotFound,
    RateLimited {
        message: String,
    },
    Errored {
        error_type: PipelineErrorType,
        message: String,
        charged: f64,
    },
    Cancelled,
}

/// In-memory snapshot served by `/health`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GeneratorHealth {
    pub last_run_id: Option<String>,
    pub last_run_at: Option<String>,
    pub last_generated_count: usize,
    pub last_error_count: usize,
}

/// Harness running one [`ArtifactGenerator`] against the store.
pub struct GeneratorService {
    generator: Arc<dyn ArtifactGenerator>,
    llm: Arc<dyn LlmBackend>,
    suggestions: SuggestionRepository,
    patterns: PatternRepository,
    runs: RunRepository,
    redactor: PiiRedactor,
    batch: BatchConfig,
    gemini: GeminiConfig,
    health: RwLock<GeneratorHealth>,
}

/// Pick the generation input among clustered patterns: highest confidence,
/// then most recent extraction.
pub(crate) fn select_canonical(patterns: Vec<FailurePattern>) -> Option<FailurePattern> {
    patterns.into_iter().max_by(|a, b| {
        a.confidence
            .partial_cmp(&b.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.extracted_at.cmp(&b.extracted_at))
    })
}

impl GeneratorService {
    pub fn new(
        generator: Arc<dyn ArtifactGenerator>,
        llm: Arc<dyn LlmBackend>,
        store: Arc<dyn DocumentStore>,
        collections: Collections,
        redactor: PiiRedactor,
        batch: BatchConfig,
        gemini: GeminiConfig,
    ) -> Self {
        Self {
            generator,
            llm,
            suggestions: SuggestionRepository::new(store.clone(), collections.clone()),
            patterns: PatternRepository::new(store.clone(), collections.clone()),
            runs: RunRepository::new(store, collections),
            redactor,
            batch,
            gemini,
            health: RwLock::new(GeneratorHealth::default()),
        }
    }

    pub fn suggestions(&self) -> &SuggestionRepository {
        &self.suggestions
    }

    pub fn patterns(&self) -> &PatternRepository {
        &self.patterns
    }

    pub fn stage(&self) -> &'static str {
        self.generator.stage()
    }

    /// Key inside `suggestion_content` this generator writes.
    pub fn stage_slot(&self) -> &'static str {
        self.generator.slot()
    }

    pub fn suggestion_type(&self) -> SuggestionType {
        self.generator.suggestion_type()
    }

    pub async fn health(&self) -> GeneratorHealth {
        self.health.read().await.clone()
    }

    pub fn config_summary(&self) -> Value {
        serde_json::json!({
            "batch_size": self.batch.batch_size,
            "per_item_timeout_sec": self.batch.per_item_timeout.as_secs(),
            "per_item_cost_budget_usd": self.batch.per_item_cost_budget_usd,
            "run_cost_budget_usd": self.batch.run_cost_budget_usd,
            "model": &self.gemini.model,
        })
    }

    /// Execute one generation batch.
    pub async fn run_batch(self: &Arc<Self>, request: RunOnceRequest) -> GeneratorRunSummary {
        let run_id = new_run_id();
        let started_at = Utc::now();
        let batch_size = request.effective_batch_size(self.batch.batch_size);
        let dry_run = request.dry_run();
        let force = request.force_overwrite();
        let triggered_by = request.triggered_by();

        // Aggregate ceiling for the whole run.
        let run_budget = self
            .batch
            .run_cost_budget_usd
            .unwrap_or(f64::MAX)
            .min(batch_size as f64 * self.batch.per_item_cost_budget_usd);

        info!(
            event = "generator_run_started",
            generator = self.generator.stage(),
            run_id = %run_id,
            batch_size,
            triggered_by = triggered_by.as_str(),
            dry_run,
            run_budget_usd = run_budget,
            "starting generation run"
        );

        let suggestions = match &request.suggestion_ids {
            Some(ids) => {
                let mut selected = Vec::new();
                for id in ids.iter().take(batch_size) {
                    if let Ok(Some(suggestion)) = self.suggestions.get(id).await {
                        selected.push(suggestion);
                    }
                }
                selected
            }
            None => self
                .suggestions
                .pending_of_type(self.generator.suggestion_type(), batch_size)
                .await
                .unwrap_or_default(),
        };

        let remaining = Arc::new(Mutex::new(run_budget));
        let semaphore = Arc::new(Semaphore::new(self.batch.worker_count));
        let mut join_set = JoinSet::new();

        for suggestion in suggestions {
            let service = Arc::clone(self);
            let semaphore = Arc::clone(&semaphore);
            let remaining = Arc::clone(&remaining);
            let run_id = run_id.clone();
            join_set.spawn(async move {
                let _permit = semaphore.acquire().await.expect("semaphore open");
                let suggestion_id = suggestion.suggestion_id.clone();
                let result = service
                    .run_item_with_timeout(&suggestion_id, force, dry_run, &run_id, &remaining)
                    .await;
                (suggestion_id, result)
            });
        }

        let mut outcomes = Vec::new();
        let mut charged_total = 0.0f64;
        while let Some(joined) = join_set.join_next().await {
            let (suggestion_id, result) = match joined {
                Ok(pair) => pair,
                Err(err) => {
                    outcomes.push(
                        RunItemOutcome::new("unknown", OutcomeStatus::Error)
                            .with_error(format!("worker panicked: {err}")),
                    );
                    continue;
                }
            };
            let (outcome, charged) = self
                .finalize_item(&suggestion_id, result, &run_id, dry_run)
                .await;
            charged_total += charged;
            outcomes.push(outcome);
        }

        let finished_at = Utc::now();
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();
        let summary = GeneratorRunSummary {
            run_id: run_id.clone(),
            generator: self.generator.stage().to_string(),
            started_at,
            finished_at,
            triggered_by,
            batch_size,
            picked_up_count: outcomes.len(),
            generated_count: count(OutcomeStatus::Stored),
            skipped_count: count(OutcomeStatus::Skipped),
            error_count: count(OutcomeStatus::Error),
            timed_out_count: count(OutcomeStatus::TimedOut),
            budget_charged_usd: charged_total,
            outcomes,
        };

        if !dry_run {
            if let Err(err) = self
                .runs
                .save_generator_summary(self.generator.stage(), &summary)
                .await
            {
                warn!(event = "run_summary_write_failed", run_id = %run_id, error = %err, "failed to persist run summary");
            }
        }
        {
            let mut health = self.health.write().await;
            health.last_run_id = Some(summary.run_id.clone());
            health.last_run_at = Some(summary.finished_at.to_rfc3339());
            health.last_generated_count = summary.generated_count;
            health.last_error_count = summary.error_count + summary.timed_out_count;
        }

        info!(
            event = "generator_run_completed",
            generator = self.generator.stage(),
            run_id = %summary.run_id,
            picked_up_count = summary.picked_up_count,
            generated_count = summary.generated_count,
            skipped_count = summary.skipped_count,
            error_count = summary.error_count,
            timed_out_count = summary.timed_out_count,
            budget_charged_usd = summary.budget_charged_usd,
            "generation run completed"
        );
        summary
    }

    /// Generate for one suggestion (the single-item endpoint). Uses the
    /// per-item budget; never hits the run-budget fallback.
    pub async fn generate_single(
        self: &Arc<Self>,
        suggestion_id: &str,
        force_overwrite: bool,
    ) -> ItemOutcomeView {
        let run_id = new_run_id();
        let remaining = Arc::new(Mutex::new(self.batch.per_item_cost_budget_usd));
        let result = self
            .run_item_with_timeout(suggestion_id, force_overwrite, false, &run_id, &remaining)
            .await;
        let (outcome, _) = self.finalize_item(suggestion_id, result, &run_id, false).await;
        ItemOutcomeView::from_outcome(suggestion_id, outcome)
    }

    /// Run one item under the wall-clock budget. On timeout the worker's
    /// cancel flag is set so any in-flight work stops producing
    /// side-effects, and the item reports `timed_out`.
    async fn run_item_with_timeout(
        self: &Arc<Self>,
        suggestion_id: &str,
        force: bool,
        dry_run: bool,
        run_id: &str,
        remaining: &Arc<Mutex<f64>>,
    ) -> ItemResult {
        let cancel = CancelFlag::new();
        let worker_cancel = cancel.clone();
        let service = Arc::clone(self);
        let suggestion_id_owned = suggestion_id.to_string();
        let run_id_owned = run_id.to_string();
        let remaining = Arc::clone(remaining);

        let handle = tokio::spawn(async move {
            service
                .process_item(
                    &suggestion_id_owned,
                    force,
                    dry_run,
                    &run_id_owned,
                    &remaining,
                    worker_cancel,
                )
                .await
        });

        match tokio::time::timeout(self.batch.per_item_timeout, handle).await {
            Ok(Ok(result)) => result,
            Ok(Err(err)) => ItemResult::Errored {
                error_type: PipelineErrorType::Unknown,
                message: format!("worker panicked: {err}"),
                charged: 0.0,
            },
            Err(_) => {
                // The task keeps running; the flag stops its writes.
                cancel.cancel();
                ItemResult::Errored {
                    error_type: PipelineErrorType::Timeout,
                    message: format!(
                        "generation exceeded {}s budget",
                        self.batch.per_item_timeout.as_secs()
                    ),
                    charged: self.batch.per_item_cost_budget_usd,
                }
            }
        }
    }

    async fn process_item(
        &self,
        suggestion_id: &str,
        force: bool,
        dry_run: bool,
        run_id: &str,
        remaining: &Arc<Mutex<f64>>,
        cancel: CancelFlag,
    ) -> ItemResult {
        let suggestion = match self.suggestions.get(suggestion_id).await {
            Ok(Some(suggestion)) => suggestion,
            Ok(None) => return ItemResult::NotFound,
            Err(err) => {
                return ItemResult::Errored {
                    error_type: PipelineErrorType::Unknown,
                    message: err.to_string(),
                    charged: 0.0,
                }
            }
        };

        if suggestion.suggestion_type != self.generator.suggestion_type() {
            return ItemResult::Skipped {
                reason: "wrong_suggestion_type",
            };
        }

        let content = serde_json::to_value(&suggestion.suggestion_content).unwrap_or_default();
        let existing = content.get(self.generator.slot()).cloned().filter(|v| !v.is_null());
        if let Some(existing_draft) = &existing {
            if existing_draft["edit_source"] == "human" && !force {
                return ItemResult::Skipped {
                    reason: "overwrite_blocked",
                };
            }
        }

        // Lineage gather.
        let trace_ids: Vec<String> = suggestion
            .source_traces
            .iter()
            .map(|s| s.trace_id.clone())
            .collect();
        let pattern_ids: Vec<String> = suggestion
            .source_traces
            .iter()
            .map(|s| s.pattern_id.clone())
            .collect();
        let patterns = self
            .patterns
            .get_by_trace_ids(&trace_ids)
            .await
            .unwrap_or_default();
        let canonical = select_canonical(patterns);

        let source = DraftSource {
            canonical_trace_id: canonical
                .as_ref()
                .map(|p| p.source_trace_id.clone())
                .or_else(|| trace_ids.first().cloned())
                .unwrap_or_else(|| "unknown".to_string()),
            canonical_pattern_id: canonical
                .as_ref()
                .map(|p| p.pattern_id.clone())
                .or_else(|| pattern_ids.first().cloned())
                .unwrap_or_else(|| "unknown".to_string()),
            trace_ids,
            pattern_ids,
        };

        let mut ctx = DraftContext {
            suggestion: suggestion.clone(),
            canonical: None,
            source,
            run_id: run_id.to_string(),
            existing,
            meta: None,
        };

        // Context-completeness and budget fallbacks produce deterministic
        // template drafts rather than errors.
        let fallback_reason = if canonical.is_none() {
            Some("missing_failure_patterns")
        } else if canonical
            .as_ref()
            .map(|p| p.reproduction_context.input_pattern.trim().is_empty())
            .unwrap_or(true)
        {
            Some("insufficient_reproduction_context")
        } else if *remaining.lock().await < self.batch.per_item_cost_budget_usd {
            Some("run_budget_exceeded")
        } else {
            None
        };

        if let Some(reason) = fallback_reason {
            let draft = self.generator.template_draft(&ctx, reason);
            info!(
                event = "template_fallback",
                generator = self.generator.stage(),
                run_id,
                suggestion_id,
                reason,
                "emitting needs_human_input template draft"
            );
            if cancel.is_cancelled() {
                return ItemResult::Cancelled;
            }
            if !dry_run {
                match self
                    .suggestions
                    .write_draft(
                        suggestion_id,
                        self.generator.slot(),
                        draft.clone(),
                        force,
                        Utc::now(),
                    )
                    .await
                {
                    Ok(_) => {}
                    Err(StoreError::Aborted(reason)) if reason == "overwrite_blocked" => {
                        return ItemResult::Skipped {
                            reason: "overwrite_blocked",
                        }
                    }
                    Err(err) => {
                        return ItemResult::Errored {
                            error_type: PipelineErrorType::Unknown,
                            message: err.to_string(),
                            charged: 0.0,
                        }
                    }
                }
            }
            return ItemResult::TemplateStored {
                draft,
                reason: reason.to_string(),
            };
        }

        let canonical = canonical.expect("fallback handled none");
        let sanitized_suggestion = self.sanitize_suggestion(&suggestion);
        let sanitized_pattern = self.sanitize_pattern(&canonical);
        ctx.canonical = Some(sanitized_pattern.clone());

        // Cancellation boundary: immediately before the model call.
        if cancel.is_cancelled() {
            return ItemResult::Cancelled;
        }

        let prompt = self
            .generator
            .build_prompt(&sanitized_suggestion, &sanitized_pattern);
        let request = LlmRequest::new(prompt, self.generator.response_schema())
            .with_temperature(self.gemini.temperature)
            .with_max_output_tokens(self.gemini.max_output_tokens)
            .with_timeout(self.batch.per_item_timeout);

        let per_item = self.batch.per_item_cost_budget_usd;
        let response = match self.llm.generate(request).await {
            Ok(response) => {
                Self::charge(remaining, per_item).await;
                response
            }
            Err(LlmError::RateLimited(message)) => {
                // Not charged: the call never reached the model.
                return ItemResult::RateLimited { message };
            }
            Err(LlmError::Timeout(secs)) => {
                Self::charge(remaining, per_item).await;
                return ItemResult::Errored {
                    error_type: PipelineErrorType::Timeout,
                    message: format!("model call exceeded {secs}s"),
                    charged: per_item,
                };
            }
            Err(LlmError::Parse(message)) => {
                Self::charge(remaining, per_item).await;
                return ItemResult::Errored {
                    error_type: PipelineErrorType::InvalidJson,
                    message,
                    charged: per_item,
                };
            }
            Err(err) => {
                Self::charge(remaining, per_item).await;
                return ItemResult::Errored {
                    error_type: PipelineErrorType::ModelError,
                    message: err.to_string(),
                    charged: per_item,
                };
            }
        };

        ctx.meta = Some(GeneratorMeta {
            model: response.model.clone(),
            temperature: self.gemini.temperature,
            prompt_sha256: response.prompt_sha256.clone(),
            response_sha256: response.response_sha256.clone(),
            run_id: run_id.to_string(),
            mapping_version: None,
        });

        let draft = match self
            .generator
            .compose_draft(&ctx, &response.parsed, &self.redactor)
        {
            Ok(draft) => draft,
            Err(reason) => {
                return ItemResult::Errored {
                    error_type: PipelineErrorType::SchemaValidation,
                    message: reason,
                    charged: self.batch.per_item_cost_budget_usd,
                };
            }
        };

        // Cancellation boundary: immediately before the store write.
        if cancel.is_cancelled() {
            return ItemResult::Cancelled;
        }

        if !dry_run {
            match self
                .suggestions
                .write_draft(
                    suggestion_id,
                    self.generator.slot(),
                    draft.clone(),
                    force,
                    Utc::now(),
                )
                .await
            {
                Ok(_) => {}
                Err(StoreError::Aborted(reason)) if reason == "overwrite_blocked" => {
                    return ItemResult::Skipped {
                        reason: "overwrite_blocked",
                    }
                }
                Err(err) => {
                    return ItemResult::Errored {
                        error_type: PipelineErrorType::Unknown,
                        message: err.to_string(),
                        charged: self.batch.per_item_cost_budget_usd,
                    }
                }
            }
        }

        ItemResult::Stored {
            draft,
            charged: self.batch.per_item_cost_budget_usd,
        }
    }

    async fn charge(remaining: &Arc<Mutex<f64>>, amount: f64) {
        let mut left = remaining.lock().await;
        *left = (*left - amount).max(0.0);
    }

    /// Map an [`ItemResult`] into a summary outcome, persist diagnostics,
    /// and settle the budget.
    async fn finalize_item(
        &self,
        suggestion_id: &str,
        result: ItemResult,
        run_id: &str,
        dry_run: bool,
    ) -> (RunItemOutcome, f64) {
        match result {
            ItemResult::Stored { draft, charged } => {
                let produced = draft[self.generator.id_field()]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                (
                    RunItemOutcome::new(suggestion_id, OutcomeStatus::Stored)
                        .with_produced(produced),
                    charged,
                )
            }
            ItemResult::TemplateStored { draft, reason } => {
                let produced = draft[self.generator.id_field()]
                    .as_str()
                    .unwrap_or_default()
                    .to_string();
                (
                    RunItemOutcome::new(suggestion_id, OutcomeStatus::Stored)
                        .with_produced(produced)
                        .with_error(reason),
                    0.0,
                )
            }
            ItemResult::Skipped { reason } => (
                RunItemOutcome::new(suggestion_id, OutcomeStatus::Skipped).with_error(reason),
                0.0,
            ),
            ItemResult::NotFound => (
                RunItemOutcome::new(suggestion_id, OutcomeStatus::Skipped)
                    .with_error("not_found"),
                0.0,
            ),
            ItemResult::RateLimited { message } => {
                self.persist_error(
                    suggestion_id,
                    run_id,
                    dry_run,
                    PipelineErrorType::ModelError,
                    &format!("rate_limited: {message}"),
                )
                .await;
                (
                    RunItemOutcome::new(suggestion_id, OutcomeStatus::Error)
                        .with_error("rate_limited"),
                    0.0,
                )
            }
            ItemResult::Errored {
                error_type,
                message,
                charged,
            } => {
                self.persist_error(suggestion_id, run_id, dry_run, error_type, &message)
                    .await;
                let status = if error_type == PipelineErrorType::Timeout {
                    OutcomeStatus::TimedOut
                } else {
                    OutcomeStatus::Error
                };
                (
                    RunItemOutcome::new(suggestion_id, status).with_error(message),
                    charged,
                )
            }
            ItemResult::Cancelled => (
                RunItemOutcome::new(suggestion_id, OutcomeStatus::TimedOut)
                    .with_error("cancelled"),
                0.0,
            ),
        }
    }

    async fn persist_error(
        &self,
        suggestion_id: &str,
        run_id: &str,
        dry_run: bool,
        error_type: PipelineErrorType,
        message: &str,
    ) {
        warn!(
            event = "generation_error",
            generator = self.generator.stage(),
            run_id,
            suggestion_id,
            error_type = error_type.as_str(),
            error = %message,
            "generation failed"
        );
        if dry_run {
            return;
        }
        let record = ErrorRecord {
            run_id: run_id.to_string(),
            source_id: suggestion_id.to_string(),
            error_type,
            error_message: self.redactor.redact_and_truncate(message, ERROR_EXCERPT_LIMIT),
            model_response_sha256: None,
            model_response_excerpt: None,
            recorded_at: Utc::now(),
        };
        if let Err(err) = self.runs.save_error(self.generator.stage(), &record).await {
            warn!(event = "error_record_write_failed", error = %err, "failed to persist error record");
        }
    }

    fn sanitize_suggestion(&self, suggestion: &Suggestion) -> Suggestion {
        let mut sanitized = suggestion.clone();
        let cap = |text: &str| self.redactor.redact_and_truncate(text, FIELD_CAP);
        sanitized.pattern.title = cap(&sanitized.pattern.title);
        sanitized.pattern.trigger_condition = cap(&sanitized.pattern.trigger_condition);
        sanitized.pattern.summary = cap(&sanitized.pattern.summary);
        sanitized
    }

    fn sanitize_pattern(&self, pattern: &FailurePattern) -> FailurePattern {
        let cap = |text: &str| self.redactor.redact_and_truncate(text, FIELD_CAP);
        let mut sanitized = pattern.clone();
        sanitized.title = cap(&sanitized.title);
        sanitized.trigger_condition = cap(&sanitized.trigger_condition);
        sanitized.summary = cap(&sanitized.summary);
        sanitized.root_cause_hypothesis = cap(&sanitized.root_cause_hypothesis);
        sanitized.confidence_rationale = cap(&sanitized.confidence_rationale);
        sanitized.evidence.signals = sanitized.evidence.signals.iter().map(|s| cap(s)).collect();
        sanitized.evidence.excerpt = sanitized.evidence.excerpt.as_deref().map(cap);
        sanitized.recommended_actions = sanitized
            .recommended_actions
            .iter()
            .map(|a| cap(a))
            .collect();
        sanitized.reproduction_context.input_pattern =
            cap(&sanitized.reproduction_context.input_pattern);
        sanitized.reproduction_context.required_state =
            sanitized.reproduction_context.required_state.as_deref().map(cap);
        sanitized.reproduction_context.tools_involved = sanitized
            .reproduction_context
            .tools_involved
            .iter()
            .map(|t| cap(t))
            .collect();
        sanitized
    }
}

/// HTTP-facing view of a single-item generation.
#[derive(Debug)]
pub struct ItemOutcomeView {
    pub suggestion_id: String,
    pub status: OutcomeStatus,
    pub reason: Option<String>,
    pub produced_id: Option<String>,
}

impl ItemOutcomeView {
    fn from_outcome(suggestion_id: &str, outcome: RunItemOutcome) -> Self {
        Self {
            suggestion_id: suggestion_id.to_string(),
            status: outcome.status,
            reason: outcome.error_reason,
            produced_id: outcome.produced_id,
        }
    }
}
