//! The deduplication workflow.
//!
//! Single-worker within a batch: the in-memory candidate set grows as new
//! suggestions are created, so later patterns in the same run can merge
//! into suggestions created moments earlier.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{info, warn};

use evalforge_llm::Embedder;
use evalforge_similarity::find_best_match;
use evalforge_store::{
    Collections, DocumentStore, PatternRepository, RunRepository, SuggestionRepository,
};
use evalforge_types::{
    new_run_id, new_suggestion_id, DedupRunSummary, FailurePattern, OutcomeStatus, RunItemOutcome,
    RunOnceRequest, SourceTraceRef, Suggestion,
};

/// Text embedded for similarity comparison.
#[must_use]
pub fn embedding_text(pattern: &FailurePattern) -> String {
    format!("{}: {}", pattern.failure_type, pattern.trigger_condition)
}

/// In-memory snapshot served by `/health`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DedupHealth {
    pub last_run_id: Option<String>,
    pub last_run_at: Option<String>,
    pub last_merged: usize,
    pub last_created: usize,
    pub last_error_count: usize,
}

/// Deduplication stage service.
pub struct DedupService {
    embedder: Arc<dyn Embedder>,
    patterns: PatternRepository,
    suggestions: SuggestionRepository,
    runs: RunRepository,
    batch_size: usize,
    similarity_threshold: f64,
    health: RwLock<DedupHealth>,
}

impl DedupService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        store: Arc<dyn DocumentStore>,
        collections: Collections,
        batch_size: usize,
        similarity_threshold: f64,
    ) -> Self {
        Self {
            embedder,
            patterns: PatternRepository::new(store.clone(), collections.clone()),
            suggestions: SuggestionRepository::new(store.clone(), collections.clone()),
            runs: RunRepository::new(store, collections),
            batch_size,
            similarity_threshold,
            health: RwLock::new(DedupHealth::default()),
        }
    }

    pub fn patterns(&self) -> &PatternRepository {
        &self.patterns
    }

    pub fn suggestions(&self) -> &SuggestionRepository {
        &self.suggestions
    }

    pub async fn health(&self) -> DedupHealth {
        self.health.read().await.clone()
    }

    pub fn config_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "batch_size": self.batch_size,
            "similarity_threshold": self.similarity_threshold,
        })
    }

    /// Process one batch of unprocessed patterns.
    pub async fn run(&self, request: RunOnceRequest) -> DedupRunSummary {
        let run_id = new_run_id();
        let started_at = Utc::now();
        let start = Instant::now();
        let batch_size = request.effective_batch_size(self.batch_size);
        let dry_run = request.dry_run();
        let triggered_by = request.triggered_by();

        info!(
            event = "dedup_run_started",
            run_id = %run_id,
            batch_size,
            triggered_by = triggered_by.as_str(),
            dry_run,
            threshold = self.similarity_threshold,
            "starting deduplication run"
        );

        let patterns = match self.patterns.get_unprocessed(batch_size).await {
            Ok(patterns) => patterns,
            Err(err) => {
                warn!(event = "patterns_fetch_failed", run_id = %run_id, error = %err, "failed to fetch patterns");
                Vec::new()
            }
        };

        let mut candidates = match self.suggestions.all_embeddings().await {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(event = "embeddings_fetch_failed", run_id = %run_id, error = %err, "failed to load candidate embeddings");
                Vec::new()
            }
        };

        let mut outcomes: Vec<RunItemOutcome> = Vec::new();
        let mut created = 0usize;
        let mut merged = 0usize;
        let mut embedding_errors = 0usize;
        let mut merge_scores: Vec<f64> = Vec::new();

        for pattern in &patterns {
            let text = embedding_text(pattern);
            let embedding = match self.embedder.embed(&text).await {
                Ok(embedding) => embedding,
                Err(err) => {
                    warn!(
                        event = "embedding_failed",
                        run_id = %run_id,
                        pattern_id = %pattern.pattern_id,
                        error = %err,
                        "embedding generation failed"
                    );
                    embedding_errors += 1;
                    outcomes.push(
                        RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::Error)
                            .with_error(err.to_string()),
                    );
                    continue;
                }
            };

            let matched = find_best_match(&embedding, &candidates, self.similarity_threshold);

            if dry_run {
                let outcome = match matched {
                    Some(m) => {
                        merge_scores.push(m.score);
                        merged += 1;
                        RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::Merged)
                            .with_produced(m.id)
                            .with_similarity(m.score)
                    }
                    None => {
                        created += 1;
                        RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::CreatedNew)
                    }
                };
                outcomes.push(outcome);
                continue;
            }

            let outcome = match matched {
                Some(m) => {
                    let entry = SourceTraceRef {
                        trace_id: pattern.source_trace_id.clone(),
                        pattern_id: pattern.pattern_id.clone(),
                        added_at: Utc::now(),
                        similarity_score: Some(m.score),
                    };
                    match self
                        .suggestions
                        .merge_source_trace(&m.id, entry, Utc::now())
                        .await
                    {
                        Ok(_) => {
                            info!(
                                event = "decision",
                                run_id = %run_id,
                                pattern_id = %pattern.pattern_id,
                                suggestion_id = %m.id,
                                similarity_score = m.score,
                                action = "dedup",
                                outcome = "merged",
                                threshold = self.similarity_threshold,
                                "merged pattern into existing suggestion"
                            );
                            merged += 1;
                            merge_scores.push(m.score);
                            RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::Merged)
                                .with_produced(m.id.clone())
                                .with_similarity(m.score)
                        }
                        Err(err) => RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::Error)
                            .with_error(err.to_string()),
                    }
                }
                None => {
                    let suggestion = Suggestion::from_pattern(
                        new_suggestion_id(),
                        pattern,
                        embedding.clone(),
                        Utc::now(),
                    );
                    match self.suggestions.create(&suggestion).await {
                        Ok(()) => {
                            info!(
                                event = "decision",
                                run_id = %run_id,
                                pattern_id = %pattern.pattern_id,
                                suggestion_id = %suggestion.suggestion_id,
                                suggestion_type = suggestion.suggestion_type.as_str(),
                                action = "dedup",
                                outcome = "created_new",
                                threshold = self.similarity_threshold,
                                "created new suggestion from pattern"
                            );
                            created += 1;
                            // Later patterns in this run may merge into it.
                            candidates.push((suggestion.suggestion_id.clone(), embedding));
                            RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::CreatedNew)
                                .with_produced(suggestion.suggestion_id.clone())
                        }
                        Err(err) => RunItemOutcome::new(&pattern.pattern_id, OutcomeStatus::Error)
                            .with_error(err.to_string()),
                    }
                }
            };

            if !matches!(outcome.status, OutcomeStatus::Error) {
                if let Err(err) = self.patterns.mark_processed(&pattern.source_trace_id).await {
                    warn!(
                        event = "mark_processed_failed",
                        pattern_id = %pattern.pattern_id,
                        error = %err,
                        "failed to mark pattern processed"
                    );
                }
            }
            outcomes.push(outcome);
        }

        let finished_at = Utc::now();
        let average = if merge_scores.is_empty() {
            None
        } else {
            Some(merge_scores.iter().sum::<f64>() / merge_scores.len() as f64)
        };
        let summary = DedupRunSummary {
            run_id: run_id.clone(),
            started_at,
            finished_at,
            triggered_by,
            patterns_processed: patterns.len(),
            suggestions_created: created,
            suggestions_merged: merged,
            embedding_errors: (embedding_errors > 0).then_some(embedding_errors),
            average_similarity_score: average,
            processing_duration_ms: start.elapsed().as_millis() as u64,
            pattern_outcomes: outcomes,
        };

        if !dry_run {
            if let Err(err) = self.runs.save_dedup_summary(&summary).await {
                warn!(event = "run_summary_write_failed", run_id = %run_id, error = %err, "failed to persist run summary");
            }
        }

        {
            let mut health = self.health.write().await;
            health.last_run_id = Some(summary.run_id.clone());
            health.last_run_at = Some(summary.finished_at.to_rfc3339());
            health.last_merged = summary.suggestions_merged;
            health.last_created = summary.suggestions_created;
            health.last_error_count = embedding_errors;
        }

        let merge_rate = if summary.patterns_processed > 0 {
            summary.suggestions_merged as f64 / summary.patterns_processed as f64
        } else {
            0.0
        };
        info!(
            event = "dedup_run_completed",
            run_id = %summary.run_id,
            patterns_processed = summary.patterns_processed,
            suggestions_created = summary.suggestions_created,
            suggestions_merged = summary.suggestions_merged,
            merge_rate,
            average_similarity_score = summary.average_similarity_score,
            processing_duration_ms = summary.processing_duration_ms,
            "deduplication run completed"
        );

        summary
    }
}
