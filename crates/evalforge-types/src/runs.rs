//! Run summaries, per-item outcomes, and diagnostic error records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a batch run was initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggeredBy {
    Scheduled,
    Manual,
}

impl Default for TriggeredBy {
    fn default() -> Self {
        Self::Manual
    }
}

impl TriggeredBy {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Manual => "manual",
        }
    }
}

/// Terminal state of one item within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Stored,
    Skipped,
    ValidationFailed,
    TimedOut,
    Error,
    Merged,
    CreatedNew,
}

/// Outcome for a single processed item (trace, pattern, or suggestion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunItemOutcome {
    pub source_id: String,
    pub status: OutcomeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub produced_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_reason: Option<String>,
}

impl RunItemOutcome {
    #[must_use]
    pub fn new(source_id: impl Into<String>, status: OutcomeStatus) -> Self {
        Self {
            source_id: source_id.into(),
            status,
            produced_id: None,
            similarity_score: None,
            error_reason: None,
        }
    }

    #[must_use]
    pub fn with_produced(mut self, id: impl Into<String>) -> Self {
        self.produced_id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_error(mut self, reason: impl Into<String>) -> Self {
        self.error_reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_similarity(mut self, score: f64) -> Self {
        self.similarity_score = Some(score);
        self
    }
}

/// One extraction batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionRunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub triggered_by: TriggeredBy,
    pub batch_size: usize,
    pub picked_up_count: usize,
    pub stored_count: usize,
    pub validation_failed_count: usize,
    pub error_count: usize,
    pub timed_out_count: usize,
    pub trace_outcomes: Vec<RunItemOutcome>,
}

impl ExtractionRunSummary {
    /// Tally counters from the collected outcomes.
    #[must_use]
    pub fn from_outcomes(
        run_id: String,
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        triggered_by: TriggeredBy,
        batch_size: usize,
        outcomes: Vec<RunItemOutcome>,
    ) -> Self {
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();
        Self {
            run_id,
            started_at,
            finished_at,
            triggered_by,
            batch_size,
            picked_up_count: outcomes.len(),
            stored_count: count(OutcomeStatus::Stored),
            validation_failed_count: count(OutcomeStatus::ValidationFailed),
            error_count: count(OutcomeStatus::Error),
            timed_out_count: count(OutcomeStatus::TimedOut),
            trace_outcomes: outcomes,
        }
    }
}

/// One deduplication batch execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DedupRunSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub triggered_by: TriggeredBy,
    pub patterns_processed: usize,
    pub suggestions_created: usize,
    pub suggestions_merged: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding_errors: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_similarity_score: Option<f64>,
    pub processing_duration_ms: u64,
    pub pattern_outcomes: Vec<RunItemOutcome>,
}

/// One generator batch execution (eval, guardrail, or runbook).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorRunSummary {
    pub run_id: String,
    pub generator: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub triggered_by: TriggeredBy,
    pub batch_size: usize,
    pub picked_up_count: usize,
    pub generated_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    pub timed_out_count: usize,
    pub budget_charged_usd: f64,
    pub outcomes: Vec<RunItemOutcome>,
}

/// Closed set of diagnostic error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineErrorType {
    InvalidJson,
    SchemaValidation,
    ModelError,
    Timeout,
    Unknown,
}

impl PipelineErrorType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidJson => "invalid_json",
            Self::SchemaValidation => "schema_validation",
            Self::ModelError => "model_error",
            Self::Timeout => "timeout",
            Self::Unknown => "unknown",
        }
    }
}

/// Diagnostic record persisted when an item fails.
///
/// Keyed by `{run_id}:{source_id}` so retries of the same item in a later
/// run produce distinct documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub run_id: String,
    pub source_id: String,
    pub error_type: PipelineErrorType,
    pub error_message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_response_sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_response_excerpt: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl ErrorRecord {
    /// The document id for this record.
    #[must_use]
    pub fn doc_id(&self) -> String {
        format!("{}:{}", self.run_id, self.source_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extraction_summary_tallies_outcomes() {
        let outcomes = vec![
            RunItemOutcome::new("t1", OutcomeStatus::Stored).with_produced("pattern_t1"),
            RunItemOutcome::new("t2", OutcomeStatus::TimedOut).with_error("budget"),
            RunItemOutcome::new("t3", OutcomeStatus::Stored),
            RunItemOutcome::new("t4", OutcomeStatus::ValidationFailed),
            RunItemOutcome::new("t5", OutcomeStatus::Error).with_error("boom"),
        ];
        let now = Utc::now();
        let summary = ExtractionRunSummary::from_outcomes(
            "run_x".to_string(),
            now,
            now,
            TriggeredBy::Manual,
            10,
            outcomes,
        );
        assert_eq!(summary.picked_up_count, 5);
        assert_eq!(summary.stored_count, 2);
        assert_eq!(summary.timed_out_count, 1);
        assert_eq!(summary.validation_failed_count, 1);
        assert_eq!(summary.error_count, 1);
    }

    #[test]
    fn error_record_doc_id_joins_run_and_source() {
        let record = ErrorRecord {
            run_id: "run_1".to_string(),
            source_id: "t9".to_string(),
            error_type: PipelineErrorType::Timeout,
            error_message: "exceeded 45s".to_string(),
            model_response_sha256: None,
            model_response_excerpt: None,
            recorded_at: Utc::now(),
        };
        assert_eq!(record.doc_id(), "run_1:t9");
    }

    #[test]
    fn outcome_statuses_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&OutcomeStatus::ValidationFailed).unwrap(),
            "\"validation_failed\""
        );
        assert_eq!(
            serde_json::to_string(&PipelineErrorType::InvalidJson).unwrap(),
            "\"invalid_json\""
        );
    }
}
