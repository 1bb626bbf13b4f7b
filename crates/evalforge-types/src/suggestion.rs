//! Reviewable suggestions: the artifact carrier between deduplication,
//! generation, and human approval.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drafts::{EvalTestDraft, GuardrailDraft, RunbookDraft};
use crate::pattern::{FailurePattern, FailureType, Severity};

/// Which artifact a suggestion will carry once generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Eval,
    Guardrail,
    Runbook,
}

impl SuggestionType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eval => "eval",
            Self::Guardrail => "guardrail",
            Self::Runbook => "runbook",
        }
    }

    /// Route a failure type to the artifact kind that addresses it.
    /// Runaway loops want a guardrail, infrastructure failures want a
    /// runbook, everything else becomes an eval test.
    #[must_use]
    pub fn for_failure(failure_type: FailureType) -> Self {
        match failure_type {
            FailureType::RunawayLoop => Self::Guardrail,
            FailureType::InfrastructureError => Self::Runbook,
            _ => Self::Eval,
        }
    }
}

impl std::fmt::Display for SuggestionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Review lifecycle. Pending is the only state that accepts transitions;
/// approved and rejected are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    Pending,
    Approved,
    Rejected,
}

impl SuggestionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Lineage entry linking a suggestion back to one clustered failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceTraceRef {
    pub trace_id: String,
    pub pattern_id: String,
    pub added_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub similarity_score: Option<f64>,
}

/// Compact pattern context stored on the suggestion for reviewers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternSummary {
    pub failure_type: FailureType,
    pub trigger_condition: String,
    pub title: String,
    pub summary: String,
    pub severity: Severity,
}

impl From<&FailurePattern> for PatternSummary {
    fn from(pattern: &FailurePattern) -> Self {
        Self {
            failure_type: pattern.failure_type,
            trigger_condition: pattern.trigger_condition.clone(),
            title: pattern.title.clone(),
            summary: pattern.summary.clone(),
            severity: pattern.severity,
        }
    }
}

/// Who did what, recorded on the terminal transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalMetadata {
    pub actor: String,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Append-only audit entry. Every status transition adds exactly one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionHistoryEntry {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub actor: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Typed draft slot. The matching generator populates exactly one field.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SuggestionContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eval_test: Option<EvalTestDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrail: Option<GuardrailDraft>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runbook: Option<RunbookDraft>,
}

impl SuggestionContent {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.eval_test.is_none() && self.guardrail.is_none() && self.runbook.is_none()
    }
}

/// A reviewable candidate artifact plus its lineage to source failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    pub suggestion_id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub status: SuggestionStatus,
    pub severity: Severity,
    pub source_traces: Vec<SourceTraceRef>,
    pub pattern: PatternSummary,
    #[serde(default)]
    pub embedding: Vec<f32>,
    pub similarity_group: String,
    #[serde(default)]
    pub suggestion_content: SuggestionContent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_metadata: Option<ApprovalMetadata>,
    #[serde(default)]
    pub version_history: Vec<VersionHistoryEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suggestion {
    /// Build a fresh pending suggestion from a pattern that matched nothing.
    #[must_use]
    pub fn from_pattern(
        suggestion_id: String,
        pattern: &FailurePattern,
        embedding: Vec<f32>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            similarity_group: format!("group_{suggestion_id}"),
            suggestion_id,
            suggestion_type: SuggestionType::for_failure(pattern.failure_type),
            status: SuggestionStatus::Pending,
            severity: pattern.severity,
            source_traces: vec![SourceTraceRef {
                trace_id: pattern.source_trace_id.clone(),
                pattern_id: pattern.pattern_id.clone(),
                added_at: now,
                similarity_score: None,
            }],
            pattern: PatternSummary::from(pattern),
            embedding,
            suggestion_content: SuggestionContent::default(),
            approval_metadata: None,
            version_history: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether this suggestion already carries the given trace in its
    /// lineage. Merges use this to stay idempotent.
    #[must_use]
    pub fn has_trace(&self, trace_id: &str) -> bool {
        self.source_traces.iter().any(|s| s.trace_id == trace_id)
    }
}
