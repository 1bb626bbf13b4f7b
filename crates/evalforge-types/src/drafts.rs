//! Typed artifact drafts embedded in suggestions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::pattern::Severity;

/// Version recorded in `generator_meta` whenever the failure-type →
/// guardrail-type mapping is applied, so drafts are auditable against the
/// mapping revision that produced them.
pub const GUARDRAIL_MAPPING_VERSION: &str = "1.0";

/// Draft lifecycle within a suggestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DraftStatus {
    Draft,
    NeedsHumanInput,
}

/// Provenance of the current draft body. Flips to `Human` only by an
/// external write; once human, regeneration requires the force flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EditSource {
    Generated,
    Human,
}

/// How a draft was produced, for reproducibility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneratorMeta {
    pub model: String,
    pub temperature: f64,
    pub prompt_sha256: String,
    pub response_sha256: String,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping_version: Option<String>,
}

/// Lineage block mirrored onto every draft.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DraftSource {
    pub trace_ids: Vec<String>,
    pub pattern_ids: Vec<String>,
    pub canonical_trace_id: String,
    pub canonical_pattern_id: String,
}

/// A generated regression test for an observed failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalTestDraft {
    pub eval_test_id: String,
    pub test_name: String,
    pub description: String,
    pub input_prompt: String,
    pub expected_behavior: String,
    pub failure_condition: String,
    pub assertions: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub source: DraftSource,
    pub status: DraftStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub edit_source: EditSource,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_meta: Option<GeneratorMeta>,
}

/// Guardrail category, derived deterministically from the failure type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardrailType {
    ValidationRule,
    RateLimit,
    ContentFilter,
    RedactionRule,
    ScopeLimit,
    FreshnessCheck,
    InputSanitization,
}

impl GuardrailType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ValidationRule => "validation_rule",
            Self::RateLimit => "rate_limit",
            Self::ContentFilter => "content_filter",
            Self::RedactionRule => "redaction_rule",
            Self::ScopeLimit => "scope_limit",
            Self::FreshnessCheck => "freshness_check",
            Self::InputSanitization => "input_sanitization",
        }
    }

    /// Deterministic failure-type → guardrail-type mapping, version
    /// [`GUARDRAIL_MAPPING_VERSION`]. Unmapped types fall back to a
    /// validation rule.
    #[must_use]
    pub fn for_failure(failure_type: &str) -> Self {
        match failure_type {
            "hallucination" => Self::ValidationRule,
            "toxicity" => Self::ContentFilter,
            "runaway_loop" => Self::RateLimit,
            "pii_leak" => Self::RedactionRule,
            "wrong_tool" => Self::ScopeLimit,
            "stale_data" => Self::FreshnessCheck,
            "prompt_injection" => Self::InputSanitization,
            _ => Self::ValidationRule,
        }
    }
}

impl std::fmt::Display for GuardrailType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A runtime-enforcement rule proposal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailDraft {
    pub guardrail_id: String,
    pub rule_name: String,
    pub guardrail_type: GuardrailType,
    pub description: String,
    /// Engine-specific key/value configuration. Ordered map keeps exports
    /// deterministic.
    pub configuration: BTreeMap<String, String>,
    pub justification: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_prevention_rate: Option<f64>,
    pub failure_type: String,
    pub source: DraftSource,
    pub status: DraftStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub edit_source: EditSource,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_meta: Option<GeneratorMeta>,
}

/// An operational runbook proposal for recurring incidents.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunbookDraft {
    pub runbook_id: String,
    pub runbook_title: String,
    pub symptom_summary: String,
    pub diagnosis_steps: Vec<String>,
    pub mitigation_steps: Vec<String>,
    pub escalation_policy: String,
    #[serde(default)]
    pub affected_services: Vec<String>,
    pub severity: Severity,
    pub source: DraftSource,
    pub status: DraftStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub edit_source: EditSource,
    pub generated_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generator_meta: Option<GeneratorMeta>,
}
