//! Structured failure patterns distilled from raw traces by the LLM.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Closed set of failure classifications the extraction prompt enforces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureType {
    Hallucination,
    Toxicity,
    WrongTool,
    RunawayLoop,
    PiiLeak,
    StaleData,
    InfrastructureError,
    ClientError,
}

impl FailureType {
    /// Wire name, matching the serde representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hallucination => "hallucination",
            Self::Toxicity => "toxicity",
            Self::WrongTool => "wrong_tool",
            Self::RunawayLoop => "runaway_loop",
            Self::PiiLeak => "pii_leak",
            Self::StaleData => "stale_data",
            Self::InfrastructureError => "infrastructure_error",
            Self::ClientError => "client_error",
        }
    }

    /// All variants, in schema order.
    #[must_use]
    pub fn all() -> &'static [FailureType] {
        &[
            Self::Hallucination,
            Self::Toxicity,
            Self::WrongTool,
            Self::RunawayLoop,
            Self::PiiLeak,
            Self::StaleData,
            Self::InfrastructureError,
            Self::ClientError,
        ]
    }
}

impl std::fmt::Display for FailureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity grading shared by patterns and suggestions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supporting evidence for a pattern. At least one signal is required; the
/// excerpt is PII-redacted and capped at 500 chars before persistence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub signals: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub excerpt: Option<String>,
}

/// What a tester would need to reproduce the failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ReproductionContext {
    #[serde(default)]
    pub input_pattern: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required_state: Option<String>,
    #[serde(default)]
    pub tools_involved: Vec<String>,
}

/// LLM-distilled description of why a trace is a failure.
///
/// Document id equals `source_trace_id`, so re-extracting a trace overwrites
/// its pattern in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailurePattern {
    pub pattern_id: String,
    pub source_trace_id: String,
    pub title: String,
    pub failure_type: FailureType,
    pub trigger_condition: String,
    pub summary: String,
    pub root_cause_hypothesis: String,
    pub evidence: Evidence,
    pub recommended_actions: Vec<String>,
    pub reproduction_context: ReproductionContext,
    pub severity: Severity,
    pub confidence: f64,
    pub confidence_rationale: String,
    pub extracted_at: DateTime<Utc>,
    #[serde(default)]
    pub processed: bool,
}

/// Structural checks the LLM's structured-output mode cannot guarantee.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum PatternValidationError {
    #[error("confidence {0} outside [0.0, 1.0]")]
    ConfidenceOutOfRange(String),

    #[error("evidence.signals must contain at least one entry")]
    EmptyEvidence,

    #[error("recommended_actions must contain at least one entry")]
    EmptyRecommendedActions,

    #[error("{0} must not be empty")]
    EmptyField(&'static str),
}

impl FailurePattern {
    /// Derive the display identifier from the source trace id.
    #[must_use]
    pub fn derive_pattern_id(source_trace_id: &str) -> String {
        format!("pattern_{source_trace_id}")
    }

    /// Re-validate everything the provider's schema enforcement can still
    /// get wrong: ranges, non-empty lists, required text.
    pub fn validate(&self) -> Result<(), PatternValidationError> {
        if !(0.0..=1.0).contains(&self.confidence) {
            return Err(PatternValidationError::ConfidenceOutOfRange(
                self.confidence.to_string(),
            ));
        }
        if self.evidence.signals.iter().all(|s| s.trim().is_empty()) {
            return Err(PatternValidationError::EmptyEvidence);
        }
        if self.recommended_actions.is_empty() {
            return Err(PatternValidationError::EmptyRecommendedActions);
        }
        if self.title.trim().is_empty() {
            return Err(PatternValidationError::EmptyField("title"));
        }
        if self.trigger_condition.trim().is_empty() {
            return Err(PatternValidationError::EmptyField("trigger_condition"));
        }
        if self.summary.trim().is_empty() {
            return Err(PatternValidationError::EmptyField("summary"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn sample_pattern(trace_id: &str) -> FailurePattern {
        FailurePattern {
            pattern_id: FailurePattern::derive_pattern_id(trace_id),
            source_trace_id: trace_id.to_string(),
            title: "Fabricated construction date".to_string(),
            failure_type: FailureType::Hallucination,
            trigger_condition: "User asks for a verifiable historical fact".to_string(),
            summary: "Model invented a date instead of admitting uncertainty".to_string(),
            root_cause_hypothesis: "No retrieval grounding for factual queries".to_string(),
            evidence: Evidence {
                signals: vec!["response contradicts knowledge base".to_string()],
                excerpt: Some("Q: built? A: 1920".to_string()),
            },
            recommended_actions: vec!["add retrieval grounding".to_string()],
            reproduction_context: ReproductionContext {
                input_pattern: "What year was the Eiffel Tower built?".to_string(),
                required_state: None,
                tools_involved: vec![],
            },
            severity: Severity::High,
            confidence: 0.9,
            confidence_rationale: "Clear contradiction with ground truth".to_string(),
            extracted_at: Utc::now(),
            processed: false,
        }
    }

    #[test]
    fn valid_pattern_passes() {
        assert!(sample_pattern("t1").validate().is_ok());
    }

    #[test]
    fn confidence_out_of_range_is_rejected() {
        let mut pattern = sample_pattern("t1");
        pattern.confidence = 1.5;
        assert!(matches!(
            pattern.validate(),
            Err(PatternValidationError::ConfidenceOutOfRange(_))
        ));
    }

    #[test]
    fn blank_evidence_signals_are_rejected() {
        let mut pattern = sample_pattern("t1");
        pattern.evidence.signals = vec!["   ".to_string()];
        assert_eq!(
            pattern.validate(),
            Err(PatternValidationError::EmptyEvidence)
        );
    }

    #[test]
    fn failure_type_wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailureType::RunawayLoop).unwrap(),
            "\"runaway_loop\""
        );
        assert_eq!(
            serde_json::from_str::<FailureType>("\"pii_leak\"").unwrap(),
            FailureType::PiiLeak
        );
    }

    #[test]
    fn pattern_id_is_deterministic() {
        assert_eq!(FailurePattern::derive_pattern_id("abc"), "pattern_abc");
    }
}
