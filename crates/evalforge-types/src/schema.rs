//! Response schemas handed to the LLM's structured-output mode.
//!
//! These are Gemini `responseSchema` documents (OpenAPI-style upper-case
//! types). Structured output minimizes parse failures but the provider can
//! still return semantically out-of-range values, so every consumer
//! re-validates after deserializing.

use serde_json::{json, Value};

use crate::pattern::FailureType;

/// Schema for failure-pattern extraction output.
#[must_use]
pub fn failure_pattern_schema() -> Value {
    let failure_types: Vec<&str> = FailureType::all().iter().map(|t| t.as_str()).collect();
    json!({
        "type": "OBJECT",
        "properties": {
            "title": {"type": "STRING"},
            "failure_type": {"type": "STRING", "enum": failure_types},
            "trigger_condition": {"type": "STRING"},
            "summary": {"type": "STRING"},
            "root_cause_hypothesis": {"type": "STRING"},
            "evidence": {
                "type": "OBJECT",
                "properties": {
                    "signals": {"type": "ARRAY", "items": {"type": "STRING"}},
                    "excerpt": {"type": "STRING"}
                },
                "required": ["signals"]
            },
            "recommended_actions": {"type": "ARRAY", "items": {"type": "STRING"}},
            "reproduction_context": {
                "type": "OBJECT",
                "properties": {
                    "input_pattern": {"type": "STRING"},
                    "required_state": {"type": "STRING"},
                    "tools_involved": {"type": "ARRAY", "items": {"type": "STRING"}}
                },
                "required": ["input_pattern"]
            },
            "severity": {"type": "STRING", "enum": ["low", "medium", "high", "critical"]},
            "confidence": {"type": "NUMBER"},
            "confidence_rationale": {"type": "STRING"}
        },
        "required": [
            "title", "failure_type", "trigger_condition", "summary",
            "root_cause_hypothesis", "evidence", "recommended_actions",
            "reproduction_context", "severity", "confidence",
            "confidence_rationale"
        ]
    })
}

/// Schema for the generated fields of an eval-test draft.
#[must_use]
pub fn eval_test_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "test_name": {"type": "STRING"},
            "description": {"type": "STRING"},
            "input_prompt": {"type": "STRING"},
            "expected_behavior": {"type": "STRING"},
            "failure_condition": {"type": "STRING"},
            "assertions": {"type": "ARRAY", "items": {"type": "STRING"}},
            "tags": {"type": "ARRAY", "items": {"type": "STRING"}}
        },
        "required": [
            "test_name", "description", "input_prompt",
            "expected_behavior", "failure_condition", "assertions"
        ]
    })
}

/// Schema for the generated fields of a guardrail draft.
#[must_use]
pub fn guardrail_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "rule_name": {"type": "STRING"},
            "description": {"type": "STRING"},
            "configuration": {
                "type": "OBJECT",
                "description": "Engine-specific key/value settings; concrete values only"
            },
            "justification": {"type": "STRING"},
            "estimated_prevention_rate": {"type": "NUMBER"}
        },
        "required": ["rule_name", "description", "configuration", "justification"]
    })
}

/// Schema for the generated fields of a runbook draft.
#[must_use]
pub fn runbook_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "runbook_title": {"type": "STRING"},
            "symptom_summary": {"type": "STRING"},
            "diagnosis_steps": {"type": "ARRAY", "items": {"type": "STRING"}},
            "mitigation_steps": {"type": "ARRAY", "items": {"type": "STRING"}},
            "escalation_policy": {"type": "STRING"},
            "affected_services": {"type": "ARRAY", "items": {"type": "STRING"}}
        },
        "required": [
            "runbook_title", "symptom_summary", "diagnosis_steps",
            "mitigation_steps", "escalation_policy"
        ]
    })
}
