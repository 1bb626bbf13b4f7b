//! Few-shot prompt assembly for failure-pattern extraction.

use serde_json::Value;

use evalforge_llm::sha256_hex;
use evalforge_types::FailureType;

const FAILURE_TYPE_DEFINITIONS: &[(&str, &str)] = &[
    (
        "hallucination",
        "The model asserted something false or unverifiable as fact.",
    ),
    (
        "toxicity",
        "The response contains harmful, offensive, or policy-violating content.",
    ),
    (
        "wrong_tool",
        "The agent invoked a tool that cannot satisfy the request, or misused a correct tool.",
    ),
    (
        "runaway_loop",
        "The agent repeated the same step or tool call without converging.",
    ),
    (
        "pii_leak",
        "The response exposed personal or sensitive data it should have withheld.",
    ),
    (
        "stale_data",
        "The response relied on outdated information when fresher data was required.",
    ),
    (
        "infrastructure_error",
        "The failure originated in serving infrastructure: timeouts, 5xx, resource exhaustion.",
    ),
    (
        "client_error",
        "The caller supplied malformed input or violated the API contract.",
    ),
];

const FEW_SHOT_EXAMPLE: &str = r#"Example trace:
{"trace_id": "example-1", "failure_type": "hallucination", "trace_payload": {"prompt": "[redacted]", "model_response_note": "asserted the Eiffel Tower was built in 1920", "quality_score": 0.1}}

Example output:
{"title": "Fabricated historical date", "failure_type": "hallucination", "trigger_condition": "User asks for a verifiable historical fact without retrieval grounding", "summary": "The model invented a construction date contradicting well-known ground truth.", "root_cause_hypothesis": "No retrieval augmentation for factual queries; model fills gaps with plausible-sounding values.", "evidence": {"signals": ["response contradicts reference data", "quality score 0.1"], "excerpt": "asserted the Eiffel Tower was built in 1920"}, "recommended_actions": ["Ground factual answers in a reference source", "Add a fact-check eval for landmark dates"], "reproduction_context": {"input_pattern": "Ask for a well-known historical fact", "tools_involved": []}, "severity": "high", "confidence": 0.9, "confidence_rationale": "Direct contradiction with established ground truth."}"#;

/// Build the single-string extraction prompt for a prepared trace payload.
#[must_use]
pub fn build_extraction_prompt(prepared_payload: &Value) -> String {
    let definitions = FAILURE_TYPE_DEFINITIONS
        .iter()
        .map(|(name, description)| format!("- {name}: {description}"))
        .collect::<Vec<_>>()
        .join("\n");

    let payload_json =
        serde_json::to_string_pretty(prepared_payload).unwrap_or_else(|_| "{}".to_string());

    format!(
        "You are an expert LLM reliability engineer. Analyze the production \
failure trace below and distill a structured failure pattern.\n\n\
Failure type definitions (choose exactly one):\n{definitions}\n\n\
Rules:\n\
- Base every field on evidence present in the trace; never invent details.\n\
- confidence is a number between 0.0 and 1.0.\n\
- evidence.signals must list at least one concrete observation.\n\
- reproduction_context.input_pattern describes how to provoke the failure again.\n\n\
{FEW_SHOT_EXAMPLE}\n\n\
Trace to analyze:\n{payload_json}\n\n\
Respond with a single JSON object matching the requested schema."
    )
}

/// SHA-256 of the assembled prompt, recorded in logs and diagnostics.
#[must_use]
pub fn prompt_sha256(prompt: &str) -> String {
    sha256_hex(prompt)
}
