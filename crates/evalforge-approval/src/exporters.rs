//! Export formats for approved suggestions: deepeval JSON, pytest source,
//! and guardrail YAML.

use serde_json::{json, Value};
use thiserror::Error;

use evalforge_types::{EvalTestDraft, GuardrailDraft, Suggestion, SuggestionStatus};

/// Supported export formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Deepeval,
    Pytest,
    Yaml,
}

impl ExportFormat {
    /// Parse the `format` query parameter.
    pub fn parse(raw: &str) -> Result<Self, ExportError> {
        match raw {
            "deepeval" => Ok(Self::Deepeval),
            "pytest" => Ok(Self::Pytest),
            "yaml" => Ok(Self::Yaml),
            other => Err(ExportError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Export failures, mapped to 400s at the HTTP layer.
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("suggestion is not approved (current: {0})")]
    NotApproved(String),

    #[error("unsupported export format: {0}")]
    UnsupportedFormat(String),

    #[error("suggestion_content missing required draft: {0}")]
    ContentMissing(String),

    #[error("export serialization failed: {0}")]
    Serialization(String),
}

/// Export an approved suggestion in the requested format.
///
/// Returns `(content, content_type)`.
pub fn export_suggestion(
    suggestion: &Suggestion,
    format: ExportFormat,
) -> Result<(String, &'static str), ExportError> {
    if suggestion.status != SuggestionStatus::Approved {
        return Err(ExportError::NotApproved(
            suggestion.status.as_str().to_string(),
        ));
    }
    match format {
        ExportFormat::Deepeval => export_deepeval(suggestion),
        ExportFormat::Pytest => export_pytest(suggestion),
        ExportFormat::Yaml => export_yaml(suggestion),
    }
}

fn eval_draft(suggestion: &Suggestion) -> Result<&EvalTestDraft, ExportError> {
    suggestion
        .suggestion_content
        .eval_test
        .as_ref()
        .ok_or_else(|| ExportError::ContentMissing("eval_test".to_string()))
}

fn guardrail_draft(suggestion: &Suggestion) -> Result<&GuardrailDraft, ExportError> {
    suggestion
        .suggestion_content
        .guardrail
        .as_ref()
        .ok_or_else(|| ExportError::ContentMissing("guardrail".to_string()))
}

/// Nine-field deepeval `LLMTestCase` document.
fn export_deepeval(suggestion: &Suggestion) -> Result<(String, &'static str), ExportError> {
    let draft = eval_draft(suggestion)?;
    let test_case = json!({
        "name": &draft.test_name,
        "input": &draft.input_prompt,
        "actual_output": &draft.failure_condition,
        "expected_output": &draft.expected_behavior,
        "context": [&draft.description],
        "retrieval_context": [],
        "tools_called": [],
        "expected_tools": [],
        "additional_metadata": {
            "suggestion_id": &suggestion.suggestion_id,
            "assertions": &draft.assertions,
            "tags": &draft.tags,
            "source_trace_ids": &draft.source.trace_ids,
            "source_pattern_ids": &draft.source.pattern_ids,
        },
    });
    let content = serde_json::to_string_pretty(&test_case)
        .map_err(|e| ExportError::Serialization(e.to_string()))?;
    Ok((content, "application/json"))
}

/// Self-contained pytest module exercising the eval draft.
fn export_pytest(suggestion: &Suggestion) -> Result<(String, &'static str), ExportError> {
    let draft = eval_draft(suggestion)?;
    let assertion_lines: String = draft
        .assertions
        .iter()
        .map(|assertion| format!("    # - {assertion}\n"))
        .collect();
    let content = format!(
        r#""""Generated regression test.

Source suggestion: {suggestion_id}
Source traces: {trace_ids}
"""

import pytest


@pytest.mark.llm_regression
def test_{test_name}(llm_client):
    """{description}"""
    response = llm_client.complete({input_prompt:?})

    # Expected behavior: {expected_behavior}
    # Failure condition: {failure_condition}
{assertion_lines}    assert response is not None
"#,
        suggestion_id = suggestion.suggestion_id,
        trace_ids = draft.source.trace_ids.join(", "),
        test_name = sanitize_identifier(&draft.test_name),
        description = draft.description,
        input_prompt = draft.input_prompt,
        expected_behavior = draft.expected_behavior,
        failure_condition = draft.failure_condition,
        assertion_lines = assertion_lines,
    );
    Ok((content, "text/x-python"))
}

/// Guardrail-only policy-engine YAML carrying the deployment fields.
fn export_yaml(suggestion: &Suggestion) -> Result<(String, &'static str), ExportError> {
    let draft = guardrail_draft(suggestion)?;
    let doc = json!({
        "rule_name": &draft.rule_name,
        "type": draft.guardrail_type.as_str(),
        "description": &draft.description,
        "configuration": &draft.configuration,
        "justification": &draft.justification,
        "failure_type": &draft.failure_type,
        "estimated_prevention_rate": draft.estimated_prevention_rate,
        "status": draft.status,
    });
    let content =
        serde_yaml::to_string(&doc).map_err(|e| ExportError::Serialization(e.to_string()))?;
    Ok((content, "application/yaml"))
}

/// Lowercase a test name into a valid Python identifier.
fn sanitize_identifier(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
        .collect();
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    if out.is_empty() {
        out.push_str("generated");
    }
    out
}
