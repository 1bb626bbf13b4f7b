//! Eval-test generator: regression tests that would have caught the
//! observed failure.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use evalforge_redaction::PiiRedactor;
use evalforge_types::{new_draft_id, schema, FailurePattern, Suggestion, SuggestionType};

use crate::harness::{ArtifactGenerator, DraftContext, FIELD_CAP};

pub struct EvalTestGenerator;

#[derive(Debug, Deserialize)]
struct EvalFields {
    test_name: String,
    description: String,
    input_prompt: String,
    expected_behavior: String,
    failure_condition: String,
    assertions: Vec<String>,
    #[serde(default)]
    tags: Vec<String>,
}

impl ArtifactGenerator for EvalTestGenerator {
    fn suggestion_type(&self) -> SuggestionType {
        SuggestionType::Eval
    }

    fn stage(&self) -> &'static str {
        "eval_test"
    }

    fn slot(&self) -> &'static str {
        "eval_test"
    }

    fn id_field(&self) -> &'static str {
        "eval_test_id"
    }

    fn response_schema(&self) -> Value {
        schema::eval_test_schema()
    }

    fn build_prompt(&self, suggestion: &Suggestion, canonical: &FailurePattern) -> String {
        format!(
            "You are a senior QA engineer writing evaluation tests for an LLM \
application. Turn the failure pattern below into one concrete regression \
test that would have caught the failure.\n\n\
Failure pattern:\n\
- failure_type: {failure_type}\n\
- title: {title}\n\
- trigger_condition: {trigger}\n\
- summary: {summary}\n\
- root_cause_hypothesis: {hypothesis}\n\
- reproduction input: {input_pattern}\n\
- tools involved: {tools}\n\
- severity: {severity}\n\n\
Suggestion context: {context}\n\n\
Rules:\n\
- input_prompt must be a runnable prompt derived from the reproduction input.\n\
- expected_behavior states what a correct response does; failure_condition \
states what the observed failure did.\n\
- assertions are concrete, checkable statements (at least two).\n\
- tags classify the test (failure type, severity).\n\n\
Respond with a single JSON object matching the requested schema.",
            failure_type = canonical.failure_type,
            title = canonical.title,
            trigger = canonical.trigger_condition,
            summary = canonical.summary,
            hypothesis = canonical.root_cause_hypothesis,
            input_pattern = canonical.reproduction_context.input_pattern,
            tools = canonical.reproduction_context.tools_involved.join(", "),
            severity = canonical.severity,
            context = suggestion.pattern.summary,
        )
    }

    fn compose_draft(
        &self,
        ctx: &DraftContext,
        parsed: &Value,
        redactor: &PiiRedactor,
    ) -> Result<Value, String> {
        let fields: EvalFields =
            serde_json::from_value(parsed.clone()).map_err(|e| e.to_string())?;
        if fields.assertions.is_empty() {
            return Err("assertions must not be empty".to_string());
        }
        if fields.input_prompt.trim().is_empty() {
            return Err("input_prompt must not be empty".to_string());
        }

        let cap = |text: &str| redactor.redact_and_truncate(text, FIELD_CAP);
        let now = Utc::now();
        let (draft_id, generated_at) = match &ctx.existing {
            Some(existing) => (
                existing["eval_test_id"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| new_draft_id("eval")),
                existing["generated_at"].clone(),
            ),
            None => (new_draft_id("eval"), json!(now)),
        };

        let meta = ctx.meta.as_ref().ok_or("generator metadata missing")?;
        Ok(json!({
            "eval_test_id": draft_id,
            "test_name": cap(&fields.test_name),
            "description": cap(&fields.description),
            "input_prompt": cap(&fields.input_prompt),
            "expected_behavior": cap(&fields.expected_behavior),
            "failure_condition": cap(&fields.failure_condition),
            "assertions": fields.assertions.iter().map(|a| cap(a)).collect::<Vec<_>>(),
            "tags": fields.tags.iter().map(|t| cap(t)).collect::<Vec<_>>(),
            "source": &ctx.source,
            "status": "draft",
            "edit_source": "generated",
            "generated_at": generated_at,
            "updated_at": now,
            "generator_meta": meta,
        }))
    }

    fn template_draft(&self, ctx: &DraftContext, reason: &str) -> Value {
        let now = Utc::now();
        json!({
            "eval_test_id": new_draft_id("eval"),
            "test_name": format!("review_needed_{}", ctx.suggestion.suggestion_id),
            "description": "Automatic generation lacked sufficient context; a reviewer must complete this test.",
            "input_prompt": "",
            "expected_behavior": "",
            "failure_condition": "",
            "assertions": [],
            "tags": [ctx.suggestion.pattern.failure_type.as_str()],
            "source": &ctx.source,
            "status": "needs_human_input",
            "reason": reason,
            "edit_source": "generated",
            "generated_at": now,
            "updated_at": now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use evalforge_types::{DraftSource, GeneratorMeta};

    fn pattern() -> FailurePattern {
        use evalforge_types::{Evidence, FailureType, ReproductionContext, Severity};
        FailurePattern {
            pattern_id: "pattern_t1".to_string(),
            source_trace_id: "t1".to_string(),
            title: "Fabricated date".to_string(),
            failure_type: FailureType::Hallucination,
            trigger_condition: "asks for facts".to_string(),
            summary: "invented a date".to_string(),
            root_cause_hypothesis: "no grounding".to_string(),
            evidence: Evidence {
                signals: vec!["contradiction".to_string()],
                excerpt: None,
            },
            recommended_actions: vec!["ground".to_string()],
            reproduction_context: ReproductionContext {
                input_pattern: "What year was the Eiffel Tower built?".to_string(),
                required_state: None,
                tools_involved: vec![],
            },
            severity: Severity::High,
            confidence: 0.9,
            confidence_rationale: "clear".to_string(),
            extracted_at: Utc::now(),
            processed: false,
        }
    }

    fn context() -> DraftContext {
        let p = pattern();
        DraftContext {
            suggestion: Suggestion::from_pattern("sugg_1".to_string(), &p, vec![], Utc::now()),
            canonical: Some(p),
            source: DraftSource {
                trace_ids: vec!["t1".to_string()],
                pattern_ids: vec!["pattern_t1".to_string()],
                canonical_trace_id: "t1".to_string(),
                canonical_pattern_id: "pattern_t1".to_string(),
            },
            run_id: "run_1".to_string(),
            existing: None,
            meta: Some(GeneratorMeta {
                model: "gemini-2.0-flash".to_string(),
                temperature: 0.2,
                prompt_sha256: "p".repeat(64),
                response_sha256: "r".repeat(64),
                run_id: "run_1".to_string(),
                mapping_version: None,
            }),
        }
    }

    fn good_fields() -> Value {
        json!({
            "test_name": "eiffel_tower_construction_date",
            "description": "Checks factual grounding for landmark dates",
            "input_prompt": "What year was the Eiffel Tower built?",
            "expected_behavior": "States 1889 or admits uncertainty",
            "failure_condition": "Asserts an incorrect year as fact",
            "assertions": ["response mentions 1889", "response does not assert 1920"],
            "tags": ["hallucination", "high"]
        })
    }

    #[test]
    fn prompt_embeds_pattern_fields() {
        let generator = EvalTestGenerator;
        let ctx = context();
        let prompt =
            generator.build_prompt(&ctx.suggestion, ctx.canonical.as_ref().unwrap());
        assert!(prompt.contains("hallucination"));
        assert!(prompt.contains("What year was the Eiffel Tower built?"));
        assert!(prompt.contains("Fabricated date"));
    }

    #[test]
    fn compose_builds_complete_draft() {
        let generator = EvalTestGenerator;
        let redactor = PiiRedactor::new("salt");
        let draft = generator
            .compose_draft(&context(), &good_fields(), &redactor)
            .unwrap();
        assert!(draft["eval_test_id"].as_str().unwrap().starts_with("eval_"));
        assert_eq!(draft["status"], "draft");
        assert_eq!(draft["edit_source"], "generated");
        assert_eq!(draft["source"]["canonical_pattern_id"], "pattern_t1");
        assert_eq!(draft["assertions"].as_array().unwrap().len(), 2);
        assert_eq!(draft["generator_meta"]["run_id"], "run_1");
    }

    #[test]
    fn compose_preserves_existing_id_and_generated_at() {
        let generator = EvalTestGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut ctx = context();
        ctx.existing = Some(json!({
            "eval_test_id": "eval_keep_me",
            "generated_at": "2026-01-01T00:00:00Z",
            "edit_source": "generated"
        }));
        let draft = generator
            .compose_draft(&ctx, &good_fields(), &redactor)
            .unwrap();
        assert_eq!(draft["eval_test_id"], "eval_keep_me");
        assert_eq!(draft["generated_at"], "2026-01-01T00:00:00Z");
    }

    #[test]
    fn compose_rejects_missing_assertions() {
        let generator = EvalTestGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut fields = good_fields();
        fields["assertions"] = json!([]);
        let err = generator
            .compose_draft(&context(), &fields, &redactor)
            .unwrap_err();
        assert!(err.contains("assertions"));
    }

    #[test]
    fn compose_redacts_output_fields() {
        let generator = EvalTestGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut fields = good_fields();
        fields["description"] = json!("mail bob@example.com when it fails");
        let draft = generator
            .compose_draft(&context(), &fields, &redactor)
            .unwrap();
        assert!(draft["description"]
            .as_str()
            .unwrap()
            .contains("[EMAIL_REDACTED]"));
    }

    #[test]
    fn template_draft_needs_human_input() {
        let generator = EvalTestGenerator;
        let draft = generator.template_draft(&context(), "missing_failure_patterns");
        assert_eq!(draft["status"], "needs_human_input");
        assert_eq!(draft["reason"], "missing_failure_patterns");
        assert_eq!(draft["edit_source"], "generated");
        assert!(draft["assertions"].as_array().unwrap().is_empty());
    }
}
