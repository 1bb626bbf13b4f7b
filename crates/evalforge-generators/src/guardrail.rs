//! Guardrail generator: runtime-enforcement rule proposals.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use evalforge_redaction::PiiRedactor;
use evalforge_types::{
    new_draft_id, schema, FailurePattern, GuardrailType, Suggestion, SuggestionType,
    GUARDRAIL_MAPPING_VERSION,
};

use crate::harness::{ArtifactGenerator, DraftContext, FIELD_CAP};
use crate::placeholder::contains_placeholder;

pub struct GuardrailGenerator;

#[derive(Debug, Deserialize)]
struct GuardrailFields {
    rule_name: String,
    description: String,
    configuration: Map<String, Value>,
    justification: String,
    #[serde(default)]
    estimated_prevention_rate: Option<f64>,
}

/// Check generated fields for placeholder tokens. Returns the offending
/// location, if any.
fn find_placeholder(fields: &GuardrailFields) -> Option<String> {
    if contains_placeholder(&fields.rule_name) {
        return Some("rule_name".to_string());
    }
    if contains_placeholder(&fields.description) {
        return Some("description".to_string());
    }
    if contains_placeholder(&fields.justification) {
        return Some("justification".to_string());
    }
    for (key, value) in &fields.configuration {
        let hit = match value {
            Value::String(s) => contains_placeholder(s),
            Value::Array(items) => items
                .iter()
                .any(|item| item.as_str().is_some_and(contains_placeholder)),
            _ => false,
        };
        if hit {
            return Some(format!("configuration.{key}"));
        }
    }
    None
}

fn failure_type_of(suggestion: &Suggestion, canonical: Option<&FailurePattern>) -> String {
    canonical
        .map(|p| p.failure_type.as_str().to_string())
        .unwrap_or_else(|| suggestion.pattern.failure_type.as_str().to_string())
}

impl ArtifactGenerator for GuardrailGenerator {
    fn suggestion_type(&self) -> SuggestionType {
        SuggestionType::Guardrail
    }

    fn stage(&self) -> &'static str {
        "guardrail"
    }

    fn slot(&self) -> &'static str {
        "guardrail"
    }

    fn id_field(&self) -> &'static str {
        "guardrail_id"
    }

    fn response_schema(&self) -> Value {
        schema::guardrail_schema()
    }

    fn build_prompt(&self, suggestion: &Suggestion, canonical: &FailurePattern) -> String {
        let guardrail_type = GuardrailType::for_failure(canonical.failure_type.as_str());
        format!(
            "You are a platform safety engineer. Propose one {guardrail_type} \
guardrail that would have prevented the failure below.\n\n\
Failure pattern:\n\
- failure_type: {failure_type}\n\
- title: {title}\n\
- trigger_condition: {trigger}\n\
- summary: {summary}\n\
- root_cause_hypothesis: {hypothesis}\n\
- reproduction input: {input_pattern}\n\
- severity: {severity}\n\n\
Suggestion context: {context}\n\n\
Rules:\n\
- configuration holds concrete, deployable key/value settings. Never emit \
placeholders such as TODO, TBD, or [VALUE].\n\
- justification explains why this rule addresses the root cause.\n\
- estimated_prevention_rate is a number between 0.0 and 1.0 when you can \
estimate it.\n\n\
Respond with a single JSON object matching the requested schema.",
            guardrail_type = guardrail_type,
            failure_type = canonical.failure_type,
            title = canonical.title,
            trigger = canonical.trigger_condition,
            summary = canonical.summary,
            hypothesis = canonical.root_cause_hypothesis,
            input_pattern = canonical.reproduction_context.input_pattern,
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
        let fields: GuardrailFields =
            serde_json::from_value(parsed.clone()).map_err(|e| e.to_string())?;
        if fields.configuration.is_empty() {
            return Err("configuration must not be empty".to_string());
        }

        let failure_type = failure_type_of(&ctx.suggestion, ctx.canonical.as_ref());
        let guardrail_type = GuardrailType::for_failure(&failure_type);

        // Placeholder content demotes the draft instead of erroring: the
        // rule shape is right, the values need a human.
        let (status, reason) = match find_placeholder(&fields) {
            Some(location) => (
                "needs_human_input",
                Some(format!("{location} contains placeholder text")),
            ),
            None => ("draft", None),
        };

        let cap = |text: &str| redactor.redact_and_truncate(text, FIELD_CAP);
        let configuration: BTreeMap<String, String> = fields
            .configuration
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                (key.clone(), cap(&rendered))
            })
            .collect();

        let now = Utc::now();
        let (draft_id, generated_at) = match &ctx.existing {
            Some(existing) => (
                existing["guardrail_id"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| new_draft_id("guard")),
                existing["generated_at"].clone(),
            ),
            None => (new_draft_id("guard"), json!(now)),
        };

        let mut meta = ctx.meta.clone().ok_or("generator metadata missing")?;
        meta.mapping_version = Some(GUARDRAIL_MAPPING_VERSION.to_string());

        let prevention_rate = fields
            .estimated_prevention_rate
            .filter(|rate| (0.0..=1.0).contains(rate));

        let mut draft = json!({
            "guardrail_id": draft_id,
            "rule_name": cap(&fields.rule_name),
            "guardrail_type": guardrail_type.as_str(),
            "description": cap(&fields.description),
            "configuration": configuration,
            "justification": cap(&fields.justification),
            "estimated_prevention_rate": prevention_rate,
            "failure_type": failure_type,
            "source": &ctx.source,
            "status": status,
            "edit_source": "generated",
            "generated_at": generated_at,
            "updated_at": now,
            "generator_meta": meta,
        });
        if let Some(reason) = reason {
            draft["reason"] = json!(reason);
        }
        Ok(draft)
    }

    fn template_draft(&self, ctx: &DraftContext, reason: &str) -> Value {
        let failure_type = failure_type_of(&ctx.suggestion, ctx.canonical.as_ref());
        let guardrail_type = GuardrailType::for_failure(&failure_type);
        let now = Utc::now();
        json!({
            "guardrail_id": new_draft_id("guard"),
            "rule_name": format!("review_needed_{}", ctx.suggestion.suggestion_id),
            "guardrail_type": guardrail_type.as_str(),
            "description": "Automatic generation lacked sufficient context; a reviewer must complete this rule.",
            "configuration": {},
            "justification": "",
            "failure_type": failure_type,
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
    use evalforge_types::{
        DraftSource, Evidence, FailureType, GeneratorMeta, ReproductionContext, Severity,
    };

    fn pattern(failure_type: FailureType) -> FailurePattern {
        FailurePattern {
            pattern_id: "pattern_t1".to_string(),
            source_trace_id: "t1".to_string(),
            title: "Loop without convergence".to_string(),
            failure_type,
            trigger_condition: "agent repeats tool call".to_string(),
            summary: "47 identical calls".to_string(),
            root_cause_hypothesis: "no loop counter".to_string(),
            evidence: Evidence {
                signals: vec!["same call repeated".to_string()],
                excerpt: None,
            },
            recommended_actions: vec!["cap iterations".to_string()],
            reproduction_context: ReproductionContext {
                input_pattern: "Ask for a task requiring repeated lookups".to_string(),
                required_state: None,
                tools_involved: vec!["search".to_string()],
            },
            severity: Severity::High,
            confidence: 0.85,
            confidence_rationale: "clear".to_string(),
            extracted_at: Utc::now(),
            processed: false,
        }
    }

    fn context(failure_type: FailureType) -> DraftContext {
        let p = pattern(failure_type);
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
            "rule_name": "cap_agent_iterations",
            "description": "Stops agent loops after a fixed iteration budget",
            "configuration": {"max_iterations": "25", "window_seconds": "60"},
            "justification": "The failure repeated one tool call 47 times; a hard cap bounds the blast radius.",
            "estimated_prevention_rate": 0.9
        })
    }

    #[test]
    fn guardrail_type_derived_from_failure_type() {
        let generator = GuardrailGenerator;
        let redactor = PiiRedactor::new("salt");
        let draft = generator
            .compose_draft(&context(FailureType::RunawayLoop), &good_fields(), &redactor)
            .unwrap();
        assert_eq!(draft["guardrail_type"], "rate_limit");
        assert_eq!(draft["failure_type"], "runaway_loop");
        assert_eq!(draft["generator_meta"]["mapping_version"], "1.0");
    }

    #[test]
    fn placeholder_configuration_demotes_to_needs_human_input() {
        let generator = GuardrailGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut fields = good_fields();
        fields["configuration"]["max_iterations"] = json!("TODO");
        let draft = generator
            .compose_draft(&context(FailureType::RunawayLoop), &fields, &redactor)
            .unwrap();
        assert_eq!(draft["status"], "needs_human_input");
        assert!(draft["reason"]
            .as_str()
            .unwrap()
            .contains("configuration.max_iterations"));
    }

    #[test]
    fn placeholder_in_text_fields_is_caught() {
        let generator = GuardrailGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut fields = good_fields();
        fields["justification"] = json!("TBD later");
        let draft = generator
            .compose_draft(&context(FailureType::Toxicity), &fields, &redactor)
            .unwrap();
        assert_eq!(draft["status"], "needs_human_input");
        assert_eq!(draft["guardrail_type"], "content_filter");
    }

    #[test]
    fn clean_configuration_stays_draft() {
        let generator = GuardrailGenerator;
        let redactor = PiiRedactor::new("salt");
        let draft = generator
            .compose_draft(&context(FailureType::PiiLeak), &good_fields(), &redactor)
            .unwrap();
        assert_eq!(draft["status"], "draft");
        assert!(draft.get("reason").is_none());
        assert_eq!(draft["guardrail_type"], "redaction_rule");
        assert_eq!(draft["configuration"]["max_iterations"], "25");
    }

    #[test]
    fn out_of_range_prevention_rate_is_dropped() {
        let generator = GuardrailGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut fields = good_fields();
        fields["estimated_prevention_rate"] = json!(1.5);
        let draft = generator
            .compose_draft(&context(FailureType::RunawayLoop), &fields, &redactor)
            .unwrap();
        assert!(draft["estimated_prevention_rate"].is_null());
    }

    #[test]
    fn empty_configuration_is_a_validation_error() {
        let generator = GuardrailGenerator;
        let redactor = PiiRedactor::new("salt");
        let mut fields = good_fields();
        fields["configuration"] = json!({});
        let err = generator
            .compose_draft(&context(FailureType::RunawayLoop), &fields, &redactor)
            .unwrap_err();
        assert!(err.contains("configuration"));
    }

    #[test]
    fn template_draft_carries_mapping_and_reason() {
        let generator = GuardrailGenerator;
        let draft =
            generator.template_draft(&context(FailureType::RunawayLoop), "run_budget_exceeded");
        assert_eq!(draft["status"], "needs_human_input");
        assert_eq!(draft["reason"], "run_budget_exceeded");
        assert_eq!(draft["guardrail_type"], "rate_limit");
    }

    #[test]
    fn prompt_names_the_guardrail_type() {
        let generator = GuardrailGenerator;
        let ctx = context(FailureType::RunawayLoop);
        let prompt =
            generator.build_prompt(&ctx.suggestion, ctx.canonical.as_ref().unwrap());
        assert!(prompt.contains("rate_limit"));
        assert!(prompt.contains("Never emit"));
    }
}
