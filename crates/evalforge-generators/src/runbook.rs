//! Runbook generator: operational response documents for recurring
//! infrastructure failures.

use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use evalforge_redaction::PiiRedactor;
use evalforge_types::{new_draft_id, schema, FailurePattern, Suggestion, SuggestionType};

use crate::harness::{ArtifactGenerator, DraftContext, FIELD_CAP};

pub struct RunbookGenerator;

#[derive(Debug, Deserialize)]
struct RunbookFields {
    runbook_title: String,
    symptom_summary: String,
    diagnosis_steps: Vec<String>,
    mitigation_steps: Vec<String>,
    escalation_policy: String,
    #[serde(default)]
    affected_services: Vec<String>,
}

impl ArtifactGenerator for RunbookGenerator {
    fn suggestion_type(&self) -> SuggestionType {
        SuggestionType::Runbook
    }

    fn stage(&self) -> &'static str {
        "runbook"
    }

    fn slot(&self) -> &'static str {
        "runbook"
    }

    fn id_field(&self) -> &'static str {
        "runbook_id"
    }

    fn response_schema(&self) -> Value {
        schema::runbook_schema()
    }

    fn build_prompt(&self, suggestion: &Suggestion, canonical: &FailurePattern) -> String {
        format!(
            "You are an SRE writing an incident runbook. Turn the recurring \
failure below into an actionable runbook for the on-call engineer.\n\n\
Failure pattern:\n\
- failure_type: {failure_type}\n\
- title: {title}\n\
- trigger_condition: {trigger}\n\
- summary: {summary}\n\
- root_cause_hypothesis: {hypothesis}\n\
- reproduction input: {input_pattern}\n\
- severity: {severity}\n\
- recommended actions: {actions}\n\n\
Suggestion context: {context}\n\n\
Rules:\n\
- diagnosis_steps are ordered checks the operator performs first.\n\
- mitigation_steps are ordered actions that restore service.\n\
- escalation_policy names when and to whom to escalate.\n\
- every step must be concrete enough to execute without further research.\n\n\
Respond with a single JSON object matching the requested schema.",
            failure_type = canonical.failure_type,
            title = canonical.title,
            trigger = canonical.trigger_condition,
            summary = canonical.summary,
            hypothesis = canonical.root_cause_hypothesis,
            input_pattern = canonical.reproduction_context.input_pattern,
            severity = canonical.severity,
            actions = canonical.recommended_actions.join("; "),
            context = suggestion.pattern.summary,
        )
    }

    fn compose_draft(
        &self,
        ctx: &DraftContext,
        parsed: &Value,
        redactor: &PiiRedactor,
    ) -> Result<Value, String> {
        let fields: RunbookFields =
            serde_json::from_value(parsed.clone()).map_err(|e| e.to_string())?;
        if fields.diagnosis_steps.is_empty() {
            return Err("diagnosis_steps must not be empty".to_string());
        }
        if fields.mitigation_steps.is_empty() {
            return Err("mitigation_steps must not be empty".to_string());
        }

        let cap = |text: &str| redactor.redact_and_truncate(text, FIELD_CAP);
        let now = Utc::now();
        let (draft_id, generated_at) = match &ctx.existing {
            Some(existing) => (
                existing["runbook_id"]
                    .as_str()
                    .map(str::to_string)
                    .unwrap_or_else(|| new_draft_id("rb")),
                existing["generated_at"].clone(),
            ),
            None => (new_draft_id("rb"), json!(now)),
        };
        let meta = ctx.meta.as_ref().ok_or("generator metadata missing")?;

        Ok(json!({
            "runbook_id": draft_id,
            "runbook_title": cap(&fields.runbook_title),
            "symptom_summary": cap(&fields.symptom_summary),
            "diagnosis_steps": fields.diagnosis_steps.iter().map(|s| cap(s)).collect::<Vec<_>>(),
            "mitigation_steps": fields.mitigation_steps.iter().map(|s| cap(s)).collect::<Vec<_>>(),
            "escalation_policy": cap(&fields.escalation_policy),
            "affected_services": fields.affected_services.iter().map(|s| cap(s)).collect::<Vec<_>>(),
            "severity": ctx.suggestion.severity.as_str(),
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
            "runbook_id": new_draft_id("rb"),
            "runbook_title": format!("review_needed_{}", ctx.suggestion.suggestion_id),
            "symptom_summary": "Automatic generation lacked sufficient context; a reviewer must complete this runbook.",
            "diagnosis_steps": [],
            "mitigation_steps": [],
            "escalation_policy": "",
            "affected_services": [],
            "severity": ctx.suggestion.severity.as_str(),
            "source": &ctx.source,
            "status": "needs_human_input",
            "reason": reason,
            "edit_source": "generated",
            "generated_at": now,
            "updated_at": now,
        })
    }
}
