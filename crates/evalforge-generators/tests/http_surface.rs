//! HTTP-level tests for a generator router: single-item status codes and
//! batch responses.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use evalforge_config::{BatchConfig, Env, GeminiConfig};
use evalforge_generators::{router, GeneratorService, GuardrailGenerator};
use evalforge_llm::{sha256_hex, LlmBackend, LlmError, LlmRequest, LlmResponse};
use evalforge_redaction::PiiRedactor;
use evalforge_store::{Collections, DocumentStore, MemoryStore, SuggestionRepository};
use evalforge_types::{
    Evidence, FailurePattern, FailureType, ReproductionContext, Severity, Suggestion,
};

struct StubLlm {
    fail_rate_limited: bool,
}

#[async_trait]
impl LlmBackend for StubLlm {
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse, LlmError> {
        if self.fail_rate_limited {
            return Err(LlmError::RateLimited("quota exhausted".to_string()));
        }
        let parsed = json!({
            "rule_name": "cap_agent_iterations",
            "description": "Stops agent loops after a fixed iteration budget",
            "configuration": {"max_iterations": "25"},
            "justification": "Bounds the blast radius of repeated calls."
        });
        let raw = parsed.to_string();
        Ok(LlmResponse {
            prompt_sha256: sha256_hex(&request.prompt),
            response_sha256: sha256_hex(&raw),
            raw_text: raw,
            parsed,
            usage: Default::default(),
            model: "stub".to_string(),
        })
    }
}

fn pattern() -> FailurePattern {
    FailurePattern {
        pattern_id: "pattern_t1".to_string(),
        source_trace_id: "t1".to_string(),
        title: "Loop".to_string(),
        failure_type: FailureType::RunawayLoop,
        trigger_condition: "repeats".to_string(),
        summary: "47 calls".to_string(),
        root_cause_hypothesis: "no cap".to_string(),
        evidence: Evidence {
            signals: vec!["repeat".to_string()],
            excerpt: None,
        },
        recommended_actions: vec!["cap".to_string()],
        reproduction_context: ReproductionContext {
            input_pattern: "ask for repeated lookups".to_string(),
            required_state: None,
            tools_involved: vec![],
        },
        severity: Severity::High,
        confidence: 0.85,
        confidence_rationale: "clear".to_string(),
        extracted_at: Utc::now(),
        processed: false,
    }
}

async fn app(fail_rate_limited: bool) -> (axum::Router, SuggestionRepository) {
    let store = Arc::new(MemoryStore::new());
    let env = Env::from_map(HashMap::new());
    let collections = Collections::new("evalforge_");
    let service = Arc::new(GeneratorService::new(
        Arc::new(GuardrailGenerator),
        Arc::new(StubLlm { fail_rate_limited }),
        store.clone() as Arc<dyn DocumentStore>,
        collections.clone(),
        PiiRedactor::new("salt"),
        BatchConfig::load(&env, "GUARDRAIL", 45).unwrap(),
        GeminiConfig::load(&env).unwrap(),
    ));

    let p = pattern();
    service.patterns().upsert_pattern(&p).await.unwrap();
    let suggestion = Suggestion::from_pattern("sugg_1".to_string(), &p, vec![], Utc::now());
    service.suggestions().create(&suggestion).await.unwrap();

    let suggestions = SuggestionRepository::new(store as Arc<dyn DocumentStore>, collections);
    (router(service), suggestions)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn single_generation_returns_artifact() {
    let (app, _) = app(false).await;
    let response = app
        .oneshot(post_json("/guardrail/generate/sugg_1", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["suggestionId"], "sugg_1");
    assert_eq!(body["status"], "generated");
    assert_eq!(body["artifact"]["rule_name"], "cap_agent_iterations");
    assert_eq!(body["artifact"]["guardrail_type"], "rate_limit");
}

#[tokio::test]
async fn missing_suggestion_is_404() {
    let (app, _) = app(false).await;
    let response = app
        .oneshot(post_json("/guardrail/generate/sugg_missing", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn human_edited_draft_is_409_without_force() {
    let (app, suggestions) = app(false).await;
    // Generate once, then mark the draft human-edited.
    let response = app
        .clone()
        .oneshot(post_json("/guardrail/generate/sugg_1", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let suggestion = suggestions.get("sugg_1").await.unwrap().unwrap();
    let mut draft =
        serde_json::to_value(suggestion.suggestion_content.guardrail.unwrap()).unwrap();
    draft["edit_source"] = json!("human");
    suggestions
        .write_draft("sugg_1", "guardrail", draft, true, Utc::now())
        .await
        .unwrap();

    let response = app
        .clone()
        .oneshot(post_json("/guardrail/generate/sugg_1", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["status"], "overwrite_blocked");

    // forceOverwrite flips the outcome.
    let response = app
        .oneshot(post_json(
            "/guardrail/generate/sugg_1",
            json!({"forceOverwrite": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn rate_limited_upstream_maps_to_429() {
    let (app, _) = app(true).await;
    let response = app
        .oneshot(post_json("/guardrail/generate/sugg_1", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
}

#[tokio::test]
async fn batch_endpoint_returns_run_summary() {
    let (app, _) = app(false).await;
    let response = app
        .oneshot(post_json("/guardrail/run-once", json!({"batchSize": 5})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["generator"], "guardrail");
    assert_eq!(body["picked_up_count"], 1);
    assert_eq!(body["generated_count"], 1);
    assert!(body["run_id"].as_str().unwrap().starts_with("run_"));
}
