//! HTTP-level tests for the approval router: auth, status codes, and
//! response shapes.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::util::ServiceExt;

use evalforge_approval::{router, ApprovalService, WebhookNotifier};
use evalforge_store::{Collections, DocumentStore, MemoryStore};
use evalforge_types::{
    DraftSource, DraftStatus, EditSource, EvalTestDraft, Evidence, FailurePattern, FailureType,
    ReproductionContext, Severity, Suggestion,
};

const API_KEY: &str = "test-api-key";

fn pattern() -> FailurePattern {
    FailurePattern {
        pattern_id: "pattern_t1".to_string(),
        source_trace_id: "t1".to_string(),
        title: "t".to_string(),
        failure_type: FailureType::Hallucination,
        trigger_condition: "trigger".to_string(),
        summary: "summary".to_string(),
        root_cause_hypothesis: "h".to_string(),
        evidence: Evidence {
            signals: vec!["s".to_string()],
            excerpt: None,
        },
        recommended_actions: vec!["a".to_string()],
        reproduction_context: ReproductionContext::default(),
        severity: Severity::High,
        confidence: 0.9,
        confidence_rationale: "r".to_string(),
        extracted_at: Utc::now(),
        processed: false,
    }
}

fn eval_draft() -> EvalTestDraft {
    EvalTestDraft {
        eval_test_id: "eval_1".to_string(),
        test_name: "eiffel_date".to_string(),
        description: "d".to_string(),
        input_prompt: "What year was the Eiffel Tower built?".to_string(),
        expected_behavior: "1889".to_string(),
        failure_condition: "1920".to_string(),
        assertions: vec!["mentions 1889".to_string()],
        tags: vec![],
        source: DraftSource::default(),
        status: DraftStatus::Draft,
        reason: None,
        edit_source: EditSource::Generated,
        generated_at: Utc::now(),
        updated_at: Utc::now(),
        generator_meta: None,
    }
}

async fn app() -> axum::Router {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(ApprovalService::new(
        store as Arc<dyn DocumentStore>,
        Collections::new("evalforge_"),
        Arc::new(WebhookNotifier::new(None)),
        Some(API_KEY.to_string()),
    ));
    let mut suggestion =
        Suggestion::from_pattern("sugg_1".to_string(), &pattern(), vec![], Utc::now());
    suggestion.suggestion_content.eval_test = Some(eval_draft());
    service.suggestions().create(&suggestion).await.unwrap();
    router(service)
}

fn post(uri: &str, api_key: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-API-Key", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn approve_requires_api_key() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(post("/suggestions/sugg_1/approve", None, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(response.headers()["www-authenticate"], "APIKey");

    let response = app
        .oneshot(post(
            "/suggestions/sugg_1/approve",
            Some("wrong-key"),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn approve_then_reapprove_maps_to_conflict() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(post(
            "/suggestions/sugg_1/approve",
            Some(API_KEY),
            json!({"actor": "alice", "notes": "lgtm"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "approved");
    assert_eq!(body["approval_metadata"]["actor"], "alice");
    assert_eq!(body["version_history"].as_array().unwrap().len(), 1);

    let response = app
        .oneshot(post(
            "/suggestions/sugg_1/approve",
            Some(API_KEY),
            json!({"actor": "bob"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid_transition");
}

#[tokio::test]
async fn reject_without_reason_is_bad_request() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(post(
            "/suggestions/sugg_1/reject",
            Some(API_KEY),
            json!({"actor": "bob"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(post(
            "/suggestions/sugg_1/reject",
            Some(API_KEY),
            json!({"actor": "bob", "reason": "duplicate"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "rejected");
    assert_eq!(body["approval_metadata"]["reason"], "duplicate");
}

#[tokio::test]
async fn unknown_suggestion_is_not_found() {
    let app = app().await;
    let response = app
        .oneshot(post(
            "/suggestions/sugg_missing/approve",
            Some(API_KEY),
            json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn export_requires_approval_then_yields_deepeval_json() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/suggestions/sugg_1/export?format=deepeval")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .clone()
        .oneshot(post(
            "/suggestions/sugg_1/approve",
            Some(API_KEY),
            json!({"actor": "alice"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/suggestions/sugg_1/export?format=deepeval")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["content-type"], "application/json");
    let body = body_json(response).await;
    assert_eq!(body["input"], "What year was the Eiffel Tower built?");
    assert!(body["additional_metadata"].is_object());
}

#[tokio::test]
async fn listing_returns_page_shape() {
    let app = app().await;
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/suggestions?status=pending&type=eval&limit=10")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["suggestions"].as_array().unwrap().len(), 1);
    assert_eq!(body["hasMore"], false);
    assert!(body["nextCursor"].is_null());

    // Unknown filter values are rejected.
    let response = app
        .oneshot(
            Request::builder()
                .uri("/suggestions?status=bogus")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_pending_backlog() {
    let app = app().await;
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["backlog"], 1);
}
