//! HTTP surface shared by the three generators.
//!
//! Each generator mounts under its type segment, e.g. the guardrail
//! service serves `POST /guardrail/run-once` and
//! `POST /guardrail/generate/{suggestion_id}`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use evalforge_types::{GenerateOneResponse, OutcomeStatus, RunOnceRequest};

use crate::harness::GeneratorService;

/// Routes for one generator service.
pub fn router(service: Arc<GeneratorService>) -> Router {
    let segment = service.suggestion_type().as_str();
    Router::new()
        .route(&format!("/{segment}/run-once"), post(run_once))
        .route(&format!("/{segment}/generate/:suggestion_id"), post(generate_one))
        .route("/health", get(health))
        .with_state(service)
}

async fn run_once(
    State(service): State<Arc<GeneratorService>>,
    body: Option<Json<RunOnceRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let summary = service.run_batch(request).await;
    (StatusCode::OK, Json(summary)).into_response()
}

async fn generate_one(
    State(service): State<Arc<GeneratorService>>,
    Path(suggestion_id): Path<String>,
    body: Option<Json<RunOnceRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let view = service
        .generate_single(&suggestion_id, request.force_overwrite())
        .await;

    let status_code = match (view.status, view.reason.as_deref()) {
        (OutcomeStatus::Skipped, Some("not_found")) => StatusCode::NOT_FOUND,
        (OutcomeStatus::Skipped, Some("overwrite_blocked")) => StatusCode::CONFLICT,
        (OutcomeStatus::Skipped, Some("wrong_suggestion_type")) => StatusCode::BAD_REQUEST,
        (OutcomeStatus::Error, Some("rate_limited")) => StatusCode::TOO_MANY_REQUESTS,
        (OutcomeStatus::Stored, _) => StatusCode::OK,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    // Hydrate the freshly written draft for 200 responses.
    let artifact = if status_code == StatusCode::OK {
        service
            .suggestions()
            .get(&suggestion_id)
            .await
            .ok()
            .flatten()
            .and_then(|suggestion| {
                serde_json::to_value(&suggestion.suggestion_content)
                    .ok()
                    .and_then(|content| content.get(service.stage_slot()).cloned())
            })
    } else {
        None
    };

    let body = GenerateOneResponse {
        suggestion_id: view.suggestion_id,
        status: match view.status {
            OutcomeStatus::Stored => "generated".to_string(),
            OutcomeStatus::Skipped => view.reason.clone().unwrap_or_else(|| "skipped".into()),
            OutcomeStatus::TimedOut => "timed_out".to_string(),
            _ => "error".to_string(),
        },
        artifact,
        reason: view.reason,
    };
    (status_code, Json(body)).into_response()
}

async fn health(State(service): State<Arc<GeneratorService>>) -> Response {
    let snapshot = service.health().await;
    let (status, backlog) = match service
        .suggestions()
        .count_by_type(service.suggestion_type())
        .await
    {
        Ok(count) => ("ok", Some(count)),
        Err(_) => ("degraded", None),
    };
    let body = json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "backlog": backlog,
        "lastRun": snapshot,
        "config": service.config_summary(),
    });
    (StatusCode::OK, Json(body)).into_response()
}
