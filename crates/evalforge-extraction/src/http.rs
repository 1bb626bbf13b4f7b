//! HTTP surface for the extraction service.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use evalforge_types::RunOnceRequest;

use crate::service::ExtractionService;

/// Routes: `POST /extraction/run-once`, `GET /health`.
pub fn router(service: Arc<ExtractionService>) -> Router {
    Router::new()
        .route("/extraction/run-once", post(run_once))
        .route("/health", get(health))
        .with_state(service)
}

async fn run_once(
    State(service): State<Arc<ExtractionService>>,
    body: Option<Json<RunOnceRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let summary = service.run(request).await;
    (StatusCode::OK, Json(summary)).into_response()
}

async fn health(State(service): State<Arc<ExtractionService>>) -> Response {
    let snapshot = service.health().await;
    // Degrade rather than fail when the store is unreachable.
    let (status, backlog) = match service.traces().backlog_size().await {
        Ok(backlog) => {
            let status = if snapshot.last_error.is_none() {
                "ok"
            } else {
                "degraded"
            };
            (status, Some(backlog))
        }
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
