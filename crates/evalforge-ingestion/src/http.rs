//! HTTP surface for the ingestion service.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::service::IngestionService;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IngestionRunRequest {
    trace_lookback_hours: Option<i64>,
    quality_threshold: Option<f64>,
}

/// Routes: `POST /ingestion/run-once`, `GET /health`.
pub fn router(service: Arc<IngestionService>) -> Router {
    Router::new()
        .route("/ingestion/run-once", post(run_once))
        .route("/health", get(health))
        .with_state(service)
}

async fn run_once(
    State(service): State<Arc<IngestionService>>,
    body: Option<Json<IngestionRunRequest>>,
) -> Response {
    let request = body.map(|Json(r)| r).unwrap_or_default();
    let (default_lookback, default_quality) = service.defaults();
    let lookback = request.trace_lookback_hours.unwrap_or(default_lookback);
    let quality = request.quality_threshold.unwrap_or(default_quality);

    match service
        .run_once(request.trace_lookback_hours, request.quality_threshold)
        .await
    {
        Ok(written) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "startedAt": Utc::now().to_rfc3339(),
                "estimatedTraceCount": written,
                "traceLookbackHours": lookback,
                "qualityThreshold": quality,
            })),
        )
            .into_response(),
        Err(message) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": message})),
        )
            .into_response(),
    }
}

async fn health(State(service): State<Arc<IngestionService>>) -> Response {
    let snapshot = service.health().await;
    let status = match (&snapshot.last_error, service.traces().backlog_size().await) {
        (None, Ok(_)) => "ok",
        _ => "degraded",
    };
    let body = json!({
        "status": status,
        "version": env!("CARGO_PKG_VERSION"),
        "backlog": snapshot.backlog_size,
        "lastRun": snapshot,
        "config": {
            "traceLookbackHours": service.defaults().0,
            "qualityThreshold": service.defaults().1,
        },
    });
    (StatusCode::OK, Json(body)).into_response()
}
