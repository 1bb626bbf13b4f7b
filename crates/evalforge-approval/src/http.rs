//! HTTP surface for the approval workflow.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::WWW_AUTHENTICATE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use evalforge_types::{SuggestionStatus, SuggestionType};

use crate::auth::verify_api_key;
use crate::exporters::{ExportError, ExportFormat};
use crate::service::{ApprovalError, ApprovalService};

/// Routes: suggestion listing, approve/reject, export, health.
pub fn router(service: Arc<ApprovalService>) -> Router {
    Router::new()
        .route("/suggestions", get(list_suggestions))
        .route("/suggestions/:id", get(get_suggestion))
        .route("/suggestions/:id/approve", post(approve))
        .route("/suggestions/:id/reject", post(reject))
        .route("/suggestions/:id/export", get(export))
        .route("/health", get(health))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
struct ListParams {
    status: Option<String>,
    #[serde(rename = "type")]
    suggestion_type: Option<String>,
    limit: Option<usize>,
    cursor: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ApproveBody {
    actor: Option<String>,
    notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RejectBody {
    actor: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    format: Option<String>,
}

fn unauthorized(detail: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(WWW_AUTHENTICATE, "APIKey")],
        Json(json!({"detail": detail})),
    )
        .into_response()
}

fn require_api_key(service: &ApprovalService, headers: &HeaderMap) -> Result<(), Response> {
    let presented = headers.get("X-API-Key").and_then(|v| v.to_str().ok());
    verify_api_key(presented, service.api_key()).map_err(|detail| unauthorized(detail))
}

fn error_response(err: ApprovalError) -> Response {
    match err {
        ApprovalError::NotFound(id) => (
            StatusCode::NOT_FOUND,
            Json(json!({"detail": format!("suggestion {id} not found")})),
        )
            .into_response(),
        ApprovalError::InvalidTransition(detail) => (
            StatusCode::CONFLICT,
            Json(json!({"detail": detail, "error": "invalid_transition"})),
        )
            .into_response(),
        ApprovalError::ReasonRequired => (
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": "reason is required"})),
        )
            .into_response(),
        ApprovalError::Export(export_err) => {
            let status = match export_err {
                ExportError::NotApproved(_) | ExportError::UnsupportedFormat(_) => {
                    StatusCode::BAD_REQUEST
                }
                ExportError::ContentMissing(_) => StatusCode::BAD_REQUEST,
                ExportError::Serialization(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            (status, Json(json!({"detail": export_err.to_string()}))).into_response()
        }
        ApprovalError::Store(detail) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"detail": detail})),
        )
            .into_response(),
    }
}

fn parse_status(raw: &Option<String>) -> Result<Option<SuggestionStatus>, Response> {
    match raw.as_deref() {
        None => Ok(None),
        Some("pending") => Ok(Some(SuggestionStatus::Pending)),
        Some("approved") => Ok(Some(SuggestionStatus::Approved)),
        Some("rejected") => Ok(Some(SuggestionStatus::Rejected)),
        Some(other) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": format!("unknown status filter: {other}")})),
        )
            .into_response()),
    }
}

fn parse_type(raw: &Option<String>) -> Result<Option<SuggestionType>, Response> {
    match raw.as_deref() {
        None => Ok(None),
        Some("eval") => Ok(Some(SuggestionType::Eval)),
        Some("guardrail") => Ok(Some(SuggestionType::Guardrail)),
        Some("runbook") => Ok(Some(SuggestionType::Runbook)),
        Some(other) => Err((
            StatusCode::BAD_REQUEST,
            Json(json!({"detail": format!("unknown type filter: {other}")})),
        )
            .into_response()),
    }
}

async fn list_suggestions(
    State(service): State<Arc<ApprovalService>>,
    Query(params): Query<ListParams>,
) -> Response {
    let status = match parse_status(&params.status) {
        Ok(status) => status,
        Err(response) => return response,
    };
    let suggestion_type = match parse_type(&params.suggestion_type) {
        Ok(suggestion_type) => suggestion_type,
        Err(response) => return response,
    };
    match service
        .list(status, suggestion_type, params.limit.unwrap_or(50), params.cursor)
        .await
    {
        Ok(page) => (
            StatusCode::OK,
            Json(json!({
                "suggestions": page.suggestions,
                "nextCursor": page.next_cursor,
                "hasMore": page.has_more,
            })),
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn get_suggestion(
    State(service): State<Arc<ApprovalService>>,
    Path(id): Path<String>,
) -> Response {
    match service.get(&id).await {
        Ok(Some(suggestion)) => (StatusCode::OK, Json(suggestion)).into_response(),
        Ok(None) => error_response(ApprovalError::NotFound(id)),
        Err(err) => error_response(err),
    }
}

async fn approve(
    State(service): State<Arc<ApprovalService>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<ApproveBody>>,
) -> Response {
    if let Err(response) = require_api_key(&service, &headers) {
        return response;
    }
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let actor = body.actor.unwrap_or_else(|| "api".to_string());
    match service.approve(&id, &actor, body.notes.clone()).await {
        Ok(suggestion) => {
            // Webhook failure must never roll back the transition.
            service.notify(&suggestion, body.notes, None);
            (StatusCode::OK, Json(suggestion)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn reject(
    State(service): State<Arc<ApprovalService>>,
    Path(id): Path<String>,
    headers: HeaderMap,
    body: Option<Json<RejectBody>>,
) -> Response {
    if let Err(response) = require_api_key(&service, &headers) {
        return response;
    }
    let body = body.map(|Json(b)| b).unwrap_or_default();
    let Some(reason) = body.reason.filter(|r| !r.trim().is_empty()) else {
        return error_response(ApprovalError::ReasonRequired);
    };
    let actor = body.actor.unwrap_or_else(|| "api".to_string());
    match service.reject(&id, &actor, reason.clone()).await {
        Ok(suggestion) => {
            service.notify(&suggestion, None, Some(reason));
            (StatusCode::OK, Json(suggestion)).into_response()
        }
        Err(err) => error_response(err),
    }
}

async fn export(
    State(service): State<Arc<ApprovalService>>,
    Path(id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Response {
    let format = match ExportFormat::parse(params.format.as_deref().unwrap_or("deepeval")) {
        Ok(format) => format,
        Err(err) => return error_response(ApprovalError::Export(err)),
    };
    match service.export(&id, format).await {
        Ok((content, content_type)) => (
            StatusCode::OK,
            [(axum::http::header::CONTENT_TYPE, content_type)],
            content,
        )
            .into_response(),
        Err(err) => error_response(err),
    }
}

async fn health(State(service): State<Arc<ApprovalService>>) -> Response {
    match service.health_stats().await {
        Ok(stats) => (
            StatusCode::OK,
            Json(json!({
                "status": "ok",
                "version": env!("CARGO_PKG_VERSION"),
                "backlog": stats["pendingCount"],
                "lastRun": stats,
                "config": {"authConfigured": service.api_key().is_some()},
            })),
        )
            .into_response(),
        Err(_) => (
            StatusCode::OK,
            Json(json!({
                "status": "degraded",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        )
            .into_response(),
    }
}
