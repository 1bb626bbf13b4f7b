//! The ingestion workflow: fetch, dedupe, sanitize, persist.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{info, warn};

use evalforge_redaction::PiiRedactor;
use evalforge_store::{Collections, DocumentStore, TraceRepository};
use evalforge_types::{CaptureStatus, FailureCapture};

use crate::datadog::{RateLimitSnapshot, TraceProvider};

/// In-memory snapshot served by `/health`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestionHealth {
    pub last_sync: Option<String>,
    pub written_count: usize,
    pub backlog_size: Option<usize>,
    pub last_error: Option<String>,
    pub trace_lookback_hours: Option<i64>,
    pub quality_threshold: Option<f64>,
    pub rate_limit: Option<RateLimitSnapshot>,
}

/// Collapse duplicate trace ids, summing recurrence counts. Events without
/// a trace id are dropped.
#[must_use]
pub fn deduplicate_by_trace_id(events: Vec<Value>) -> Vec<Value> {
    let mut seen: HashMap<String, Value> = HashMap::new();
    let mut order: Vec<String> = Vec::new();
    for event in events {
        let Some(trace_id) = event.get("trace_id").and_then(Value::as_str).map(str::to_string)
        else {
            continue;
        };
        if trace_id.is_empty() {
            continue;
        }
        match seen.get_mut(&trace_id) {
            Some(existing) => {
                let count = existing["recurrence_count"].as_u64().unwrap_or(1);
                let incoming = event
                    .get("recurrence_count")
                    .and_then(Value::as_u64)
                    .unwrap_or(1);
                existing["recurrence_count"] = Value::from(count + incoming);
            }
            None => {
                let mut first = event;
                if first.get("recurrence_count").and_then(Value::as_u64).is_none() {
                    first["recurrence_count"] = Value::from(1u64);
                }
                seen.insert(trace_id.clone(), first);
                order.push(trace_id);
            }
        }
    }
    order.into_iter().filter_map(|id| seen.remove(&id)).collect()
}

/// Ingestion stage service.
pub struct IngestionService {
    provider: Arc<dyn TraceProvider>,
    traces: TraceRepository,
    redactor: PiiRedactor,
    default_lookback_hours: i64,
    default_quality_threshold: f64,
    health: RwLock<IngestionHealth>,
}

impl IngestionService {
    pub fn new(
        provider: Arc<dyn TraceProvider>,
        store: Arc<dyn DocumentStore>,
        collections: Collections,
        redactor: PiiRedactor,
        default_lookback_hours: i64,
        default_quality_threshold: f64,
    ) -> Self {
        Self {
            provider,
            traces: TraceRepository::new(store, collections),
            redactor,
            default_lookback_hours,
            default_quality_threshold,
            health: RwLock::new(IngestionHealth::default()),
        }
    }

    pub fn traces(&self) -> &TraceRepository {
        &self.traces
    }

    pub fn defaults(&self) -> (i64, f64) {
        (self.default_lookback_hours, self.default_quality_threshold)
    }

    pub async fn health(&self) -> IngestionHealth {
        let mut snapshot = self.health.read().await.clone();
        snapshot.rate_limit = self.provider.last_rate_limit();
        snapshot
    }

    /// Execute one ingestion pass; returns the number of captures written.
    pub async fn run_once(
        &self,
        lookback_hours: Option<i64>,
        quality_threshold: Option<f64>,
    ) -> Result<usize, String> {
        let lookback = lookback_hours.unwrap_or(self.default_lookback_hours);
        let quality = quality_threshold.unwrap_or(self.default_quality_threshold);

        let events = match self
            .provider
            .fetch_recent_failures(lookback, quality, None)
            .await
        {
            Ok(events) => events,
            Err(err) => {
                let message = err.to_string();
                self.update_health(0, None, lookback, quality, Some(message.clone()))
                    .await;
                return Err(message);
            }
        };

        let fetched_count = events.len();
        let events = deduplicate_by_trace_id(events);

        let mut written = 0usize;
        let mut last_error: Option<String> = None;
        for event in events {
            let Some(trace_id) = event.get("trace_id").and_then(Value::as_str).map(str::to_string)
            else {
                warn!(event = "skip_event", reason = "missing trace_id", "skipping event");
                continue;
            };
            match self.build_capture(&trace_id, &event) {
                Ok(capture) => match self.traces.upsert_capture(capture).await {
                    Ok(()) => {
                        info!(
                            event = "decision",
                            trace_id = %trace_id,
                            action = "ingest",
                            outcome = "written",
                            "capture written"
                        );
                        written += 1;
                    }
                    Err(err) => {
                        warn!(event = "capture_write_failed", trace_id = %trace_id, error = %err, "failed to write capture");
                        last_error = Some(err.to_string());
                    }
                },
                Err(reason) => {
                    warn!(event = "capture_build_failed", trace_id = %trace_id, error = %reason, "failed to build capture");
                    last_error = Some(reason);
                }
            }
        }

        let backlog = self.traces.backlog_size().await.ok();
        self.update_health(written, backlog, lookback, quality, last_error)
            .await;

        info!(
            event = "ingestion_metrics",
            fetched_count,
            written_count = written,
            backlog_size = backlog,
            "ingestion pass completed"
        );
        Ok(written)
    }

    fn build_capture(&self, trace_id: &str, event: &Value) -> Result<FailureCapture, String> {
        // Sanitize a combined view so user ids living beside the payload
        // still hash.
        let mut payload = event.get("trace_payload").cloned().unwrap_or(Value::Null);
        if !payload.is_object() {
            payload = serde_json::json!({});
        }
        if payload.get("user").is_none() {
            if let Some(user) = event.get("user").filter(|u| u.is_object()) {
                payload["user"] = user.clone();
            }
        }
        let user_hash = self.redactor.sanitize_payload(&mut payload);

        let now = Utc::now();
        Ok(FailureCapture {
            trace_id: trace_id.to_string(),
            fetched_at: now,
            failure_type: event
                .get("failure_type")
                .and_then(Value::as_str)
                .unwrap_or("unknown")
                .to_string(),
            trace_payload: payload,
            service_name: event
                .get("service_name")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            severity: event
                .get("severity")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string(),
            status_code: event.get("status_code").and_then(Value::as_i64),
            quality_score: event.get("quality_score").and_then(Value::as_f64),
            user_hash,
            processed: false,
            recurrence_count: event
                .get("recurrence_count")
                .and_then(Value::as_u64)
                .unwrap_or(1),
            status: CaptureStatus::New,
            status_history: Vec::new(),
            export_status: None,
            export_destination: None,
            export_reference: None,
        }
        .with_initial_history(now))
    }

    async fn update_health(
        &self,
        written: usize,
        backlog: Option<usize>,
        lookback: i64,
        quality: f64,
        last_error: Option<String>,
    ) {
        let mut health = self.health.write().await;
        health.last_sync = Some(Utc::now().to_rfc3339());
        health.written_count = written;
        health.backlog_size = backlog;
        health.last_error = last_error;
        health.trace_lookback_hours = Some(lookback);
        health.quality_threshold = Some(quality);
    }
}
