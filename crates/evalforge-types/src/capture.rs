//! Normalized failure records captured from the observability provider.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle of a captured failure trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CaptureStatus {
    /// Freshly ingested, not yet exported anywhere.
    New,
    /// Referenced by a successful approval export.
    Exported,
}

impl Default for CaptureStatus {
    fn default() -> Self {
        Self::New
    }
}

/// Append-only status trail entry on a capture.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusHistoryEntry {
    pub status: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// Normalized record of a production LLM failure.
///
/// Document id equals `trace_id`, which makes re-ingestion idempotent: a
/// second run for the same trace overwrites this document rather than
/// creating a sibling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureCapture {
    pub trace_id: String,
    pub fetched_at: DateTime<Utc>,
    /// Coarse failure classification reported by the provider.
    pub failure_type: String,
    /// Sanitized trace payload. PII fields are stripped before this is built.
    pub trace_payload: Value,
    #[serde(default)]
    pub service_name: String,
    #[serde(default)]
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quality_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_hash: Option<String>,
    #[serde(default)]
    pub processed: bool,
    #[serde(default = "default_recurrence")]
    pub recurrence_count: u64,
    #[serde(default)]
    pub status: CaptureStatus,
    #[serde(default)]
    pub status_history: Vec<StatusHistoryEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_destination: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub export_reference: Option<String>,
}

fn default_recurrence() -> u64 {
    1
}

impl FailureCapture {
    /// Seed the status trail for a fresh ingestion.
    #[must_use]
    pub fn with_initial_history(mut self, now: DateTime<Utc>) -> Self {
        self.status_history.push(StatusHistoryEntry {
            status: "new".to_string(),
            actor: "ingestion".to_string(),
            timestamp: now,
        });
        self
    }

    /// Carry approval/export state forward from an existing document.
    ///
    /// Ingestion owns every other field; `status`, `status_history`, and the
    /// export fields belong to the approval stage and must survive
    /// re-ingestion.
    pub fn preserve_from(&mut self, existing: &FailureCapture) {
        self.status = existing.status;
        self.status_history = existing.status_history.clone();
        self.export_status = existing.export_status.clone();
        self.export_destination = existing.export_destination.clone();
        self.export_reference = existing.export_reference.clone();
    }
}
