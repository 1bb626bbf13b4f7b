//! Request/response types shared by the per-service HTTP surfaces.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::runs::TriggeredBy;

/// Body of every `POST /<stage>/run-once` trigger.
///
/// Field names are camelCase on the wire; batch size is clamped by the
/// handler against the configured 1..=200 window.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOnceRequest {
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub dry_run: Option<bool>,
    #[serde(default)]
    pub triggered_by: Option<TriggeredBy>,
    #[serde(default)]
    pub suggestion_ids: Option<Vec<String>>,
    #[serde(default)]
    pub trace_ids: Option<Vec<String>>,
    #[serde(default)]
    pub force_overwrite: Option<bool>,
}

impl RunOnceRequest {
    #[must_use]
    pub fn triggered_by(&self) -> TriggeredBy {
        self.triggered_by.unwrap_or_default()
    }

    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.dry_run.unwrap_or(false)
    }

    #[must_use]
    pub fn force_overwrite(&self) -> bool {
        self.force_overwrite.unwrap_or(false)
    }

    /// Effective batch size, clamped into the accepted window.
    #[must_use]
    pub fn effective_batch_size(&self, configured: usize) -> usize {
        self.batch_size.unwrap_or(configured).clamp(1, 200)
    }
}

/// Response of `POST /<type>/generate/{suggestion_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateOneResponse {
    pub suggestion_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}
