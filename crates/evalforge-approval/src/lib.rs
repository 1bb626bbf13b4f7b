//! Approval workflow: the human gate between generated drafts and
//! exported artifacts. Transitions are transactional, audit history is
//! append-only, notifications are fire-and-forget, and exports require an
//! approved suggestion.

mod auth;
mod exporters;
mod http;
mod service;
mod webhook;

pub use auth::verify_api_key;
pub use exporters::{export_suggestion, ExportError, ExportFormat};
pub use http::router;
pub use service::{ApprovalError, ApprovalService};
pub use webhook::{build_approval_payload, build_test_payload, WebhookNotifier};
