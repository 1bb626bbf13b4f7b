//! Fire-and-forget Slack notification for approval actions.
//!
//! Delivery never blocks or fails an approval: the HTTP handler spawns
//! the send as a detached task, non-200s log a warning, exceptions are
//! swallowed, and an unset URL is a successful no-op.

use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(5);

/// Build the Block Kit payload for an approval/rejection notification.
#[must_use]
pub fn build_approval_payload(
    suggestion_id: &str,
    action: &str,
    actor: &str,
    suggestion_type: Option<&str>,
    notes: Option<&str>,
    reason: Option<&str>,
) -> Value {
    let emoji = if action == "approved" {
        ":white_check_mark:"
    } else {
        ":x:"
    };
    let action_title = {
        let mut chars = action.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
            None => String::new(),
        }
    };

    let mut details = format!("*ID:* `{suggestion_id}`\n*Action:* {action}\n*By:* {actor}");
    if let Some(suggestion_type) = suggestion_type {
        details.push_str(&format!("\n*Type:* {suggestion_type}"));
    }
    if let Some(notes) = notes {
        details.push_str(&format!("\n*Notes:* {notes}"));
    }
    if let Some(reason) = reason {
        details.push_str(&format!("\n*Reason:* {reason}"));
    }

    json!({
        "text": format!("{emoji} Suggestion {suggestion_id} was {action} by {actor}"),
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": format!("{emoji} Suggestion {action_title}"),
                    "emoji": true,
                }
            },
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": details}
            },
            {
                "type": "context",
                "elements": [
                    {"type": "mrkdwn", "text": format!("_{}_", Utc::now().to_rfc3339())}
                ]
            }
        ]
    })
}

/// Test message for verifying webhook configuration from an operator shell.
#[must_use]
pub fn build_test_payload(message: Option<&str>) -> Value {
    let text = message.unwrap_or("Test notification from EvalForge Approval Workflow");
    json!({
        "text": text,
        "blocks": [
            {
                "type": "header",
                "text": {
                    "type": "plain_text",
                    "text": ":test_tube: Webhook Test",
                    "emoji": true,
                }
            },
            {
                "type": "section",
                "text": {"type": "mrkdwn", "text": text}
            },
            {
                "type": "context",
                "elements": [
                    {"type": "mrkdwn", "text": format!("_Sent at {}_", Utc::now().to_rfc3339())}
                ]
            }
        ]
    })
}

/// Posts notification payloads to the configured webhook URL.
pub struct WebhookNotifier {
    url: Option<String>,
    client: std::sync::OnceLock<reqwest::Client>,
}

impl WebhookNotifier {
    #[must_use]
    pub fn new(url: Option<String>) -> Self {
        Self {
            url,
            client: std::sync::OnceLock::new(),
        }
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(reqwest::Client::new)
    }

    /// Send a payload. Returns whether delivery succeeded; all failure
    /// modes are logged and swallowed.
    pub async fn send(&self, payload: Value) -> bool {
        let Some(url) = &self.url else {
            debug!("SLACK_WEBHOOK_URL not configured, skipping notification");
            return true;
        };

        let result = self
            .client()
            .post(url)
            .timeout(WEBHOOK_TIMEOUT)
            .json(&payload)
            .send()
            .await;

        match result {
            Ok(response) => {
                let status = response.status();
                if status.as_u16() == 429 {
                    let retry_after = response
                        .headers()
                        .get("Retry-After")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or("unknown")
                        .to_string();
                    warn!(retry_after = %retry_after, "webhook rate limited");
                    return false;
                }
                if !status.is_success() {
                    warn!(status = status.as_u16(), "webhook delivery failed");
                    return false;
                }
                info!("webhook notification sent");
                true
            }
            Err(err) if err.is_timeout() => {
                warn!("webhook timed out (continuing)");
                false
            }
            Err(err) => {
                warn!(error = %err, "webhook error");
                false
            }
        }
    }

    /// Build and send an approval/rejection notification.
    pub async fn send_approval_notification(
        &self,
        suggestion_id: &str,
        action: &str,
        actor: &str,
        suggestion_type: Option<&str>,
        notes: Option<&str>,
        reason: Option<&str>,
    ) -> bool {
        let payload =
            build_approval_payload(suggestion_id, action, actor, suggestion_type, notes, reason);
        self.send(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn approval_payload_shape() {
        let payload = build_approval_payload(
            "sugg_1",
            "approved",
            "alice",
            Some("eval"),
            Some("looks right"),
            None,
        );
        assert!(payload["text"].as_str().unwrap().contains("sugg_1"));
        let blocks = payload["blocks"].as_array().unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0]["type"], "header");
        let details = blocks[1]["text"]["text"].as_str().unwrap();
        assert!(details.contains("*By:* alice"));
        assert!(details.contains("*Type:* eval"));
        assert!(details.contains("*Notes:* looks right"));
    }

    #[test]
    fn rejection_payload_carries_reason() {
        let payload = build_approval_payload(
            "sugg_2",
            "rejected",
            "bob",
            Some("guardrail"),
            None,
            Some("duplicate"),
        );
        assert!(payload["text"].as_str().unwrap().contains(":x:"));
        let details = payload["blocks"][1]["text"]["text"].as_str().unwrap();
        assert!(details.contains("*Reason:* duplicate"));
        assert!(!details.contains("*Notes:*"));
    }

    #[test]
    fn test_payload_uses_default_or_custom_message() {
        let payload = build_test_payload(None);
        assert!(payload["text"].as_str().unwrap().contains("EvalForge"));
        let payload = build_test_payload(Some("ping"));
        assert_eq!(payload["text"], "ping");
        assert_eq!(payload["blocks"][0]["text"]["text"], ":test_tube: Webhook Test");
    }

    #[tokio::test]
    async fn unconfigured_url_is_a_successful_noop() {
        let notifier = WebhookNotifier::new(None);
        assert!(notifier.send(json!({"text": "hello"})).await);
    }

    #[tokio::test]
    async fn unreachable_url_fails_quietly() {
        let notifier = WebhookNotifier::new(Some("http://127.0.0.1:1/webhook".to_string()));
        // No panic, no error propagation; just a false.
        assert!(!notifier.send(json!({"text": "hello"})).await);
    }
}
