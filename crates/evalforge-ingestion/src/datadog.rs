//! Datadog spans client: the failure-quality search query and its retry
//! policy, plus the last rate-limit snapshot for health reporting.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use evalforge_config::DatadogConfig;

const SPANS_PAGE_LIMIT: usize = 100;
const FETCH_ATTEMPTS: u32 = 3;

/// Provider-side failures.
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("provider transport error: {0}")]
    Transport(String),

    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },
}

/// Rate-limit headers captured from the most recent provider response.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct RateLimitSnapshot {
    pub limit: Option<String>,
    pub remaining: Option<String>,
    pub reset: Option<String>,
}

/// Seam for the observability provider. Production uses
/// [`DatadogSpansClient`]; tests inject fixed span sets.
#[async_trait]
pub trait TraceProvider: Send + Sync {
    /// Spans matching the failure-quality query inside the lookback window,
    /// normalized to flat event objects.
    async fn fetch_recent_failures(
        &self,
        lookback_hours: i64,
        quality_threshold: f64,
        service_name: Option<&str>,
    ) -> Result<Vec<Value>, ProviderError>;

    /// The most recent rate-limit snapshot, if any request has been made.
    fn last_rate_limit(&self) -> Option<RateLimitSnapshot>;
}

/// Disjunctive failure-quality query over LLM observability spans.
#[must_use]
pub fn build_failure_query(quality_threshold: f64, service_name: Option<&str>) -> String {
    let clauses = [
        format!("llm_obs.quality_score:<{quality_threshold}"),
        "http.status_code:[400 TO *]".to_string(),
        "llm_obs.evaluations.hallucination:true".to_string(),
        "llm_obs.evaluations.prompt_injection:true".to_string(),
        "llm_obs.evaluations.toxicity_score:[0.7 TO *]".to_string(),
        "llm_obs.guardrails.failed:true".to_string(),
    ];
    let query = format!("({})", clauses.join(" OR "));
    match service_name {
        Some(service) => format!("{query} service:{service}"),
        None => query,
    }
}

/// HTTP client for the Datadog spans search API.
pub struct DatadogSpansClient {
    api_key: String,
    app_key: String,
    base_url: String,
    rate_limit: Mutex<Option<RateLimitSnapshot>>,
    client: std::sync::OnceLock<reqwest::Client>,
}

impl DatadogSpansClient {
    #[must_use]
    pub fn from_config(config: &DatadogConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            app_key: config.app_key.clone(),
            base_url: format!("https://api.{}", config.site),
            rate_limit: Mutex::new(None),
            client: std::sync::OnceLock::new(),
        }
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn client(&self) -> &reqwest::Client {
        self.client.get_or_init(reqwest::Client::new)
    }

    fn build_request_body(
        lookback_hours: i64,
        quality_threshold: f64,
        service_name: Option<&str>,
        cursor: Option<&str>,
    ) -> Value {
        let mut page = json!({"limit": SPANS_PAGE_LIMIT});
        if let Some(cursor) = cursor {
            page["cursor"] = json!(cursor);
        }
        json!({
            "data": {
                "type": "search_request",
                "attributes": {
                    "filter": {
                        "from": format!("now-{lookback_hours}h"),
                        "to": "now",
                        "query": build_failure_query(quality_threshold, service_name),
                    },
                    "options": {"timezone": "UTC"},
                    "page": page,
                    "sort": "-timestamp",
                }
            }
        })
    }

    fn capture_rate_limit(&self, headers: &reqwest::header::HeaderMap) {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        let snapshot = RateLimitSnapshot {
            limit: get("x-ratelimit-limit"),
            remaining: get("x-ratelimit-remaining"),
            reset: get("x-ratelimit-reset"),
        };
        *self.rate_limit.lock().expect("rate limit lock") = Some(snapshot);
    }

    async fn fetch_page(&self, body: &Value) -> Result<Value, ProviderError> {
        let url = format!("{}/api/v2/spans/events/search", self.base_url);
        let mut last_err = None;
        for attempt in 0..FETCH_ATTEMPTS {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1)).min(Duration::from_secs(8));
                tokio::time::sleep(delay).await;
            }
            let result = self
                .client()
                .post(&url)
                .header("DD-API-KEY", &self.api_key)
                .header("DD-APPLICATION-KEY", &self.app_key)
                .json(body)
                .send()
                .await;
            match result {
                Ok(response) => {
                    self.capture_rate_limit(response.headers());
                    let status = response.status();
                    if status.is_success() {
                        return response
                            .json()
                            .await
                            .map_err(|e| ProviderError::Transport(e.to_string()));
                    }
                    let message = response.text().await.unwrap_or_default();
                    let err = ProviderError::Api {
                        status: status.as_u16(),
                        message,
                    };
                    // 429 and 5xx retry; client errors surface immediately.
                    if status.as_u16() == 429 || status.is_server_error() {
                        debug!(attempt, status = status.as_u16(), "retrying provider fetch");
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    debug!(attempt, error = %e, "provider transport failure");
                    last_err = Some(ProviderError::Transport(e.to_string()));
                }
            }
        }
        Err(last_err.unwrap_or_else(|| ProviderError::Transport("exhausted retries".into())))
    }
}

/// Flatten a span document into the event shape ingestion consumes.
#[must_use]
pub fn normalize_span(span: &Value) -> Value {
    let attributes = span.get("attributes").cloned().unwrap_or_else(|| json!({}));
    let custom = attributes.get("custom").cloned().unwrap_or_else(|| json!({}));

    let pick = |key: &str| -> Value {
        custom
            .get(key)
            .or_else(|| attributes.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    };

    let trace_id = pick("trace_id")
        .as_str()
        .map(str::to_string)
        .or_else(|| span.get("id").and_then(Value::as_str).map(str::to_string));

    json!({
        "trace_id": trace_id,
        "failure_type": pick("failure_type").as_str().unwrap_or("unknown"),
        "severity": pick("severity").as_str().unwrap_or(""),
        "service_name": attributes.get("service").and_then(Value::as_str).unwrap_or(""),
        "status_code": pick("status_code"),
        "quality_score": pick("quality_score"),
        "user": custom.get("user").cloned().unwrap_or(Value::Null),
        "trace_payload": custom.get("trace_payload").cloned().unwrap_or(custom),
    })
}

#[async_trait]
impl TraceProvider for DatadogSpansClient {
    async fn fetch_recent_failures(
        &self,
        lookback_hours: i64,
        quality_threshold: f64,
        service_name: Option<&str>,
    ) -> Result<Vec<Value>, ProviderError> {
        info!(
            event = "provider_query",
            lookback_hours,
            quality_threshold,
            service_name = service_name.unwrap_or(""),
            "querying provider for failing spans"
        );

        let mut events = Vec::new();
        let mut cursor: Option<String> = None;
        loop {
            let body = Self::build_request_body(
                lookback_hours,
                quality_threshold,
                service_name,
                cursor.as_deref(),
            );
            let page = self.fetch_page(&body).await?;
            let spans = page
                .get("data")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            events.extend(spans.iter().map(normalize_span));

            cursor = page
                .pointer("/meta/page/after")
                .and_then(Value::as_str)
                .map(str::to_string);
            if cursor.is_none() || spans.is_empty() {
                break;
            }
        }

        info!(
            event = "provider_query_success",
            count = events.len(),
            "provider query completed"
        );
        Ok(events)
    }

    fn last_rate_limit(&self) -> Option<RateLimitSnapshot> {
        self.rate_limit.lock().expect("rate limit lock").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_contains_every_failure_clause() {
        let query = build_failure_query(0.5, None);
        assert!(query.contains("llm_obs.quality_score:<0.5"));
        assert!(query.contains("http.status_code:[400 TO *]"));
        assert!(query.contains("llm_obs.evaluations.hallucination:true"));
        assert!(query.contains("llm_obs.evaluations.prompt_injection:true"));
        assert!(query.contains("llm_obs.evaluations.toxicity_score:[0.7 TO *]"));
        assert!(query.contains("llm_obs.guardrails.failed:true"));
        assert!(query.starts_with('('));
    }

    #[test]
    fn query_appends_service_filter() {
        let query = build_failure_query(0.4, Some("chat-api"));
        assert!(query.ends_with("service:chat-api"));
    }

    #[test]
    fn request_body_shape() {
        let body = DatadogSpansClient::build_request_body(24, 0.5, None, None);
        assert_eq!(body["data"]["type"], "search_request");
        assert_eq!(body["data"]["attributes"]["filter"]["from"], "now-24h");
        assert_eq!(body["data"]["attributes"]["page"]["limit"], 100);
        assert_eq!(body["data"]["attributes"]["sort"], "-timestamp");
        assert!(body["data"]["attributes"]["page"].get("cursor").is_none());

        let with_cursor = DatadogSpansClient::build_request_body(24, 0.5, None, Some("abc"));
        assert_eq!(with_cursor["data"]["attributes"]["page"]["cursor"], "abc");
    }

    #[test]
    fn normalize_span_pulls_custom_fields() {
        let span = json!({
            "id": "span-9",
            "attributes": {
                "service": "chat-api",
                "custom": {
                    "trace_id": "t1",
                    "failure_type": "hallucination",
                    "severity": "high",
                    "quality_score": 0.2,
                    "trace_payload": {"prompt": "hi"},
                    "user": {"id": "u1"}
                }
            }
        });
        let event = normalize_span(&span);
        assert_eq!(event["trace_id"], "t1");
        assert_eq!(event["failure_type"], "hallucination");
        assert_eq!(event["service_name"], "chat-api");
        assert_eq!(event["trace_payload"]["prompt"], "hi");
        assert_eq!(event["user"]["id"], "u1");
    }

    #[test]
    fn normalize_span_falls_back_to_span_id() {
        let span = json!({"id": "span-7", "attributes": {"custom": {}}});
        let event = normalize_span(&span);
        assert_eq!(event["trace_id"], "span-7");
        assert_eq!(event["failure_type"], "unknown");
    }
}
