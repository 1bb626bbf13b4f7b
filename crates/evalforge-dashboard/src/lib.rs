//! Dashboard aggregation: counts suggestion states and publishes gauge
//! series to the observability provider.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};

use evalforge_config::DatadogConfig;
use evalforge_store::{Collections, DocumentStore, StoreError, SuggestionRepository, TraceRepository};
use evalforge_types::{SuggestionStatus, SuggestionType};

/// One gauge sample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricPoint {
    pub metric: String,
    pub value: f64,
    pub tags: Vec<String>,
}

impl MetricPoint {
    fn new(metric: &str, value: f64) -> Self {
        Self {
            metric: metric.to_string(),
            value,
            tags: Vec::new(),
        }
    }

    fn with_tag(mut self, tag: String) -> Self {
        self.tags.push(tag);
        self
    }
}

/// Metric publication failures.
#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("metric publication failed: {0}")]
    Publish(String),
}

/// Counts suggestion states into gauge points.
pub struct DashboardAggregator {
    suggestions: SuggestionRepository,
    traces: TraceRepository,
}

impl DashboardAggregator {
    pub fn new(store: Arc<dyn DocumentStore>, collections: Collections) -> Self {
        Self {
            suggestions: SuggestionRepository::new(store.clone(), collections.clone()),
            traces: TraceRepository::new(store, collections),
        }
    }

    pub fn suggestions(&self) -> &SuggestionRepository {
        &self.suggestions
    }

    /// Collect the full gauge set.
    pub async fn collect(&self) -> Result<Vec<MetricPoint>, DashboardError> {
        let mut points = Vec::new();

        let pending = self.suggestions.count_by_status(SuggestionStatus::Pending).await?;
        let approved = self.suggestions.count_by_status(SuggestionStatus::Approved).await?;
        let rejected = self.suggestions.count_by_status(SuggestionStatus::Rejected).await?;
        points.push(MetricPoint::new("evalforge.suggestions.pending", pending as f64));
        points.push(MetricPoint::new("evalforge.suggestions.approved", approved as f64));
        points.push(MetricPoint::new("evalforge.suggestions.rejected", rejected as f64));
        points.push(MetricPoint::new(
            "evalforge.suggestions.total",
            (pending + approved + rejected) as f64,
        ));

        for suggestion_type in [
            SuggestionType::Eval,
            SuggestionType::Guardrail,
            SuggestionType::Runbook,
        ] {
            let count = self.suggestions.count_by_type(suggestion_type).await?;
            points.push(
                MetricPoint::new("evalforge.suggestions.by_type", count as f64)
                    .with_tag(format!("type:{suggestion_type}")),
            );
        }

        for severity in ["low", "medium", "high", "critical"] {
            let count = self.suggestions.count_by_severity(severity).await?;
            points.push(
                MetricPoint::new("evalforge.suggestions.by_severity", count as f64)
                    .with_tag(format!("severity:{severity}")),
            );
        }

        // Coverage improvement: approved eval tests over total captured
        // failures, as a percentage.
        let approved_evals = self.suggestions.count_approved_evals().await?;
        let total_failures = self.traces.total().await?;
        let coverage = if total_failures > 0 {
            approved_evals as f64 / total_failures as f64 * 100.0
        } else {
            0.0
        };
        points.push(MetricPoint::new("evalforge.coverage.improvement", coverage));

        debug!(point_count = points.len(), "collected dashboard metrics");
        Ok(points)
    }
}

/// Publishes gauge series to the Datadog metrics API.
pub struct DatadogMetricsPublisher {
    api_key: String,
    base_url: String,
    client: std::sync::OnceLock<reqwest::Client>,
}

impl DatadogMetricsPublisher {
    #[must_use]
    pub fn from_config(config: &DatadogConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: format!("https://api.{}", config.site),
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

    /// Build the v2 series payload for a set of points.
    #[must_use]
    pub fn build_series(points: &[MetricPoint]) -> serde_json::Value {
        let timestamp = Utc::now().timestamp();
        let series: Vec<serde_json::Value> = points
            .iter()
            .map(|point| {
                serde_json::json!({
                    "metric": &point.metric,
                    // 3 = gauge in the Datadog v2 metric intake.
                    "type": 3,
                    "points": [{"timestamp": timestamp, "value": point.value}],
                    "tags": &point.tags,
                })
            })
            .collect();
        serde_json::json!({"series": series})
    }

    pub async fn publish(&self, points: &[MetricPoint]) -> Result<(), DashboardError> {
        if points.is_empty() {
            return Ok(());
        }
        let url = format!("{}/api/v2/series", self.base_url);
        let body = Self::build_series(points);
        let response = self
            .client()
            .post(url)
            .header("DD-API-KEY", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| DashboardError::Publish(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(DashboardError::Publish(format!("HTTP {status}: {message}")));
        }
        info!(
            event = "metrics_published",
            point_count = points.len(),
            "published dashboard metrics"
        );
        Ok(())
    }
}
