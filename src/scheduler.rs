//! Scheduler glue: periodic invocation of each stage's batch endpoint.
//!
//! The stages have no internal timers; a deployment either uses an
//! external scheduler hitting the run-once endpoints or runs this loop.

use std::time::Duration;

use anyhow::Result;
use serde_json::json;
use tracing::{info, warn};

/// Fire `POST {target}` with a scheduled trigger body every `interval`.
///
/// One tick failure is logged and does not stop the loop; each stage's
/// batch tolerates per-item failure the same way.
pub async fn run_schedule(targets: Vec<String>, interval: Duration) -> Result<()> {
    let client = reqwest::Client::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    info!(
        target_count = targets.len(),
        interval_secs = interval.as_secs(),
        "scheduler started"
    );

    loop {
        ticker.tick().await;
        for target in &targets {
            let result = client
                .post(target)
                .json(&json!({"triggeredBy": "scheduled"}))
                .send()
                .await;
            match result {
                Ok(response) if response.status().is_success() => {
                    info!(target = %target, status = response.status().as_u16(), "scheduled trigger fired");
                }
                Ok(response) => {
                    warn!(target = %target, status = response.status().as_u16(), "scheduled trigger rejected");
                }
                Err(err) => {
                    warn!(target = %target, error = %err, "scheduled trigger failed");
                }
            }
        }
    }
}
