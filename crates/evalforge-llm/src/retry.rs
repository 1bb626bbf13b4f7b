//! Exponential-backoff retry policy shared by the LLM and embedding clients.

use std::time::Duration;

/// Retry schedule: `attempts` tries total, delays doubling from `base`
/// and capped at `max_delay`. The default matches the pipeline contract:
/// 3 attempts, 1s → 2s → 4s, capped at 10s.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Delay before retry number `retry_index` (0-based: the delay after
    /// the first failed attempt is index 0).
    #[must_use]
    pub fn delay_for(&self, retry_index: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry_index);
        self.base.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, exhausts the attempt budget, or fails
    /// with a non-retryable error (as judged by `retryable`).
    pub async fn run<T, E, F, Fut>(
        &self,
        mut op: F,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
    {
        let mut last_err = None;
        for attempt in 0..self.attempts {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if !retryable(&err) || attempt + 1 == self.attempts {
                        return Err(err);
                    }
                    let delay = self.delay_for(attempt);
                    tracing::debug!(
                        attempt = attempt + 1,
                        delay_ms = delay.as_millis() as u64,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                    last_err = Some(err);
                }
            }
        }
        // Unreachable with attempts >= 1; kept for the attempts == 0 case.
        Err(last_err.expect("retry policy requires at least one attempt"))
    }
}
