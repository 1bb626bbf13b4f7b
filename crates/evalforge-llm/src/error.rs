//! Error classification for LLM calls.

use thiserror::Error;

/// Errors surfaced by [`crate::LlmBackend`] implementations.
///
/// The split matters to callers: `RateLimited` items are not charged
/// against generation cost budgets, `Parse` is never retried, and
/// `Misconfiguration` is fatal at startup.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Network-level failure or transient upstream error (5xx) that
    /// survived the retry policy.
    #[error("LLM transport error: {0}")]
    Transport(String),

    /// Rate limit (429) that survived the retry policy.
    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    /// Non-transient provider rejection.
    #[error("LLM API error (status {status}): {message}")]
    Api { status: u16, message: String },

    /// The model produced output that is not valid JSON. Not retried:
    /// structured-output mode makes this deterministic enough that a
    /// retry would spend budget on the same failure.
    #[error("LLM response parse error: {0}")]
    Parse(String),

    /// The call exceeded its wall-clock budget.
    #[error("LLM call timed out after {0} seconds")]
    Timeout(u64),

    /// Client cannot be used as configured (missing key, bad model).
    #[error("LLM misconfiguration: {0}")]
    Misconfiguration(String),
}

impl LlmError {
    /// Whether another attempt may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::RateLimited(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryability_matches_classification() {
        assert!(LlmError::Transport("502".into()).is_retryable());
        assert!(LlmError::RateLimited("quota".into()).is_retryable());
        assert!(!LlmError::Parse("bad json".into()).is_retryable());
        assert!(!LlmError::Timeout(45).is_retryable());
        assert!(!LlmError::Api {
            status: 400,
            message: "bad request".into()
        }
        .is_retryable());
    }
}
