//! Environment-driven configuration for EvalForge services.
//!
//! Every tunable is an environment variable with a typed default. Required
//! variables fail at first read with a descriptive [`ConfigError`], so a
//! misconfigured service dies at startup instead of halfway through a batch.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Configuration loading and validation errors.
///
/// All variants are fatal at startup; services do not attempt to run with a
/// partial configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingRequired(String),

    #[error("Invalid value for {key}: {value} ({reason})")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Source of environment values.
///
/// Production uses [`Env::process`]; tests inject a map so they never touch
/// process-global state.
#[derive(Clone)]
pub struct Env {
    overrides: Option<HashMap<String, String>>,
}

impl Env {
    /// Read from the real process environment.
    #[must_use]
    pub fn process() -> Self {
        Self { overrides: None }
    }

    /// Read from a fixed map (test seam).
    #[must_use]
    pub fn from_map(map: HashMap<String, String>) -> Self {
        Self {
            overrides: Some(map),
        }
    }

    fn get(&self, key: &str) -> Option<String> {
        match &self.overrides {
            Some(map) => map.get(key).cloned().filter(|v| !v.is_empty()),
            None => std::env::var(key).ok().filter(|v| !v.is_empty()),
        }
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.get(key)
            .ok_or_else(|| ConfigError::MissingRequired(key.to_string()))
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn optional(&self, key: &str) -> Option<String> {
        self.get(key)
    }

    fn int(&self, key: &str, default: i64) -> Result<i64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: "expected an integer".to_string(),
            }),
        }
    }

    fn float(&self, key: &str, default: f64) -> Result<f64, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: raw,
                reason: "expected a number".to_string(),
            }),
        }
    }
}

/// Observability-provider (Datadog) credentials and ingestion tuning.
#[derive(Debug, Clone, Serialize)]
pub struct DatadogConfig {
    #[serde(skip_serializing)]
    pub api_key: String,
    #[serde(skip_serializing)]
    pub app_key: String,
    pub site: String,
    pub trace_lookback_hours: i64,
    pub quality_threshold: f64,
}

impl DatadogConfig {
    pub fn load(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env.required("DATADOG_API_KEY")?,
            app_key: env.required("DATADOG_APP_KEY")?,
            site: env.string("DATADOG_SITE", "datadoghq.com"),
            trace_lookback_hours: env.int("TRACE_LOOKBACK_HOURS", 24)?,
            quality_threshold: env.float("QUALITY_THRESHOLD", 0.5)?,
        })
    }
}

/// Document-store settings shared by every service.
#[derive(Debug, Clone, Serialize)]
pub struct FirestoreConfig {
    pub collection_prefix: String,
    pub project_id: Option<String>,
    pub database_id: String,
}

impl FirestoreConfig {
    pub fn load(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            collection_prefix: env.string("FIRESTORE_COLLECTION_PREFIX", "evalforge_"),
            project_id: env.optional("GOOGLE_CLOUD_PROJECT"),
            database_id: env.string("FIRESTORE_DATABASE_ID", "(default)"),
        })
    }
}

/// LLM (Gemini) generation settings.
#[derive(Debug, Clone, Serialize)]
pub struct GeminiConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub location: String,
    pub temperature: f64,
    pub max_output_tokens: i64,
}

impl GeminiConfig {
    pub fn load(env: &Env) -> Result<Self, ConfigError> {
        let temperature = env.float("GEMINI_TEMPERATURE", 0.2)?;
        if !(0.0..=2.0).contains(&temperature) {
            return Err(ConfigError::InvalidValue {
                key: "GEMINI_TEMPERATURE".to_string(),
                value: temperature.to_string(),
                reason: "must be between 0.0 and 2.0".to_string(),
            });
        }
        Ok(Self {
            api_key: env.optional("GEMINI_API_KEY"),
            model: env.string("GEMINI_MODEL", "gemini-2.0-flash"),
            location: env.string("GEMINI_LOCATION", "us-central1"),
            temperature,
            max_output_tokens: env.int("GEMINI_MAX_OUTPUT_TOKENS", 8192)?,
        })
    }
}

/// Text-embedding model settings for the deduplication service.
#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingConfig {
    pub model: String,
    pub location: String,
    pub output_dimensionality: usize,
}

impl EmbeddingConfig {
    pub fn load(env: &Env) -> Result<Self, ConfigError> {
        let dim = env.int("EMBEDDING_DIM", 768)?;
        if dim <= 0 {
            return Err(ConfigError::InvalidValue {
                key: "EMBEDDING_DIM".to_string(),
                value: dim.to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(Self {
            model: env.string("EMBEDDING_MODEL", "text-embedding-004"),
            location: env.string("EMBEDDING_LOCATION", "us-central1"),
            output_dimensionality: dim as usize,
        })
    }
}

/// Approval-workflow settings: write auth and the notification sink.
#[derive(Debug, Clone, Serialize)]
pub struct ApprovalConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    #[serde(skip_serializing)]
    pub slack_webhook_url: Option<String>,
}

impl ApprovalConfig {
    pub fn load(env: &Env) -> Result<Self, ConfigError> {
        Ok(Self {
            api_key: env.optional("APPROVAL_API_KEY"),
            slack_webhook_url: env.optional("SLACK_WEBHOOK_URL"),
        })
    }
}

/// Batch tuning shared by the extraction service and the three generators.
#[derive(Debug, Clone, Serialize)]
pub struct BatchConfig {
    pub batch_size: usize,
    pub per_item_timeout: Duration,
    pub per_item_cost_budget_usd: f64,
    pub run_cost_budget_usd: Option<f64>,
    pub worker_count: usize,
}

impl BatchConfig {
    /// Load a batch config. `prefix` selects the variable family, e.g.
    /// `EXTRACTION` reads `EXTRACTION_BATCH_SIZE` and friends.
    pub fn load(env: &Env, prefix: &str, default_timeout_sec: u64) -> Result<Self, ConfigError> {
        let batch_size = env.int(&format!("{prefix}_BATCH_SIZE"), 20)?;
        if !(1..=200).contains(&batch_size) {
            return Err(ConfigError::InvalidValue {
                key: format!("{prefix}_BATCH_SIZE"),
                value: batch_size.to_string(),
                reason: "must be between 1 and 200".to_string(),
            });
        }
        let timeout_sec = env.int(
            &format!("{prefix}_PER_ITEM_TIMEOUT_SEC"),
            default_timeout_sec as i64,
        )?;
        let run_budget = match env.optional(&format!("{prefix}_RUN_COST_BUDGET_USD")) {
            Some(raw) => Some(raw.parse().map_err(|_| ConfigError::InvalidValue {
                key: format!("{prefix}_RUN_COST_BUDGET_USD"),
                value: raw,
                reason: "expected a number".to_string(),
            })?),
            None => None,
        };
        Ok(Self {
            batch_size: batch_size as usize,
            per_item_timeout: Duration::from_secs(timeout_sec.max(1) as u64),
            per_item_cost_budget_usd: env.float(&format!("{prefix}_ITEM_COST_BUDGET_USD"), 0.05)?,
            run_cost_budget_usd: run_budget,
            worker_count: env.int(&format!("{prefix}_WORKER_COUNT"), 4)?.clamp(1, 4) as usize,
        })
    }
}

/// PII handling settings.
#[derive(Debug, Clone, Serialize)]
pub struct PiiConfig {
    #[serde(skip_serializing)]
    pub salt: String,
}

impl PiiConfig {
    pub fn load(env: &Env) -> Self {
        Self {
            salt: env.string("PII_SALT", "evalforge"),
        }
    }
}

/// Everything a running EvalForge process needs.
///
/// Services load only the sections they use; the server binary loads the
/// whole thing once at startup so misconfiguration is fatal before any
/// listener is bound.
#[derive(Debug, Clone, Serialize)]
pub struct Settings {
    pub firestore: FirestoreConfig,
    pub gemini: GeminiConfig,
    pub embedding: EmbeddingConfig,
    pub approval: ApprovalConfig,
    pub pii: PiiConfig,
    pub extraction: BatchConfig,
    pub dedup_batch_size: usize,
    pub eval_generator: BatchConfig,
    pub guardrail_generator: BatchConfig,
    pub runbook_generator: BatchConfig,
    pub similarity_threshold: f64,
}

impl Settings {
    pub fn load(env: &Env) -> Result<Self, ConfigError> {
        let threshold = env.float("SIMILARITY_THRESHOLD", 0.85)?;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::InvalidValue {
                key: "SIMILARITY_THRESHOLD".to_string(),
                value: threshold.to_string(),
                reason: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(Self {
            firestore: FirestoreConfig::load(env)?,
            gemini: GeminiConfig::load(env)?,
            embedding: EmbeddingConfig::load(env)?,
            approval: ApprovalConfig::load(env)?,
            pii: PiiConfig::load(env),
            extraction: BatchConfig::load(env, "EXTRACTION", 60)?,
            dedup_batch_size: env.int("DEDUP_BATCH_SIZE", 20)?.clamp(1, 200) as usize,
            eval_generator: BatchConfig::load(env, "EVAL", 45)?,
            guardrail_generator: BatchConfig::load(env, "GUARDRAIL", 45)?,
            runbook_generator: BatchConfig::load(env, "RUNBOOK", 45)?,
            similarity_threshold: threshold,
        })
    }

    /// Load from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::load(&Env::process())
    }
}
