//! Collection naming. All collections share a configurable prefix so
//! multiple deployments can coexist in one database.

use evalforge_config::FirestoreConfig;

/// Resolves prefixed collection names.
#[derive(Debug, Clone)]
pub struct Collections {
    prefix: String,
}

impl Collections {
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &FirestoreConfig) -> Self {
        Self::new(config.collection_prefix.clone())
    }

    #[must_use]
    pub fn raw_traces(&self) -> String {
        format!("{}raw_traces", self.prefix)
    }

    #[must_use]
    pub fn failure_patterns(&self) -> String {
        format!("{}failure_patterns", self.prefix)
    }

    #[must_use]
    pub fn suggestions(&self) -> String {
        format!("{}suggestions", self.prefix)
    }

    #[must_use]
    pub fn exports(&self) -> String {
        format!("{}exports", self.prefix)
    }

    /// Run-summary collection for a stage, e.g. `extraction` →
    /// `{prefix}extraction_runs`, `eval_test` → `{prefix}eval_test_runs`.
    #[must_use]
    pub fn runs_for(&self, stage: &str) -> String {
        format!("{}{}_runs", self.prefix, stage)
    }

    /// Error collection for a stage.
    #[must_use]
    pub fn errors_for(&self, stage: &str) -> String {
        format!("{}{}_errors", self.prefix, stage)
    }
}
