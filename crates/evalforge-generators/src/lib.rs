//! Artifact generators: for each pending suggestion of a matching type,
//! select the canonical source pattern, prompt the LLM under budget and
//! timeout, validate, and embed the typed draft on the suggestion.
//!
//! The three generators share one harness; only the prompt, the response
//! schema, and the draft composition differ.

mod cancel;
mod eval;
mod guardrail;
mod harness;
mod http;
mod placeholder;
mod runbook;

pub use cancel::CancelFlag;
pub use eval::EvalTestGenerator;
pub use guardrail::GuardrailGenerator;
pub use harness::{
    ArtifactGenerator, DraftContext, GeneratorHealth, GeneratorService, ItemOutcomeView,
};
pub use http::router;
pub use placeholder::contains_placeholder;
pub use runbook::RunbookGenerator;
