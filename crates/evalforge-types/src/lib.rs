//! Domain model for the EvalForge pipeline.
//!
//! Every document that crosses the document store, plus the run/outcome
//! bookkeeping and the JSON response schemas handed to the LLM for
//! structured output. Stages communicate only through these documents;
//! there are no in-process calls between pipeline stages.

mod capture;
mod drafts;
mod http;
mod ids;
mod pattern;
mod runs;
pub mod schema;
mod suggestion;

pub use capture::{CaptureStatus, FailureCapture, StatusHistoryEntry};
pub use drafts::{
    DraftSource, DraftStatus, EditSource, EvalTestDraft, GeneratorMeta, GuardrailDraft,
    GuardrailType, RunbookDraft, GUARDRAIL_MAPPING_VERSION,
};
pub use http::{GenerateOneResponse, RunOnceRequest};
pub use ids::{new_draft_id, new_run_id, new_suggestion_id};
pub use pattern::{
    Evidence, FailurePattern, FailureType, PatternValidationError, ReproductionContext, Severity,
};
pub use runs::{
    DedupRunSummary, ErrorRecord, ExtractionRunSummary, GeneratorRunSummary, OutcomeStatus,
    PipelineErrorType, RunItemOutcome, TriggeredBy,
};
pub use suggestion::{
    ApprovalMetadata, PatternSummary, SourceTraceRef, Suggestion, SuggestionContent,
    SuggestionStatus, SuggestionType, VersionHistoryEntry,
};
