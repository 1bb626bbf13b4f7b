//! Document-store gateway for EvalForge.
//!
//! Each pipeline stage reads its input collection and writes its output
//! collection; the store is the only channel between stages. The
//! [`DocumentStore`] trait is the seam: production uses the Firestore REST
//! implementation, tests use [`MemoryStore`], and the typed repositories on
//! top are shared by both so every workflow test exercises the real
//! repository code.

mod collections;
mod error;
mod firestore;
mod memory;
mod repos;
mod store;
mod value;

pub use collections::Collections;
pub use error::StoreError;
pub use firestore::FirestoreStore;
pub use memory::MemoryStore;
pub use repos::{
    PatternRepository, RunRepository, SuggestionFilter, SuggestionPage, SuggestionRepository,
    TraceRepository,
};
pub use store::{DocumentStore, Filter, ListQuery, Page, TransformFn};
pub use value::array_union;
