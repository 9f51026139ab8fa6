//! # Analysis Context
//!
//! Per-session accumulator for entities discovered across many processing
//! steps: API endpoints, functions, classes, imports and database
//! references, plus the relationships between the files that carry them.
//!
//! Deduplication is fingerprint-based, so the worker can re-report findings
//! freely; only genuinely new ones are stored. The [`ContextRegistry`] owns
//! one store per session and persists each as a single overwritten record.

mod entity;
mod error;
mod graph;
mod registry;
mod store;

pub use entity::{
    dedup_fingerprint, ApiFinding, ClassFinding, DbConnectionFinding, DedupKey, Discovered,
    Finding, FunctionFinding, ImportFinding,
};
pub use error::{ContextError, Result};
pub use graph::find_cycles;
pub use registry::ContextRegistry;
pub use store::{ContextSnapshot, ContextStore, ContextSummary, CrossReference, FileContext};
