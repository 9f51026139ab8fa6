//! # Analysis Session
//!
//! Batch planning and checklist scheduling for incremental codebase analysis.
//!
//! ## Pipeline
//!
//! ```text
//! FileRecords (size-sorted)
//!     │
//!     ├──> Batcher (token budget, strategy)
//!     │      └─> Batches
//!     │
//!     └──> Checklist (file → goal / batch dependency layers)
//!            └─> Session ──> SessionStore (durable save / reload)
//! ```
//!
//! The external worker loops on [`Session::next_ready`], does the analysis
//! itself, and reports back through [`Session::update_status`]. The engine
//! never retries on its own; `retry_count` is bookkeeping for the caller.

mod batch;
mod checklist;
mod error;
mod session;
mod status;
mod store;

pub use batch::{Batch, BatchStrategy, Batcher, SizeClass, DEFAULT_TOKEN_BUDGET};
pub use checklist::{
    build_checklist, BlockedItem, ChecklistItem, FailedItem, ItemKind, ItemMetadata, KindProgress,
    ProgressSummary,
};
pub use error::{Result, SessionError};
pub use session::Session;
pub use status::TaskStatus;
pub use store::SessionStore;
