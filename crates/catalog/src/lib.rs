//! # Analysis Catalog
//!
//! Repository file discovery for incremental codebase analysis.
//!
//! ## Pipeline
//!
//! ```text
//! Repository root
//!     │
//!     ├──> FileCatalog (fixed ignore tables, extension filter)
//!     │      └─> FileRecord (size, language, estimated tokens)
//!     │
//!     └──> ScanStats
//!            └─> Processing hint (single pass vs. batched)
//! ```
//!
//! Records come out sorted by size descending; the batcher depends on that
//! ordering to pack token-bounded batches.

mod error;
mod language;
mod scanner;
mod stats;

pub use error::{CatalogError, Result};
pub use language::{Language, CONFIG_EXTENSIONS, KNOWN_EXTENSIONS};
pub use scanner::{
    estimate_tokens, FileCatalog, FileRecord, ScanOptions, ScanOutcome, SkipReason, SkippedFile,
    DEFAULT_MAX_FILE_SIZE,
};
pub use stats::{ProcessingHint, ProcessingMode, ScanStats};
