//! # Analysis Cache
//!
//! Tiered result cache consulted by the analysis worker before and after
//! processing a file, so expensive per-file analysis is never recomputed
//! while the file is unchanged.
//!
//! ```text
//! get(path, kind) ──> memory tier (budget-bound, volatile)
//!                       └─miss─> disk tier (blobs + metadata index, durable)
//!                                  └─miss─> caller recomputes, set(...)
//! ```
//!
//! Entries are invalidated by file mtime changes, TTL expiry, and explicit
//! clears; every miss is silent and at worst forces a recomputation.

mod entry;
mod error;
mod store;

pub use entry::{fingerprint, CacheEntryMeta, CacheStats, StorageTier};
pub use error::{CacheError, Result};
pub use store::{
    CacheConfig, CacheStore, DEFAULT_MEMORY_BUDGET_BYTES, DEFAULT_MEMORY_ITEM_MAX_BYTES,
};
