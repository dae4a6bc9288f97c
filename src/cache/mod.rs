//! Registry cache
//!
//! Durable record of everything fetched from the registry. The cache is
//! append-only: packages and versions are added or refreshed, never
//! removed, and every write goes through a temporary file and a rename.
//!
//! # Document layout
//!
//! | Field | Description |
//! |-------|-------------|
//! | `cached_at` | Run timestamp of the last persist |
//! | `package_count`, `version_count`, `metadata_entries` | Summary counters |
//! | `checkpoint` | Resume cursor of an unfinished fetch |
//! | `packages` | Package id to cached entity |

pub mod entity;
pub mod store;

pub use entity::{CacheDocument, CachedPackage, CachedVersion, Checkpoint, FetchPhase};
pub use store::CacheStore;
