//! Registry fetch engine
//!
//! Bounded-concurrency, rate-limited, retrying fetch that drives the cache
//! to completeness and checkpoints so an interrupted run can resume.

pub mod coordinator;
pub mod retry;

pub use coordinator::{BatchReport, FetchCoordinator, FetchMode, FetchOptions, FetchReport};
pub use retry::{with_retry, FetchFailure, RetryPolicy};
