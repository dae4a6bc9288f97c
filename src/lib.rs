//! nodemap - node to package index builder
//!
//! Mirrors a paginated node registry into an append-only local cache,
//! merges a community extension map, and writes a ranked mapping from node
//! identifiers to the packages that provide them.

pub mod cache;
pub mod cli;
pub mod community;
pub mod config;
pub mod error;
pub mod fetch;
pub mod fsutil;
pub mod history;
pub mod mapping;
pub mod pipeline;
pub mod registry;
pub mod repo_url;
pub mod ui;
pub mod validate;
pub mod version;

pub use error::{NodemapError, NodemapResult};
