//! Registry fetch interface
//!
//! Provides a trait for the four registry reads the fetch coordinator needs,
//! so the coordinator can be driven by the HTTP client in production and by
//! an in-memory fake in tests.

#[cfg(test)]
pub mod fake;
pub mod http;
pub mod types;

pub use http::HttpRegistry;
pub use types::{
    InstallInfo, LatestVersion, NodeDefinition, NodeDefinitionPage, PackageMetadata, PackagePage,
    VersionMetadata,
};

use async_trait::async_trait;
use thiserror::Error;

/// Failure of a single registry request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("rate limited (HTTP 429)")]
    RateLimited,

    #[error("server error (HTTP {0})")]
    Server(u16),

    #[error("client error (HTTP {0})")]
    Client(u16),

    #[error("not found (HTTP 404)")]
    NotFound,

    #[error("invalid response body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Transport failures, throttling and server faults are worth another try
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited | Self::Server(_))
    }

    /// Classify an HTTP status code
    pub fn from_status(status: u16) -> Self {
        match status {
            404 => Self::NotFound,
            429 => Self::RateLimited,
            500..=599 => Self::Server(status),
            _ => Self::Client(status),
        }
    }
}

/// Abstract registry interface
///
/// Implementations must be safe to call from several worker tasks at once.
#[async_trait]
pub trait RegistrySource: Send + Sync {
    /// One page of package summaries (1-based page number)
    async fn list_packages(&self, page: u32, limit: u32) -> Result<PackagePage, FetchError>;

    /// Every published version of a package, deprecated ones included
    async fn package_versions(&self, package_id: &str) -> Result<Vec<VersionMetadata>, FetchError>;

    /// Install details for one version
    async fn install_info(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<InstallInfo, FetchError>;

    /// All node definitions a version declares, across every result page
    async fn node_definitions(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Vec<NodeDefinition>, FetchError>;

    /// Human-readable name for logs
    fn source_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(FetchError::from_status(404), FetchError::NotFound);
        assert_eq!(FetchError::from_status(429), FetchError::RateLimited);
        assert_eq!(FetchError::from_status(503), FetchError::Server(503));
        assert_eq!(FetchError::from_status(403), FetchError::Client(403));
    }

    #[test]
    fn retryable_classes() {
        assert!(FetchError::Network("reset".into()).is_retryable());
        assert!(FetchError::RateLimited.is_retryable());
        assert!(FetchError::Server(502).is_retryable());
        assert!(!FetchError::Client(400).is_retryable());
        assert!(!FetchError::NotFound.is_retryable());
        assert!(!FetchError::Decode("eof".into()).is_retryable());
    }
}
