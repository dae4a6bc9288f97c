//! Error types for nodemap
//!
//! All modules use `NodemapResult<T>` as their return type. Registry fetch
//! failures have their own type ([`crate::registry::FetchError`]) because the
//! fetch coordinator absorbs them per item instead of aborting the run.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for nodemap operations
pub type NodemapResult<T> = Result<T, NodemapError>;

/// All errors that can occur in nodemap
#[derive(Error, Debug)]
pub enum NodemapError {
    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Cache errors
    #[error("Cache file {path} is corrupt: {reason}")]
    CacheCorrupt { path: PathBuf, reason: String },

    #[error("Cache file not found: {0}")]
    CacheNotFound(PathBuf),

    // Persistence errors
    #[error("Failed to persist {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // Input document errors
    #[error("Mappings file not found: {0}")]
    MappingsNotFound(PathBuf),

    #[error("Invalid mappings file {path}: {reason}")]
    MappingsInvalid { path: PathBuf, reason: String },

    #[error("Invalid community data at {path}: {source}")]
    CommunityInvalid {
        path: PathBuf,
        #[source]
        source: crate::community::SnapshotError,
    },

    #[error("Community data fetch failed: {0}")]
    CommunityFetch(String),

    // Validation errors
    #[error("Validation failed with {0} error(s)")]
    ValidationFailed(usize),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    User(String),
}

impl NodemapError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a persistence error for a target file
    pub fn persist(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Persist {
            path: path.into(),
            source,
        }
    }

    /// Check if the caller can continue from a clean state instead of aborting
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::CacheCorrupt { .. } | Self::CommunityFetch(_))
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::ConfigInvalid { .. } => Some("Run: nodemap config init --force"),
            Self::CacheNotFound(_) => Some("Run: nodemap fetch"),
            Self::MappingsNotFound(_) | Self::MappingsInvalid { .. } => {
                Some("Run: nodemap build")
            }
            Self::CommunityInvalid { .. } => Some("Run: nodemap community --force"),
            Self::Persist { .. } => {
                Some("The previous file was left intact; check free space and permissions")
            }
            _ => None,
        }
    }
}
