//! Persisted cache document

use crate::registry::{NodeDefinition, PackageMetadata, VersionMetadata};
use crate::version;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Fetch phase a checkpoint belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchPhase {
    Listing,
    Versions,
    Definitions,
}

impl fmt::Display for FetchPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Listing => write!(f, "listing"),
            Self::Versions => write!(f, "versions"),
            Self::Definitions => write!(f, "definitions"),
        }
    }
}

/// Resume cursor for an interrupted fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub phase: FetchPhase,

    /// Key of the last item applied, in the phase's job order
    pub last_item: Option<String>,

    pub processed: usize,
    pub failed: usize,
}

impl Checkpoint {
    pub fn start(phase: FetchPhase) -> Self {
        Self {
            phase,
            last_item: None,
            processed: 0,
            failed: 0,
        }
    }
}

/// One cached version of a package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedVersion {
    pub metadata: VersionMetadata,

    pub first_seen: DateTime<Utc>,

    /// `None` until definitions have been fetched; `Some(vec![])` when the
    /// version declares no nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_definitions: Option<Vec<NodeDefinition>>,
}

/// One cached registry package
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPackage {
    pub metadata: PackageMetadata,

    #[serde(default)]
    pub versions: BTreeMap<String, CachedVersion>,

    pub first_seen: DateTime<Utc>,

    /// Last successful version re-fetch; `None` if never version-checked
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_checked: Option<DateTime<Utc>>,
}

impl CachedPackage {
    pub fn new(metadata: PackageMetadata, now: DateTime<Utc>) -> Self {
        Self {
            metadata,
            versions: BTreeMap::new(),
            first_seen: now,
            last_checked: None,
        }
    }

    /// Non-deprecated version strings, newest first
    pub fn current_versions(&self) -> Vec<String> {
        let mut current: Vec<String> = self
            .versions
            .iter()
            .filter(|(_, v)| !v.metadata.deprecated)
            .map(|(k, _)| k.clone())
            .collect();
        version::sort_newest_first(&mut current);
        current
    }
}

/// Top-level cache file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(default)]
    pub cached_at: Option<DateTime<Utc>>,

    #[serde(default)]
    pub package_count: usize,

    #[serde(default)]
    pub version_count: usize,

    /// Versions whose node definitions have been fetched
    #[serde(default)]
    pub metadata_entries: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkpoint: Option<Checkpoint>,

    #[serde(default)]
    pub packages: BTreeMap<String, CachedPackage>,
}

impl CacheDocument {
    /// Recompute the summary counters from the package table
    pub fn refresh_counts(&mut self) {
        self.package_count = self.packages.len();
        self.version_count = self.packages.values().map(|p| p.versions.len()).sum();
        self.metadata_entries = self
            .packages
            .values()
            .flat_map(|p| p.versions.values())
            .filter(|v| v.node_definitions.is_some())
            .count();
    }
}
