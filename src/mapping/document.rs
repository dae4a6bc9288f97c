//! Mapping document model
//!
//! The document is derived data: it is rebuilt from the cache and the
//! community snapshot on every run and never patched in place.

use crate::error::{NodemapError, NodemapResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;

/// Where a record or entry came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provenance {
    /// The registry API
    #[default]
    Registry,
    /// The community extension map
    Community,
}

impl Provenance {
    pub fn is_registry(&self) -> bool {
        matches!(self, Self::Registry)
    }
}

/// One provider of a node key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingEntry {
    pub package_id: String,

    /// Non-deprecated versions declaring the node, newest first; always
    /// empty for community entries
    #[serde(default)]
    pub versions: Vec<String>,

    /// 1-based position in the node key's list; 0 until ranked
    #[serde(default)]
    pub rank: u32,

    #[serde(
        default,
        rename = "source",
        skip_serializing_if = "Provenance::is_registry"
    )]
    pub provenance: Provenance,
}

impl MappingEntry {
    pub fn registry(package_id: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            versions: vec![version.into()],
            rank: 0,
            provenance: Provenance::Registry,
        }
    }

    pub fn community(package_id: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            versions: Vec::new(),
            rank: 0,
            provenance: Provenance::Community,
        }
    }
}

/// Version details kept in a package record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionRecord {
    pub version: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,

    /// RFC 3339 release timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_date: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_os: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_accelerators: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_comfyui_version: Option<String>,
}

/// A package providing one or more node keys
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub display_name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Canonical repository identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<String>,

    #[serde(default)]
    pub downloads: u64,

    #[serde(default)]
    pub github_stars: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub license: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    /// Every known version, deprecated ones included
    #[serde(default)]
    pub versions: BTreeMap<String, VersionRecord>,

    #[serde(
        default,
        rename = "source",
        skip_serializing_if = "Provenance::is_registry"
    )]
    pub provenance: Provenance,

    /// Synthesized from community data alone
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub synthetic: bool,
}

/// Augmentation counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AugmentStats {
    /// Node names listed across all community records
    pub community_nodes: usize,
    pub entries_added: usize,
    /// Package and node key pairs that already had an entry
    pub entries_skipped_existing: usize,
    pub packages_augmented: usize,
    pub synthetic_packages: usize,
    /// Records whose URL could not be turned into an identity
    pub unprocessable: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingStats {
    pub packages: usize,
    pub signatures: usize,
    pub total_mappings: usize,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub augmentation: Option<AugmentStats>,
}

/// Node key to ranked providers, plus the package table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappingDocument {
    /// Run date, `YYYY.MM.DD`
    pub version: String,
    pub generated_at: DateTime<Utc>,
    pub stats: MappingStats,
    pub mappings: BTreeMap<String, Vec<MappingEntry>>,
    pub packages: BTreeMap<String, PackageRecord>,
}

impl MappingDocument {
    pub fn new(
        now: DateTime<Utc>,
        mappings: BTreeMap<String, Vec<MappingEntry>>,
        packages: BTreeMap<String, PackageRecord>,
        augmentation: Option<AugmentStats>,
    ) -> Self {
        let stats = MappingStats {
            packages: packages.len(),
            signatures: mappings.len(),
            total_mappings: mappings.values().map(Vec::len).sum(),
            augmentation,
        };
        Self {
            version: now.format("%Y.%m.%d").to_string(),
            generated_at: now,
            stats,
            mappings,
            packages,
        }
    }

    /// Read a mapping document from disk
    pub async fn load(path: &Path) -> NodemapResult<Self> {
        let content = match fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NodemapError::MappingsNotFound(path.to_path_buf()));
            }
            Err(e) => {
                return Err(NodemapError::io(
                    format!("reading mappings from {}", path.display()),
                    e,
                ))
            }
        };

        serde_json::from_str(&content).map_err(|e| NodemapError::MappingsInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}
