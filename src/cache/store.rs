//! Append-only registry cache
//!
//! The store owns the in-memory [`CacheDocument`] and its file. Packages and
//! versions are only ever added or refreshed; nothing here removes a key.

use super::entity::{CacheDocument, CachedPackage, CachedVersion, Checkpoint};
use crate::error::{NodemapError, NodemapResult};
use crate::fsutil;
use crate::registry::{NodeDefinition, PackageMetadata, VersionMetadata};
use chrono::{DateTime, Duration, Utc};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

/// Durable cache of registry entities
#[derive(Debug)]
pub struct CacheStore {
    path: PathBuf,
    doc: CacheDocument,
}

impl CacheStore {
    /// Empty cache bound to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            doc: CacheDocument::default(),
        }
    }

    /// Load the cache file
    ///
    /// A missing file is [`NodemapError::CacheNotFound`]; an unparsable one is
    /// [`NodemapError::CacheCorrupt`].
    pub async fn load(path: impl Into<PathBuf>) -> NodemapResult<Self> {
        let path = path.into();
        let content = match fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(NodemapError::CacheNotFound(path));
            }
            Err(e) => {
                return Err(NodemapError::io(
                    format!("reading cache from {}", path.display()),
                    e,
                ));
            }
        };

        let doc: CacheDocument =
            serde_json::from_str(&content).map_err(|e| NodemapError::CacheCorrupt {
                path: path.clone(),
                reason: e.to_string(),
            })?;

        debug!(
            path = %path.display(),
            packages = doc.packages.len(),
            "Loaded registry cache"
        );
        Ok(Self { path, doc })
    }

    /// Load the cache, starting empty when the file is absent or corrupt
    pub async fn load_or_cold_start(path: impl Into<PathBuf>) -> NodemapResult<Self> {
        let path = path.into();
        match Self::load(&path).await {
            Ok(store) => Ok(store),
            Err(NodemapError::CacheNotFound(_)) => {
                info!("No cache at {}, starting empty", path.display());
                Ok(Self::new(path))
            }
            Err(e) if e.is_recoverable() => {
                warn!("{}; starting from an empty cache and re-fetching everything", e);
                Ok(Self::new(path))
            }
            Err(e) => Err(e),
        }
    }

    /// Write the full cache atomically
    pub async fn persist(&mut self, now: DateTime<Utc>) -> NodemapResult<()> {
        self.doc.cached_at = Some(now);
        self.doc.refresh_counts();

        let content = serde_json::to_string_pretty(&self.doc)?;
        fsutil::write_atomic(&self.path, content.as_bytes()).await?;

        debug!(
            packages = self.doc.package_count,
            versions = self.doc.version_count,
            "Cache persisted"
        );
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn document(&self) -> &CacheDocument {
        &self.doc
    }

    pub fn packages(&self) -> &BTreeMap<String, CachedPackage> {
        &self.doc.packages
    }

    pub fn len(&self) -> usize {
        self.doc.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc.packages.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&CachedPackage> {
        self.doc.packages.get(id)
    }

    /// Record a package summary from the listing
    ///
    /// Creates the entity on first sight. An existing entity gets fresh
    /// metadata but keeps `last_checked`, so its versions are still due.
    pub fn record_summary(&mut self, metadata: PackageMetadata, now: DateTime<Utc>) {
        match self.doc.packages.get_mut(&metadata.id) {
            Some(existing) => existing.metadata = metadata,
            None => {
                let id = metadata.id.clone();
                self.doc
                    .packages
                    .insert(id, CachedPackage::new(metadata, now));
            }
        }
    }

    /// Merge a fresh version listing into a package
    ///
    /// `first_seen` is kept for the package and every known version; known
    /// versions keep their fetched node definitions. Versions absent from
    /// `versions` stay in the cache.
    pub fn upsert(
        &mut self,
        metadata: PackageMetadata,
        versions: Vec<VersionMetadata>,
        now: DateTime<Utc>,
    ) {
        let id = metadata.id.clone();
        let entry = self
            .doc
            .packages
            .entry(id)
            .or_insert_with(|| CachedPackage::new(metadata.clone(), now));
        entry.metadata = metadata;
        entry.last_checked = Some(now);

        for version in versions {
            match entry.versions.get_mut(&version.version) {
                Some(cached) => cached.metadata = version,
                None => {
                    entry.versions.insert(
                        version.version.clone(),
                        CachedVersion {
                            metadata: version,
                            first_seen: now,
                            node_definitions: None,
                        },
                    );
                }
            }
        }
    }

    /// Store the node definitions fetched for one version
    ///
    /// Returns `false` when the package or version is not cached.
    pub fn record_node_definitions(
        &mut self,
        id: &str,
        version: &str,
        nodes: Vec<NodeDefinition>,
    ) -> bool {
        match self
            .doc
            .packages
            .get_mut(id)
            .and_then(|p| p.versions.get_mut(version))
        {
            Some(cached) => {
                cached.node_definitions = Some(nodes);
                true
            }
            None => {
                warn!(package = id, version, "Node definitions for an uncached version");
                false
            }
        }
    }

    /// Whether a package's version list should be fetched again
    pub fn needs_version_refresh(
        &self,
        id: &str,
        latest_seen: Option<&str>,
        now: DateTime<Utc>,
        refresh_after: Duration,
    ) -> bool {
        let Some(pkg) = self.doc.packages.get(id) else {
            return true;
        };
        let Some(last_checked) = pkg.last_checked else {
            return true;
        };
        if let Some(latest) = latest_seen {
            if !pkg.versions.contains_key(latest) {
                return true;
            }
        }
        now - last_checked >= refresh_after
    }

    pub fn checkpoint(&self) -> Option<&Checkpoint> {
        self.doc.checkpoint.as_ref()
    }

    pub fn set_checkpoint(&mut self, checkpoint: Checkpoint) {
        self.doc.checkpoint = Some(checkpoint);
    }

    pub fn clear_checkpoint(&mut self) {
        self.doc.checkpoint = None;
    }
}
