//! Community augmentation
//!
//! Pass 1 attaches community node names to registry packages that share a
//! repository identity. Pass 2 synthesizes packages for the repositories the
//! registry does not know. Every touched node key is re-ranked afterwards.
//! Community entries always use the placeholder signature, and no entry is
//! added for a package that already provides the key.

use super::document::{AugmentStats, MappingEntry, PackageRecord, Provenance};
use super::rank::Ranker;
use super::signature::{node_key, PLACEHOLDER_TOKEN};
use crate::community::CommunityRecord;
use crate::config::ScoringConfig;
use crate::repo_url;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};
use url::Url;

/// Merges a community snapshot into registry mappings
pub struct Augmenter<'a> {
    mappings: &'a mut BTreeMap<String, Vec<MappingEntry>>,
    packages: &'a mut BTreeMap<String, PackageRecord>,
    changed: BTreeSet<String>,
    augmented: BTreeSet<String>,
    stats: AugmentStats,
}

impl<'a> Augmenter<'a> {
    pub fn new(
        mappings: &'a mut BTreeMap<String, Vec<MappingEntry>>,
        packages: &'a mut BTreeMap<String, PackageRecord>,
    ) -> Self {
        Self {
            mappings,
            packages,
            changed: BTreeSet::new(),
            augmented: BTreeSet::new(),
            stats: AugmentStats::default(),
        }
    }

    /// Run both passes and re-rank every node key that gained an entry
    pub fn run(
        mut self,
        community: &BTreeMap<String, CommunityRecord>,
        now: DateTime<Utc>,
        scoring: &ScoringConfig,
    ) -> AugmentStats {
        let index = self.repository_index();
        let mut unmatched = Vec::new();

        for (url, record) in community {
            let identity = repo_url::normalize(url);
            if identity.is_empty() {
                debug!(url = url.as_str(), "Community record without a usable URL");
                self.stats.unprocessable += 1;
                continue;
            }
            match index.get(&identity) {
                Some(package_id) => {
                    self.stats.community_nodes += record.node_names.len();
                    let added = self.add_entries(package_id, &record.node_names);
                    if added > 0 {
                        self.augmented.insert(package_id.clone());
                        debug!(package = package_id.as_str(), added, "Augmented registry package");
                    }
                }
                None => unmatched.push((identity, record)),
            }
        }

        for (identity, record) in unmatched {
            let Some(package_id) = repo_url::synthetic_package_id(&identity) else {
                self.stats.unprocessable += 1;
                continue;
            };
            self.stats.community_nodes += record.node_names.len();
            self.ensure_synthetic(&package_id, &identity, record);
            self.add_entries(&package_id, &record.node_names);
        }

        self.stats.packages_augmented = self.augmented.len();
        let ranker = Ranker::new(self.packages, now, scoring);
        ranker.rank_keys(self.mappings, &self.changed);

        info!(
            added = self.stats.entries_added,
            skipped = self.stats.entries_skipped_existing,
            augmented = self.stats.packages_augmented,
            synthetic = self.stats.synthetic_packages,
            "Community augmentation complete"
        );
        self.stats
    }

    /// Normalized repository identity to the registry package that owns it
    fn repository_index(&self) -> BTreeMap<String, String> {
        let mut index: BTreeMap<String, String> = BTreeMap::new();
        for (id, record) in self.packages.iter() {
            if record.provenance != Provenance::Registry {
                continue;
            }
            let Some(repository) = record.repository.as_deref() else {
                continue;
            };
            let identity = repo_url::normalize(repository);
            if identity.is_empty() {
                continue;
            }
            if let Some(owner) = index.get(&identity) {
                debug!(
                    repository = identity.as_str(),
                    owner = owner.as_str(),
                    other = id.as_str(),
                    "Repository shared by several packages"
                );
                continue;
            }
            index.insert(identity, id.clone());
        }
        index
    }

    /// Append community entries for `package_id`; returns how many were new
    fn add_entries(&mut self, package_id: &str, node_names: &[String]) -> usize {
        let mut added = 0;
        for name in node_names {
            let key = node_key(name, PLACEHOLDER_TOKEN);
            let entries = self.mappings.entry(key.clone()).or_default();
            if entries.iter().any(|e| e.package_id == package_id) {
                self.stats.entries_skipped_existing += 1;
                continue;
            }
            entries.push(MappingEntry::community(package_id));
            self.changed.insert(key);
            self.stats.entries_added += 1;
            added += 1;
        }
        added
    }

    fn ensure_synthetic(&mut self, package_id: &str, identity: &str, record: &CommunityRecord) {
        if self.packages.contains_key(package_id) {
            debug!(package = package_id, "Merging into existing synthetic package");
            return;
        }

        let (owner, repo) = owner_and_repo(identity);
        let meta = &record.metadata;
        let display_name = meta
            .title
            .clone()
            .or_else(|| meta.title_aux.clone())
            .or(repo)
            .unwrap_or_else(|| package_id.to_string());

        self.packages.insert(
            package_id.to_string(),
            PackageRecord {
                display_name,
                author: meta.author.clone().or(owner),
                description: meta.description.clone(),
                repository: Some(identity.to_string()),
                provenance: Provenance::Community,
                synthetic: true,
                ..Default::default()
            },
        );
        self.stats.synthetic_packages += 1;
        if repo_url::is_supported_repo_url(identity) {
            debug!(package = package_id, "Created synthetic package");
        } else {
            debug!(
                package = package_id,
                repository = identity,
                "Created synthetic package for an unrecognized host"
            );
        }
    }
}

/// Last two path components of a normalized repository URL
fn owner_and_repo(identity: &str) -> (Option<String>, Option<String>) {
    let Ok(url) = Url::parse(identity) else {
        return (None, None);
    };
    let segments: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [.., owner, repo] => (Some(owner.to_string()), Some(repo.to_string())),
        [repo] => (None, Some(repo.to_string())),
        [] => (None, None),
    }
}

/// Merge `community` into the registry output in place
pub fn augment(
    mappings: &mut BTreeMap<String, Vec<MappingEntry>>,
    packages: &mut BTreeMap<String, PackageRecord>,
    community: &BTreeMap<String, CommunityRecord>,
    now: DateTime<Utc>,
    scoring: &ScoringConfig,
) -> AugmentStats {
    Augmenter::new(mappings, packages).run(community, now, scoring)
}
