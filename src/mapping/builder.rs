//! Registry mapping builder
//!
//! Walks the cache in package id order and turns every node declared by a
//! non-deprecated version into a registry entry under its node key.

use super::document::{MappingEntry, PackageRecord, Provenance, VersionRecord};
use super::signature::{node_key, signature_token};
use crate::cache::CachedPackage;
use crate::registry::PackageMetadata;
use crate::repo_url;
use crate::version;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Unranked output of the builder
#[derive(Debug, Default)]
pub struct RegistryMappings {
    pub mappings: BTreeMap<String, Vec<MappingEntry>>,
    pub packages: BTreeMap<String, PackageRecord>,

    /// Node descriptors turned into (or merged into) an entry
    pub nodes_processed: usize,

    /// Descriptors skipped for a missing name or an unreadable input shape
    pub nodes_skipped: usize,
}

/// Build registry entries and package records from a cache snapshot
pub fn build_registry_mappings(packages: &BTreeMap<String, CachedPackage>) -> RegistryMappings {
    let mut out = RegistryMappings::default();

    for (id, cached) in packages {
        out.packages.insert(id.clone(), package_record(cached));

        for (number, cached_version) in &cached.versions {
            if cached_version.metadata.deprecated {
                continue;
            }
            let Some(ref nodes) = cached_version.node_definitions else {
                continue;
            };

            for node in nodes {
                let name = node.comfy_node_name.trim();
                if name.is_empty() {
                    debug!(package = id.as_str(), version = number.as_str(), "Node without a name");
                    out.nodes_skipped += 1;
                    continue;
                }
                let token = match signature_token(&node.input_types) {
                    Ok(token) => token,
                    Err(e) => {
                        debug!(package = id.as_str(), node = name, "Skipping node: {}", e);
                        out.nodes_skipped += 1;
                        continue;
                    }
                };

                let entries = out.mappings.entry(node_key(name, &token)).or_default();
                match entries.iter_mut().find(|e| e.package_id == *id) {
                    Some(entry) => {
                        if !entry.versions.iter().any(|v| v == number) {
                            entry.versions.push(number.clone());
                        }
                    }
                    None => entries.push(MappingEntry::registry(id.clone(), number.clone())),
                }
                out.nodes_processed += 1;
            }
        }
    }

    for entries in out.mappings.values_mut() {
        for entry in entries.iter_mut() {
            version::sort_newest_first(&mut entry.versions);
        }
    }

    info!(
        packages = out.packages.len(),
        signatures = out.mappings.len(),
        nodes = out.nodes_processed,
        skipped = out.nodes_skipped,
        "Registry mappings built"
    );
    out
}

fn package_record(cached: &CachedPackage) -> PackageRecord {
    let meta: &PackageMetadata = &cached.metadata;
    let repository = meta
        .repository
        .as_deref()
        .map(repo_url::normalize)
        .filter(|r| !r.is_empty());

    let versions = cached
        .versions
        .iter()
        .map(|(number, v)| {
            let m = &v.metadata;
            (
                number.clone(),
                VersionRecord {
                    version: number.clone(),
                    changelog: m.changelog.clone(),
                    release_date: m.created_at.clone(),
                    dependencies: m.dependencies.clone(),
                    deprecated: m.deprecated,
                    download_url: m.download_url.clone().filter(|u| !u.trim().is_empty()),
                    status: m.status.clone(),
                    supported_os: m.supported_os.clone(),
                    supported_accelerators: m.supported_accelerators.clone(),
                    supported_comfyui_version: m
                        .supported_comfyui_version
                        .clone()
                        .filter(|v| !v.trim().is_empty()),
                },
            )
        })
        .collect();

    PackageRecord {
        display_name: meta.name.clone().unwrap_or_else(|| meta.id.clone()),
        author: meta.author.clone(),
        description: meta.description.clone(),
        repository,
        downloads: meta.downloads,
        github_stars: meta.github_stars,
        rating: meta.rating,
        license: meta.license.clone(),
        category: meta.category.clone(),
        icon: meta.icon.clone(),
        tags: meta.tags.clone(),
        status: meta.status.clone(),
        created_at: meta.created_at.clone(),
        versions,
        provenance: Provenance::Registry,
        synthetic: false,
    }
}
