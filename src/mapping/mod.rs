//! Node mapping derivation
//!
//! | Stage | Module |
//! |-------|--------|
//! | Node keys | [`signature`] |
//! | Registry entries | [`builder`] |
//! | Scores and ranks | [`rank`] |
//! | Community merge | [`augment`] |
//! | Output shaping | [`filter`] |

pub mod augment;
pub mod builder;
pub mod document;
pub mod filter;
pub mod rank;
pub mod signature;

pub use augment::{augment, Augmenter};
pub use builder::{build_registry_mappings, RegistryMappings};
pub use document::{
    AugmentStats, MappingDocument, MappingEntry, MappingStats, PackageRecord, Provenance,
    VersionRecord,
};
pub use filter::{filter_document, SchemaFilter};
pub use rank::Ranker;
pub use signature::{node_key, signature_token, split_node_key, PLACEHOLDER_TOKEN};

use crate::cache::CachedPackage;
use crate::community::CommunityRecord;
use crate::config::ScoringConfig;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Derive the complete mapping document from a cache snapshot and, when
/// given, a community snapshot
pub fn build_document(
    cache: &BTreeMap<String, CachedPackage>,
    community: Option<&BTreeMap<String, CommunityRecord>>,
    now: DateTime<Utc>,
    scoring: &ScoringConfig,
) -> MappingDocument {
    let RegistryMappings {
        mut mappings,
        mut packages,
        ..
    } = build_registry_mappings(cache);

    Ranker::new(&packages, now, scoring).rank_all(&mut mappings);

    let augmentation =
        community.map(|records| augment(&mut mappings, &mut packages, records, now, scoring));

    MappingDocument::new(now, mappings, packages, augmentation)
}
