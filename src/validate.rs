//! Structural checks for the cache and mapping documents

use crate::cache::CacheDocument;
use crate::config::ScoringConfig;
use crate::mapping::{split_node_key, MappingDocument, Provenance, Ranker};
use std::collections::BTreeSet;
use std::fmt;

/// One violated rule
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    /// Where in the document, e.g. `mappings["Add::_"][1]`
    pub location: String,
    pub message: String,
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.location, self.message)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn error(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.errors.push(Issue {
            location: location.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, location: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(Issue {
            location: location.into(),
            message: message.into(),
        });
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.errors.extend(other.errors);
        self.warnings.extend(other.warnings);
    }
}

/// Check a mapping document.
///
/// Scores are recomputed with `scoring` at the document's generation time,
/// so a document built with different thresholds reports ordering errors.
pub fn validate_mappings(doc: &MappingDocument, scoring: &ScoringConfig) -> ValidationReport {
    let mut report = ValidationReport::default();
    let ranker = Ranker::new(&doc.packages, doc.generated_at, scoring);

    for (key, entries) in &doc.mappings {
        let here = format!("mappings[{:?}]", key);
        match split_node_key(key) {
            Some((name, token)) if !name.is_empty() && !token.is_empty() => {}
            _ => report.error(&here, "node key is not `name::token`"),
        }
        if entries.is_empty() {
            report.warn(&here, "no providers");
        }

        let mut seen = BTreeSet::new();
        let mut previous_score = f64::INFINITY;
        for (position, entry) in entries.iter().enumerate() {
            let at = format!("{}[{}]", here, position);
            if !seen.insert(entry.package_id.as_str()) {
                report.error(&at, format!("duplicate package {}", entry.package_id));
            }
            if entry.rank as usize != position + 1 {
                report.error(&at, format!("rank {} at position {}", entry.rank, position + 1));
            }
            if !doc.packages.contains_key(&entry.package_id) {
                report.error(&at, format!("unknown package {}", entry.package_id));
            }
            match entry.provenance {
                Provenance::Community if !entry.versions.is_empty() => {
                    report.error(&at, "community entry lists versions");
                }
                Provenance::Registry if entry.versions.is_empty() => {
                    report.warn(&at, "registry entry without versions");
                }
                _ => {}
            }

            let score = ranker.score(&entry.package_id);
            if score > previous_score {
                report.error(&at, "ranked above a higher-scoring package");
            }
            previous_score = score;
        }
    }

    for (id, record) in &doc.packages {
        let here = format!("packages[{:?}]", id);
        if record.provenance == Provenance::Community {
            if record.downloads != 0 || record.github_stars != 0 {
                report.error(&here, "community package carries popularity metrics");
            }
            if !record.versions.is_empty() {
                report.error(&here, "community package lists versions");
            }
        } else if record.synthetic {
            report.error(&here, "synthetic package marked as registry");
        }
    }

    let stats = &doc.stats;
    let total: usize = doc.mappings.values().map(Vec::len).sum();
    if stats.packages != doc.packages.len() {
        report.error("stats.packages", format!("{} != {}", stats.packages, doc.packages.len()));
    }
    if stats.signatures != doc.mappings.len() {
        report.error(
            "stats.signatures",
            format!("{} != {}", stats.signatures, doc.mappings.len()),
        );
    }
    if stats.total_mappings != total {
        report.error("stats.total_mappings", format!("{} != {}", stats.total_mappings, total));
    }

    report
}

/// Check a cache document
pub fn validate_cache(doc: &CacheDocument) -> ValidationReport {
    let mut report = ValidationReport::default();

    for (id, package) in &doc.packages {
        let here = format!("packages[{:?}]", id);
        if package.metadata.id != *id {
            report.error(&here, format!("stored under a different id ({})", package.metadata.id));
        }
        if let Some(checked) = package.last_checked {
            if checked < package.first_seen {
                report.error(&here, "last_checked precedes first_seen");
            }
        }
        for (number, version) in &package.versions {
            let at = format!("{}.versions[{:?}]", here, number);
            if version.metadata.version != *number {
                report.error(&at, format!("stored under a different version ({})", version.metadata.version));
            }
            if version.first_seen < package.first_seen {
                report.warn(&at, "seen before its package");
            }
        }
    }

    let mut expected = doc.clone();
    expected.refresh_counts();
    for (field, stored, actual) in [
        ("package_count", doc.package_count, expected.package_count),
        ("version_count", doc.version_count, expected.version_count),
        ("metadata_entries", doc.metadata_entries, expected.metadata_entries),
    ] {
        if stored != actual {
            report.error(field, format!("{} != {}", stored, actual));
        }
    }

    if let Some(checkpoint) = &doc.checkpoint {
        report.warn(
            "checkpoint",
            format!("interrupted {} phase pending resume", checkpoint.phase),
        );
    }

    report
}
