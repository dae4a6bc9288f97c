//! Popularity and recency scoring
//!
//! `score = (downloads / 10 + stars * 2) * recency`, where recency is 1.0
//! for a package released within `fresh_days`, falls linearly to 0.5 at
//! `stale_days`, and stays at 0.5 beyond that or when no release date is
//! known. Scores only order entries; they are never written out.

use super::document::{MappingEntry, PackageRecord};
use crate::config::ScoringConfig;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use std::collections::{BTreeMap, BTreeSet};

pub const MAX_MULTIPLIER: f64 = 1.0;
pub const MIN_MULTIPLIER: f64 = 0.5;

/// Popularity before recency
pub fn base_score(downloads: u64, github_stars: u64) -> f64 {
    downloads as f64 / 10.0 + github_stars as f64 * 2.0
}

/// Multiplier for a package whose newest release is `age_days` old
pub fn recency_multiplier(age_days: Option<i64>, scoring: &ScoringConfig) -> f64 {
    let Some(age) = age_days else {
        return MIN_MULTIPLIER;
    };
    let fresh = i64::from(scoring.fresh_days);
    let stale = i64::from(scoring.stale_days);

    if age <= fresh {
        return MAX_MULTIPLIER;
    }
    if age >= stale || stale <= fresh {
        return MIN_MULTIPLIER;
    }

    let progress = (age - fresh) as f64 / (stale - fresh) as f64;
    MAX_MULTIPLIER - progress * (MAX_MULTIPLIER - MIN_MULTIPLIER)
}

/// Days since the most recent release of a non-deprecated version
pub fn latest_release_age(record: &PackageRecord, now: DateTime<Utc>) -> Option<i64> {
    record
        .versions
        .values()
        .filter(|v| !v.deprecated)
        .filter_map(|v| v.release_date.as_deref())
        .filter_map(parse_release_date)
        .max()
        .map(|latest| (now - latest).num_days().max(0))
}

/// Release timestamps with an offset, or naive date-times and plain dates
/// taken as UTC
pub fn parse_release_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Some(date.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Final score of a package
pub fn package_score(record: &PackageRecord, now: DateTime<Utc>, scoring: &ScoringConfig) -> f64 {
    let base = base_score(record.downloads, record.github_stars);
    if base == 0.0 {
        return 0.0;
    }
    base * recency_multiplier(latest_release_age(record, now), scoring)
}

/// Scores every package once per run
pub struct Ranker<'a> {
    scores: BTreeMap<&'a str, f64>,
}

impl<'a> Ranker<'a> {
    pub fn new(
        packages: &'a BTreeMap<String, PackageRecord>,
        now: DateTime<Utc>,
        scoring: &ScoringConfig,
    ) -> Self {
        let scores = packages
            .iter()
            .map(|(id, record)| (id.as_str(), package_score(record, now, scoring)))
            .collect();
        Self { scores }
    }

    /// Score of a package; unknown ids score 0
    pub fn score(&self, package_id: &str) -> f64 {
        self.scores.get(package_id).copied().unwrap_or(0.0)
    }

    /// Order entries by score, highest first, and number them from 1
    ///
    /// The sort is stable: equal scores keep their current relative order.
    pub fn rank(&self, entries: &mut [MappingEntry]) {
        entries.sort_by(|a, b| {
            self.score(&b.package_id)
                .total_cmp(&self.score(&a.package_id))
        });
        for (position, entry) in entries.iter_mut().enumerate() {
            entry.rank = position as u32 + 1;
        }
    }

    pub fn rank_all(&self, mappings: &mut BTreeMap<String, Vec<MappingEntry>>) {
        for entries in mappings.values_mut() {
            self.rank(entries);
        }
    }

    pub fn rank_keys(
        &self,
        mappings: &mut BTreeMap<String, Vec<MappingEntry>>,
        keys: &BTreeSet<String>,
    ) {
        for key in keys {
            if let Some(entries) = mappings.get_mut(key) {
                self.rank(entries);
            }
        }
    }
}
