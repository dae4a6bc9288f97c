//! Version string ordering
//!
//! Registry versions are mostly semver, but older packages publish things
//! like `1.2` or `2024.05.01`. Those fall back to numeric dotted comparison.
//! Every string maps to a sort key so the order stays total across mixed
//! formats.

use semver::Version;
use std::cmp::Ordering;

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
struct SortKey<'a> {
    parsable: bool,
    /// Numeric release components with trailing zeros removed
    release: Vec<u64>,
    /// Final releases sort above their pre-releases
    is_final: bool,
    semver: Option<Version>,
    raw: &'a str,
}

fn sort_key(raw: &str) -> SortKey<'_> {
    let trimmed = raw.trim();
    if let Ok(parsed) = Version::parse(trimmed) {
        return SortKey {
            parsable: true,
            release: strip_zeros(vec![parsed.major, parsed.minor, parsed.patch]),
            is_final: parsed.pre.is_empty(),
            semver: Some(parsed),
            raw,
        };
    }

    match numeric_parts(trimmed) {
        Some(parts) => SortKey {
            parsable: true,
            release: strip_zeros(parts),
            is_final: true,
            semver: None,
            raw,
        },
        None => SortKey {
            parsable: false,
            release: Vec::new(),
            is_final: false,
            semver: None,
            raw,
        },
    }
}

fn strip_zeros(mut parts: Vec<u64>) -> Vec<u64> {
    while parts.last() == Some(&0) {
        parts.pop();
    }
    parts
}

fn numeric_parts(version: &str) -> Option<Vec<u64>> {
    let trimmed = version.trim_start_matches(['v', 'V']);
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .split('.')
        .map(|part| part.parse::<u64>().ok())
        .collect()
}

/// Total order over version strings, oldest first
pub fn compare(a: &str, b: &str) -> Ordering {
    sort_key(a).cmp(&sort_key(b))
}

/// Sort newest first
pub fn sort_newest_first(versions: &mut [String]) {
    versions.sort_by(|a, b| compare(b, a));
}
