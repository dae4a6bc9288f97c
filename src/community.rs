//! Community extension map
//!
//! The map is a JSON object from repository URL to
//! `[node_name_list, optional_metadata]`. It is stored locally either raw
//! or wrapped as `{fetched_at, source, extension_count, extensions}`; the
//! wrapped form records when it was downloaded so a recent copy can be
//! reused instead of fetched again.

use crate::config::CommunityConfig;
use crate::error::{NodemapError, NodemapResult};
use crate::fsutil::write_atomic;
use crate::registry::http::{fetch_text, http_agent};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use url::Url;

/// Optional descriptive fields attached to a community record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommunityMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_aux: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Node names one repository is known to provide
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CommunityRecord {
    pub node_names: Vec<String>,
    pub metadata: CommunityMetadata,
}

/// Parsed community map, keyed by the URL as written upstream
#[derive(Debug, Clone, Default)]
pub struct CommunitySnapshot {
    pub fetched_at: Option<DateTime<Utc>>,
    pub source: Option<String>,
    pub extensions: BTreeMap<String, CommunityRecord>,

    /// Records that were not `[names, metadata]` arrays
    pub malformed: usize,
}

impl CommunitySnapshot {
    pub fn len(&self) -> usize {
        self.extensions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.extensions.is_empty()
    }

    /// Hours since download; `None` for raw snapshots
    pub fn age_hours(&self, now: DateTime<Utc>) -> Option<i64> {
        self.fetched_at.map(|at| (now - at).num_hours())
    }
}

#[derive(Serialize)]
struct WrappedSnapshot<'a> {
    fetched_at: DateTime<Utc>,
    source: &'a str,
    extension_count: usize,
    extensions: &'a Map<String, Value>,
}

/// Why a community map could not be read
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object, found {0}")]
    NotAnObject(&'static str),
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn parse_object(text: &str) -> Result<Map<String, Value>, SnapshotError> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        other => Err(SnapshotError::NotAnObject(json_kind(&other))),
    }
}

/// Parse the community map in either stored form
pub fn parse_snapshot(text: &str) -> Result<CommunitySnapshot, SnapshotError> {
    let mut root = parse_object(text)?;

    let mut snapshot = CommunitySnapshot::default();
    let extensions = match root.remove("extensions") {
        Some(Value::Object(extensions)) => {
            snapshot.fetched_at = root
                .get("fetched_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|at| at.with_timezone(&Utc));
            snapshot.source = root.get("source").and_then(Value::as_str).map(str::to_string);
            extensions
        }
        Some(other) => {
            // Not the wrapper: a raw map that happens to use this key
            root.insert("extensions".to_string(), other);
            root
        }
        None => root,
    };

    for (url, raw) in extensions {
        match parse_record(&raw) {
            Some(record) => {
                snapshot.extensions.insert(url, record);
            }
            None => {
                debug!(url = url.as_str(), "Skipping malformed community record");
                snapshot.malformed += 1;
            }
        }
    }
    Ok(snapshot)
}

fn parse_record(raw: &Value) -> Option<CommunityRecord> {
    let items = raw.as_array()?;
    let names = items.first()?.as_array()?;
    let node_names = names
        .iter()
        .filter_map(Value::as_str)
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();

    let metadata = items
        .get(1)
        .filter(|m| m.is_object())
        .and_then(|m| serde_json::from_value(m.clone()).ok())
        .unwrap_or_default();

    Some(CommunityRecord {
        node_names,
        metadata,
    })
}

/// Read a stored snapshot
pub async fn load_snapshot(path: &Path) -> NodemapResult<CommunitySnapshot> {
    let text = fs::read_to_string(path)
        .await
        .map_err(|e| NodemapError::io(format!("reading community data {}", path.display()), e))?;
    let snapshot = parse_snapshot(&text).map_err(|source| NodemapError::CommunityInvalid {
        path: path.to_path_buf(),
        source,
    })?;
    debug!(
        path = %path.display(),
        extensions = snapshot.len(),
        malformed = snapshot.malformed,
        "Loaded community data"
    );
    Ok(snapshot)
}

/// What [`refresh_snapshot`] did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// The local copy was recent enough
    Reused { age_hours: i64 },
    /// A new copy was downloaded and stored
    Downloaded { extensions: usize },
}

/// Make sure `path` holds a recent community snapshot.
///
/// A wrapped local copy younger than `max_age_hours` is kept unless `force`
/// is set. Otherwise the map is downloaded, checked, and stored wrapped.
pub async fn refresh_snapshot(
    config: &CommunityConfig,
    path: &Path,
    timeout: Duration,
    force: bool,
    now: DateTime<Utc>,
) -> NodemapResult<RefreshOutcome> {
    if !force {
        if let Some(age_hours) = fresh_local_age(path, config.max_age_hours, now).await {
            info!(age_hours, "Community data is recent, skipping download");
            return Ok(RefreshOutcome::Reused { age_hours });
        }
    }

    let url = Url::parse(&config.url)
        .map_err(|e| NodemapError::CommunityFetch(format!("invalid URL {}: {}", config.url, e)))?;
    let agent = http_agent(timeout);
    let text = fetch_text(&agent, url)
        .await
        .map_err(|e| NodemapError::CommunityFetch(e.to_string()))?;

    let extensions = parse_object(&text)
        .map_err(|e| NodemapError::CommunityFetch(format!("unusable response: {}", e)))?;

    let wrapped = WrappedSnapshot {
        fetched_at: now,
        source: &config.url,
        extension_count: extensions.len(),
        extensions: &extensions,
    };
    write_atomic(path, &serde_json::to_vec_pretty(&wrapped)?).await?;

    info!(extensions = extensions.len(), path = %path.display(), "Community data downloaded");
    Ok(RefreshOutcome::Downloaded {
        extensions: extensions.len(),
    })
}

async fn fresh_local_age(path: &Path, max_age_hours: u32, now: DateTime<Utc>) -> Option<i64> {
    let text = fs::read_to_string(path).await.ok()?;
    let snapshot = parse_snapshot(&text).ok()?;
    let age = snapshot.age_hours(now)?;
    (age >= 0 && age < i64::from(max_age_hours)).then_some(age)
}
