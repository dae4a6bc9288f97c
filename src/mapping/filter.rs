//! Output schema filter
//!
//! A TOML allow-list trims fields from the serialized mapping document:
//!
//! ```toml
//! [mappings]
//! versions = false
//!
//! [packages]
//! icon = false
//! tags = false
//!
//! [versions]
//! changelog = false
//! ```
//!
//! Fields not named are kept. A schema that cannot be read or parsed leaves
//! the document untouched.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::Path;
use tokio::fs;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaFilter {
    /// Fields of each mapping entry
    #[serde(default)]
    pub mappings: BTreeMap<String, bool>,

    /// Fields of each package record
    #[serde(default)]
    pub packages: BTreeMap<String, bool>,

    /// Fields of each version record inside a package
    #[serde(default)]
    pub versions: BTreeMap<String, bool>,
}

impl SchemaFilter {
    pub fn parse(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Load a schema file, or `None` (with a warning) if it is unusable
    pub async fn load(path: &Path) -> Option<Self> {
        let text = match fs::read_to_string(path).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Schema file {} unreadable, output left unfiltered: {}", path.display(), e);
                return None;
            }
        };
        match Self::parse(&text) {
            Ok(filter) => {
                debug!(path = %path.display(), "Loaded output schema");
                Some(filter)
            }
            Err(e) => {
                warn!("Schema file {} is malformed, output left unfiltered: {}", path.display(), e);
                None
            }
        }
    }

    /// True when nothing would be removed
    pub fn is_passthrough(&self) -> bool {
        [&self.mappings, &self.packages, &self.versions]
            .iter()
            .all(|table| table.values().all(|keep| *keep))
    }

    /// Remove disallowed fields from a serialized mapping document
    pub fn apply(&self, document: &mut Value) {
        if self.is_passthrough() {
            return;
        }

        if let Some(mappings) = document.get_mut("mappings").and_then(Value::as_object_mut) {
            for entries in mappings.values_mut() {
                if let Some(entries) = entries.as_array_mut() {
                    for entry in entries.iter_mut().filter_map(Value::as_object_mut) {
                        prune(entry, &self.mappings);
                    }
                }
            }
        }

        if let Some(packages) = document.get_mut("packages").and_then(Value::as_object_mut) {
            for package in packages.values_mut().filter_map(Value::as_object_mut) {
                if let Some(versions) = package.get_mut("versions").and_then(Value::as_object_mut) {
                    for version in versions.values_mut().filter_map(Value::as_object_mut) {
                        prune(version, &self.versions);
                    }
                }
                prune(package, &self.packages);
            }
        }
    }
}

fn prune(object: &mut Map<String, Value>, allow: &BTreeMap<String, bool>) {
    for (field, keep) in allow {
        if !keep {
            object.remove(field);
        }
    }
}

/// Apply the schema at `path` if one is configured
pub async fn filter_document(document: &mut Value, schema: Option<&Path>) {
    let Some(path) = schema else {
        return;
    };
    if let Some(filter) = SchemaFilter::load(path).await {
        filter.apply(document);
    }
}
