//! Registry wire types
//!
//! Every struct keeps unknown fields in a flattened `extra` map so that a
//! value read from the API, cached, and read back is unchanged.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One page of the package listing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PackagePage {
    #[serde(default)]
    pub nodes: Vec<PackageMetadata>,

    #[serde(default = "default_total_pages", rename = "totalPages")]
    pub total_pages: u32,
}

fn default_total_pages() -> u32 {
    1
}

/// Advertised latest version in a package summary
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LatestVersion {
    #[serde(default)]
    pub version: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

/// Package summary as returned by the listing endpoint
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageMetadata {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

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

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_version: Option<LatestVersion>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl PackageMetadata {
    /// Minimal summary, mostly useful for tests and fakes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Latest version string the registry advertises
    pub fn latest_version_str(&self) -> Option<&str> {
        self.latest_version.as_ref()?.version.as_deref()
    }
}

/// One published version of a package
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionMetadata {
    pub version: String,

    /// Release timestamp (RFC 3339)
    #[serde(default, rename = "createdAt", skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,

    #[serde(default)]
    pub deprecated: bool,

    #[serde(default, rename = "downloadUrl", skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dependencies: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,

    #[serde(default, rename = "installType", skip_serializing_if = "Option::is_none")]
    pub install_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_os: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_accelerators: Option<Vec<String>>,

    /// Version requirement on the host application, e.g. `>=0.3.0`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supported_comfyui_version: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl VersionMetadata {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            ..Default::default()
        }
    }

    /// Whether the listing already carried a usable download url
    pub fn has_download_url(&self) -> bool {
        self.download_url
            .as_deref()
            .is_some_and(|url| !url.trim().is_empty())
    }
}

/// Install details for one version
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InstallInfo {
    #[serde(default, rename = "downloadUrl")]
    pub download_url: Option<String>,

    #[serde(default)]
    pub dependencies: Vec<String>,

    #[serde(default, rename = "installType")]
    pub install_type: Option<String>,
}

/// A node a package version declares
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeDefinition {
    /// Display name the host application registers the node under
    #[serde(default)]
    pub comfy_node_name: String,

    /// Declared input shape: a JSON document, either inline or as a string
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input_types: Value,

    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl NodeDefinition {
    pub fn new(name: impl Into<String>, input_types: Value) -> Self {
        Self {
            comfy_node_name: name.into(),
            input_types,
            extra: BTreeMap::new(),
        }
    }
}

/// One page of node definitions for a version
#[derive(Debug, Clone, Default, Deserialize)]
pub struct NodeDefinitionPage {
    #[serde(default)]
    pub comfy_nodes: Vec<NodeDefinition>,

    #[serde(default, rename = "totalNumberOfPages", alias = "totalPages")]
    pub total_pages: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_fields_survive_roundtrip() {
        let raw = json!({
            "id": "comfyui-impact-pack",
            "name": "Impact Pack",
            "downloads": 120000,
            "github_stars": 2100,
            "publisher": {"id": "dr-lt-data"},
            "latest_version": {"version": "8.1.0", "createdAt": "2025-02-01T00:00:00Z"}
        });

        let meta: PackageMetadata = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(meta.latest_version_str(), Some("8.1.0"));
        assert!(meta.extra.contains_key("publisher"));

        let back = serde_json::to_value(&meta).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn page_defaults_to_single_page() {
        let page: PackagePage = serde_json::from_str(r#"{"nodes": []}"#).unwrap();
        assert_eq!(page.total_pages, 1);
    }

    #[test]
    fn definition_page_accepts_either_total_field() {
        let a: NodeDefinitionPage =
            serde_json::from_str(r#"{"comfy_nodes": [], "totalNumberOfPages": 3}"#).unwrap();
        let b: NodeDefinitionPage =
            serde_json::from_str(r#"{"comfy_nodes": [], "totalPages": 2}"#).unwrap();
        assert_eq!(a.total_pages, Some(3));
        assert_eq!(b.total_pages, Some(2));
    }

    #[test]
    fn download_url_presence() {
        let mut v = VersionMetadata::new("1.0.0");
        assert!(!v.has_download_url());
        v.download_url = Some("  ".to_string());
        assert!(!v.has_download_url());
        v.download_url = Some("https://cdn.example/pkg.zip".to_string());
        assert!(v.has_download_url());
    }
}
