//! HTTP registry client
//!
//! ureq is blocking, so every request runs on the blocking thread pool and
//! the async side only awaits the join handle.

use super::types::{InstallInfo, NodeDefinition, NodeDefinitionPage, PackagePage, VersionMetadata};
use super::{FetchError, RegistrySource};
use crate::config::RegistryConfig;
use crate::error::{NodemapError, NodemapResult};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, trace};
use ureq::Agent;
use url::Url;

/// Largest response body accepted from any endpoint
const BODY_LIMIT: u64 = 64 * 1024 * 1024;

/// The node definition listing is never followed past this page
const MAX_DEFINITION_PAGES: u32 = 100;

const USER_AGENT: &str = concat!("nodemap/", env!("CARGO_PKG_VERSION"));

/// Build a blocking HTTP agent with a global per-request timeout
pub fn http_agent(timeout: Duration) -> Agent {
    Agent::config_builder()
        .timeout_global(Some(timeout))
        .build()
        .into()
}

/// GET a URL and return the body as text
pub async fn fetch_text(agent: &Agent, url: Url) -> Result<String, FetchError> {
    let agent = agent.clone();
    tokio::task::spawn_blocking(move || {
        trace!(url = %url, "GET");
        let mut response = agent
            .get(url.as_str())
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .call()
            .map_err(map_transport_error)?;
        response
            .body_mut()
            .with_config()
            .limit(BODY_LIMIT)
            .read_to_string()
            .map_err(map_transport_error)
    })
    .await
    .map_err(|e| FetchError::Network(format!("request task failed: {}", e)))?
}

fn map_transport_error(err: ureq::Error) -> FetchError {
    match err {
        ureq::Error::StatusCode(status) => FetchError::from_status(status),
        other => FetchError::Network(other.to_string()),
    }
}

/// Registry client over the public HTTP API
pub struct HttpRegistry {
    agent: Agent,
    base: Url,
}

impl HttpRegistry {
    /// Create a client for the given API root
    pub fn new(base_url: &str, timeout: Duration) -> NodemapResult<Self> {
        let base = Url::parse(base_url)
            .map_err(|e| NodemapError::User(format!("Invalid registry URL {}: {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(NodemapError::User(format!(
                "Invalid registry URL {}: not a base URL",
                base_url
            )));
        }

        Ok(Self {
            agent: http_agent(timeout),
            base,
        })
    }

    /// Create a client from the `[registry]` config section
    pub fn from_config(config: &RegistryConfig) -> NodemapResult<Self> {
        Self::new(&config.base_url, config.request_timeout())
    }

    fn endpoint(&self, segments: &[&str], query: &[(&str, String)]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        url
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, FetchError> {
        let body = fetch_text(&self.agent, url).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RegistrySource for HttpRegistry {
    async fn list_packages(&self, page: u32, limit: u32) -> Result<PackagePage, FetchError> {
        let url = self.endpoint(
            &["nodes"],
            &[("page", page.to_string()), ("limit", limit.to_string())],
        );
        self.get_json(url).await
    }

    async fn package_versions(&self, package_id: &str) -> Result<Vec<VersionMetadata>, FetchError> {
        let url = self.endpoint(&["nodes", package_id, "versions"], &[]);
        self.get_json(url).await
    }

    async fn install_info(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<InstallInfo, FetchError> {
        let url = self.endpoint(
            &["nodes", package_id, "install"],
            &[("version", version.to_string())],
        );
        self.get_json(url).await
    }

    async fn node_definitions(
        &self,
        package_id: &str,
        version: &str,
    ) -> Result<Vec<NodeDefinition>, FetchError> {
        let mut nodes = Vec::new();
        let mut page = 1;

        loop {
            let url = self.endpoint(
                &["nodes", package_id, "versions", version, "comfy-nodes"],
                &[("page", page.to_string())],
            );
            let batch: NodeDefinitionPage = self.get_json(url).await?;
            let received = batch.comfy_nodes.len();
            nodes.extend(batch.comfy_nodes);

            let total = batch.total_pages.unwrap_or(1);
            if received == 0 || page >= total || page >= MAX_DEFINITION_PAGES {
                break;
            }
            page += 1;
        }

        debug!(
            package = package_id,
            version,
            count = nodes.len(),
            "Fetched node definitions"
        );
        Ok(nodes)
    }

    fn source_name(&self) -> &str {
        self.base.as_str()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> HttpRegistry {
        HttpRegistry::new("https://api.example.org", Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn endpoint_builds_paths_and_query() {
        let url = client().endpoint(&["nodes"], &[("page", "2".into()), ("limit", "50".into())]);
        assert_eq!(url.as_str(), "https://api.example.org/nodes?page=2&limit=50");
    }

    #[test]
    fn endpoint_escapes_segments() {
        let url = client().endpoint(&["nodes", "odd id", "versions", "1.0.0", "comfy-nodes"], &[]);
        assert_eq!(
            url.as_str(),
            "https://api.example.org/nodes/odd%20id/versions/1.0.0/comfy-nodes"
        );
    }

    #[test]
    fn base_with_path_prefix() {
        let client = HttpRegistry::new("https://mirror.example.org/api/", Duration::from_secs(5))
            .unwrap();
        let url = client.endpoint(&["nodes", "pkg", "versions"], &[]);
        assert_eq!(url.as_str(), "https://mirror.example.org/api/nodes/pkg/versions");
    }

    #[test]
    fn rejects_non_base_url() {
        assert!(HttpRegistry::new("mailto:ops@example.org", Duration::from_secs(5)).is_err());
        assert!(HttpRegistry::new("not a url", Duration::from_secs(5)).is_err());
    }
}
