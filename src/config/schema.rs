//! Configuration schema for nodemap
//!
//! Configuration is stored at `~/.config/nodemap/config.toml`

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Upper bound for `registry.concurrency` and `--concurrency`
pub const MAX_CONCURRENCY: usize = 64;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Data file locations
    pub paths: PathsConfig,

    /// Registry API and fetch settings
    pub registry: RegistryConfig,

    /// Community extension map settings
    pub community: CommunityConfig,

    /// Ranking settings
    pub scoring: ScoringConfig,
}

impl Config {
    /// Settings a run cannot work with; empty when the config is usable
    pub fn problems(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let registry = &self.registry;

        if !(1..=MAX_CONCURRENCY).contains(&registry.concurrency) {
            problems.push(format!(
                "registry.concurrency must be between 1 and {}, got {}",
                MAX_CONCURRENCY, registry.concurrency
            ));
        }
        if registry.page_size == 0 {
            problems.push("registry.page_size must be at least 1".to_string());
        }
        if registry.checkpoint_interval == 0 {
            problems.push("registry.checkpoint_interval must be at least 1".to_string());
        }
        if registry.request_timeout_secs == 0 {
            problems.push("registry.request_timeout_secs must be at least 1".to_string());
        }
        if registry.max_pages == Some(0) {
            problems.push("registry.max_pages must be at least 1 when set".to_string());
        }
        for (key, value) in [
            ("registry.base_url", &registry.base_url),
            ("community.url", &self.community.url),
        ] {
            let usable = Url::parse(value)
                .map(|url| matches!(url.scheme(), "http" | "https"))
                .unwrap_or(false);
            if !usable {
                problems.push(format!("{} is not an http(s) URL: {}", key, value));
            }
        }
        if self.scoring.stale_days <= self.scoring.fresh_days {
            problems.push(format!(
                "scoring.stale_days ({}) must be greater than scoring.fresh_days ({})",
                self.scoring.stale_days, self.scoring.fresh_days
            ));
        }
        if !matches!(self.general.log_format.as_str(), "text" | "json") {
            problems.push(format!(
                "general.log_format must be \"text\" or \"json\", got {:?}",
                self.general.log_format
            ));
        }
        problems
    }
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,

    /// Append one JSON line per pipeline run to the history log
    pub history_log: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
            history_log: true,
        }
    }
}

/// Data file locations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory holding every generated file (default: platform data dir)
    pub data_dir: Option<PathBuf>,

    /// Registry cache file name
    pub cache_file: String,

    /// Mapping document file name
    pub mappings_file: String,

    /// Community snapshot file name
    pub community_file: String,

    /// Schema filter allow-list (absent = unfiltered output)
    pub schema_file: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            cache_file: "registry_cache.json".to_string(),
            mappings_file: "node_mappings.json".to_string(),
            community_file: "extension-node-map.json".to_string(),
            schema_file: None,
        }
    }
}

impl PathsConfig {
    /// Resolve relative `data_dir` and `schema_file` against `base`
    pub fn anchor(&mut self, base: &Path) {
        for path in [&mut self.data_dir, &mut self.schema_file].into_iter().flatten() {
            if path.is_relative() {
                *path = base.join(path.as_path());
            }
        }
    }

    /// Resolved data directory
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("nodemap")
        })
    }

    pub fn cache_path(&self) -> PathBuf {
        self.data_dir().join(&self.cache_file)
    }

    pub fn mappings_path(&self) -> PathBuf {
        self.data_dir().join(&self.mappings_file)
    }

    pub fn community_path(&self) -> PathBuf {
        self.data_dir().join(&self.community_file)
    }

    pub fn history_path(&self) -> PathBuf {
        self.data_dir().join("history.jsonl")
    }
}

/// Registry API and fetch settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry API root
    pub base_url: String,

    /// Concurrent in-flight requests
    pub concurrency: usize,

    /// Packages per listing page
    pub page_size: u32,

    /// Minimum delay between two dispatches from the same worker
    pub rate_limit_delay_ms: u64,

    /// Retries after the first attempt for transient failures
    pub max_retries: u32,

    /// First backoff delay; each retry multiplies it by three
    pub retry_base_delay_ms: u64,

    /// Persist the cache every N processed items
    pub checkpoint_interval: usize,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Newest versions per package to fetch node definitions for (0 = all)
    pub max_versions: usize,

    /// Re-check package versions after this many hours even if unchanged
    pub refresh_after_hours: u32,

    /// Stop listing after this many pages (testing aid)
    pub max_pages: Option<u32>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.comfy.org".to_string(),
            concurrency: 8,
            page_size: 100,
            rate_limit_delay_ms: 100,
            max_retries: 3,
            retry_base_delay_ms: 1000,
            checkpoint_interval: 25,
            request_timeout_secs: 30,
            max_versions: 10,
            refresh_after_hours: 24,
            max_pages: None,
        }
    }
}

impl RegistryConfig {
    pub fn rate_limit_delay(&self) -> Duration {
        Duration::from_millis(self.rate_limit_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Community extension map settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommunityConfig {
    /// Merge community data into the mappings
    pub enabled: bool,

    /// Download location of the extension map
    pub url: String,

    /// Reuse the local snapshot when younger than this
    pub max_age_hours: u32,
}

impl Default for CommunityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "https://raw.githubusercontent.com/ltdrdata/ComfyUI-Manager/main/extension-node-map.json"
                .to_string(),
            max_age_hours: 6,
        }
    }
}

/// Recency decay thresholds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    /// Ages at or below this keep the full score
    pub fresh_days: u32,

    /// Ages at or beyond this get the floor multiplier
    pub stale_days: u32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            fresh_days: 90,
            stale_days: 730,
        }
    }
}
