//! Configuration loading for nodemap
//!
//! The file is optional. Relative paths under `[paths]` are taken relative to
//! the directory holding the file, and settings a fetch cannot run with are
//! rejected at load time.

pub mod schema;

pub use schema::{
    CommunityConfig, Config, GeneralConfig, PathsConfig, RegistryConfig, ScoringConfig,
    MAX_CONCURRENCY,
};

use crate::error::{NodemapError, NodemapResult};
use crate::fsutil::write_atomic;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Locates, loads and writes the configuration file
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// `~/.config/nodemap/config.toml` or the platform equivalent
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nodemap")
            .join("config.toml")
    }

    /// Load and check the configuration; a missing file means defaults
    pub async fn load(&self) -> NodemapResult<Config> {
        match fs::read_to_string(&self.config_path).await {
            Ok(text) => self.parse(&text),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No config at {}, using defaults", self.config_path.display());
                Ok(Config::default())
            }
            Err(e) => Err(NodemapError::io(
                format!("reading config from {}", self.config_path.display()),
                e,
            )),
        }
    }

    fn parse(&self, text: &str) -> NodemapResult<Config> {
        let mut config: Config = toml::from_str(text).map_err(|e| self.invalid(e.to_string()))?;
        if let Some(base) = self.config_path.parent() {
            config.paths.anchor(base);
        }

        let problems = config.problems();
        if !problems.is_empty() {
            return Err(self.invalid(problems.join("; ")));
        }
        Ok(config)
    }

    fn invalid(&self, reason: String) -> NodemapError {
        NodemapError::ConfigInvalid {
            path: self.config_path.clone(),
            reason,
        }
    }

    /// Write `config`, replacing any existing file
    pub async fn save(&self, config: &Config) -> NodemapResult<()> {
        let content = toml::to_string_pretty(config)?;
        write_atomic(&self.config_path, content.as_bytes()).await?;
        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Create the data directory before a run writes into it
    pub async fn ensure_data_dir(config: &Config) -> NodemapResult<()> {
        let dir = config.paths.data_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| NodemapError::io(format!("creating directory {}", dir.display()), e))
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}
