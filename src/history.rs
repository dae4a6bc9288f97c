//! Run history
//!
//! Appends one JSON line per pipeline run to `history.jsonl` in the data
//! directory. Failures to write are logged and otherwise ignored.

use crate::config::Config;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;
use tracing::warn;
use uuid::Uuid;

/// Summary of one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunRecord {
    pub run_id: Uuid,
    pub command: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub success: bool,
    pub packages_cached: usize,
    pub items_fetched: usize,
    pub items_failed: usize,
    pub cancelled: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub signatures: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_mappings: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunRecord {
    pub fn start(command: &str, now: DateTime<Utc>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            command: command.to_string(),
            started_at: now,
            finished_at: now,
            ..Default::default()
        }
    }
}

/// Append-only JSON lines log of pipeline runs
pub struct RunHistory {
    enabled: bool,
    path: PathBuf,
}

impl RunHistory {
    pub fn new(config: &Config) -> Self {
        Self {
            enabled: config.general.history_log,
            path: config.paths.history_path(),
        }
    }

    pub async fn record(&self, run: &RunRecord) {
        if !self.enabled {
            return;
        }

        let mut line = match serde_json::to_string(run) {
            Ok(s) => s,
            Err(e) => {
                warn!("Failed to serialize run record: {}", e);
                return;
            }
        };
        line.push('\n');

        if let Err(e) = self.append(&line).await {
            warn!("Failed to write run history {}: {}", self.path.display(), e);
        }
    }

    async fn append(&self, line: &str) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;

        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn history(dir: &TempDir, enabled: bool) -> RunHistory {
        RunHistory {
            enabled,
            path: dir.path().join("nested").join("history.jsonl"),
        }
    }

    fn run() -> RunRecord {
        let now = Utc.with_ymd_and_hms(2025, 2, 2, 2, 2, 2).unwrap();
        let mut run = RunRecord::start("update", now);
        run.success = true;
        run.signatures = Some(12);
        run
    }

    #[tokio::test]
    async fn appends_json_lines() {
        let dir = TempDir::new().unwrap();
        let log = history(&dir, true);

        log.record(&run()).await;
        log.record(&run()).await;

        let content = tokio::fs::read_to_string(&log.path).await.unwrap();
        let lines: Vec<&str> = content.trim().lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["command"], "update");
        assert_eq!(parsed["signatures"], 12);
        assert!(parsed.get("error").is_none());
        assert_ne!(lines[0], lines[1]);
    }

    #[tokio::test]
    async fn skips_when_disabled() {
        let dir = TempDir::new().unwrap();
        let log = history(&dir, false);
        log.record(&run()).await;
        assert!(!log.path.exists());
    }

    #[tokio::test]
    async fn unwritable_path_is_not_fatal() {
        let dir = TempDir::new().unwrap();
        let log = RunHistory {
            enabled: true,
            path: dir.path().to_path_buf(),
        };
        log.record(&run()).await;
    }
}
