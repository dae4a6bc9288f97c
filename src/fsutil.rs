//! Crash-safe file replacement

use crate::error::{NodemapError, NodemapResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};
use uuid::Uuid;

/// Replace `path` with `contents` so readers see either the old file or the
/// complete new one.
///
/// The bytes go to a uniquely named sibling, are flushed to disk, and the
/// sibling is renamed over the target. The sibling is removed on failure.
pub async fn write_atomic(path: &Path, contents: &[u8]) -> NodemapResult<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| NodemapError::persist(path, e))?;
    }

    let temp = temp_sibling(path);
    if let Err(e) = write_and_sync(&temp, contents).await {
        discard(&temp).await;
        return Err(NodemapError::persist(path, e));
    }

    if let Err(e) = fs::rename(&temp, path).await {
        discard(&temp).await;
        return Err(NodemapError::persist(path, e));
    }

    debug!(path = %path.display(), bytes = contents.len(), "Persisted file");
    Ok(())
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "nodemap".to_string());
    path.with_file_name(format!(".{}.{}.tmp", name, Uuid::new_v4().simple()))
}

async fn write_and_sync(temp: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut file = fs::File::create(temp).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}

async fn discard(temp: &Path) {
    if let Err(e) = fs::remove_file(temp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Failed to remove temporary file {}: {}", temp.display(), e);
        }
    }
}
