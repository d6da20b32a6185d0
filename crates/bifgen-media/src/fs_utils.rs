//! Filesystem utilities for atomic artifact writes and scratch cleanup.

use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Write `bytes` to `path` atomically: write a sibling temp file, then
/// rename into place. A reader never observes a partially written file.
///
/// The parent directory is created if needed. The temp file is cleaned up
/// if the rename fails.
pub async fn atomic_write(path: impl AsRef<Path>, bytes: &[u8]) -> MediaResult<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    // Sibling temp path keeps the rename on one filesystem.
    let tmp = path.with_extension("tmp");

    fs::write(&tmp, bytes).await?;

    fs::rename(&tmp, path).await.map_err(|e| {
        let _ = std::fs::remove_file(&tmp);
        tracing::error!(
            "Failed to rename temp file into place: {} -> {}: {}",
            tmp.display(),
            path.display(),
            e
        );
        MediaError::from(e)
    })?;

    Ok(())
}

/// Remove a scratch directory, logging but not propagating failure.
/// Scratch cleanup must never turn a finished task into a failed one.
pub async fn remove_scratch(dir: impl AsRef<Path>) {
    let dir = dir.as_ref();
    if let Err(e) = fs::remove_dir_all(dir).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!("Failed to clean up scratch dir {}: {}", dir.display(), e);
        }
    }
}
