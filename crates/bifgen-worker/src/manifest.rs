//! Load the item manifest the catalog collaborator exported.
//!
//! The manifest is a JSON array of media items; `duration_ms` and
//! `codec` are optional hints.

use std::path::Path;

use bifgen_models::MediaItem;

use crate::error::{WorkerError, WorkerResult};

pub async fn load_manifest(path: &Path) -> WorkerResult<Vec<MediaItem>> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|source| WorkerError::ManifestRead {
            path: path.display().to_string(),
            source,
        })?;

    serde_json::from_slice(&bytes).map_err(|source| WorkerError::ManifestParse {
        path: path.display().to_string(),
        source,
    })
}
