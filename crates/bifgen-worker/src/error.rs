//! Errors surfaced while bringing the worker up.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// -q:v outside the useful JPEG range.
    #[error("thumbnail quality {0} out of range (2-6)")]
    InvalidQuality(u8),

    #[error("sampling interval must be at least 1 second, got {0}")]
    InvalidInterval(u64),

    #[error("unknown accelerator '{0}' in BIFGEN_ACCEL")]
    UnknownAccel(String),

    #[error("failed to read manifest {path}: {source}")]
    ManifestRead {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse manifest {path}: {source}")]
    ManifestParse {
        path: String,
        source: serde_json::Error,
    },
}
