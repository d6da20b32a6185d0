//! Error types for the worker pool and job controller.

use thiserror::Error;

use bifgen_models::JobId;

/// Result type for pool operations.
pub type PoolResult<T> = Result<T, PoolError>;

/// Errors from pool construction and job control.
#[derive(Debug, Error)]
pub enum PoolError {
    /// Configuration would start a pool with no worker of any kind.
    /// Fails fast at construction, before any task runs.
    #[error("pool configured with zero workers of any kind")]
    NoWorkers,

    #[error("unknown job: {0}")]
    UnknownJob(JobId),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
