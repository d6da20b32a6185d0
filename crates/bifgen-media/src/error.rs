//! Error types for media operations.

use std::path::PathBuf;
use thiserror::Error;

use bifgen_models::FailureKind;

/// Result type for extraction-pipeline operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Result type for BIF encoding/decoding.
pub type BifResult<T> = Result<T, BifError>;

/// Errors that can occur while driving FFmpeg.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("FFmpeg not found in PATH")]
    FfmpegNotFound,

    #[error("accelerator cannot decode this source: {detail}")]
    AcceleratorUnsupported { detail: String },

    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),

    #[error("FFmpeg timed out after {0} seconds")]
    Timeout(u64),

    #[error("FFmpeg exited with status {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    #[error("FFmpeg finished but produced no frames")]
    EmptyOutput,

    #[error("operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    /// Map to the scheduler-facing failure taxonomy.
    ///
    /// A cancelled run surfaces as a crash-class failure so the task
    /// reaches a terminal state; the scheduler already knows the pool is
    /// shutting down.
    pub fn failure_kind(&self) -> FailureKind {
        match self {
            MediaError::AcceleratorUnsupported { .. } => FailureKind::AcceleratorUnsupported,
            MediaError::SourceNotFound(_) => FailureKind::SourceNotFound,
            MediaError::Timeout(_) => FailureKind::ProcessTimeout,
            MediaError::NonZeroExit { .. } => FailureKind::NonZeroExit,
            MediaError::EmptyOutput => FailureKind::EmptyOutput,
            MediaError::FfmpegNotFound | MediaError::Cancelled | MediaError::Io(_) => {
                FailureKind::ProcessCrash
            }
        }
    }
}

/// Errors from the BIF index encoder/decoder.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BifError {
    #[error("cannot encode an empty frame set")]
    EmptyFrameSet,

    #[error("timestamp decreases at frame {index}")]
    NonMonotonicTimestamps { index: usize },

    #[error("not a BIF file: bad magic")]
    BadMagic,

    #[error("unsupported BIF version {0}")]
    UnsupportedVersion(u32),

    #[error("BIF header declares zero frames")]
    ZeroFrameCount,

    #[error("BIF data truncated")]
    Truncated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_kind_mapping() {
        assert_eq!(
            MediaError::AcceleratorUnsupported {
                detail: "no decoder".into()
            }
            .failure_kind(),
            FailureKind::AcceleratorUnsupported
        );
        assert_eq!(
            MediaError::SourceNotFound("/missing.mkv".into()).failure_kind(),
            FailureKind::SourceNotFound
        );
        assert_eq!(
            MediaError::Timeout(600).failure_kind(),
            FailureKind::ProcessTimeout
        );
        assert_eq!(
            MediaError::EmptyOutput.failure_kind(),
            FailureKind::EmptyOutput
        );
    }
}
