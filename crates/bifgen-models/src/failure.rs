//! Failure taxonomy shared between the extraction pipeline and the
//! scheduler.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a task attempt failed.
///
/// Only `AcceleratorUnsupported` is worth a second attempt: the same
/// source on a software decoder usually succeeds. Everything else is
/// terminal after the attempt that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The accelerator cannot decode this codec/profile
    AcceleratorUnsupported,
    /// Source file missing, almost always a path-mapping problem
    SourceNotFound,
    /// The external process exceeded the per-task timeout
    ProcessTimeout,
    /// The external process exited non-zero
    NonZeroExit,
    /// The external process (or the worker driving it) died unexpectedly
    ProcessCrash,
    /// The run finished but produced zero frames
    EmptyOutput,
    /// The index encoder refused the frame set
    EncodeFailure,
}

impl FailureKind {
    /// Whether this failure routes the task to the fallback queue.
    pub fn is_fallback_eligible(&self) -> bool {
        matches!(self, FailureKind::AcceleratorUnsupported)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::AcceleratorUnsupported => "accelerator_unsupported",
            FailureKind::SourceNotFound => "source_not_found",
            FailureKind::ProcessTimeout => "process_timeout",
            FailureKind::NonZeroExit => "non_zero_exit",
            FailureKind::ProcessCrash => "process_crash",
            FailureKind::EmptyOutput => "empty_output",
            FailureKind::EncodeFailure => "encode_failure",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_accelerator_unsupported_is_fallback_eligible() {
        assert!(FailureKind::AcceleratorUnsupported.is_fallback_eligible());
        for kind in [
            FailureKind::SourceNotFound,
            FailureKind::ProcessTimeout,
            FailureKind::NonZeroExit,
            FailureKind::ProcessCrash,
            FailureKind::EmptyOutput,
            FailureKind::EncodeFailure,
        ] {
            assert!(!kind.is_fallback_eligible(), "{kind} must be terminal");
        }
    }
}
