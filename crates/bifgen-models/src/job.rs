//! Jobs: batches of tasks created from one catalog selection.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Job lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Created, not yet submitted to the pool
    #[default]
    Pending,
    /// The pool is draining this job's tasks
    Running,
    /// Every task succeeded
    Completed,
    /// At least one task exhausted its attempts
    Failed,
    /// Cancelled before all tasks finished
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Aggregate task counts for a job.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobCounts {
    /// Tasks created for this job
    pub total: usize,
    /// Tasks that wrote an artifact
    pub succeeded: usize,
    /// Tasks that exhausted their attempts
    pub failed: usize,
    /// Tasks currently running on a worker
    pub in_flight: usize,
}

impl JobCounts {
    /// All tasks have reached a terminal state.
    pub fn is_drained(&self) -> bool {
        self.succeeded + self.failed == self.total
    }

    /// Terminal status derived purely from the counts. `None` while tasks
    /// remain outstanding.
    pub fn terminal_status(&self) -> Option<JobStatus> {
        if !self.is_drained() {
            return None;
        }
        if self.failed > 0 {
            Some(JobStatus::Failed)
        } else {
            Some(JobStatus::Completed)
        }
    }
}

/// A batch of tasks created together from one catalog selection.
///
/// Status is always computed from task terminal counts plus the
/// cancellation flag, never tracked separately.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job identifier
    pub id: JobId,
    /// When the job was created
    pub created_at: DateTime<Utc>,
    /// Current status
    pub status: JobStatus,
    /// Aggregate task counts
    pub counts: JobCounts,
}

impl Job {
    /// Create a pending job over `total` tasks.
    pub fn new(total: usize) -> Self {
        Self {
            id: JobId::new(),
            created_at: Utc::now(),
            status: JobStatus::Pending,
            counts: JobCounts {
                total,
                ..JobCounts::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_status_from_counts() {
        let mut counts = JobCounts {
            total: 3,
            ..JobCounts::default()
        };
        assert_eq!(counts.terminal_status(), None);

        counts.succeeded = 3;
        assert_eq!(counts.terminal_status(), Some(JobStatus::Completed));

        counts.succeeded = 2;
        counts.failed = 1;
        assert_eq!(counts.terminal_status(), Some(JobStatus::Failed));
    }

    #[test]
    fn test_completed_and_failed_are_exclusive() {
        // Drained counts always map to exactly one terminal status.
        for failed in 0..=3usize {
            let counts = JobCounts {
                total: 3,
                succeeded: 3 - failed,
                failed,
                in_flight: 0,
            };
            let status = counts.terminal_status().unwrap();
            if failed == 0 {
                assert_eq!(status, JobStatus::Completed);
            } else {
                assert_eq!(status, JobStatus::Failed);
            }
        }
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
    }
}
