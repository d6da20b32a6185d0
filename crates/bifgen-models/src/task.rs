//! Tasks: one media item's processing attempts within a job.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{FailureKind, JobId, MediaItem};

/// A task may be attempted at most twice: once accelerated, once on the
/// fallback queue.
pub const MAX_ATTEMPTS: u32 = 2;

/// Unique identifier for a task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task lifecycle state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum TaskState {
    /// Waiting in a queue
    #[default]
    Queued,
    /// Handed to a worker, not yet running
    Assigned { worker: usize },
    /// The worker is driving the pipeline
    Running { worker: usize },
    /// Index artifact written
    Succeeded,
    /// Attempts exhausted or terminal failure
    Failed,
    /// Bounced off an accelerator, waiting on the fallback queue
    RequeuedFallback,
}

impl TaskState {
    /// Terminal states receive no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }
}

/// Mutable scheduling unit: one media item bound to one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier
    pub id: TaskId,
    /// Owning job
    pub job_id: JobId,
    /// The item to process
    pub item: MediaItem,
    /// Current lifecycle state
    pub state: TaskState,
    /// Attempts consumed so far (capped at [`MAX_ATTEMPTS`])
    pub attempts: u32,
    /// Failure kind of the most recent failed attempt
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<FailureKind>,
    /// Output artifact path once succeeded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl Task {
    /// Create a queued task for an item.
    pub fn new(job_id: JobId, item: MediaItem) -> Self {
        Self {
            id: TaskId::new(),
            job_id,
            item,
            state: TaskState::Queued,
            attempts: 0,
            last_error: None,
            artifact: None,
        }
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.attempts < MAX_ATTEMPTS
    }

    /// Record a successful attempt and the artifact it produced.
    pub fn succeed(&mut self, artifact: PathBuf) {
        self.state = TaskState::Succeeded;
        self.artifact = Some(artifact);
    }

    /// Record a terminal failure.
    pub fn fail(&mut self, kind: FailureKind) {
        self.state = TaskState::Failed;
        self.last_error = Some(kind);
    }

    /// Record a fallback requeue after an accelerator rejection.
    pub fn requeue(&mut self, kind: FailureKind) {
        self.state = TaskState::RequeuedFallback;
        self.last_error = Some(kind);
    }
}
