//! Progress events emitted by the worker pool.
//!
//! Both the interactive console and the remote feed consume these; the
//! dispatch loop does not know which is attached.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::{FailureKind, JobId, TaskId};

/// Per-task lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A worker picked up the task
    Started {
        task_id: TaskId,
        job_id: JobId,
        worker: usize,
        title: String,
    },

    /// FFmpeg progress tick
    Progress {
        task_id: TaskId,
        job_id: JobId,
        worker: usize,
        /// Percent of the source duration decoded (0-100)
        percent: u8,
        /// Decode speed relative to realtime (e.g. 8.5 = 8.5x)
        speed: f64,
        /// Estimated seconds remaining for this task
        #[serde(skip_serializing_if = "Option::is_none")]
        eta_seconds: Option<f64>,
    },

    /// Index artifact written
    Succeeded {
        task_id: TaskId,
        job_id: JobId,
        artifact: PathBuf,
    },

    /// Attempts exhausted or terminal failure
    Failed {
        task_id: TaskId,
        job_id: JobId,
        kind: FailureKind,
        /// Original media path so a human can act on the failure
        path: PathBuf,
    },

    /// Bounced off an accelerator onto the fallback queue
    Requeued {
        task_id: TaskId,
        job_id: JobId,
        kind: FailureKind,
    },
}

impl TaskEvent {
    /// The task this event belongs to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Started { task_id, .. }
            | TaskEvent::Progress { task_id, .. }
            | TaskEvent::Succeeded { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Requeued { task_id, .. } => task_id,
        }
    }
}

/// Per-job lifecycle event.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobEvent {
    /// The pool started draining this job
    Started {
        job_id: JobId,
        total: usize,
        timestamp: DateTime<Utc>,
    },

    /// Every task succeeded
    Completed {
        job_id: JobId,
        succeeded: usize,
        timestamp: DateTime<Utc>,
    },

    /// At least one task failed terminally
    Failed {
        job_id: JobId,
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },

    /// Cancelled before all tasks finished
    Cancelled {
        job_id: JobId,
        succeeded: usize,
        failed: usize,
        timestamp: DateTime<Utc>,
    },
}

impl JobEvent {
    /// The job this event belongs to.
    pub fn job_id(&self) -> &JobId {
        match self {
            JobEvent::Started { job_id, .. }
            | JobEvent::Completed { job_id, .. }
            | JobEvent::Failed { job_id, .. }
            | JobEvent::Cancelled { job_id, .. } => job_id,
        }
    }
}
