//! Shared data models for the bifgen preview engine.
//!
//! This crate provides Serde-serializable types for:
//! - Media items handed over by the catalog collaborator
//! - Hardware capability descriptors
//! - Tasks, jobs and their lifecycle states
//! - Failure taxonomy shared between the pipeline and the scheduler
//! - Progress events and snapshots

pub mod capability;
pub mod event;
pub mod failure;
pub mod job;
pub mod media;
pub mod progress;
pub mod task;

// Re-export common types
pub use capability::{AccelKind, Capability};
pub use event::{JobEvent, TaskEvent};
pub use failure::FailureKind;
pub use job::{Job, JobCounts, JobId, JobStatus};
pub use media::{MediaItem, MediaKey};
pub use progress::{ProgressSnapshot, WorkerActivity};
pub use task::{Task, TaskId, TaskState};
