//! Worker-pool scheduler and job controller.
//!
//! This crate provides:
//! - The extraction-pipeline contract the scheduler drives
//! - Primary and fallback task queues with race-free dequeue
//! - Persistent worker slots bound to hardware capabilities
//! - Hardware-to-software fallback routing (one retry, then terminal)
//! - Progress sinks shared by the console and the remote feed
//! - The job controller that owns job lifecycle and aggregate state

pub mod config;
pub mod controller;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod progress;
pub mod queue;
pub mod worker;

pub use config::PoolConfig;
pub use controller::{JobController, JobPlan};
pub use error::{PoolError, PoolResult};
pub use pipeline::{ExtractionPipeline, FfmpegPipeline, PipelineProgress};
pub use pool::WorkerPool;
pub use progress::{ChannelSink, FanoutSink, NullSink, PoolEvent, ProgressSink, ProgressTracker};
pub use queue::TaskQueues;
