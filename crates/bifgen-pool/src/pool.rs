//! The worker pool: fixed slots, shared queues, one job at a time.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

use bifgen_models::{Capability, JobCounts, ProgressSnapshot, Task};

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::pipeline::ExtractionPipeline;
use crate::progress::{ProgressSink, ProgressTracker};
use crate::queue::TaskQueues;
use crate::worker::{run_worker, WorkerContext, WorkerSlot};

/// A fixed-size pool of worker slots draining the task queues.
///
/// Slot count and capability assignment are decided at construction and
/// never change. Accelerated slots are dealt round-robin over the probed
/// capabilities; with no accelerated capability every slot decodes in
/// software.
pub struct WorkerPool {
    slots: Vec<WorkerSlot>,
    queues: Arc<TaskQueues>,
    tracker: Arc<ProgressTracker>,
    pipeline: Arc<dyn ExtractionPipeline>,
    config: Arc<PoolConfig>,
    cancel_tx: watch::Sender<bool>,
}

impl WorkerPool {
    /// Build a pool from the probed capabilities and config.
    ///
    /// Fails fast with [`PoolError::NoWorkers`] when the config asks for
    /// zero slots.
    pub fn new(
        capabilities: &[Capability],
        config: PoolConfig,
        pipeline: Arc<dyn ExtractionPipeline>,
    ) -> PoolResult<Self> {
        if config.total_workers() == 0 {
            return Err(PoolError::NoWorkers);
        }

        let accelerated: Vec<&Capability> =
            capabilities.iter().filter(|c| c.is_accelerated()).collect();
        if accelerated.is_empty() && config.gpu_workers > 0 {
            warn!(
                slots = config.gpu_workers,
                "No accelerated capability probed, accelerated slots will decode in software"
            );
        }

        let mut slots = Vec::with_capacity(config.total_workers());
        for i in 0..config.gpu_workers {
            let capability = if accelerated.is_empty() {
                Capability::cpu()
            } else {
                accelerated[i % accelerated.len()].clone()
            };
            slots.push(WorkerSlot {
                id: slots.len(),
                capability,
            });
        }
        for _ in 0..config.cpu_workers {
            slots.push(WorkerSlot {
                id: slots.len(),
                capability: Capability::cpu(),
            });
        }

        let has_cpu_workers = slots.iter().any(|s| !s.capability.is_accelerated());
        let (cancel_tx, _) = watch::channel(false);

        info!(
            workers = slots.len(),
            accelerated = slots.iter().filter(|s| s.capability.is_accelerated()).count(),
            "Worker pool built"
        );

        Ok(Self {
            slots,
            queues: Arc::new(TaskQueues::new(has_cpu_workers)),
            tracker: Arc::new(ProgressTracker::new()),
            pipeline,
            config: Arc::new(config),
            cancel_tx,
        })
    }

    /// Enqueue a batch of tasks in submission order.
    pub fn submit(&self, tasks: Vec<Task>) {
        if tasks.is_empty() {
            return;
        }
        self.tracker.record_submitted(tasks.len());
        self.queues.push_batch(tasks);
    }

    /// Drain the queues with every slot, returning the final counts once
    /// all submitted tasks are terminal (or the pool was cancelled).
    pub async fn run(&self, sink: Arc<dyn ProgressSink>) -> JobCounts {
        // A batch of zero tasks completes immediately.
        if self.tracker.is_drained() {
            self.queues.close();
        }

        let mut handles = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            let ctx = WorkerContext {
                queues: Arc::clone(&self.queues),
                tracker: Arc::clone(&self.tracker),
                pipeline: Arc::clone(&self.pipeline),
                config: Arc::clone(&self.config),
                sink: Arc::clone(&sink),
                cancel_rx: self.cancel_tx.subscribe(),
            };
            handles.push(tokio::spawn(run_worker(slot.clone(), ctx)));
        }

        for handle in handles {
            // run_worker absorbs processing panics itself.
            let _ = handle.await;
        }

        self.tracker.counts()
    }

    /// Stop the pool: queued tasks never start, in-flight runs are told
    /// to wind down. Idempotent.
    pub fn cancel(&self) {
        let _ = self.cancel_tx.send(true);
        self.queues.close();
    }

    /// Whether [`cancel`](Self::cancel) has been called.
    pub fn is_cancelled(&self) -> bool {
        *self.cancel_tx.borrow()
    }

    /// Aggregate progress with rate and ETA.
    pub fn progress(&self) -> ProgressSnapshot {
        self.tracker.snapshot()
    }

    /// Current counts.
    pub fn counts(&self) -> JobCounts {
        self.tracker.counts()
    }

    /// Slot capabilities, in slot-id order.
    pub fn capabilities(&self) -> Vec<Capability> {
        self.slots.iter().map(|s| s.capability.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::FfmpegPipeline;
    use bifgen_models::AccelKind;

    fn config(gpu: usize, cpu: usize) -> PoolConfig {
        PoolConfig {
            gpu_workers: gpu,
            cpu_workers: cpu,
            ..Default::default()
        }
    }

    #[test]
    fn test_zero_workers_rejected() {
        let result = WorkerPool::new(&[], config(0, 0), Arc::new(FfmpegPipeline));
        assert!(matches!(result, Err(PoolError::NoWorkers)));
    }

    #[test]
    fn test_round_robin_capability_assignment() {
        let caps = vec![
            Capability::accelerated(AccelKind::Cuda, None),
            Capability::accelerated(AccelKind::Vaapi, Some("/dev/dri/renderD128".into())),
        ];
        let pool = WorkerPool::new(&caps, config(3, 1), Arc::new(FfmpegPipeline)).unwrap();

        let kinds: Vec<AccelKind> = pool.capabilities().iter().map(|c| c.kind).collect();
        assert_eq!(
            kinds,
            vec![
                AccelKind::Cuda,
                AccelKind::Vaapi,
                AccelKind::Cuda,
                AccelKind::Cpu
            ]
        );
    }

    #[test]
    fn test_no_accelerators_degrades_to_software() {
        let pool = WorkerPool::new(&[], config(2, 0), Arc::new(FfmpegPipeline)).unwrap();
        assert!(pool.capabilities().iter().all(|c| !c.is_accelerated()));
    }

    #[test]
    fn test_cpu_capability_entries_ignored_for_gpu_slots() {
        // A probe may report the software fallback as a capability; it
        // must not occupy an accelerated slot round-robin position.
        let caps = vec![
            Capability::cpu(),
            Capability::accelerated(AccelKind::Cuda, None),
        ];
        let pool = WorkerPool::new(&caps, config(2, 0), Arc::new(FfmpegPipeline)).unwrap();
        assert!(pool.capabilities().iter().all(|c| c.kind == AccelKind::Cuda));
    }

    #[tokio::test]
    async fn test_empty_batch_run_returns_immediately() {
        let pool = WorkerPool::new(&[], config(0, 2), Arc::new(FfmpegPipeline)).unwrap();
        let counts = pool.run(Arc::new(crate::progress::NullSink)).await;
        assert_eq!(counts, JobCounts::default());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let pool = WorkerPool::new(&[], config(0, 1), Arc::new(FfmpegPipeline)).unwrap();
        assert!(!pool.is_cancelled());
        pool.cancel();
        pool.cancel();
        assert!(pool.is_cancelled());
    }
}
