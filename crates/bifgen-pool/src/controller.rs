//! Job lifecycle: planning, dispatch, cancellation, final status.

use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info};

use bifgen_media::artifact_path;
use bifgen_models::{
    Capability, Job, JobEvent, JobId, JobStatus, MediaItem, ProgressSnapshot, Task,
};

use crate::config::PoolConfig;
use crate::error::{PoolError, PoolResult};
use crate::pipeline::ExtractionPipeline;
use crate::pool::WorkerPool;
use crate::progress::ProgressSink;

struct ActiveJob {
    id: JobId,
    pool: Arc<WorkerPool>,
}

/// Owns job lifecycle end to end: plans a batch from catalog items,
/// drives one pool per job, and derives the final status from task
/// counts plus the cancellation flag.
pub struct JobController {
    capabilities: Vec<Capability>,
    config: PoolConfig,
    pipeline: Arc<dyn ExtractionPipeline>,
    sink: Arc<dyn ProgressSink>,
    active: Mutex<Option<ActiveJob>>,
}

/// What a planning pass decided for one batch.
#[derive(Debug)]
pub struct JobPlan {
    pub job: Job,
    pub tasks: Vec<Task>,
    /// Items skipped because their artifact already exists
    pub skipped: usize,
}

impl JobController {
    pub fn new(
        capabilities: Vec<Capability>,
        config: PoolConfig,
        pipeline: Arc<dyn ExtractionPipeline>,
        sink: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            capabilities,
            config,
            pipeline,
            sink,
            active: Mutex::new(None),
        }
    }

    /// Plan a job over `items`: one task per item, minus the items whose
    /// artifact already exists (unless regeneration is on).
    pub fn plan_job(&self, items: &[MediaItem]) -> JobPlan {
        let mut tasks = Vec::with_capacity(items.len());
        let mut skipped = 0;
        let job = Job::new(0);

        for item in items {
            let artifact = artifact_path(&self.config.output_root, &item.key);
            if !self.config.regenerate && artifact.is_file() {
                debug!(item = %item.key, artifact = %artifact.display(), "Artifact exists, skipping");
                skipped += 1;
                continue;
            }
            tasks.push(Task::new(job.id.clone(), item.clone()));
        }

        let mut job = job;
        job.counts.total = tasks.len();

        info!(
            job = %job.id,
            tasks = tasks.len(),
            skipped,
            "Job planned"
        );

        JobPlan { job, tasks, skipped }
    }

    /// Run one batch to completion and return the finished job.
    ///
    /// The final status comes from the counts: `Completed` when every
    /// task succeeded, `Failed` when at least one failed terminally, and
    /// `Cancelled` when the run was stopped with tasks outstanding.
    pub async fn run_job(&self, items: &[MediaItem]) -> PoolResult<Job> {
        let JobPlan { mut job, tasks, .. } = self.plan_job(items);

        let pool = Arc::new(WorkerPool::new(
            &self.capabilities,
            self.config.clone(),
            Arc::clone(&self.pipeline),
        )?);

        {
            let mut active = self.active.lock().expect("active job lock");
            *active = Some(ActiveJob {
                id: job.id.clone(),
                pool: Arc::clone(&pool),
            });
        }

        job.status = JobStatus::Running;
        self.sink.on_job_event(&JobEvent::Started {
            job_id: job.id.clone(),
            total: tasks.len(),
            timestamp: Utc::now(),
        });

        pool.submit(tasks);
        let counts = pool.run(Arc::clone(&self.sink)).await;

        {
            let mut active = self.active.lock().expect("active job lock");
            *active = None;
        }

        job.counts = counts;
        job.status = match counts.terminal_status() {
            Some(status) => status,
            // Cancelled with queued tasks that never started.
            None => JobStatus::Cancelled,
        };

        let timestamp = Utc::now();
        let event = match job.status {
            JobStatus::Completed => JobEvent::Completed {
                job_id: job.id.clone(),
                succeeded: counts.succeeded,
                timestamp,
            },
            JobStatus::Failed => JobEvent::Failed {
                job_id: job.id.clone(),
                succeeded: counts.succeeded,
                failed: counts.failed,
                timestamp,
            },
            _ => JobEvent::Cancelled {
                job_id: job.id.clone(),
                succeeded: counts.succeeded,
                failed: counts.failed,
                timestamp,
            },
        };
        self.sink.on_job_event(&event);

        info!(
            job = %job.id,
            status = %job.status,
            succeeded = counts.succeeded,
            failed = counts.failed,
            "Job finished"
        );

        Ok(job)
    }

    /// Cancel the named job if it is the one currently running.
    pub fn cancel_job(&self, job_id: &JobId) -> PoolResult<()> {
        let active = self.active.lock().expect("active job lock");
        match active.as_ref() {
            Some(job) if &job.id == job_id => {
                job.pool.cancel();
                Ok(())
            }
            _ => Err(PoolError::UnknownJob(job_id.clone())),
        }
    }

    /// Cancel whatever job is running, if any.
    pub fn cancel_current(&self) {
        if let Some(job) = self.active.lock().expect("active job lock").as_ref() {
            job.pool.cancel();
        }
    }

    /// Snapshot of the running job's progress, if one is running.
    pub fn progress(&self) -> Option<ProgressSnapshot> {
        self.active
            .lock()
            .expect("active job lock")
            .as_ref()
            .map(|job| job.pool.progress())
    }

    /// Snapshot for a specific job; errs when that job is not running.
    pub fn progress_for(&self, job_id: &JobId) -> PoolResult<ProgressSnapshot> {
        let active = self.active.lock().expect("active job lock");
        match active.as_ref() {
            Some(job) if &job.id == job_id => Ok(job.pool.progress()),
            _ => Err(PoolError::UnknownJob(job_id.clone())),
        }
    }
}
