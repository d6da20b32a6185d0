//! Worker slots: persistent execution units bound to one capability.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use bifgen_media::{artifact_path, bif, fs_utils, MediaError};
use bifgen_models::{Capability, FailureKind, Task, TaskEvent, TaskState};

use crate::config::PoolConfig;
use crate::pipeline::{ExtractionPipeline, PipelineProgress};
use crate::progress::{ProgressSink, ProgressTracker};
use crate::queue::TaskQueues;

/// One worker slot, bound 1:1 to a capability for the pool's lifetime.
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    /// Slot index, stable for the pool's lifetime
    pub id: usize,
    /// The hardware this slot decodes with
    pub capability: Capability,
}

/// Everything a worker loop shares with the rest of the pool.
#[derive(Clone)]
pub(crate) struct WorkerContext {
    pub queues: Arc<TaskQueues>,
    pub tracker: Arc<ProgressTracker>,
    pub pipeline: Arc<dyn ExtractionPipeline>,
    pub config: Arc<PoolConfig>,
    pub sink: Arc<dyn ProgressSink>,
    pub cancel_rx: watch::Receiver<bool>,
}

/// Long-lived loop for one slot: pull, process, repeat until the queues
/// close. A crash while processing costs the task, never the slot.
pub(crate) async fn run_worker(slot: WorkerSlot, ctx: WorkerContext) {
    debug!(worker = slot.id, capability = %slot.capability, "Worker started");

    while let Some(task) = ctx.queues.pull(slot.capability.kind).await {
        process_task(&slot, &ctx, task).await;

        // Completion is judged on terminal-state counts, not on queue
        // emptiness: a fallback requeue can leave the queues transiently
        // empty with work still outstanding.
        if ctx.tracker.is_drained() {
            ctx.queues.close();
        }
    }

    debug!(worker = slot.id, "Worker stopped");
}

async fn process_task(slot: &WorkerSlot, ctx: &WorkerContext, mut task: Task) {
    task.attempts += 1;
    task.state = TaskState::Running { worker: slot.id };

    ctx.tracker
        .record_started(slot.id, slot.capability.kind, &task.item.title);
    ctx.sink.on_task_event(&TaskEvent::Started {
        task_id: task.id.clone(),
        job_id: task.job_id.clone(),
        worker: slot.id,
        title: task.item.title.clone(),
    });

    let scratch = ctx.config.scratch_root.join(task.id.as_str());
    let result = run_pipeline(slot, ctx, &task, &scratch).await;

    // Scratch space goes away on success and failure alike.
    fs_utils::remove_scratch(&scratch).await;

    match result {
        Ok(frames) => finish_success(slot, ctx, task, &frames).await,
        Err(e) => finish_failure(slot, ctx, task, e),
    }
}

/// Drive the pipeline inside its own tokio task so a panic is absorbed
/// as a crash-class task failure and the slot stays usable.
async fn run_pipeline(
    slot: &WorkerSlot,
    ctx: &WorkerContext,
    task: &Task,
    scratch: &std::path::Path,
) -> Result<bif::FrameSet, MediaError> {
    let pipeline = Arc::clone(&ctx.pipeline);
    let item = task.item.clone();
    let capability = slot.capability.clone();
    let options = ctx.config.extract.clone();
    let cancel = ctx.cancel_rx.clone();
    let scratch = scratch.to_path_buf();
    let progress = progress_callback(slot, ctx, task);

    let handle = tokio::spawn(async move {
        pipeline
            .extract(&item, &capability, &scratch, &options, progress, cancel)
            .await
    });

    match handle.await {
        Ok(result) => result,
        Err(join_err) => {
            error!(
                worker = slot.id,
                task = %task.id,
                "Worker crashed while processing: {join_err}"
            );
            Err(MediaError::Io(std::io::Error::other(
                "pipeline task aborted unexpectedly",
            )))
        }
    }
}

/// Build the per-run progress callback relaying FFmpeg ticks to the
/// tracker and the sink.
fn progress_callback(slot: &WorkerSlot, ctx: &WorkerContext, task: &Task) -> PipelineProgress {
    let tracker = Arc::clone(&ctx.tracker);
    let sink = Arc::clone(&ctx.sink);
    let task_id = task.id.clone();
    let job_id = task.job_id.clone();
    let worker = slot.id;
    let duration_ms = task.item.duration_ms.unwrap_or(0);

    Box::new(move |progress| {
        let percent = progress.percentage(duration_ms) as u8;
        tracker.record_progress(worker, percent);
        sink.on_task_event(&TaskEvent::Progress {
            task_id: task_id.clone(),
            job_id: job_id.clone(),
            worker,
            percent,
            speed: progress.speed,
            eta_seconds: progress.eta_seconds(duration_ms),
        });
    })
}

async fn finish_success(slot: &WorkerSlot, ctx: &WorkerContext, mut task: Task, frames: &bif::FrameSet) {
    let encoded = match bif::encode(frames) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(task = %task.id, "Index encoder refused frame set: {e}");
            fail_task(slot, ctx, task, FailureKind::EncodeFailure);
            return;
        }
    };

    let path = artifact_path(&ctx.config.output_root, &task.item.key);
    if let Err(e) = bif::write_artifact(&path, &encoded).await {
        error!(task = %task.id, "Failed to write artifact: {e}");
        fail_task(slot, ctx, task, e.failure_kind());
        return;
    }

    info!(
        worker = slot.id,
        task = %task.id,
        artifact = %path.display(),
        frames = frames.len(),
        "Task succeeded"
    );

    task.succeed(path.clone());
    ctx.tracker.record_succeeded(slot.id);
    ctx.sink.on_task_event(&TaskEvent::Succeeded {
        task_id: task.id.clone(),
        job_id: task.job_id.clone(),
        artifact: path,
    });
}

fn finish_failure(slot: &WorkerSlot, ctx: &WorkerContext, mut task: Task, error: MediaError) {
    let kind = error.failure_kind();
    let cancelled = *ctx.cancel_rx.borrow();

    if kind.is_fallback_eligible() && task.can_retry() && !cancelled {
        info!(
            worker = slot.id,
            task = %task.id,
            "Accelerator rejected source, requeueing for software decode: {error}"
        );
        task.requeue(kind);
        ctx.tracker.record_requeued(slot.id);
        ctx.sink.on_task_event(&TaskEvent::Requeued {
            task_id: task.id.clone(),
            job_id: task.job_id.clone(),
            kind,
        });
        ctx.queues.push_fallback(task);
        return;
    }

    warn!(
        worker = slot.id,
        task = %task.id,
        path = %task.item.path.display(),
        kind = %kind,
        "Task failed: {error}"
    );
    fail_task(slot, ctx, task, kind);
}

fn fail_task(slot: &WorkerSlot, ctx: &WorkerContext, mut task: Task, kind: FailureKind) {
    task.fail(kind);
    ctx.tracker.record_failed(slot.id);
    ctx.sink.on_task_event(&TaskEvent::Failed {
        task_id: task.id.clone(),
        job_id: task.job_id.clone(),
        kind,
        path: task.item.path.clone(),
    });
}
