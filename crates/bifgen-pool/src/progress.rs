//! Progress sinks and the shared aggregate tracker.
//!
//! The dispatch loop emits every event through one [`ProgressSink`]
//! handle; whether the other end is an interactive console, a remote
//! feed, or both is not its concern.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::trace;

use bifgen_models::{
    AccelKind, JobCounts, JobEvent, ProgressSnapshot, TaskEvent, WorkerActivity,
};

/// How many recent completions feed the moving-average rate.
const RATE_WINDOW: usize = 10;

/// Observer interface for pool events.
///
/// Implementations must not block: every registered sink receives every
/// event exactly once, and a slow sink must never delay another.
pub trait ProgressSink: Send + Sync {
    fn on_task_event(&self, event: &TaskEvent);
    fn on_job_event(&self, event: &JobEvent);
}

/// Discards everything. Useful in tests and for fire-and-forget runs.
#[derive(Debug, Default)]
pub struct NullSink;

impl ProgressSink for NullSink {
    fn on_task_event(&self, _event: &TaskEvent) {}
    fn on_job_event(&self, _event: &JobEvent) {}
}

/// Delivers every event to each registered sink in order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn ProgressSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register another consumer.
    pub fn with(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sinks.push(sink);
        self
    }
}

impl ProgressSink for FanoutSink {
    fn on_task_event(&self, event: &TaskEvent) {
        for sink in &self.sinks {
            sink.on_task_event(event);
        }
    }

    fn on_job_event(&self, event: &JobEvent) {
        for sink in &self.sinks {
            sink.on_job_event(event);
        }
    }
}

/// One event as seen by a channel consumer.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(tag = "scope", rename_all = "snake_case")]
pub enum PoolEvent {
    Task(TaskEvent),
    Job(JobEvent),
}

/// Forwards events over an unbounded channel to a remote feed. Sending
/// never blocks; once the receiver is gone the events are dropped
/// quietly.
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<PoolEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving half for the feed.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<PoolEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ProgressSink for ChannelSink {
    fn on_task_event(&self, event: &TaskEvent) {
        let _ = self.tx.send(PoolEvent::Task(event.clone()));
    }

    fn on_job_event(&self, event: &JobEvent) {
        let _ = self.tx.send(PoolEvent::Job(event.clone()));
    }
}

struct TrackerState {
    counts: JobCounts,
    active: HashMap<usize, WorkerActivity>,
    /// Completion instants for the moving average, newest last
    completions: Vec<Instant>,
    started_at: Instant,
}

/// Single mutex-guarded aggregate over one job's tasks.
///
/// Worker code never touches the counters directly; every transition
/// goes through one `record_*` entry point, so `succeeded + failed`
/// always converges on `total` no matter how completions interleave.
pub struct ProgressTracker {
    state: Mutex<TrackerState>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                counts: JobCounts::default(),
                active: HashMap::new(),
                completions: Vec::new(),
                started_at: Instant::now(),
            }),
        }
    }

    /// Account for newly submitted tasks.
    pub fn record_submitted(&self, count: usize) {
        self.state.lock().expect("tracker lock").counts.total += count;
    }

    /// A worker picked up a task.
    pub fn record_started(&self, worker_id: usize, kind: AccelKind, item_title: &str) {
        let mut state = self.state.lock().expect("tracker lock");
        state.counts.in_flight += 1;
        state.active.insert(
            worker_id,
            WorkerActivity {
                worker_id,
                kind,
                item_title: item_title.to_string(),
                percent: 0,
            },
        );
    }

    /// Progress tick for a busy worker.
    pub fn record_progress(&self, worker_id: usize, percent: u8) {
        let mut state = self.state.lock().expect("tracker lock");
        if let Some(activity) = state.active.get_mut(&worker_id) {
            activity.percent = percent.min(100);
        }
    }

    /// A task reached `succeeded`.
    pub fn record_succeeded(&self, worker_id: usize) {
        let mut state = self.state.lock().expect("tracker lock");
        state.counts.in_flight = state.counts.in_flight.saturating_sub(1);
        state.counts.succeeded += 1;
        state.active.remove(&worker_id);
        push_completion(&mut state, Instant::now());
    }

    /// A task reached terminal `failed`.
    pub fn record_failed(&self, worker_id: usize) {
        let mut state = self.state.lock().expect("tracker lock");
        state.counts.in_flight = state.counts.in_flight.saturating_sub(1);
        state.counts.failed += 1;
        state.active.remove(&worker_id);
        push_completion(&mut state, Instant::now());
    }

    /// A task bounced back to the fallback queue (not terminal).
    pub fn record_requeued(&self, worker_id: usize) {
        let mut state = self.state.lock().expect("tracker lock");
        state.counts.in_flight = state.counts.in_flight.saturating_sub(1);
        state.active.remove(&worker_id);
    }

    /// Current counts.
    pub fn counts(&self) -> JobCounts {
        self.state.lock().expect("tracker lock").counts
    }

    /// Every task has reached a terminal state.
    pub fn is_drained(&self) -> bool {
        self.counts().is_drained()
    }

    /// Point-in-time snapshot with rate and ETA.
    pub fn snapshot(&self) -> ProgressSnapshot {
        let state = self.state.lock().expect("tracker lock");

        let rate_items_per_min = moving_rate(&state);
        let remaining = state
            .counts
            .total
            .saturating_sub(state.counts.succeeded + state.counts.failed);
        let eta_seconds = if rate_items_per_min > 0.0 && remaining > 0 {
            Some(remaining as f64 / rate_items_per_min * 60.0)
        } else {
            None
        };

        let mut active: Vec<WorkerActivity> = state.active.values().cloned().collect();
        active.sort_by_key(|a| a.worker_id);

        trace!(?eta_seconds, "Progress snapshot taken");

        ProgressSnapshot {
            counts: state.counts,
            active,
            rate_items_per_min,
            eta_seconds,
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn push_completion(state: &mut TrackerState, at: Instant) {
    if state.completions.len() == RATE_WINDOW {
        state.completions.remove(0);
    }
    state.completions.push(at);
}

/// Items per minute over the recent completion window.
fn moving_rate(state: &TrackerState) -> f64 {
    let done = state.completions.len();
    if done == 0 {
        return 0.0;
    }
    let window_start = if done == RATE_WINDOW {
        state.completions[0]
    } else {
        state.started_at
    };
    let elapsed = state
        .completions
        .last()
        .expect("non-empty completions")
        .duration_since(window_start)
        .as_secs_f64();
    if elapsed <= 0.0 {
        return 0.0;
    }
    let counted = if done == RATE_WINDOW { done - 1 } else { done };
    counted as f64 / elapsed * 60.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use bifgen_models::{FailureKind, JobId, TaskId};

    #[test]
    fn test_tracker_counts_converge() {
        let tracker = ProgressTracker::new();
        tracker.record_submitted(3);

        tracker.record_started(0, AccelKind::Cuda, "a");
        tracker.record_started(1, AccelKind::Cpu, "b");
        assert_eq!(tracker.counts().in_flight, 2);

        tracker.record_succeeded(0);
        tracker.record_failed(1);
        tracker.record_started(0, AccelKind::Cuda, "c");
        tracker.record_succeeded(0);

        let counts = tracker.counts();
        assert_eq!(counts.succeeded + counts.failed, counts.total);
        assert_eq!(counts.in_flight, 0);
        assert!(tracker.is_drained());
    }

    #[test]
    fn test_requeue_is_not_terminal() {
        let tracker = ProgressTracker::new();
        tracker.record_submitted(1);
        tracker.record_started(0, AccelKind::Cuda, "a");
        tracker.record_requeued(0);

        assert!(!tracker.is_drained());
        assert_eq!(tracker.counts().in_flight, 0);
    }

    #[test]
    fn test_snapshot_active_workers_sorted() {
        let tracker = ProgressTracker::new();
        tracker.record_submitted(2);
        tracker.record_started(3, AccelKind::Cpu, "b");
        tracker.record_started(1, AccelKind::Cuda, "a");
        tracker.record_progress(3, 40);

        let snapshot = tracker.snapshot();
        assert_eq!(snapshot.active.len(), 2);
        assert_eq!(snapshot.active[0].worker_id, 1);
        assert_eq!(snapshot.active[1].worker_id, 3);
        assert_eq!(snapshot.active[1].percent, 40);
    }

    #[test]
    fn test_fanout_delivers_to_all() {
        struct Counting(std::sync::atomic::AtomicUsize);
        impl ProgressSink for Counting {
            fn on_task_event(&self, _: &TaskEvent) {
                self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            }
            fn on_job_event(&self, _: &JobEvent) {}
        }

        let a = Arc::new(Counting(Default::default()));
        let b = Arc::new(Counting(Default::default()));
        let fanout = FanoutSink::new().with(a.clone()).with(b.clone());

        let event = TaskEvent::Requeued {
            task_id: TaskId::new(),
            job_id: JobId::new(),
            kind: FailureKind::AcceleratorUnsupported,
        };
        fanout.on_task_event(&event);
        fanout.on_task_event(&event);

        assert_eq!(a.0.load(std::sync::atomic::Ordering::SeqCst), 2);
        assert_eq!(b.0.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_channel_sink_forwards_and_survives_closed_receiver() {
        let (sink, mut rx) = ChannelSink::new();
        let event = TaskEvent::Requeued {
            task_id: TaskId::new(),
            job_id: JobId::new(),
            kind: FailureKind::AcceleratorUnsupported,
        };

        sink.on_task_event(&event);
        assert!(matches!(rx.recv().await, Some(PoolEvent::Task(_))));

        drop(rx);
        // Must not panic or block.
        sink.on_task_event(&event);
    }
}
