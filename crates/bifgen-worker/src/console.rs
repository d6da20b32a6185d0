//! Console progress consumer: renders pool events as log lines.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::{info, warn};

use bifgen_models::{JobEvent, TaskEvent};
use bifgen_pool::ProgressSink;

/// Logs task and job transitions through tracing. Progress ticks are
/// throttled to one line per decade crossed, tracked per worker, so an
/// interactive run stays readable even when ticks are coarse or the
/// percent never moves (no duration hint).
#[derive(Debug, Default)]
pub struct ConsoleSink {
    last_decade: Mutex<HashMap<usize, u8>>,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when this tick is the worker's first since its task started,
    /// or lands in a different decade than the last logged one.
    fn decade_crossed(&self, worker: usize, percent: u8) -> bool {
        let decade = percent / 10;
        let mut last = self.last_decade.lock().expect("decade map lock");
        last.insert(worker, decade) != Some(decade)
    }

    fn reset_worker(&self, worker: usize) {
        self.last_decade
            .lock()
            .expect("decade map lock")
            .remove(&worker);
    }
}

impl ProgressSink for ConsoleSink {
    fn on_task_event(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Started { worker, title, .. } => {
                self.reset_worker(*worker);
                info!(worker, "Processing {title}");
            }
            TaskEvent::Progress {
                worker,
                percent,
                speed,
                ..
            } => {
                if self.decade_crossed(*worker, *percent) {
                    info!(worker, "{percent}% at {speed:.1}x");
                }
            }
            TaskEvent::Succeeded { artifact, .. } => {
                info!("Wrote {}", artifact.display());
            }
            TaskEvent::Failed { kind, path, .. } => {
                warn!(kind = %kind, "Failed on {}", path.display());
            }
            TaskEvent::Requeued { kind, .. } => {
                info!(kind = %kind, "Retrying with software decode");
            }
        }
    }

    fn on_job_event(&self, event: &JobEvent) {
        match event {
            JobEvent::Started { total, .. } => {
                info!("Generating previews for {total} items");
            }
            JobEvent::Completed { succeeded, .. } => {
                info!("Done, {succeeded} previews written");
            }
            JobEvent::Failed {
                succeeded, failed, ..
            } => {
                warn!("Finished with failures: {succeeded} written, {failed} failed");
            }
            JobEvent::Cancelled {
                succeeded, failed, ..
            } => {
                warn!("Cancelled: {succeeded} written, {failed} failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_percent_logs_once() {
        let sink = ConsoleSink::new();

        // Sources without a duration hint report 0% on every tick.
        assert!(sink.decade_crossed(0, 0));
        assert!(!sink.decade_crossed(0, 0));
        assert!(!sink.decade_crossed(0, 7));
    }

    #[test]
    fn test_coarse_ticks_still_log_each_decade() {
        let sink = ConsoleSink::new();

        assert!(sink.decade_crossed(0, 7));
        assert!(sink.decade_crossed(0, 23));
        assert!(!sink.decade_crossed(0, 28));
        assert!(sink.decade_crossed(0, 60));
    }

    #[test]
    fn test_workers_tracked_independently() {
        let sink = ConsoleSink::new();

        assert!(sink.decade_crossed(0, 10));
        assert!(sink.decade_crossed(1, 10));
        assert!(!sink.decade_crossed(0, 15));
    }

    #[test]
    fn test_new_task_resets_worker() {
        let sink = ConsoleSink::new();

        assert!(sink.decade_crossed(0, 90));
        sink.reset_worker(0);
        assert!(sink.decade_crossed(0, 0));
    }
}
