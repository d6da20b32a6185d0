//! Primary and fallback task queues.
//!
//! One lock guards both queues, so a length check and the dequeue it
//! gates can never race. The fallback queue holds tasks that bounced off
//! an accelerator; it is drained by CPU workers before they touch
//! primary work (or by accelerated workers when the pool has no CPU
//! slot at all). Primary tasks go to an idle accelerated worker when one
//! is waiting; a CPU worker takes primary work only while no accelerated
//! worker is idle.

use std::collections::VecDeque;
use std::sync::Mutex;

use tokio::sync::Notify;

use bifgen_models::{AccelKind, Task};

#[derive(Default)]
struct QueueState {
    primary: VecDeque<Task>,
    fallback: VecDeque<Task>,
    closed: bool,
    /// Accelerated workers currently parked in [`TaskQueues::pull`].
    idle_accel: usize,
}

impl QueueState {
    fn pop_for(&mut self, kind: AccelKind, fallback_open_to_accel: bool) -> Option<Task> {
        let cpu = kind == AccelKind::Cpu;
        if cpu || fallback_open_to_accel {
            if let Some(task) = self.fallback.pop_front() {
                return Some(task);
            }
        }
        // Primary work is offered to an idle accelerated worker first; a
        // CPU worker that skips here re-checks on the next wakeup.
        if cpu && self.idle_accel > 0 {
            return None;
        }
        self.primary.pop_front()
    }

    fn has_queued(&self) -> bool {
        !self.primary.is_empty() || !self.fallback.is_empty()
    }
}

/// Shared task queues for one pool.
pub struct TaskQueues {
    state: Mutex<QueueState>,
    notify: Notify,
    /// True when the pool has no CPU worker, so accelerated workers must
    /// serve the fallback queue themselves.
    fallback_open_to_accel: bool,
}

impl TaskQueues {
    /// Create queues for a pool with the given worker mix.
    pub fn new(has_cpu_workers: bool) -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            notify: Notify::new(),
            fallback_open_to_accel: !has_cpu_workers,
        }
    }

    /// Enqueue a batch in submission order. No-op on empty input; never
    /// blocks.
    pub fn push_batch(&self, tasks: impl IntoIterator<Item = Task>) {
        let mut state = self.state.lock().expect("queue lock");
        let before = state.primary.len();
        state.primary.extend(tasks);
        if state.primary.len() > before {
            drop(state);
            self.notify.notify_waiters();
        }
    }

    /// Re-enqueue a task that bounced off an accelerator.
    pub fn push_fallback(&self, task: Task) {
        self.state.lock().expect("queue lock").fallback.push_back(task);
        self.notify.notify_waiters();
    }

    /// Pull the next task for a worker of `kind`, waiting while the
    /// queues are empty. Returns `None` once the queues are closed and
    /// nothing is left for this worker to do.
    pub async fn pull(&self, kind: AccelKind) -> Option<Task> {
        let accelerated = kind != AccelKind::Cpu;
        let mut registered = false;
        loop {
            // Arm the wakeup before checking, or a push between the check
            // and the await would be lost.
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock().expect("queue lock");
                if registered {
                    state.idle_accel -= 1;
                    registered = false;
                }
                if state.closed {
                    return None;
                }
                if let Some(task) = state.pop_for(kind, self.fallback_open_to_accel) {
                    // Wake deferred CPU workers: with this worker no
                    // longer idle, remaining primary work is theirs.
                    let queued = state.has_queued();
                    drop(state);
                    if queued {
                        self.notify.notify_waiters();
                    }
                    return Some(task);
                }
                if accelerated {
                    state.idle_accel += 1;
                    registered = true;
                }
            }
            notified.await;
        }
    }

    /// Close the queues: waiting workers return, queued tasks never
    /// start. Idempotent.
    pub fn close(&self) {
        self.state.lock().expect("queue lock").closed = true;
        self.notify.notify_waiters();
    }

    /// Whether the queues have been closed.
    pub fn is_closed(&self) -> bool {
        self.state.lock().expect("queue lock").closed
    }

    /// Queued (not yet started) task count across both queues.
    pub fn len(&self) -> usize {
        let state = self.state.lock().expect("queue lock");
        state.primary.len() + state.fallback.len()
    }

    /// Whether both queues are empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bifgen_models::{JobId, MediaItem};

    fn task(name: &str) -> Task {
        Task::new(JobId::new(), MediaItem::new(name, name, format!("/media/{name}.mkv")))
    }

    #[tokio::test]
    async fn test_fifo_within_primary() {
        let queues = TaskQueues::new(true);
        queues.push_batch([task("a"), task("b"), task("c")]);

        for expected in ["a", "b", "c"] {
            let got = queues.pull(AccelKind::Cuda).await.unwrap();
            assert_eq!(got.item.key.as_str(), expected);
        }
    }

    #[tokio::test]
    async fn test_cpu_drains_fallback_first() {
        let queues = TaskQueues::new(true);
        queues.push_batch([task("primary")]);
        queues.push_fallback(task("bounced"));

        let first = queues.pull(AccelKind::Cpu).await.unwrap();
        assert_eq!(first.item.key.as_str(), "bounced");
        let second = queues.pull(AccelKind::Cpu).await.unwrap();
        assert_eq!(second.item.key.as_str(), "primary");
    }

    #[tokio::test]
    async fn test_accelerated_skips_fallback_when_cpu_exists() {
        let queues = TaskQueues::new(true);
        queues.push_batch([task("primary")]);
        queues.push_fallback(task("bounced"));

        let got = queues.pull(AccelKind::Cuda).await.unwrap();
        assert_eq!(got.item.key.as_str(), "primary");
        assert_eq!(queues.len(), 1);
    }

    #[tokio::test]
    async fn test_accelerated_serves_fallback_without_cpu_workers() {
        let queues = TaskQueues::new(false);
        queues.push_batch([task("primary")]);
        queues.push_fallback(task("bounced"));

        let got = queues.pull(AccelKind::Cuda).await.unwrap();
        assert_eq!(got.item.key.as_str(), "bounced");
    }

    #[tokio::test]
    async fn test_close_releases_waiting_worker() {
        let queues = std::sync::Arc::new(TaskQueues::new(true));
        let waiter = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cpu).await })
        };

        tokio::task::yield_now().await;
        queues.close();

        assert!(waiter.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_queue_returns_none_with_work_left() {
        let queues = TaskQueues::new(true);
        queues.push_batch([task("never-starts")]);
        queues.close();

        assert!(queues.pull(AccelKind::Cpu).await.is_none());
    }

    #[tokio::test]
    async fn test_push_wakes_waiting_worker() {
        let queues = std::sync::Arc::new(TaskQueues::new(true));
        let waiter = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cpu).await })
        };

        tokio::task::yield_now().await;
        queues.push_batch([task("late")]);

        let got = waiter.await.unwrap().unwrap();
        assert_eq!(got.item.key.as_str(), "late");
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let queues = TaskQueues::new(true);
        queues.push_batch(std::iter::empty());
        assert!(queues.is_empty());
    }

    #[tokio::test]
    async fn test_primary_offered_to_idle_accelerated_first() {
        let queues = std::sync::Arc::new(TaskQueues::new(true));
        let accel = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cuda).await })
        };
        tokio::task::yield_now().await;
        let cpu = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cpu).await })
        };
        tokio::task::yield_now().await;

        // Both workers idle: the single primary task must land on the
        // accelerated one no matter which wins the wakeup.
        queues.push_batch([task("one")]);

        let got = accel.await.unwrap().unwrap();
        assert_eq!(got.item.key.as_str(), "one");

        queues.close();
        assert!(cpu.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deferred_cpu_resumes_after_accelerated_pop() {
        let queues = std::sync::Arc::new(TaskQueues::new(true));
        let accel = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cuda).await })
        };
        tokio::task::yield_now().await;
        let cpu = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cpu).await })
        };
        tokio::task::yield_now().await;

        queues.push_batch([task("a"), task("b")]);

        // The accelerated worker takes the first task; once it is no
        // longer idle the CPU worker picks up the second.
        assert_eq!(accel.await.unwrap().unwrap().item.key.as_str(), "a");
        assert_eq!(cpu.await.unwrap().unwrap().item.key.as_str(), "b");
    }

    #[tokio::test]
    async fn test_cpu_takes_primary_with_no_idle_accelerated() {
        let queues = TaskQueues::new(true);
        queues.push_batch([task("one")]);

        // No accelerated worker is parked, so the CPU worker may take
        // primary work directly. Also covers CPU-only pools.
        let got = queues.pull(AccelKind::Cpu).await.unwrap();
        assert_eq!(got.item.key.as_str(), "one");
    }

    #[tokio::test]
    async fn test_idle_accelerated_does_not_block_fallback() {
        let queues = std::sync::Arc::new(TaskQueues::new(true));
        let accel = {
            let queues = queues.clone();
            tokio::spawn(async move { queues.pull(AccelKind::Cuda).await })
        };
        tokio::task::yield_now().await;

        queues.push_fallback(task("bounced"));

        // Fallback work belongs to CPU workers even while an accelerated
        // worker is parked.
        let got = queues.pull(AccelKind::Cpu).await.unwrap();
        assert_eq!(got.item.key.as_str(), "bounced");

        queues.close();
        assert!(accel.await.unwrap().is_none());
    }
}
