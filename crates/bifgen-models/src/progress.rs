//! Point-in-time progress snapshots for polling consumers.

use serde::{Deserialize, Serialize};

use crate::{AccelKind, JobCounts};

/// What one busy worker is doing right now.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerActivity {
    /// Worker slot index
    pub worker_id: usize,
    /// The slot's acceleration family
    pub kind: AccelKind,
    /// Title of the item being processed
    pub item_title: String,
    /// Percent of the current task completed (0-100)
    pub percent: u8,
}

/// Point-in-time aggregate over a job, assembled under a short-held lock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    /// Task counts at snapshot time
    pub counts: JobCounts,
    /// Busy workers and their current items
    pub active: Vec<WorkerActivity>,
    /// Moving-average completion rate, items per minute
    pub rate_items_per_min: f64,
    /// Estimated seconds until the batch closes out, when the rate is
    /// meaningful
    #[serde(skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
}

impl ProgressSnapshot {
    /// Overall percent of the batch in terminal state.
    pub fn percent(&self) -> u8 {
        if self.counts.total == 0 {
            return 100;
        }
        let done = self.counts.succeeded + self.counts.failed;
        ((done * 100) / self.counts.total).min(100) as u8
    }
}
