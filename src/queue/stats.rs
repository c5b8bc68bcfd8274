//! Aggregate queue statistics.

use serde::Serialize;

use super::task::{Task, TaskStatus};

/// Counts derived from the current task collection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct QueueStats {
    pub total: usize,
    pub pending: usize,
    pub processing: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    /// `completed / (completed + failed)`, 0 when neither.
    pub success_rate: f64,
    /// Mean first-dispatch-to-completion time of completed tasks.
    pub average_time_ms: f64,
}

impl QueueStats {
    /// Recompute from scratch; nothing is counted incrementally.
    pub fn from_tasks<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Self {
        let mut stats = Self::default();
        let mut timed = 0u64;
        let mut total_ms = 0u64;
        for task in tasks {
            stats.total += 1;
            match task.status {
                TaskStatus::Pending => stats.pending += 1,
                TaskStatus::Processing => stats.processing += 1,
                TaskStatus::Completed => {
                    stats.completed += 1;
                    if let Some(ms) = task.elapsed_ms() {
                        timed += 1;
                        total_ms += ms;
                    }
                }
                TaskStatus::Failed => stats.failed += 1,
                TaskStatus::Cancelled => stats.cancelled += 1,
            }
        }
        let finished = stats.completed + stats.failed;
        if finished > 0 {
            stats.success_rate = stats.completed as f64 / finished as f64;
        }
        if timed > 0 {
            stats.average_time_ms = total_ms as f64 / timed as f64;
        }
        stats
    }
}
