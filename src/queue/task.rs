//! Task records held by the queue.

use std::fmt;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;
use crate::types::{GenerateResult, RequestDescriptor};
use crate::HuginnError;

/// Queue-assigned task id. Ids increase in submission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Lifecycle state of a task.
///
/// ```text
/// pending ──► processing ──► completed
///    ▲            │
///    └─(retry)────┼────────► failed
///                 │
/// any non-terminal ────────► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Processing => "processing",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The last error a task saw, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    pub message: String,
    pub kind: ErrorKind,
}

impl From<&HuginnError> for TaskError {
    fn from(e: &HuginnError) -> Self {
        Self {
            message: e.to_string(),
            kind: e.kind(),
        }
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// One unit of work. Only the queue mutates it; callers get clones.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Task {
    pub id: TaskId,
    pub descriptor: RequestDescriptor,
    pub status: TaskStatus,
    /// 0–100.
    pub progress: u8,
    /// Times the task has been dispatched.
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GenerateResult>,
    /// Last failure. Kept while a retry is pending.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<TaskError>,
    pub created_at: SystemTime,
    /// First dispatch.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<SystemTime>,
    /// Reached a terminal state.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<SystemTime>,
}

impl Task {
    pub(crate) fn new(id: TaskId, descriptor: RequestDescriptor) -> Self {
        Self {
            id,
            descriptor,
            status: TaskStatus::Pending,
            progress: 0,
            attempts: 0,
            result: None,
            error: None,
            created_at: SystemTime::now(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Wall time from first dispatch to the terminal state.
    pub fn elapsed_ms(&self) -> Option<u64> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        completed
            .duration_since(started)
            .ok()
            .map(|d| d.as_millis() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskKind;
    use std::time::Duration;

    #[test]
    fn terminal_states() {
        assert!(!TaskStatus::Pending.is_terminal());
        assert!(!TaskStatus::Processing.is_terminal());
        assert!(TaskStatus::Completed.is_terminal());
        assert!(TaskStatus::Failed.is_terminal());
        assert!(TaskStatus::Cancelled.is_terminal());
    }

    #[test]
    fn elapsed_needs_both_timestamps() {
        let mut task = Task::new(TaskId(1), RequestDescriptor::new("x", TaskKind::Score));
        assert!(task.elapsed_ms().is_none());
        let start = SystemTime::now();
        task.started_at = Some(start);
        task.completed_at = Some(start + Duration::from_millis(250));
        assert_eq!(task.elapsed_ms(), Some(250));
    }

    #[test]
    fn task_error_keeps_kind() {
        let err = TaskError::from(&HuginnError::Http("reset".into()));
        assert_eq!(err.kind, ErrorKind::TransientProvider);
        assert!(err.message.contains("reset"));
    }

    #[test]
    fn id_display() {
        assert_eq!(TaskId(7).to_string(), "task-7");
    }
}
