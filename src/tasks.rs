//! Asynchronous task state tracking.
//!
//! Every pipeline run is registered here under a generated task id and moves
//! through `pending -> processing -> completed | failed`. Terminal states are
//! final and progress never moves backwards, so pollers observe a monotonic
//! view even when stages report out of order.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::RwLock;
use uuid::Uuid;

/// Opaque task identifier handed to pollers.
pub type TaskId = String;

/// Lifecycle states of a tracked task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Registered, not yet picked up.
    Pending,
    /// A stage is running.
    Processing,
    /// All stages finished; `result` is populated.
    Completed,
    /// A stage failed; `error` is populated.
    Failed,
}

impl TaskStatus {
    fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Point-in-time view of one task.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSnapshot {
    /// The task's identifier.
    pub task_id: TaskId,
    /// Free-form task category (e.g. `document_processing`).
    pub task_type: String,
    /// Current lifecycle state.
    pub status: TaskStatus,
    /// Overall completion percentage, `0..=100`.
    pub progress: u8,
    /// Failure description, set only in the failed state.
    pub error: Option<String>,
    /// Final result payload, set only in the completed state.
    pub result: Option<serde_json::Value>,
    /// Registration timestamp (RFC3339).
    pub created_at: String,
    /// Last state-change timestamp (RFC3339).
    pub updated_at: String,
}

/// Shared in-process registry of task states.
#[derive(Default)]
pub struct TaskTracker {
    tasks: RwLock<HashMap<TaskId, TaskSnapshot>>,
}

impl TaskTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new pending task and return its id.
    pub fn start(&self, task_type: &str) -> TaskId {
        let task_id = Uuid::new_v4().to_string();
        let now = crate::store::types::current_timestamp_rfc3339();
        let snapshot = TaskSnapshot {
            task_id: task_id.clone(),
            task_type: task_type.to_string(),
            status: TaskStatus::Pending,
            progress: 0,
            error: None,
            result: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.write_lock().insert(task_id.clone(), snapshot);
        tracing::debug!(task_id = %task_id, task_type, "Registered task");
        task_id
    }

    /// Record progress as `done` units out of `total`.
    ///
    /// Moves a pending task to processing. Progress is monotonic; a report
    /// that computes lower than the stored value keeps the stored value, and
    /// `total == 0` leaves progress untouched. Updates to a terminal task are
    /// ignored.
    pub fn record_progress(&self, task_id: &str, done: usize, total: usize) {
        let mut tasks = self.write_lock();
        let Some(task) = tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        task.status = TaskStatus::Processing;
        if total > 0 {
            let computed = ((done * 100) / total).min(100) as u8;
            task.progress = task.progress.max(computed);
        }
        task.updated_at = crate::store::types::current_timestamp_rfc3339();
    }

    /// Mark a task completed with its result payload.
    pub fn complete(&self, task_id: &str, result: serde_json::Value) {
        let mut tasks = self.write_lock();
        let Some(task) = tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        task.status = TaskStatus::Completed;
        task.progress = 100;
        task.result = Some(result);
        task.updated_at = crate::store::types::current_timestamp_rfc3339();
        tracing::info!(task_id, "Task completed");
    }

    /// Mark a task failed with a description.
    pub fn fail(&self, task_id: &str, error: String) {
        let mut tasks = self.write_lock();
        let Some(task) = tasks.get_mut(task_id) else {
            return;
        };
        if task.status.is_terminal() {
            return;
        }
        task.status = TaskStatus::Failed;
        task.error = Some(error);
        task.updated_at = crate::store::types::current_timestamp_rfc3339();
        tracing::warn!(task_id, error = %task.error.as_deref().unwrap_or(""), "Task failed");
    }

    /// Current snapshot of a task, if it exists.
    pub fn get(&self, task_id: &str) -> Option<TaskSnapshot> {
        self.tasks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(task_id)
            .cloned()
    }

    fn write_lock(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<TaskId, TaskSnapshot>> {
        self.tasks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
