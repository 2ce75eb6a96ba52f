// src/dag/task_descriptor.rs

use crate::job::TaskId;

/// Scheduling view of a task currently handed out to a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningTaskDescriptor {
    pub task_id: TaskId,
    pub execution_host: Option<String>,
    /// Milliseconds since the Unix epoch.
    pub started_at: i64,
}
