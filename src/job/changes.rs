// src/job/changes.rs

use std::collections::BTreeSet;

use super::ids::TaskId;

/// Accumulator describing which tasks a single mutation touched. Handed to
/// the notification sink and the job store after each step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangedTasksInfo {
    new_tasks: BTreeSet<TaskId>,
    updated_tasks: BTreeSet<TaskId>,
    skipped_tasks: BTreeSet<TaskId>,
}

impl ChangedTasksInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_tasks_added(&mut self, ids: impl IntoIterator<Item = TaskId>) {
        self.new_tasks.extend(ids);
    }

    pub fn task_updated(&mut self, id: TaskId) {
        self.updated_tasks.insert(id);
    }

    pub fn task_skipped(&mut self, id: TaskId) {
        self.skipped_tasks.insert(id);
    }

    pub fn merge(&mut self, other: ChangedTasksInfo) {
        self.new_tasks.extend(other.new_tasks);
        self.updated_tasks.extend(other.updated_tasks);
        self.skipped_tasks.extend(other.skipped_tasks);
    }

    pub fn new_tasks(&self) -> &BTreeSet<TaskId> {
        &self.new_tasks
    }

    pub fn updated_tasks(&self) -> &BTreeSet<TaskId> {
        &self.updated_tasks
    }

    pub fn skipped_tasks(&self) -> &BTreeSet<TaskId> {
        &self.skipped_tasks
    }

    /// Every task that must be persisted.
    pub fn all(&self) -> BTreeSet<TaskId> {
        self.new_tasks
            .iter()
            .chain(&self.updated_tasks)
            .chain(&self.skipped_tasks)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.new_tasks.is_empty() && self.updated_tasks.is_empty() && self.skipped_tasks.is_empty()
    }
}
