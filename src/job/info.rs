// src/job/info.rs

//! Point-in-time snapshots of job and task state, exchanged with
//! collaborators and accepted back through `JobModel::update_*_info`.

use std::collections::BTreeSet;

use super::ids::{JobId, TaskId};
use super::status::{JobStatus, StatusClass, TaskStatus};
use crate::types::JobPriority;

/// Task counts per status class. `total` equals the sum of the others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskCounters {
    pub total: u32,
    pub pending: u32,
    pub running: u32,
    pub in_error: u32,
    pub finished: u32,
    pub failed: u32,
    pub faulty: u32,
}

impl TaskCounters {
    pub(crate) fn enter(&mut self, class: StatusClass) {
        *self.bucket(class) += 1;
    }

    pub(crate) fn leave(&mut self, class: StatusClass) {
        let bucket = self.bucket(class);
        *bucket = bucket.saturating_sub(1);
    }

    fn bucket(&mut self, class: StatusClass) -> &mut u32 {
        match class {
            StatusClass::Pending => &mut self.pending,
            StatusClass::Running => &mut self.running,
            StatusClass::InError => &mut self.in_error,
            StatusClass::Finished => &mut self.finished,
            StatusClass::Failed => &mut self.failed,
            StatusClass::Faulty => &mut self.faulty,
        }
    }

    pub fn sum_of_classes(&self) -> u32 {
        self.pending + self.running + self.in_error + self.finished + self.failed + self.faulty
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub job_id: JobId,
    pub owner: String,
    pub name: String,
    pub priority: JobPriority,
    pub status: JobStatus,
    pub counters: TaskCounters,
    pub submitted_time: Option<i64>,
    pub start_time: Option<i64>,
    pub finished_time: Option<i64>,
    pub to_be_removed: bool,
    /// Tasks the sender decided to skip; applied by `update_job_info`.
    pub tasks_skipped: Option<BTreeSet<TaskId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub job_id: JobId,
    pub task_id: TaskId,
    pub name: String,
    pub status: TaskStatus,
    pub start_time: Option<i64>,
    pub finished_time: Option<i64>,
    pub in_error_time: Option<i64>,
    pub execution_duration: Option<i64>,
    pub execution_host: Option<String>,
    pub progress: u8,
    pub executions_left: u32,
}
