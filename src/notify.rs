// src/notify.rs

//! Notification collaborator: told about task and job changes after each
//! serialized mutation.

use tracing::info;

use crate::job::{ChangedTasksInfo, JobId, JobInfo};

pub trait NotificationSink: Send {
    fn notify_tasks_changed(&mut self, owner: &str, job: JobId, changes: &ChangedTasksInfo);

    fn notify_job_state(&mut self, owner: &str, info: &JobInfo);
}

/// Reports notifications as log events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn notify_tasks_changed(&mut self, owner: &str, job: JobId, changes: &ChangedTasksInfo) {
        if changes.is_empty() {
            return;
        }
        info!(
            %owner,
            %job,
            new = changes.new_tasks().len(),
            updated = changes.updated_tasks().len(),
            skipped = changes.skipped_tasks().len(),
            "tasks changed"
        );
    }

    fn notify_job_state(&mut self, owner: &str, info: &JobInfo) {
        info!(
            %owner,
            job = %info.job_id,
            status = %info.status,
            finished = info.counters.finished,
            faulty = info.counters.faulty,
            total = info.counters.total,
            "job state"
        );
    }
}
