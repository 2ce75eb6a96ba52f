use std::sync::{Arc, Mutex};

use jobflow::job::{ChangedTasksInfo, JobId, JobInfo, JobStatus};
use jobflow::notify::NotificationSink;

/// One call made on the sink.
#[derive(Debug, Clone)]
pub enum Notification {
    TasksChanged {
        owner: String,
        job: JobId,
        changes: ChangedTasksInfo,
    },
    JobState(JobInfo),
}

/// Notification sink that keeps every call. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<Notification>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Notification> {
        self.events.lock().unwrap().clone()
    }

    /// Successive job statuses reported for `job`.
    pub fn job_states(&self, job: JobId) -> Vec<JobStatus> {
        self.events()
            .into_iter()
            .filter_map(|n| match n {
                Notification::JobState(info) if info.job_id == job => Some(info.status),
                _ => None,
            })
            .collect()
    }
}

impl NotificationSink for RecordingSink {
    fn notify_tasks_changed(&mut self, owner: &str, job: JobId, changes: &ChangedTasksInfo) {
        self.events.lock().unwrap().push(Notification::TasksChanged {
            owner: owner.to_string(),
            job,
            changes: changes.clone(),
        });
    }

    fn notify_job_state(&mut self, _owner: &str, info: &JobInfo) {
        self.events
            .lock()
            .unwrap()
            .push(Notification::JobState(info.clone()));
    }
}
