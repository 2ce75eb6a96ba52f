// src/store.rs

//! Persistence collaborator.
//!
//! The core never persists anything itself; after each mutation the engine
//! hands the job and the ids of the tasks that changed to a [`JobStore`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::debug;

use crate::errors::{JobflowError, Result};
use crate::job::{JobId, JobModel, TaskId};

pub trait JobStore: Send {
    /// Loads a job with its scheduling view rebuilt from task statuses.
    fn load_job(&self, id: JobId) -> Result<JobModel>;

    /// Saves the job and the given subset of its tasks.
    fn save_job_and_tasks(&mut self, job: &JobModel, changed: &BTreeSet<TaskId>) -> Result<()>;
}

/// Keeps full job snapshots in memory. Clones share the same storage.
#[derive(Debug, Clone, Default)]
pub struct InMemoryJobStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Debug, Default)]
struct StoreState {
    jobs: BTreeMap<JobId, JobModel>,
    saved_tasks: BTreeMap<JobId, usize>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> Result<MutexGuard<'_, StoreState>> {
        self.inner
            .lock()
            .map_err(|_| JobflowError::IllegalState("job store lock poisoned".to_string()))
    }

    /// Ids of every stored job.
    pub fn job_ids(&self) -> Result<Vec<JobId>> {
        Ok(self.state()?.jobs.keys().copied().collect())
    }

    /// Number of task records written for a job so far.
    pub fn saved_task_count(&self, id: JobId) -> Result<usize> {
        Ok(self.state()?.saved_tasks.get(&id).copied().unwrap_or(0))
    }
}

impl JobStore for InMemoryJobStore {
    fn load_job(&self, id: JobId) -> Result<JobModel> {
        let state = self.state()?;
        let mut job = state
            .jobs
            .get(&id)
            .cloned()
            .ok_or(JobflowError::UnknownJob(id))?;
        job.rebuild_dependency_graph();
        Ok(job)
    }

    fn save_job_and_tasks(&mut self, job: &JobModel, changed: &BTreeSet<TaskId>) -> Result<()> {
        let mut state = self.state()?;
        state.jobs.insert(job.id(), job.clone());
        *state.saved_tasks.entry(job.id()).or_default() += changed.len();
        debug!(job = %job.id(), tasks = changed.len(), "job saved");
        Ok(())
    }
}
