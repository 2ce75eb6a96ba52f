// src/job/ids.rs

//! Identifiers for jobs and tasks.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Immutable job identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl JobId {
    pub fn new(value: u64) -> Self {
        JobId(value)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Task identifier: the owning job plus a per-job index allocated in creation
/// order. The readable name is carried along for logging only; identity is
/// `(job, index)`.
#[derive(Debug, Clone)]
pub struct TaskId {
    job: JobId,
    index: u32,
    name: String,
}

impl TaskId {
    pub fn new(job: JobId, name: impl Into<String>, index: u32) -> Self {
        TaskId {
            job,
            index,
            name: name.into(),
        }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn readable_name(&self) -> &str {
        &self.name
    }
}

impl PartialEq for TaskId {
    fn eq(&self, other: &Self) -> bool {
        self.job == other.job && self.index == other.index
    }
}

impl Eq for TaskId {}

impl Hash for TaskId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.job.hash(state);
        self.index.hash(state);
    }
}

impl PartialOrd for TaskId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TaskId {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.job, self.index).cmp(&(other.job, other.index))
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}t{} ({})", self.job, self.index, self.name)
    }
}
