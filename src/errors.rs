// src/errors.rs

//! Crate-wide error type and result alias.

use thiserror::Error;

use crate::factory::FlowError;
use crate::job::{JobId, TaskId, TaskStatus};

#[derive(Error, Debug)]
pub enum JobflowError {
    /// The submitted task flow is structurally invalid.
    #[error(transparent)]
    Flow(#[from] FlowError),

    /// The job definition cannot be turned into a job (empty job, bad executable, ...).
    #[error("Job creation error: {0}")]
    JobCreation(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    #[error("Job not found: {0}")]
    UnknownJob(JobId),

    /// Integration error: the caller asked for something the job cannot do in
    /// its current state (id mismatch, task not eligible, job already started, ...).
    #[error("Illegal state: {0}")]
    IllegalState(String),

    #[error("Task {0} is not running")]
    TaskNotRunning(TaskId),

    #[error("Illegal transition for task {task}: {from} -> {to}")]
    IllegalTransition {
        task: TaskId,
        from: TaskStatus,
        to: TaskStatus,
    },

    #[error("Invalid cron expression: {0}")]
    Cron(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, JobflowError>;
