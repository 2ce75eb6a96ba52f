use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Scheduling priority of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobPriority {
    Idle,
    Lowest,
    Low,
    Normal,
    High,
    Highest,
}

impl Default for JobPriority {
    fn default() -> Self {
        JobPriority::Normal
    }
}

impl FromStr for JobPriority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "idle" => Ok(JobPriority::Idle),
            "lowest" => Ok(JobPriority::Lowest),
            "low" => Ok(JobPriority::Low),
            "normal" => Ok(JobPriority::Normal),
            "high" => Ok(JobPriority::High),
            "highest" => Ok(JobPriority::Highest),
            other => Err(format!("invalid job priority: {other}")),
        }
    }
}

/// What happens to the job when one of its tasks ends in error and has no
/// executions left.
///
/// - `None`: no explicit policy; a task inherits the job policy, and a job
///   without one behaves like `ContinueJobExecution`.
/// - `ContinueJobExecution`: the task becomes FAULTY, the rest of the job runs.
/// - `SuspendTask`: the task is held IN_ERROR until restarted; the job is IN_ERROR.
/// - `PauseJob`: like `SuspendTask`, and the whole job is paused.
/// - `CancelJob`: the job is canceled, every remaining task is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnTaskError {
    None,
    ContinueJobExecution,
    SuspendTask,
    PauseJob,
    CancelJob,
}

impl Default for OnTaskError {
    fn default() -> Self {
        OnTaskError::None
    }
}

impl OnTaskError {
    pub fn is_set(self) -> bool {
        self != OnTaskError::None
    }
}

impl FromStr for OnTaskError {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(OnTaskError::None),
            "continue_job_execution" => Ok(OnTaskError::ContinueJobExecution),
            "suspend_task" => Ok(OnTaskError::SuspendTask),
            "pause_job" => Ok(OnTaskError::PauseJob),
            "cancel_job" => Ok(OnTaskError::CancelJob),
            other => Err(format!(
                "invalid on_task_error: {other} (expected none, continue_job_execution, suspend_task, pause_job or cancel_job)"
            )),
        }
    }
}

/// Where a task may be re-executed after an error. Opaque to the core; the
/// node-selection collaborator interprets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestartMode {
    Anywhere,
    Elsewhere,
}

impl Default for RestartMode {
    fn default() -> Self {
        RestartMode::Anywhere
    }
}

/// Kind of job; selects the validation rules applied at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    TaskFlow,
    ParameterSweeping,
}

impl Default for JobKind {
    fn default() -> Self {
        JobKind::TaskFlow
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKind::TaskFlow => write!(f, "TASKSFLOW"),
            JobKind::ParameterSweeping => write!(f, "PARAMETER_SWEEPING"),
        }
    }
}
