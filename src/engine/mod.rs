// src/engine/mod.rs

//! Scheduling engine.
//!
//! Every mutation of a job happens inside [`CoreRuntime::step`], one event at
//! a time, so the mutations of one job are serialized. The core is pure: it
//! returns [`CoreCommand`]s (dispatch these tasks, arm this timer, exit) and
//! the async shell in [`runtime`] carries them out.

use std::time::Duration;

use crate::job::{Executable, FlowAction, FlowScript, JobId, JobModel, TaskId, TaskResult};

/// How a dispatched task ended, as reported by the executor.
#[derive(Debug, Clone, Default)]
pub struct TaskCompletion {
    pub error_occurred: bool,
    /// Flow action computed by the task's flow script, if any.
    pub action: Option<FlowAction>,
    pub result: TaskResult,
}

impl TaskCompletion {
    pub fn success() -> Self {
        Self::default()
    }

    pub fn failure() -> Self {
        TaskCompletion {
            error_occurred: true,
            ..Self::default()
        }
    }

    pub fn with_action(mut self, action: Option<FlowAction>) -> Self {
        self.action = action;
        self
    }

    pub fn with_output(mut self, output: String) -> Self {
        self.result.output = Some(output);
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.result.duration_ms = i64::try_from(duration.as_millis()).ok();
        self
    }
}

/// Events flowing into the engine.
#[derive(Debug, Clone)]
pub enum SchedulerEvent {
    /// A validated job is handed over; the engine starts it.
    JobSubmitted { job: Box<JobModel> },
    TaskCompleted {
        job: JobId,
        task: TaskId,
        completion: TaskCompletion,
    },
    /// The node running a task went away.
    NodeLost { job: JobId, task: TaskId },
    /// The restart delay of a task in error elapsed.
    RestartTask { job: JobId, task: TaskId },
    /// Manual restart of a task held IN_ERROR.
    RestartInErrorTask { job: JobId, task: TaskId },
    PauseJob { job: JobId },
    ResumeJob { job: JobId },
    KillJob { job: JobId },
    /// A deferred task (cron loop) may have become startable.
    Tick,
    ShutdownRequested,
}

/// A task handed to the executor.
#[derive(Debug, Clone)]
pub struct DispatchedTask {
    pub job: JobId,
    pub task: TaskId,
    pub name: String,
    pub executable: Executable,
    pub flow_script: Option<FlowScript>,
    pub iteration: u32,
    pub replication: u32,
}

/// Runtime options used by both the core and the async shell.
#[derive(Debug, Clone)]
pub struct RuntimeOptions {
    /// Stop once no job can make progress any more.
    pub exit_when_idle: bool,
    /// Host label recorded on started tasks.
    pub execution_host: String,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            exit_when_idle: true,
            execution_host: "localhost".to_string(),
        }
    }
}

/// Command produced by the pure core, to be executed by the outer IO shell.
#[derive(Debug, Clone)]
pub enum CoreCommand {
    /// Send these tasks to the executor.
    DispatchTasks(Vec<DispatchedTask>),
    /// Emit `RestartTask` for this task after `delay`.
    ScheduleRestart {
        job: JobId,
        task: TaskId,
        delay: Duration,
    },
    /// Emit `Tick` after `delay`.
    ScheduleWakeUp { delay: Duration },
    /// Request that the process exits.
    RequestExit,
}

/// Decision returned by the core after handling a single event.
#[derive(Debug, Clone)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    /// Whether the outer runtime loop should keep running.
    pub keep_running: bool,
}

pub mod core;
pub mod event_handlers;
pub mod runtime;

pub use core::{CoreRuntime, SchedulerContext};
pub use runtime::Runtime;
