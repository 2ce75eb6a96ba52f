// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::job::{FlowActionType, FlowBlock};
use crate::types::{JobKind, JobPriority, OnTaskError, RestartMode};

/// A user job definition as read from a TOML file.
///
/// ```toml
/// [job]
/// name = "nightly"
/// on_task_error = "continue_job_execution"
///
/// [[task]]
/// name = "prepare"
/// executable = { type = "native", command = ["./prepare.sh"] }
///
/// [[task]]
/// name = "process"
/// after = ["prepare"]
/// executable = { type = "script", script = "echo processing" }
/// flow = { action = "replicate", runs = 3 }
/// ```
///
/// Task order in the file is the order in which task ids are allocated.
#[derive(Debug, Clone, Deserialize)]
pub struct JobDefinition {
    pub job: JobSection,

    #[serde(default, rename = "task")]
    pub tasks: Vec<TaskDefinition>,
}

/// `[job]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct JobSection {
    pub name: String,

    #[serde(default)]
    pub kind: JobKind,

    #[serde(default)]
    pub description: Option<String>,

    #[serde(default)]
    pub project_name: Option<String>,

    #[serde(default)]
    pub priority: JobPriority,

    /// Default error policy of the job's tasks.
    #[serde(default)]
    pub on_task_error: OnTaskError,

    #[serde(default)]
    pub restart_task_on_error: RestartMode,

    /// Default number of executions of each task (the first run included).
    #[serde(default = "default_max_number_of_execution")]
    pub max_number_of_execution: u32,

    /// Opaque, passed through untouched.
    #[serde(default)]
    pub credentials: Option<String>,

    #[serde(default)]
    pub input_space: Option<String>,

    #[serde(default)]
    pub output_space: Option<String>,

    #[serde(default)]
    pub global_space: Option<String>,

    #[serde(default)]
    pub user_space: Option<String>,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub generic_information: BTreeMap<String, String>,
}

fn default_max_number_of_execution() -> u32 {
    1
}

/// `[[task]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskDefinition {
    pub name: String,

    pub executable: ExecutableDefinition,

    #[serde(default)]
    pub description: Option<String>,

    /// Tasks this one waits for.
    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub flow_block: FlowBlock,

    #[serde(default)]
    pub flow: Option<FlowDefinition>,

    /// Unset values are inherited from the job.
    #[serde(default)]
    pub on_task_error: Option<OnTaskError>,

    #[serde(default)]
    pub restart_task_on_error: Option<RestartMode>,

    #[serde(default)]
    pub max_number_of_execution: Option<u32>,

    /// Maximum run time in seconds.
    #[serde(default)]
    pub wall_time: Option<u64>,

    #[serde(default)]
    pub precious_result: bool,

    #[serde(default)]
    pub run_as_me: bool,

    #[serde(default)]
    pub variables: BTreeMap<String, String>,

    #[serde(default)]
    pub generic_information: BTreeMap<String, String>,
}

impl TaskDefinition {
    pub fn flow_action(&self) -> Option<FlowActionType> {
        self.flow.as_ref().map(|f| f.action)
    }

    pub fn is_if(&self) -> bool {
        self.flow_action() == Some(FlowActionType::If)
    }
}

/// What a task executes. The variant is chosen by the `type` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ExecutableDefinition {
    Script {
        script: String,
        #[serde(default = "default_script_engine")]
        engine: String,
    },
    Native {
        command: Vec<String>,
    },
    Java {
        class: String,
        #[serde(default)]
        arguments: BTreeMap<String, String>,
    },
}

fn default_script_engine() -> String {
    "shell".to_string()
}

/// `[task.flow]`: the control-flow script attached to a task.
///
/// `runs`, `iterations` and `branch` stand in for what the script would
/// compute at run time; they are only used by the simulated executor.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FlowDefinition {
    pub action: FlowActionType,

    #[serde(default)]
    pub target: Option<String>,

    #[serde(default, rename = "else")]
    pub target_else: Option<String>,

    #[serde(default)]
    pub continuation: Option<String>,

    /// LOOP only: cron expression deferring each new iteration.
    #[serde(default)]
    pub cron: Option<String>,

    #[serde(default)]
    pub runs: Option<i64>,

    #[serde(default)]
    pub iterations: Option<u32>,

    #[serde(default)]
    pub branch: Option<Branch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Branch {
    If,
    Else,
}

/// Scheduler-wide settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Delay before the first re-execution of a failed task, in milliseconds.
    #[serde(default = "default_restart_waiting_time_ms")]
    pub restart_waiting_time_ms: u64,

    /// Host label recorded on tasks started by the local executor.
    #[serde(default = "default_execution_host")]
    pub execution_host: String,

    /// Stop the runtime once no job is left alive.
    #[serde(default = "default_exit_when_idle")]
    pub exit_when_idle: bool,
}

fn default_restart_waiting_time_ms() -> u64 {
    crate::job::model::DEFAULT_RESTART_WAITING_TIMER_MS
}

fn default_execution_host() -> String {
    "localhost".to_string()
}

fn default_exit_when_idle() -> bool {
    true
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            restart_waiting_time_ms: default_restart_waiting_time_ms(),
            execution_host: default_execution_host(),
            exit_when_idle: default_exit_when_idle(),
        }
    }
}
