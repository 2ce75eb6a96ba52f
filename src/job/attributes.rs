// src/job/attributes.rs

//! Opaque per-job and per-task settings carried along for collaborators.
//! The core reads only the error and restart policies.

use std::collections::BTreeMap;

use crate::types::{JobPriority, OnTaskError, RestartMode};

/// Data space locations. Uninterpreted by the core.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataSpaces {
    pub input: Option<String>,
    pub output: Option<String>,
    pub global: Option<String>,
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobAttributes {
    pub description: Option<String>,
    pub project_name: Option<String>,
    pub priority: JobPriority,
    pub on_task_error: OnTaskError,
    pub restart_task_on_error: RestartMode,
    pub max_number_of_execution: u32,
    pub credentials: Option<String>,
    pub data_spaces: DataSpaces,
    pub variables: BTreeMap<String, String>,
    pub generic_information: BTreeMap<String, String>,
}

impl Default for JobAttributes {
    fn default() -> Self {
        JobAttributes {
            description: None,
            project_name: None,
            priority: JobPriority::default(),
            on_task_error: OnTaskError::None,
            restart_task_on_error: RestartMode::default(),
            max_number_of_execution: 1,
            credentials: None,
            data_spaces: DataSpaces::default(),
            variables: BTreeMap::new(),
            generic_information: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskAttributes {
    pub description: Option<String>,
    pub on_task_error: OnTaskError,
    pub restart_task_on_error: RestartMode,
    pub max_number_of_execution: u32,
    /// Maximum run time in seconds.
    pub wall_time: Option<u64>,
    pub precious_result: bool,
    pub run_as_me: bool,
    pub variables: BTreeMap<String, String>,
}

impl Default for TaskAttributes {
    fn default() -> Self {
        TaskAttributes {
            description: None,
            on_task_error: OnTaskError::None,
            restart_task_on_error: RestartMode::default(),
            max_number_of_execution: 1,
            wall_time: None,
            precious_result: false,
            run_as_me: false,
            variables: BTreeMap::new(),
        }
    }
}
