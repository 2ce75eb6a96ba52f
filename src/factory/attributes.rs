// src/factory/attributes.rs

//! Explicit copy tables from user definitions to job and task attributes.
//!
//! Each table lists every copied field by name; a field missing from a table
//! is not copied.

use crate::config::model::{JobSection, TaskDefinition};
use crate::job::{DataSpaces, JobAttributes, TaskAttributes};

pub struct FieldMapping<S, T> {
    pub name: &'static str,
    pub copy: fn(&S, &mut T),
}

/// Task fields read the task definition and fall back to the job section for
/// inherited values.
pub struct TaskFieldMapping {
    pub name: &'static str,
    pub copy: fn(&JobSection, &TaskDefinition, &mut TaskAttributes),
}

pub const JOB_FIELDS: &[FieldMapping<JobSection, JobAttributes>] = &[
    FieldMapping {
        name: "description",
        copy: |s, t| t.description = s.description.clone(),
    },
    FieldMapping {
        name: "project_name",
        copy: |s, t| t.project_name = s.project_name.clone(),
    },
    FieldMapping {
        name: "priority",
        copy: |s, t| t.priority = s.priority,
    },
    FieldMapping {
        name: "on_task_error",
        copy: |s, t| t.on_task_error = s.on_task_error,
    },
    FieldMapping {
        name: "restart_task_on_error",
        copy: |s, t| t.restart_task_on_error = s.restart_task_on_error,
    },
    FieldMapping {
        name: "max_number_of_execution",
        copy: |s, t| t.max_number_of_execution = s.max_number_of_execution,
    },
    FieldMapping {
        name: "credentials",
        copy: |s, t| t.credentials = s.credentials.clone(),
    },
    FieldMapping {
        name: "data_spaces",
        copy: |s, t| {
            t.data_spaces = DataSpaces {
                input: s.input_space.clone(),
                output: s.output_space.clone(),
                global: s.global_space.clone(),
                user: s.user_space.clone(),
            }
        },
    },
    FieldMapping {
        name: "variables",
        copy: |s, t| t.variables = s.variables.clone(),
    },
    FieldMapping {
        name: "generic_information",
        copy: |s, t| t.generic_information = s.generic_information.clone(),
    },
];

pub const TASK_FIELDS: &[TaskFieldMapping] = &[
    TaskFieldMapping {
        name: "description",
        copy: |_, s, t| t.description = s.description.clone(),
    },
    TaskFieldMapping {
        name: "on_task_error",
        copy: |j, s, t| t.on_task_error = s.on_task_error.unwrap_or(j.on_task_error),
    },
    TaskFieldMapping {
        name: "restart_task_on_error",
        copy: |j, s, t| {
            t.restart_task_on_error = s
                .restart_task_on_error
                .unwrap_or(j.restart_task_on_error)
        },
    },
    TaskFieldMapping {
        name: "max_number_of_execution",
        copy: |j, s, t| {
            t.max_number_of_execution = s
                .max_number_of_execution
                .unwrap_or(j.max_number_of_execution)
        },
    },
    TaskFieldMapping {
        name: "wall_time",
        copy: |_, s, t| t.wall_time = s.wall_time,
    },
    TaskFieldMapping {
        name: "precious_result",
        copy: |_, s, t| t.precious_result = s.precious_result,
    },
    TaskFieldMapping {
        name: "run_as_me",
        copy: |_, s, t| t.run_as_me = s.run_as_me,
    },
    TaskFieldMapping {
        name: "variables",
        copy: |_, s, t| t.variables = s.variables.clone(),
    },
];

pub fn job_attributes(section: &JobSection) -> JobAttributes {
    let mut attributes = JobAttributes::default();
    for field in JOB_FIELDS {
        (field.copy)(section, &mut attributes);
    }
    attributes
}

pub fn task_attributes(job: &JobSection, task: &TaskDefinition) -> TaskAttributes {
    let mut attributes = TaskAttributes::default();
    for field in TASK_FIELDS {
        (field.copy)(job, task, &mut attributes);
    }
    attributes
}
