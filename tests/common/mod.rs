#![allow(dead_code)]

pub use jobflow_test_utils::builders::{JobDefinitionBuilder, TaskDefinitionBuilder};
pub use jobflow_test_utils::driver::CoreDriver;
pub use jobflow_test_utils::init_tracing;

use jobflow::job::{JobModel, TaskStatus};

/// Status of the task called `name`.
pub fn status_of(job: &JobModel, name: &str) -> TaskStatus {
    job.task_by_name(name)
        .unwrap_or_else(|| panic!("no task named {name}"))
        .status()
}

/// Names of all tasks of `job`, in creation order.
pub fn task_names(job: &JobModel) -> Vec<String> {
    job.tasks().map(|t| t.name().to_string()).collect()
}
