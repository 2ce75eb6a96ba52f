// src/job/mod.rs

//! Jobs, their tasks, and the state machine that drives them.
//!
//! - [`model`] is the mutable job and the only place statuses change.
//! - [`task`] is a single task node with its edges.
//! - [`flow`] applies LOOP / IF / REPLICATE actions.
//! - [`info`] and [`changes`] are snapshots handed to collaborators.

pub mod attributes;
pub mod changes;
pub mod executable;
pub mod flow;
pub mod ids;
pub mod info;
pub mod model;
pub mod status;
pub mod task;

use std::collections::BTreeMap;

pub use attributes::{DataSpaces, JobAttributes, TaskAttributes};
pub use changes::ChangedTasksInfo;
pub use executable::Executable;
pub use flow::{FlowAction, FlowActionType, FlowBlock, FlowDecision, FlowScript};
pub use ids::{JobId, TaskId};
pub use info::{JobInfo, TaskCounters, TaskInfo};
pub use model::{FailOutcome, JobModel, TaskErrorOutcome, TaskResult};
pub use status::{JobStatus, StatusClass, TaskStatus};
pub use task::TaskNode;

/// Tasks of one job, ordered by creation index.
pub type TaskMap = BTreeMap<TaskId, TaskNode>;

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
