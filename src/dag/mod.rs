// src/dag/mod.rs

//! Scheduling view over a job's tasks.
//!
//! - [`descriptor`] holds the eligible / running / paused partitions.
//! - [`readiness`] derives whether a task's parents are done.
//! - [`task_descriptor`] describes a task handed out to a node.

pub mod descriptor;
pub mod readiness;
pub mod task_descriptor;

pub use descriptor::DependencyGraph;
pub use task_descriptor::RunningTaskDescriptor;
