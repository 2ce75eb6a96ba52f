// src/exec/mod.rs

//! Task execution layer.
//!
//! The core never executes anything; the runtime hands dispatched tasks to an
//! [`ExecutorBackend`], which reports completions back as
//! [`SchedulerEvent`](crate::engine::SchedulerEvent)s.
//!
//! - [`backend`] provides the trait.
//! - [`simulated`] completes tasks without running them, following the
//!   declarative decisions of their flow scripts.
//! - [`process`] runs native commands and shell scripts locally.

pub mod backend;
pub mod process;
pub mod simulated;

pub use backend::{ExecutorBackend, completion_action};
pub use process::ProcessExecutor;
pub use simulated::{FailurePlan, SimulatedExecutor, parse_failure};
