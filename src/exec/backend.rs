// src/exec/backend.rs

//! Pluggable executor backend abstraction.
//!
//! The runtime talks to an `ExecutorBackend` instead of running anything
//! itself. The CLI uses [`SimulatedExecutor`](super::SimulatedExecutor) or
//! [`ProcessExecutor`](super::ProcessExecutor); tests provide their own
//! implementation that records dispatched tasks and answers directly.

use std::future::Future;
use std::pin::Pin;

use crate::engine::DispatchedTask;
use crate::errors::Result;
use crate::job::FlowAction;

/// Trait abstracting how dispatched tasks are executed.
///
/// Implementations report each task back with a
/// [`SchedulerEvent::TaskCompleted`](crate::engine::SchedulerEvent::TaskCompleted).
pub trait ExecutorBackend: Send {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// The flow action a task reports on completion, failed or not: its flow
/// script evaluated at the task's iteration.
pub fn completion_action(task: &DispatchedTask) -> Option<FlowAction> {
    task.flow_script
        .as_ref()
        .map(|script| script.evaluate(task.iteration))
}
