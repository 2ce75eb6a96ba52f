// src/exec/simulated.rs

//! Executor that runs nothing: every task completes after a fixed delay,
//! unless it is configured to fail.

use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use super::backend::{ExecutorBackend, completion_action};
use crate::engine::{DispatchedTask, SchedulerEvent, TaskCompletion};
use crate::errors::{JobflowError, Result};

/// How many times a task fails before it succeeds. `None` fails forever.
pub type FailurePlan = BTreeMap<String, Option<u32>>;

pub struct SimulatedExecutor {
    runtime_tx: mpsc::Sender<SchedulerEvent>,
    task_duration: Duration,
    failures: Arc<Mutex<FailurePlan>>,
}

impl SimulatedExecutor {
    pub fn new(runtime_tx: mpsc::Sender<SchedulerEvent>) -> Self {
        Self {
            runtime_tx,
            task_duration: Duration::ZERO,
            failures: Arc::new(Mutex::new(FailurePlan::new())),
        }
    }

    pub fn with_task_duration(mut self, duration: Duration) -> Self {
        self.task_duration = duration;
        self
    }

    /// Tasks (by initial name) that end in error.
    pub fn with_failures(mut self, plan: FailurePlan) -> Self {
        self.failures = Arc::new(Mutex::new(plan));
        self
    }

    fn should_fail(failures: &Mutex<FailurePlan>, name: &str) -> Result<bool> {
        let mut plan = failures
            .lock()
            .map_err(|_| JobflowError::IllegalState("failure plan lock poisoned".to_string()))?;
        let Some(remaining) = plan.get_mut(name) else {
            return Ok(false);
        };
        match remaining {
            None => Ok(true),
            Some(0) => Ok(false),
            Some(n) => {
                *n -= 1;
                Ok(true)
            }
        }
    }
}

/// Parses `NAME` or `NAME:COUNT`.
pub fn parse_failure(arg: &str) -> std::result::Result<(String, Option<u32>), String> {
    match arg.split_once(':') {
        None => Ok((arg.to_string(), None)),
        Some((name, count)) => {
            let count = count
                .parse::<u32>()
                .map_err(|e| format!("invalid failure count in '{arg}': {e}"))?;
            Ok((name.to_string(), Some(count)))
        }
    }
}

impl ExecutorBackend for SimulatedExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let duration = self.task_duration;
        let failures = Arc::clone(&self.failures);

        Box::pin(async move {
            for task in tasks {
                let base_name = crate::job::task::initial_name(&task.name).to_owned();
                let fail = Self::should_fail(&failures, &base_name)?;
                let tx = tx.clone();
                tokio::spawn(async move {
                    if !duration.is_zero() {
                        tokio::time::sleep(duration).await;
                    }
                    let completion = if fail {
                        info!(task = %task.task, "simulated task failed");
                        TaskCompletion::failure().with_action(completion_action(&task))
                    } else {
                        debug!(task = %task.task, "simulated task finished");
                        TaskCompletion::success().with_action(completion_action(&task))
                    };
                    let completion = completion.with_duration(duration);
                    let event = SchedulerEvent::TaskCompleted {
                        job: task.job,
                        task: task.task,
                        completion,
                    };
                    if tx.send(event).await.is_err() {
                        debug!("runtime gone; dropping completion");
                    }
                });
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_specs() {
        assert_eq!(parse_failure("build"), Ok(("build".to_string(), None)));
        assert_eq!(parse_failure("build:2"), Ok(("build".to_string(), Some(2))));
        assert!(parse_failure("build:x").is_err());
    }

    #[test]
    fn counted_failures_run_out() {
        let plan = Mutex::new(FailurePlan::from([("a".to_string(), Some(1))]));
        assert!(SimulatedExecutor::should_fail(&plan, "a").unwrap());
        assert!(!SimulatedExecutor::should_fail(&plan, "a").unwrap());
        assert!(!SimulatedExecutor::should_fail(&plan, "b").unwrap());
    }
}
