use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use jobflow::engine::{DispatchedTask, SchedulerEvent, TaskCompletion};
use jobflow::errors::Result;
use jobflow::exec::{ExecutorBackend, completion_action};
use jobflow::job::task::initial_name;

/// A fake executor that:
/// - records the name of every dispatched task
/// - immediately reports TaskCompleted for it, with the flow action its
///   script evaluates to, or an error when its base name is in `failing`.
pub struct FakeExecutor {
    runtime_tx: mpsc::Sender<SchedulerEvent>,
    executed: Arc<Mutex<Vec<String>>>,
    failing: BTreeSet<String>,
}

impl FakeExecutor {
    pub fn new(
        runtime_tx: mpsc::Sender<SchedulerEvent>,
        executed: Arc<Mutex<Vec<String>>>,
    ) -> Self {
        Self {
            runtime_tx,
            executed,
            failing: BTreeSet::new(),
        }
    }

    pub fn failing(mut self, name: &str) -> Self {
        self.failing.insert(name.to_string());
        self
    }
}

impl ExecutorBackend for FakeExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        let executed = Arc::clone(&self.executed);
        let failing = self.failing.clone();

        Box::pin(async move {
            for t in tasks {
                {
                    let mut guard = executed.lock().unwrap();
                    guard.push(t.name.clone());
                }

                let completion = if failing.contains(initial_name(&t.name)) {
                    TaskCompletion::failure().with_action(completion_action(&t))
                } else {
                    TaskCompletion::success().with_action(completion_action(&t))
                };
                tx.send(SchedulerEvent::TaskCompleted {
                    job: t.job,
                    task: t.task,
                    completion,
                })
                .await
                .map_err(anyhow::Error::from)?;
            }
            Ok(())
        })
    }
}
