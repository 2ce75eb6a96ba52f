use std::collections::{BTreeMap, VecDeque};

use jobflow::engine::{
    CoreCommand, CoreRuntime, DispatchedTask, RuntimeOptions, SchedulerEvent, TaskCompletion,
};
use jobflow::exec::completion_action;
use jobflow::job::task::initial_name;
use jobflow::job::{JobId, JobModel, TaskId};
use jobflow::store::{InMemoryJobStore, JobStore};

use crate::recording::RecordingSink;

/// Drives a `CoreRuntime` synchronously, standing in for both the async
/// shell and the executor.
///
/// Dispatched tasks are queued and completed one at a time, in dispatch
/// order. Restart timers are collected instead of armed.
pub struct CoreDriver {
    pub core: CoreRuntime,
    pub store: InMemoryJobStore,
    pub sink: RecordingSink,
    queue: VecDeque<DispatchedTask>,
    /// Names of every dispatched task, in dispatch order.
    pub dispatched: Vec<String>,
    /// Restart timers armed by the core and not fired yet.
    pub restarts: Vec<(JobId, TaskId)>,
    /// Wake-up timers armed by the core.
    pub wake_ups: usize,
    /// Remaining failures per base task name.
    failures: BTreeMap<String, u32>,
    pub exit_requested: bool,
}

impl CoreDriver {
    pub fn new() -> Self {
        let store = InMemoryJobStore::new();
        let sink = RecordingSink::new();
        let core = CoreRuntime::new(
            Box::new(store.clone()),
            Box::new(sink.clone()),
            RuntimeOptions::default(),
        );
        Self {
            core,
            store,
            sink,
            queue: VecDeque::new(),
            dispatched: Vec::new(),
            restarts: Vec::new(),
            wake_ups: 0,
            failures: BTreeMap::new(),
            exit_requested: false,
        }
    }

    /// Makes the next `times` executions of `name` end in error.
    pub fn fail(mut self, name: &str, times: u32) -> Self {
        self.failures.insert(name.to_string(), times);
        self
    }

    pub fn step(&mut self, event: SchedulerEvent) -> Vec<CoreCommand> {
        let step = self.core.step(event);
        for command in &step.commands {
            match command {
                CoreCommand::DispatchTasks(tasks) => {
                    for t in tasks {
                        self.dispatched.push(t.name.clone());
                        self.queue.push_back(t.clone());
                    }
                }
                CoreCommand::ScheduleRestart { job, task, .. } => {
                    self.restarts.push((*job, task.clone()));
                }
                CoreCommand::ScheduleWakeUp { .. } => self.wake_ups += 1,
                CoreCommand::RequestExit => self.exit_requested = true,
            }
        }
        step.commands
    }

    pub fn submit(&mut self, job: JobModel) -> JobId {
        let id = job.id();
        self.step(SchedulerEvent::JobSubmitted { job: Box::new(job) });
        id
    }

    /// Tasks dispatched and not completed yet.
    pub fn in_flight(&self) -> Vec<&DispatchedTask> {
        self.queue.iter().collect()
    }

    /// Completes the oldest dispatched task. Returns its name.
    pub fn complete_next(&mut self) -> Option<String> {
        let task = self.queue.front()?;
        let action = completion_action(task);
        let completion = match self.failures.get_mut(initial_name(&task.name)) {
            Some(n) if *n > 0 => {
                *n -= 1;
                TaskCompletion::failure()
            }
            _ => TaskCompletion::success(),
        };
        self.complete_next_with(completion.with_action(action))
    }

    /// Completes the oldest dispatched task with a given outcome.
    pub fn complete_next_with(&mut self, completion: TaskCompletion) -> Option<String> {
        let task = self.queue.pop_front()?;
        let name = task.name.clone();
        self.step(SchedulerEvent::TaskCompleted {
            job: task.job,
            task: task.task,
            completion,
        });
        Some(name)
    }

    /// Fires every armed restart timer.
    pub fn fire_restarts(&mut self) {
        for (job, task) in std::mem::take(&mut self.restarts) {
            self.step(SchedulerEvent::RestartTask { job, task });
        }
    }

    /// Completes tasks and fires restarts until nothing is left to do.
    pub fn run_until_quiet(&mut self) {
        for _ in 0..10_000 {
            if self.complete_next().is_some() {
                continue;
            }
            if self.restarts.is_empty() {
                return;
            }
            self.fire_restarts();
        }
        panic!("job did not settle");
    }

    /// Last saved state of a job, live or not.
    pub fn saved(&self, id: JobId) -> JobModel {
        self.store.load_job(id).expect("job was never saved")
    }

    /// Id of the task called `name` in the saved job.
    pub fn task_id(&self, job: JobId, name: &str) -> TaskId {
        self.saved(job)
            .task_by_name(name)
            .unwrap_or_else(|| panic!("no task named {name}"))
            .id()
            .clone()
    }
}

impl Default for CoreDriver {
    fn default() -> Self {
        Self::new()
    }
}
