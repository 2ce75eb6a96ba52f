// src/engine/core.rs

//! Pure core runtime state machine.
//!
//! [`CoreRuntime`] consumes [`SchedulerEvent`]s one at a time and produces
//! [`CoreCommand`]s. It owns every live job; the store and the notification
//! sink are called synchronously after each mutation. No Tokio types, no
//! channels, no IO of its own, so it is unit tested directly.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, error, warn};

use crate::engine::event_handlers::{
    handle_job_submitted, handle_kill_job, handle_node_lost, handle_pause_job,
    handle_restart_in_error_task, handle_restart_task, handle_resume_job, handle_task_completed,
};
use crate::engine::{CoreCommand, CoreStep, DispatchedTask, RuntimeOptions, SchedulerEvent};
use crate::job::task::START_AT;
use crate::job::{ChangedTasksInfo, JobId, JobModel, JobStatus, TaskId, TaskNode};
use crate::notify::NotificationSink;
use crate::store::JobStore;

/// Live jobs plus the collaborators every mutation reports to.
pub struct SchedulerContext {
    pub(crate) jobs: BTreeMap<JobId, JobModel>,
    store: Box<dyn JobStore>,
    notifier: Box<dyn NotificationSink>,
    options: RuntimeOptions,
    pub(crate) pending_restarts: BTreeSet<(JobId, TaskId)>,
    pub(crate) wake_up_pending: bool,
}

impl fmt::Debug for SchedulerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerContext")
            .field("jobs", &self.jobs.keys().collect::<Vec<_>>())
            .field("options", &self.options)
            .field("pending_restarts", &self.pending_restarts)
            .field("wake_up_pending", &self.wake_up_pending)
            .finish_non_exhaustive()
    }
}

impl SchedulerContext {
    pub fn new(
        store: Box<dyn JobStore>,
        notifier: Box<dyn NotificationSink>,
        options: RuntimeOptions,
    ) -> Self {
        SchedulerContext {
            jobs: BTreeMap::new(),
            store,
            notifier,
            options,
            pending_restarts: BTreeSet::new(),
            wake_up_pending: false,
        }
    }

    /// A live (not yet terminated) job.
    pub fn job(&self, id: JobId) -> Option<&JobModel> {
        self.jobs.get(&id)
    }

    pub fn live_jobs(&self) -> impl Iterator<Item = &JobModel> {
        self.jobs.values()
    }

    /// True when nothing can happen without outside intervention: no task
    /// running or startable, no timer armed.
    pub fn is_idle(&self) -> bool {
        self.pending_restarts.is_empty()
            && !self.wake_up_pending
            && self.jobs.values().all(|job| {
                !job.dependency_graph().has_running_tasks() && job.eligible_tasks().is_empty()
            })
    }

    /// Persists and reports the outcome of one mutation of `id`, then drops
    /// the job from the live set if it ended.
    pub(crate) fn commit(&mut self, id: JobId, before: JobStatus, changes: ChangedTasksInfo) {
        let Some(job) = self.jobs.get(&id) else {
            return;
        };
        if let Err(e) = self.store.save_job_and_tasks(job, &changes.all()) {
            error!(job = %id, error = %e, "failed to save job");
        }
        self.notifier.notify_tasks_changed(job.owner(), id, &changes);
        if job.status() != before {
            self.notifier.notify_job_state(job.owner(), &job.job_info());
        }
        if job.status().is_terminal() {
            debug!(job = %id, status = %job.status(), "job leaves the live set");
            self.jobs.remove(&id);
            self.pending_restarts.retain(|(job, _)| *job != id);
        }
    }

    /// Starts every eligible task of every dispatching job, highest priority
    /// first. Tasks stamped with a future `START_AT` are held back and a
    /// wake-up is requested.
    pub(crate) fn dispatch(&mut self) -> Vec<CoreCommand> {
        let now = Utc::now();
        let mut order: Vec<(Reverse<_>, JobId)> = self
            .jobs
            .values()
            .map(|job| (Reverse(job.attributes().priority), job.id()))
            .collect();
        order.sort();

        let mut dispatched = Vec::new();
        let mut next_wake_up: Option<Duration> = None;

        for (_, id) in order {
            let Some(job) = self.jobs.get_mut(&id) else {
                continue;
            };
            let before = job.status();
            let candidates: Vec<(TaskId, Option<DateTime<Utc>>)> = job
                .eligible_tasks()
                .into_iter()
                .map(|task| (task.id().clone(), start_at(task)))
                .collect();

            let mut changes = ChangedTasksInfo::new();
            for (task, start_at) in candidates {
                if let Some(at) = start_at.filter(|at| *at > now) {
                    let wait = (at - now).to_std().unwrap_or_default();
                    next_wake_up = Some(next_wake_up.map_or(wait, |w| w.min(wait)));
                    debug!(job = %id, task = %task, start_at = %at, "task deferred");
                    continue;
                }
                if let Err(e) = job.start_task(&task, Some(self.options.execution_host.clone())) {
                    warn!(job = %id, task = %task, error = %e, "could not start task");
                    continue;
                }
                if let Ok(node) = job.task(&task) {
                    dispatched.push(DispatchedTask {
                        job: id,
                        task: task.clone(),
                        name: node.name().to_owned(),
                        executable: node.executable().clone(),
                        flow_script: node.flow_script().cloned(),
                        iteration: node.iteration_index(),
                        replication: node.replication_index(),
                    });
                }
                changes.task_updated(task);
            }
            if !changes.is_empty() {
                self.commit(id, before, changes);
            }
        }

        let mut commands = Vec::new();
        if !dispatched.is_empty() {
            commands.push(CoreCommand::DispatchTasks(dispatched));
        }
        if let Some(delay) = next_wake_up.filter(|_| !self.wake_up_pending) {
            self.wake_up_pending = true;
            commands.push(CoreCommand::ScheduleWakeUp { delay });
        }
        commands
    }
}

fn start_at(task: &TaskNode) -> Option<DateTime<Utc>> {
    let raw = task.generic_information().get(START_AT)?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(at) => Some(at.with_timezone(&Utc)),
        Err(e) => {
            warn!(task = %task.id(), value = %raw, error = %e, "ignoring unreadable START_AT");
            None
        }
    }
}

/// Pure core runtime.
#[derive(Debug)]
pub struct CoreRuntime {
    ctx: SchedulerContext,
}

impl CoreRuntime {
    pub fn new(
        store: Box<dyn JobStore>,
        notifier: Box<dyn NotificationSink>,
        options: RuntimeOptions,
    ) -> Self {
        CoreRuntime {
            ctx: SchedulerContext::new(store, notifier, options),
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.ctx
    }

    pub fn is_idle(&self) -> bool {
        self.ctx.is_idle()
    }

    /// Handle a single event, updating core state and returning the
    /// resulting commands for the IO shell.
    pub fn step(&mut self, event: SchedulerEvent) -> CoreStep {
        let ctx = &mut self.ctx;
        let mut commands = match event {
            SchedulerEvent::JobSubmitted { job } => handle_job_submitted(ctx, *job),
            SchedulerEvent::TaskCompleted {
                job,
                task,
                completion,
            } => handle_task_completed(ctx, job, task, completion),
            SchedulerEvent::NodeLost { job, task } => handle_node_lost(ctx, job, task),
            SchedulerEvent::RestartTask { job, task } => handle_restart_task(ctx, job, task),
            SchedulerEvent::RestartInErrorTask { job, task } => {
                handle_restart_in_error_task(ctx, job, task)
            }
            SchedulerEvent::PauseJob { job } => handle_pause_job(ctx, job),
            SchedulerEvent::ResumeJob { job } => handle_resume_job(ctx, job),
            SchedulerEvent::KillJob { job } => handle_kill_job(ctx, job),
            SchedulerEvent::Tick => {
                ctx.wake_up_pending = false;
                Vec::new()
            }
            SchedulerEvent::ShutdownRequested => {
                return CoreStep {
                    commands: Vec::new(),
                    keep_running: false,
                };
            }
        };

        commands.extend(ctx.dispatch());

        let mut keep_running = true;
        if ctx.options.exit_when_idle && ctx.is_idle() {
            if !ctx.jobs.is_empty() {
                warn!(
                    jobs = ctx.jobs.len(),
                    "no job can make progress without intervention"
                );
            }
            keep_running = false;
            commands.push(CoreCommand::RequestExit);
        }

        CoreStep {
            commands,
            keep_running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::JobDefinition;
    use crate::engine::event_handlers::{handle_job_submitted, pending_restarts_of};
    use crate::engine::TaskCompletion;
    use crate::factory::JobFactory;
    use crate::notify::TracingSink;
    use crate::store::InMemoryJobStore;

    fn context() -> SchedulerContext {
        SchedulerContext::new(
            Box::new(InMemoryJobStore::new()),
            Box::new(TracingSink),
            RuntimeOptions::default(),
        )
    }

    fn job(factory: &mut JobFactory, toml: &str) -> JobModel {
        let definition: JobDefinition = toml::from_str(toml).unwrap();
        factory.create_job(&definition, "alice").unwrap()
    }

    fn dispatched(commands: &[CoreCommand]) -> Vec<(JobId, String)> {
        commands
            .iter()
            .filter_map(|c| match c {
                CoreCommand::DispatchTasks(tasks) => Some(tasks),
                _ => None,
            })
            .flatten()
            .map(|t| (t.job, t.name.clone()))
            .collect()
    }

    const SINGLE: &str = r#"
[job]
name = "single"
priority = "PRIORITY"

[[task]]
name = "only"
executable = { type = "script", script = "true" }
"#;

    #[test]
    fn higher_priority_jobs_dispatch_first() {
        let mut factory = JobFactory::new();
        let low = job(&mut factory, &SINGLE.replace("PRIORITY", "low"));
        let high = job(&mut factory, &SINGLE.replace("PRIORITY", "highest"));
        let (low_id, high_id) = (low.id(), high.id());

        let mut ctx = context();
        assert!(handle_job_submitted(&mut ctx, low).is_empty());
        assert!(handle_job_submitted(&mut ctx, high).is_empty());

        let order: Vec<JobId> = dispatched(&ctx.dispatch()).into_iter().map(|(j, _)| j).collect();
        assert_eq!(order, vec![high_id, low_id]);
        assert!(!ctx.is_idle());
    }

    #[test]
    fn future_start_at_defers_the_task() {
        let mut factory = JobFactory::new();
        let deferred = job(
            &mut factory,
            r#"
[job]
name = "deferred"

[[task]]
name = "later"
executable = { type = "script", script = "true" }
generic_information = { START_AT = "2999-01-01T00:00:00Z" }

[[task]]
name = "now"
executable = { type = "script", script = "true" }
generic_information = { START_AT = "2000-01-01T00:00:00Z" }

[[task]]
name = "garbled"
executable = { type = "script", script = "true" }
generic_information = { START_AT = "tomorrow" }
"#,
        );
        let mut ctx = context();
        handle_job_submitted(&mut ctx, deferred);

        let commands = ctx.dispatch();
        let names: Vec<String> = dispatched(&commands).into_iter().map(|(_, n)| n).collect();
        assert_eq!(names, vec!["now", "garbled"]);
        assert!(
            commands
                .iter()
                .any(|c| matches!(c, CoreCommand::ScheduleWakeUp { .. }))
        );
        assert!(ctx.wake_up_pending);

        // one wake-up at a time
        let again = ctx.dispatch();
        assert!(again.is_empty());
    }

    #[test]
    fn tick_clears_the_pending_wake_up() {
        let mut factory = JobFactory::new();
        let deferred = job(
            &mut factory,
            r#"
[job]
name = "deferred"

[[task]]
name = "later"
executable = { type = "script", script = "true" }
generic_information = { START_AT = "2999-01-01T00:00:00Z" }
"#,
        );
        let mut core = CoreRuntime::new(
            Box::new(InMemoryJobStore::new()),
            Box::new(TracingSink),
            RuntimeOptions::default(),
        );
        let step = core.step(SchedulerEvent::JobSubmitted {
            job: Box::new(deferred),
        });
        assert!(step.keep_running);
        assert!(!core.is_idle());

        let step = core.step(SchedulerEvent::Tick);
        assert!(step.keep_running);
        assert!(
            step.commands
                .iter()
                .any(|c| matches!(c, CoreCommand::ScheduleWakeUp { .. }))
        );
    }

    #[test]
    fn failed_task_waits_for_its_restart_timer() {
        let mut factory = JobFactory::new();
        let retried = job(
            &mut factory,
            r#"
[job]
name = "retried"
max_number_of_execution = 2

[[task]]
name = "flaky"
executable = { type = "script", script = "true" }
"#,
        );
        let id = retried.id();
        let mut core = CoreRuntime::new(
            Box::new(InMemoryJobStore::new()),
            Box::new(TracingSink),
            RuntimeOptions::default(),
        );
        let step = core.step(SchedulerEvent::JobSubmitted {
            job: Box::new(retried),
        });
        let task = match step.commands.first() {
            Some(CoreCommand::DispatchTasks(tasks)) => tasks[0].task.clone(),
            other => panic!("expected a dispatch, got {other:?}"),
        };

        let step = core.step(SchedulerEvent::TaskCompleted {
            job: id,
            task: task.clone(),
            completion: TaskCompletion::failure(),
        });
        assert!(step.keep_running, "a restart timer is armed");
        assert!(step.commands.iter().any(|c| matches!(
            c,
            CoreCommand::ScheduleRestart { delay, .. } if *delay >= Duration::from_secs(1)
        )));
        assert_eq!(pending_restarts_of(core.context(), id), BTreeSet::from([task.clone()]));

        let step = core.step(SchedulerEvent::RestartTask { job: id, task });
        assert!(pending_restarts_of(core.context(), id).is_empty());
        assert_eq!(dispatched(&step.commands).len(), 1);
    }

    #[test]
    fn idle_core_requests_exit() {
        let mut core = CoreRuntime::new(
            Box::new(InMemoryJobStore::new()),
            Box::new(TracingSink),
            RuntimeOptions::default(),
        );
        let step = core.step(SchedulerEvent::Tick);
        assert!(!step.keep_running);
        assert!(matches!(step.commands.as_slice(), [CoreCommand::RequestExit]));

        let mut core = CoreRuntime::new(
            Box::new(InMemoryJobStore::new()),
            Box::new(TracingSink),
            RuntimeOptions {
                exit_when_idle: false,
                ..RuntimeOptions::default()
            },
        );
        assert!(core.step(SchedulerEvent::Tick).keep_running);
        assert!(!core.step(SchedulerEvent::ShutdownRequested).keep_running);
    }
}
