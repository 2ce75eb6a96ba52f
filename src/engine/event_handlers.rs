// src/engine/event_handlers.rs

//! Event handling logic for the core runtime.
//!
//! Each handler mutates at most one job and returns the commands the IO
//! shell must carry out. Persistence and notification happen in
//! [`SchedulerContext::commit`].

use std::collections::BTreeSet;

use tracing::{info, warn};

use crate::engine::core::SchedulerContext;
use crate::engine::{CoreCommand, TaskCompletion};
use crate::errors::{JobflowError, Result};
use crate::job::{
    ChangedTasksInfo, FailOutcome, JobId, JobModel, JobStatus, TaskErrorOutcome, TaskId,
    TaskStatus,
};

/// Runs `op` against a live job and commits whatever it changed. A rejected
/// operation is logged; the job is still committed since it may have been
/// partially updated.
fn mutate_job<F>(ctx: &mut SchedulerContext, id: JobId, what: &str, op: F) -> Vec<CoreCommand>
where
    F: FnOnce(&mut JobModel, &mut Vec<CoreCommand>) -> Result<ChangedTasksInfo>,
{
    let Some(job) = ctx.jobs.get_mut(&id) else {
        warn!(job = %id, event = what, "event for unknown or finished job ignored");
        return Vec::new();
    };
    let before = job.status();
    let mut commands = Vec::new();

    let changes = match op(job, &mut commands) {
        Ok(changes) => changes,
        Err(e) => {
            warn!(job = %id, event = what, error = %e, "operation rejected");
            ChangedTasksInfo::new()
        }
    };

    for command in &commands {
        if let CoreCommand::ScheduleRestart { job, task, .. } = command {
            ctx.pending_restarts.insert((*job, task.clone()));
        }
    }
    ctx.commit(id, before, changes);
    commands
}

fn updated(ids: impl IntoIterator<Item = TaskId>) -> ChangedTasksInfo {
    let mut changes = ChangedTasksInfo::new();
    for id in ids {
        changes.task_updated(id);
    }
    changes
}

fn fail_outcome_changes(outcome: FailOutcome) -> ChangedTasksInfo {
    match outcome {
        FailOutcome::AlreadyTerminated(_) => ChangedTasksInfo::new(),
        FailOutcome::Failed { updated: ids } => updated(ids),
    }
}

/// Starts a freshly created job.
pub fn handle_job_submitted(ctx: &mut SchedulerContext, mut job: JobModel) -> Vec<CoreCommand> {
    let id = job.id();
    if ctx.jobs.contains_key(&id) {
        warn!(job = %id, "job submitted twice; ignoring");
        return Vec::new();
    }
    let before = job.status();
    job.submit();
    let started = match job.start() {
        Ok(started) => started,
        Err(e) => {
            warn!(job = %id, error = %e, "job could not be started");
            return Vec::new();
        }
    };
    info!(job = %id, owner = %job.owner(), tasks = job.task_count(), "job submitted");
    ctx.jobs.insert(id, job);
    ctx.commit(id, before, updated(started));
    Vec::new()
}

pub fn handle_task_completed(
    ctx: &mut SchedulerContext,
    id: JobId,
    task: TaskId,
    completion: TaskCompletion,
) -> Vec<CoreCommand> {
    mutate_job(ctx, id, "task completed", |job, commands| {
        if !completion.error_occurred {
            return job.terminate_task(false, &task, completion.action.as_ref(), &completion.result);
        }
        let changes = match job.task_error(&task, completion.action.as_ref(), &completion.result)? {
            TaskErrorOutcome::Restart { delay } => {
                commands.push(CoreCommand::ScheduleRestart {
                    job: id,
                    task: task.clone(),
                    delay,
                });
                updated([task])
            }
            TaskErrorOutcome::Faulty(changes) => changes,
            TaskErrorOutcome::Suspended => updated([task]),
            TaskErrorOutcome::JobPaused(paused) => {
                let mut changes = updated(paused);
                changes.task_updated(task);
                changes
            }
            TaskErrorOutcome::JobCanceled(outcome) => fail_outcome_changes(outcome),
        };
        Ok(changes)
    })
}

/// The node of a running task was lost: re-run it elsewhere if it has
/// executions left, otherwise the job fails.
pub fn handle_node_lost(ctx: &mut SchedulerContext, id: JobId, task: TaskId) -> Vec<CoreCommand> {
    mutate_job(ctx, id, "node lost", |job, commands| {
        let node = job.task(&task)?;
        if node.status() != TaskStatus::Running {
            return Err(JobflowError::TaskNotRunning(task.clone()));
        }
        if node.executions_left() > 1 {
            let attempt = node.executions_done() + 1;
            job.task_waiting_on_error(&task, true)?;
            let delay = job.next_waiting_time(attempt);
            commands.push(CoreCommand::ScheduleRestart {
                job: id,
                task: task.clone(),
                delay,
            });
            return Ok(updated([task]));
        }
        Ok(fail_outcome_changes(job.failed(Some(&task), JobStatus::Failed)?))
    })
}

pub fn handle_restart_task(ctx: &mut SchedulerContext, id: JobId, task: TaskId) -> Vec<CoreCommand> {
    ctx.pending_restarts.remove(&(id, task.clone()));
    mutate_job(ctx, id, "restart task", |job, _| {
        job.re_start_task(&task)?;
        Ok(updated([task]))
    })
}

pub fn handle_restart_in_error_task(
    ctx: &mut SchedulerContext,
    id: JobId,
    task: TaskId,
) -> Vec<CoreCommand> {
    mutate_job(ctx, id, "restart in-error task", |job, _| {
        job.restart_in_error_task(&task)?;
        Ok(updated([task]))
    })
}

pub fn handle_pause_job(ctx: &mut SchedulerContext, id: JobId) -> Vec<CoreCommand> {
    mutate_job(ctx, id, "pause job", |job, _| Ok(updated(job.set_paused()?)))
}

pub fn handle_resume_job(ctx: &mut SchedulerContext, id: JobId) -> Vec<CoreCommand> {
    mutate_job(ctx, id, "resume job", |job, _| Ok(updated(job.set_unpause()?)))
}

pub fn handle_kill_job(ctx: &mut SchedulerContext, id: JobId) -> Vec<CoreCommand> {
    mutate_job(ctx, id, "kill job", |job, _| {
        Ok(fail_outcome_changes(job.failed(None, JobStatus::Killed)?))
    })
}

/// Tasks of a job currently waiting for a restart timer.
pub fn pending_restarts_of(ctx: &SchedulerContext, id: JobId) -> BTreeSet<TaskId> {
    ctx.pending_restarts
        .iter()
        .filter(|(job, _)| *job == id)
        .map(|(_, task)| task.clone())
        .collect()
}
