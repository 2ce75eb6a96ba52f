// src/job/flow/if_action.rs

use tracing::info;

use super::{FlowAction, FlowActionHandler};
use crate::errors::{JobflowError, Result};
use crate::job::changes::ChangedTasksInfo;
use crate::job::model::JobModel;
use crate::job::task::{TaskNode, initial_name};
use crate::job::{TaskId, TaskStatus};

pub(super) struct IfHandler;

fn is_done(task: &TaskNode) -> bool {
    matches!(task.status(), TaskStatus::Finished | TaskStatus::Skipped)
}

/// Branch and join tasks an IF decision applies to.
struct IfTargets {
    selected: TaskId,
    other: TaskId,
    join: Option<TaskId>,
}

/// Finds the tasks named by the action. Exact names are tried first; if a
/// target already ran (it was looped), the latest iteration with the same
/// base name and replication index is used instead.
fn resolve_targets(job: &JobModel, initiator: &TaskId, action: &FlowAction) -> Result<IfTargets> {
    let target = action
        .target
        .as_deref()
        .ok_or_else(|| JobflowError::IllegalState("IF action has no target".into()))?;
    let target_else = action
        .target_else
        .as_deref()
        .ok_or_else(|| JobflowError::IllegalState("IF action has no ELSE target".into()))?;
    let continuation = action.target_continuation.as_deref();

    let initiator_node = job.task(initiator)?;
    let (mut selected, mut other, mut join) = (None, None, None);

    for task in job.tasks().filter(|t| !is_done(t)) {
        if task.name() == target {
            if task.if_branch() == Some(initiator) {
                selected = Some(task.id().clone());
            }
        } else if task.name() == target_else {
            if task.if_branch() == Some(initiator) {
                other = Some(task.id().clone());
            }
        } else if Some(task.name()) == continuation
            && job.find_task_up(initiator_node.name(), task.id()).as_ref() == Some(initiator)
        {
            join = Some(task.id().clone());
        }
    }

    let (search_selected, search_other, search_join) =
        (selected.is_none(), other.is_none(), join.is_none());
    let latest = |current: &Option<TaskId>, candidate: &TaskNode| match current {
        Some(id) => job
            .task(id)
            .map(|c| c.iteration_index() < candidate.iteration_index())
            .unwrap_or(true),
        None => true,
    };
    for task in job
        .tasks()
        .filter(|t| t.replication_index() == initiator_node.replication_index() && !is_done(t))
    {
        let name = task.initial_name();
        if search_selected && initial_name(target) == name {
            if latest(&selected, task) {
                selected = Some(task.id().clone());
            }
        } else if search_other && initial_name(target_else) == name {
            if latest(&other, task) {
                other = Some(task.id().clone());
            }
        } else if search_join && continuation.map(initial_name) == Some(name) {
            if latest(&join, task) {
                join = Some(task.id().clone());
            }
        }
    }

    let selected = selected.ok_or_else(|| {
        JobflowError::IllegalState(format!("IF target {target} not found for {initiator}"))
    })?;
    let other = other.ok_or_else(|| {
        JobflowError::IllegalState(format!("IF ELSE target {target_else} not found for {initiator}"))
    })?;
    Ok(IfTargets {
        selected,
        other,
        join,
    })
}

impl FlowActionHandler for IfHandler {
    fn apply(
        &self,
        job: &mut JobModel,
        initiator: &TaskId,
        action: &FlowAction,
        changes: &mut ChangedTasksInfo,
    ) -> Result<bool> {
        let IfTargets {
            selected,
            other,
            join,
        } = resolve_targets(job, initiator, action)?;

        // the selected branch is either a single task or a block
        let branch_end = match job.task(&selected)?.matching_block() {
            Some(end) => job
                .tasks()
                .filter(|t| t.name() == end && !is_done(t))
                .last()
                .map(|t| t.id().clone())
                .unwrap_or_else(|| selected.clone()),
            None => selected.clone(),
        };

        // everything that can only run through the other branch
        let skipped: Vec<TaskId> = job
            .tasks()
            .filter(|t| !t.status().is_terminal() && job.depends_on(t.id(), &other))
            .map(|t| t.id().clone())
            .collect();
        let finished_at = job
            .task(initiator)?
            .finished_time()
            .map(|t| t + 1);

        job.task_mut(&selected)?.add_dependency(initiator.clone());
        changes.task_updated(selected.clone());
        if let Some(join) = &join {
            job.task_mut(join)?.add_dependency(branch_end.clone());
            changes.task_updated(join.clone());
        }
        job.task_mut(&other)?.add_dependency(initiator.clone());
        changes.task_updated(other.clone());

        for id in &skipped {
            job.set_task_status(id, TaskStatus::Skipped)?;
            let task = job.task_mut(id)?;
            task.finished_time = finished_at;
            task.execution_duration = Some(0);
            changes.task_skipped(id.clone());
        }

        job.descriptor.terminate(initiator, &job.tasks, job.status);

        info!(
            job = %job.id(),
            initiator = %initiator,
            selected = %selected,
            join = ?join.as_ref().map(|j| j.to_string()),
            skipped = skipped.len(),
            "IF"
        );
        Ok(true)
    }
}
