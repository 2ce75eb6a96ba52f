// src/job/flow/loop_action.rs

use std::collections::HashSet;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;
use tracing::info;

use super::replication::{commit_replicas, mapped, replicate_tree};
use super::{FlowAction, FlowActionHandler};
use crate::errors::{JobflowError, Result};
use crate::job::changes::ChangedTasksInfo;
use crate::job::model::JobModel;
use crate::job::task::{REPLICATION_SEPARATOR, START_AT};
use crate::job::TaskId;

/// Date format used in the tag of cron-driven iterations.
const CRON_TAG_FORMAT: &str = "%d_%m_%y_%H_%M";

pub(super) struct LoopHandler;

impl FlowActionHandler for LoopHandler {
    fn apply(
        &self,
        job: &mut JobModel,
        initiator: &TaskId,
        action: &FlowAction,
        changes: &mut ChangedTasksInfo,
    ) -> Result<bool> {
        let target_name = action.target.as_deref().ok_or_else(|| {
            JobflowError::IllegalState(format!("LOOP action of {initiator} has no target"))
        })?;

        let target = if job.task(initiator)?.name() == target_name {
            initiator.clone()
        } else {
            job.find_task_up(target_name, initiator).ok_or_else(|| {
                JobflowError::IllegalState(format!(
                    "LOOP target {target_name} not found above {initiator}"
                ))
            })?
        };

        let start_at = action
            .cron_expr
            .as_deref()
            .map(next_cron_date)
            .transpose()?;

        let mut replicas = replicate_tree(&job.tasks, initiator, &target, true)?;
        if !replicas.contains_key(initiator) || !replicas.contains_key(&target) {
            return Err(JobflowError::IllegalState(format!(
                "LOOP block from {target} to {initiator} could not be duplicated"
            )));
        }

        // a task of the block may already have a copy at the next iteration
        // (nested loops): bump until every name is free
        let mut taken: HashSet<String> = job.tasks().map(|t| t.name().to_owned()).collect();
        for copy in replicas.values_mut() {
            while taken.contains(copy.name()) {
                let next = copy.iteration_index() + 1;
                copy.set_iteration_index(next);
            }
            taken.insert(copy.name().to_owned());
        }

        let initiator_node = job.task(initiator)?;
        let mut tag_prefix = format!("LOOP-{}", initiator_node.initial_name());
        if initiator_node.replication_index() > 0 {
            tag_prefix.push(REPLICATION_SEPARATOR);
            tag_prefix.push_str(&initiator_node.replication_index().to_string());
        }
        for copy in replicas.values_mut() {
            let suffix = match start_at {
                Some(date) => date.format(CRON_TAG_FORMAT).to_string(),
                None => copy.iteration_index().to_string(),
            };
            copy.tag = Some(format!("{tag_prefix}-{suffix}"));
            if let Some(date) = start_at {
                copy.generic_information
                    .insert(START_AT.to_owned(), date.to_rfc3339());
            }
        }

        let mapping = commit_replicas(job, replicas, changes)?;
        let new_target = mapped(&mapping, &target)?;
        let new_initiator = mapped(&mapping, initiator)?;

        job.task_mut(&new_target)?.add_dependency(initiator.clone());

        // whatever waited on the initiator now waits on the last iteration
        let mergers: Vec<TaskId> = job
            .tasks()
            .filter(|t| t.id() != &new_target && t.dependencies().contains(initiator))
            .map(|t| t.id().clone())
            .collect();
        for merger in mergers {
            let task = job.task_mut(&merger)?;
            for dep in task.dependencies.iter_mut() {
                if *dep == *initiator {
                    *dep = new_initiator.clone();
                }
            }
            changes.task_updated(merger);
        }

        job.descriptor
            .do_loop(initiator, &new_target, &job.tasks, job.status);

        info!(
            job = %job.id(),
            initiator = %initiator,
            target = %target,
            new_target = %new_target,
            start_at = ?start_at,
            "LOOP"
        );
        Ok(true)
    }
}

/// Next date matching a cron expression. Five-field expressions are
/// accepted by assuming second zero.
pub fn next_cron_date(expr: &str) -> Result<DateTime<Utc>> {
    let normalized = if expr.split_whitespace().count() == 5 {
        format!("0 {expr}")
    } else {
        expr.to_owned()
    };
    let schedule = Schedule::from_str(&normalized)
        .map_err(|e| JobflowError::Cron(format!("{expr}: {e}")))?;
    schedule
        .upcoming(Utc)
        .next()
        .ok_or_else(|| JobflowError::Cron(format!("{expr}: no upcoming date")))
}
