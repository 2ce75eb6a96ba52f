// src/job/flow/replicate_action.rs

use std::collections::HashMap;

use tracing::{info, warn};

use super::replication::{Replicas, commit_replicas, mapped, replicate_tree};
use super::{FlowAction, FlowActionHandler, FlowBlock};
use crate::errors::{JobflowError, Result};
use crate::job::changes::ChangedTasksInfo;
use crate::job::model::JobModel;
use crate::job::{TaskId, TaskStatus};

pub(super) struct ReplicateHandler;

/// One run of a replicated block, built but not yet inserted.
struct PlannedRun {
    root: TaskId,
    end: TaskId,
    merges: Vec<TaskId>,
    replicas: Replicas,
}

/// End of the block starting at `root`, or `root` itself when it is a
/// single task.
fn block_end(job: &JobModel, root: &TaskId) -> Option<TaskId> {
    let task = job.task(root).ok()?;
    if task.flow_block() != FlowBlock::Start {
        return Some(root.clone());
    }
    let end = task.matching_block()?;
    job.tasks()
        .filter(|t| {
            t.name() == end
                && !matches!(t.status(), TaskStatus::Finished | TaskStatus::Skipped)
                && job.depends_on(t.id(), root)
        })
        .map(|t| t.id().clone())
        .next()
}

impl FlowActionHandler for ReplicateHandler {
    fn apply(
        &self,
        job: &mut JobModel,
        initiator: &TaskId,
        action: &FlowAction,
        changes: &mut ChangedTasksInfo,
    ) -> Result<bool> {
        let runs = action.dup_number;
        let initiator_name = job.task(initiator)?.name().to_owned();

        let roots: Vec<TaskId> = job
            .tasks()
            .filter(|t| t.dependencies().contains(initiator))
            .map(|t| t.id().clone())
            .collect();

        // Nothing is inserted until every run is built.
        let mut planned: Vec<PlannedRun> = Vec::new();
        let mut next_index: HashMap<(String, u32), u32> = HashMap::new();
        for root in roots {
            let Some(end) = block_end(job, &root) else {
                warn!(job = %job.id(), task = %root, "REPLICATE: end of block not found; skipping");
                continue;
            };
            let merges: Vec<TaskId> = job
                .tasks()
                .filter(|t| t.dependencies().contains(&end))
                .map(|t| t.id().clone())
                .collect();

            for i in 0..runs {
                let mut replicas = replicate_tree(&job.tasks, &end, &root, false)?;
                if !replicas.contains_key(&root) || !replicas.contains_key(&end) {
                    return Err(JobflowError::IllegalState(format!(
                        "REPLICATE block from {root} to {end} could not be duplicated"
                    )));
                }
                for copy in replicas.values_mut() {
                    let key = (copy.initial_name().to_owned(), copy.iteration_index());
                    let replication = *next_index
                        .entry(key.clone())
                        .or_insert_with(|| job.next_replication_index(&key.0, key.1));
                    next_index.insert(key, replication + 1);
                    copy.set_replication_index(replication);
                    copy.tag = Some(format!("REPLICATE-{initiator_name}-{i}"));
                }
                planned.push(PlannedRun {
                    root: root.clone(),
                    end: end.clone(),
                    merges: merges.clone(),
                    replicas,
                });
            }
        }

        for run in planned {
            let mapping = commit_replicas(job, run.replicas, changes)?;
            job.task_mut(&mapped(&mapping, &run.root)?)?
                .add_dependency(initiator.clone());

            let new_end = mapped(&mapping, &run.end)?;
            for merge in &run.merges {
                job.task_mut(merge)?.add_dependency(new_end.clone());
                changes.task_updated(merge.clone());
            }
        }

        job.descriptor.terminate(initiator, &job.tasks, job.status);

        info!(
            job = %job.id(),
            initiator = %initiator,
            runs,
            new_tasks = changes.new_tasks().len(),
            "REPLICATE"
        );
        Ok(true)
    }
}
