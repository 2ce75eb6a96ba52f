// src/job/flow/replication.rs

//! Sub-graph duplication shared by LOOP and REPLICATE.
//!
//! Duplication happens in two phases. [`replicate_tree`] builds detached
//! copies whose edges still point at the originals they were copied from.
//! [`commit_replicas`] then allocates ids, rewrites edges onto the new ids
//! and inserts everything into the job in one go. Nothing in the job changes
//! until the commit.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::errors::{JobflowError, Result};
use crate::job::changes::ChangedTasksInfo;
use crate::job::model::JobModel;
use crate::job::task::{TaskNode, initial_name};
use crate::job::{JobStatus, TaskId, TaskMap, TaskStatus};

/// Detached copies keyed by the id of the task they were copied from.
pub(in crate::job) type Replicas = BTreeMap<TaskId, TaskNode>;

/// Copies every task on the paths from `bottom` up to `top` (both included).
///
/// For a LOOP the copies get the next iteration index. When loops are nested
/// several iterations of the same task may be reached; only the lowest one
/// is kept and edges are routed around the dropped ones.
pub(in crate::job) fn replicate_tree(
    tasks: &TaskMap,
    bottom: &TaskId,
    top: &TaskId,
    loop_action: bool,
) -> Result<Replicas> {
    let mut raw: Replicas = BTreeMap::new();
    let mut stack = vec![bottom.clone()];

    while let Some(id) = stack.pop() {
        if raw.contains_key(&id) {
            continue;
        }
        let node = tasks
            .get(&id)
            .ok_or_else(|| JobflowError::UnknownTask(id.to_string()))?;
        let mut copy = node.replica();
        if loop_action {
            copy.set_iteration_index(node.iteration_index() + 1);
        }
        raw.insert(id.clone(), copy);

        if id != *top {
            stack.extend(distinct_by_base_name(tasks, node.dependencies()));
            stack.extend(node.joined_branches().iter().cloned());
            stack.extend(node.if_branch().cloned());
        }
    }

    let mut lowest: HashMap<&str, &TaskId> = HashMap::new();
    for (id, copy) in &raw {
        let name = initial_name(copy.name());
        let keep_current = lowest
            .get(name)
            .and_then(|current| raw.get(*current))
            .is_some_and(|current| current.iteration_index() <= copy.iteration_index());
        if !keep_current {
            lowest.insert(name, id);
        }
    }
    let kept: HashSet<TaskId> = lowest.into_values().cloned().collect();
    let mut replicas: Replicas = raw.into_iter().filter(|(id, _)| kept.contains(id)).collect();

    let mut visited = HashSet::new();
    reconstruct(tasks, &mut replicas, bottom, top, &mut visited);
    Ok(replicas)
}

#[derive(Clone, Copy)]
enum EdgeKind {
    Dependency,
    IfBranch,
    Joined,
}

/// Re-creates the edges between copies, mirroring the originals.
fn reconstruct(
    tasks: &TaskMap,
    replicas: &mut Replicas,
    id: &TaskId,
    top: &TaskId,
    visited: &mut HashSet<TaskId>,
) {
    if id == top || !visited.insert(id.clone()) {
        return;
    }
    let Some(node) = tasks.get(id) else {
        return;
    };

    // After an IF ran, a branch root has both the weak and the hard edge to
    // its initiator; only the weak one is copied.
    let (kind, parents) = if let Some(initiator) = node.if_branch() {
        (EdgeKind::IfBranch, vec![initiator.clone()])
    } else if node.joined_branches().len() == 2 {
        (EdgeKind::Joined, node.joined_branches().to_vec())
    } else {
        (
            EdgeKind::Dependency,
            distinct_by_base_name(tasks, node.dependencies()),
        )
    };

    for parent in parents {
        let mut parent = parent;
        if replicas.contains_key(id) {
            if !replicas.contains_key(&parent) {
                // the parent copy was dropped (nested loop): climb to the
                // nearest ancestor that was kept
                let mut hops = 0;
                while !replicas.contains_key(&parent) && hops < tasks.len() {
                    match first_parent(tasks, &parent) {
                        Some(up) => parent = up,
                        None => break,
                    }
                    hops += 1;
                }
                if replicas.contains_key(&parent) {
                    if let Some(copy) = replicas.get_mut(id) {
                        copy.add_dependency(parent.clone());
                    }
                }
            } else if let Some(copy) = replicas.get_mut(id) {
                match kind {
                    EdgeKind::Dependency => copy.add_dependency(parent.clone()),
                    EdgeKind::IfBranch => copy.if_branch = Some(parent.clone()),
                    EdgeKind::Joined => {
                        if !copy.joined_branches.contains(&parent) {
                            copy.joined_branches.push(parent.clone());
                        }
                    }
                }
            }
        }
        if parent != *top {
            reconstruct(tasks, replicas, &parent, top, visited);
        }
    }
}

/// Among parents sharing a base name (replicas of one another), keeps the
/// one with the lowest replication index.
fn distinct_by_base_name(tasks: &TaskMap, parents: &[TaskId]) -> Vec<TaskId> {
    let mut by_name: BTreeMap<&str, (&TaskId, u32)> = BTreeMap::new();
    for id in parents {
        let Some(parent) = tasks.get(id) else {
            continue;
        };
        let replication = parent.replication_index();
        match by_name.get(parent.initial_name()) {
            Some((_, current)) if *current <= replication => {}
            _ => {
                by_name.insert(parent.initial_name(), (id, replication));
            }
        }
    }
    by_name.into_values().map(|(id, _)| id.clone()).collect()
}

fn first_parent(tasks: &TaskMap, id: &TaskId) -> Option<TaskId> {
    let node = tasks.get(id)?;
    node.dependencies()
        .first()
        .or(node.if_branch())
        .or(node.joined_branches().first())
        .cloned()
}

/// Inserts detached copies into the job. Returns the original-to-copy id
/// mapping.
pub(in crate::job) fn commit_replicas(
    job: &mut JobModel,
    replicas: Replicas,
    changes: &mut ChangedTasksInfo,
) -> Result<BTreeMap<TaskId, TaskId>> {
    let mut mapping: BTreeMap<TaskId, TaskId> = BTreeMap::new();
    for (offset, (original, copy)) in replicas.iter().enumerate() {
        let offset = u32::try_from(offset).unwrap_or(u32::MAX);
        mapping.insert(original.clone(), job.next_task_id(copy.name(), offset));
    }

    let status = if job.status == JobStatus::Paused {
        TaskStatus::Paused
    } else {
        TaskStatus::Pending
    };
    let remap = |id: &TaskId| mapping.get(id).cloned().unwrap_or_else(|| id.clone());

    let mut added = Vec::with_capacity(replicas.len());
    for (original, mut copy) in replicas {
        copy.id = mapped(&mapping, &original)?;
        copy.dependencies = copy.dependencies.iter().map(remap).collect();
        copy.if_branch = copy.if_branch.as_ref().map(remap);
        copy.joined_branches = copy.joined_branches.iter().map(remap).collect();
        copy.status = status;
        added.push(copy.id.clone());
        job.insert_task(copy)?;
    }
    changes.new_tasks_added(added);
    Ok(mapping)
}

pub(in crate::job) fn mapped(mapping: &BTreeMap<TaskId, TaskId>, original: &TaskId) -> Result<TaskId> {
    mapping.get(original).cloned().ok_or_else(|| {
        JobflowError::IllegalState(format!("task {original} was not duplicated"))
    })
}
