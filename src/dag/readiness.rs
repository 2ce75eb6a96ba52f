// src/dag/readiness.rs

//! Read-only readiness checks over a job's task map.
//!
//! Readiness is derived from task statuses on demand rather than tracked with
//! per-task counters, so duplicating tasks or plugging IF branches never has
//! a counter to keep in sync.

use crate::job::{TaskId, TaskMap, TaskNode};

/// Whether every parent `task` waits on has completed.
///
/// A task attached to an IF initiator through `if_branch` is only ready once
/// the initiator has plugged it in as a hard dependency, which happens when
/// the initiator selects this branch (or skips it).
pub fn dependencies_satisfied(task: &TaskNode, tasks: &TaskMap) -> bool {
    if let Some(initiator) = task.if_branch() {
        if !task.dependencies().contains(initiator) {
            return false;
        }
    }
    task.upstream().all(|parent| {
        tasks
            .get(parent)
            .is_some_and(|p| p.status().satisfies_dependency())
    })
}

/// Tasks that wait on `parent` through a dependency or a joined branch.
pub fn children_of<'a>(parent: &'a TaskId, tasks: &'a TaskMap) -> impl Iterator<Item = &'a TaskNode> {
    tasks
        .values()
        .filter(move |t| t.upstream().any(|p| p == parent))
}
