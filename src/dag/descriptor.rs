// src/dag/descriptor.rs

//! Scheduling view of a job: which tasks may start now, which are running,
//! and which are held back because the job (or the task) is paused.
//!
//! The three partitions are disjoint. They are maintained only through the
//! methods below, each of which is driven by a `JobModel` operation.

use std::collections::{BTreeMap, BTreeSet, HashSet};

use tracing::{debug, trace};

use crate::dag::readiness::{children_of, dependencies_satisfied};
use crate::dag::task_descriptor::RunningTaskDescriptor;
use crate::job::{JobStatus, TaskId, TaskMap, TaskStatus};

#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    eligible: BTreeSet<TaskId>,
    running: BTreeMap<TaskId, RunningTaskDescriptor>,
    paused: BTreeSet<TaskId>,
}

impl DependencyGraph {
    /// Recomputes the partitions from task statuses. Used at job start and
    /// after restoring a job from storage.
    pub fn rebuild(&mut self, tasks: &TaskMap, job_status: JobStatus) {
        self.eligible.clear();
        self.running.clear();
        self.paused.clear();

        if job_status.is_terminal() {
            return;
        }

        for task in tasks.values() {
            let id = task.id().clone();
            match task.status() {
                TaskStatus::Running => {
                    self.running.insert(
                        id.clone(),
                        RunningTaskDescriptor {
                            task_id: id,
                            execution_host: task.execution_host().map(str::to_owned),
                            started_at: task.start_time().unwrap_or_default(),
                        },
                    );
                }
                TaskStatus::InError | TaskStatus::WaitingOnError | TaskStatus::WaitingOnFailure => {
                    self.paused.insert(id);
                }
                TaskStatus::Paused if dependencies_satisfied(task, tasks) => {
                    self.paused.insert(id);
                }
                TaskStatus::Pending if dependencies_satisfied(task, tasks) => {
                    if job_status == JobStatus::Paused {
                        self.paused.insert(id);
                    } else {
                        self.eligible.insert(id);
                    }
                }
                _ => {}
            }
        }
        debug!(
            eligible = self.eligible.len(),
            running = self.running.len(),
            paused = self.paused.len(),
            "dependency graph rebuilt"
        );
    }

    /// Moves an eligible task to running. Returns false if it was not eligible.
    pub fn start(&mut self, id: &TaskId, host: Option<String>, started_at: i64) -> bool {
        if !self.eligible.remove(id) {
            return false;
        }
        self.running.insert(
            id.clone(),
            RunningTaskDescriptor {
                task_id: id.clone(),
                execution_host: host,
                started_at,
            },
        );
        true
    }

    /// Puts a running task back into the eligible set.
    pub fn re_start(&mut self, id: &TaskId) -> bool {
        if self.running.remove(id).is_none() {
            return false;
        }
        self.eligible.insert(id.clone());
        true
    }

    pub fn pause(&mut self, id: &TaskId) {
        if self.eligible.remove(id) {
            self.paused.insert(id.clone());
        }
    }

    pub fn unpause(&mut self, id: &TaskId) {
        if self.paused.remove(id) {
            self.eligible.insert(id.clone());
        }
    }

    /// A running task failed and waits (restart delay or IN_ERROR hold).
    pub fn paused_task_on_error(&mut self, id: &TaskId) {
        self.running.remove(id);
        self.eligible.remove(id);
        self.paused.insert(id.clone());
    }

    /// Removes a completed task and promotes the children it unblocked.
    ///
    /// Children already SKIPPED are terminated in turn, so readiness flows
    /// through skipped branches.
    pub fn terminate(&mut self, id: &TaskId, tasks: &TaskMap, job_status: JobStatus) {
        self.running.remove(id);
        self.eligible.remove(id);
        self.paused.remove(id);

        let mut stack = vec![id.clone()];
        let mut propagated: HashSet<TaskId> = HashSet::new();

        while let Some(parent) = stack.pop() {
            for child in children_of(&parent, tasks) {
                if !dependencies_satisfied(child, tasks) {
                    continue;
                }
                let child_id = child.id().clone();
                match child.status() {
                    TaskStatus::Skipped => {
                        if propagated.insert(child_id.clone()) {
                            trace!(task = %child_id, "propagating through skipped task");
                            stack.push(child_id);
                        }
                    }
                    TaskStatus::Pending if job_status != JobStatus::Paused => {
                        self.eligible.insert(child_id);
                    }
                    TaskStatus::Pending | TaskStatus::Paused => {
                        self.paused.insert(child_id);
                    }
                    _ => {}
                }
            }
        }
    }

    /// Removes a task that reached a final state outside of normal
    /// termination (skipped, recovered) and promotes its children.
    pub fn recover_task(&mut self, id: &TaskId, tasks: &TaskMap, job_status: JobStatus) {
        self.terminate(id, tasks, job_status);
    }

    /// LOOP: the initiator is done, the copied loop target becomes startable.
    pub fn do_loop(
        &mut self,
        initiator: &TaskId,
        new_target: &TaskId,
        tasks: &TaskMap,
        job_status: JobStatus,
    ) {
        self.running.remove(initiator);
        self.eligible.remove(initiator);
        self.paused.remove(initiator);

        let Some(target) = tasks.get(new_target) else {
            return;
        };
        if !dependencies_satisfied(target, tasks) {
            return;
        }
        if job_status == JobStatus::Paused || target.status() == TaskStatus::Paused {
            self.paused.insert(new_target.clone());
        } else {
            self.eligible.insert(new_target.clone());
        }
    }

    /// Job ended: nothing may be scheduled anymore.
    pub fn failed(&mut self) {
        self.eligible.clear();
        self.running.clear();
        self.paused.clear();
    }

    pub fn is_eligible(&self, id: &TaskId) -> bool {
        self.eligible.contains(id)
    }

    pub fn is_running(&self, id: &TaskId) -> bool {
        self.running.contains_key(id)
    }

    pub fn is_paused(&self, id: &TaskId) -> bool {
        self.paused.contains(id)
    }

    pub fn eligible_tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.eligible.iter()
    }

    pub fn running_tasks(&self) -> impl Iterator<Item = &RunningTaskDescriptor> {
        self.running.values()
    }

    pub fn paused_tasks(&self) -> impl Iterator<Item = &TaskId> {
        self.paused.iter()
    }

    pub fn running_task_descriptor(&self, id: &TaskId) -> Option<&RunningTaskDescriptor> {
        self.running.get(id)
    }

    pub fn has_running_tasks(&self) -> bool {
        !self.running.is_empty()
    }
}
