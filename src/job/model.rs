// src/job/model.rs

//! The mutable job: its tasks, status, counters and dependency graph.
//!
//! Every task status change goes through [`JobModel::set_task_status`], which
//! checks the transition table and moves the task between counter buckets.
//! Counters are therefore exact at all times, which `recount` can verify.

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::attributes::JobAttributes;
use super::changes::ChangedTasksInfo;
use super::flow::{self, FlowAction, FlowActionType};
use super::ids::{JobId, TaskId};
use super::info::{JobInfo, TaskCounters, TaskInfo};
use super::status::{JobStatus, TaskStatus};
use super::task::TaskNode;
use super::{TaskMap, now_millis};
use crate::dag::{DependencyGraph, RunningTaskDescriptor};
use crate::errors::{JobflowError, Result};
use crate::types::{JobKind, OnTaskError};

/// Default delay before the first re-execution of a task that ended in error.
pub const DEFAULT_RESTART_WAITING_TIMER_MS: u64 = 1000;

/// Opaque outcome of a task execution, as far as the core is concerned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskResult {
    pub duration_ms: Option<i64>,
    pub output: Option<String>,
}

/// Result of [`JobModel::failed`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// The job had already ended; nothing changed.
    AlreadyTerminated(JobStatus),
    Failed { updated: BTreeSet<TaskId> },
}

/// What [`JobModel::task_error`] decided for a task that ended in error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskErrorOutcome {
    /// Executions remain; the task waits and must be restarted after `delay`.
    Restart { delay: Duration },
    /// The task is FAULTY and the job keeps running.
    Faulty(ChangedTasksInfo),
    /// The task is held IN_ERROR until explicitly restarted.
    Suspended,
    /// The task is IN_ERROR and the job was paused.
    JobPaused(BTreeSet<TaskId>),
    /// The job was canceled.
    JobCanceled(FailOutcome),
}

#[derive(Debug, Clone)]
pub struct JobModel {
    pub(in crate::job) id: JobId,
    owner: String,
    name: String,
    kind: JobKind,
    attributes: JobAttributes,
    pub(in crate::job) status: JobStatus,
    submitted_time: Option<i64>,
    start_time: Option<i64>,
    finished_time: Option<i64>,
    counters: TaskCounters,
    faulty: BTreeSet<TaskId>,
    pub(in crate::job) tasks: TaskMap,
    pub(in crate::job) descriptor: DependencyGraph,
    restart_waiting_timer_ms: u64,
    to_be_removed: bool,
}

impl JobModel {
    pub fn new(
        id: JobId,
        owner: impl Into<String>,
        name: impl Into<String>,
        kind: JobKind,
        attributes: JobAttributes,
    ) -> Self {
        JobModel {
            id,
            owner: owner.into(),
            name: name.into(),
            kind,
            attributes,
            status: JobStatus::Pending,
            submitted_time: None,
            start_time: None,
            finished_time: None,
            counters: TaskCounters::default(),
            faulty: BTreeSet::new(),
            tasks: TaskMap::new(),
            descriptor: DependencyGraph::default(),
            restart_waiting_timer_ms: DEFAULT_RESTART_WAITING_TIMER_MS,
            to_be_removed: false,
        }
    }

    pub fn with_restart_waiting_timer(mut self, timer: Duration) -> Self {
        self.restart_waiting_timer_ms = u64::try_from(timer.as_millis()).unwrap_or(u64::MAX);
        self
    }

    // ---------------------------------------------------------------------
    // Queries
    // ---------------------------------------------------------------------

    pub fn id(&self) -> JobId {
        self.id
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn attributes(&self) -> &JobAttributes {
        &self.attributes
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn counters(&self) -> TaskCounters {
        self.counters
    }

    pub fn faulty_tasks(&self) -> &BTreeSet<TaskId> {
        &self.faulty
    }

    pub fn submitted_time(&self) -> Option<i64> {
        self.submitted_time
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn finished_time(&self) -> Option<i64> {
        self.finished_time
    }

    pub fn is_to_be_removed(&self) -> bool {
        self.to_be_removed
    }

    pub fn set_to_be_removed(&mut self) {
        self.to_be_removed = true;
    }

    pub fn tasks(&self) -> impl Iterator<Item = &TaskNode> {
        self.tasks.values()
    }

    pub fn task_count(&self) -> usize {
        self.tasks.len()
    }

    pub fn task(&self, id: &TaskId) -> Result<&TaskNode> {
        self.tasks
            .get(id)
            .ok_or_else(|| JobflowError::UnknownTask(id.to_string()))
    }

    pub fn task_by_name(&self, name: &str) -> Option<&TaskNode> {
        self.tasks.values().find(|t| t.name() == name)
    }

    pub fn dependency_graph(&self) -> &DependencyGraph {
        &self.descriptor
    }

    /// Tasks that may be started now. Empty unless the job is running,
    /// stalled, or in error.
    pub fn eligible_tasks(&self) -> Vec<&TaskNode> {
        if !self.status.is_dispatching() {
            return Vec::new();
        }
        self.descriptor
            .eligible_tasks()
            .filter_map(|id| self.tasks.get(id))
            .collect()
    }

    pub fn running_task_descriptor(&self, id: &TaskId) -> Result<&RunningTaskDescriptor> {
        self.descriptor
            .running_task_descriptor(id)
            .ok_or_else(|| JobflowError::TaskNotRunning(id.clone()))
    }

    /// Counters recomputed from task statuses.
    pub fn recount(&self) -> TaskCounters {
        let mut counters = TaskCounters {
            total: self.task_count_u32(),
            ..TaskCounters::default()
        };
        for task in self.tasks.values() {
            counters.enter(task.status().class());
        }
        counters
    }

    pub fn job_info(&self) -> JobInfo {
        JobInfo {
            job_id: self.id,
            owner: self.owner.clone(),
            name: self.name.clone(),
            priority: self.attributes.priority,
            status: self.status,
            counters: self.counters,
            submitted_time: self.submitted_time,
            start_time: self.start_time,
            finished_time: self.finished_time,
            to_be_removed: self.to_be_removed,
            tasks_skipped: None,
        }
    }

    pub fn task_info(&self, id: &TaskId) -> Result<TaskInfo> {
        let task = self.task(id)?;
        Ok(TaskInfo {
            job_id: self.id,
            task_id: id.clone(),
            name: task.name().to_owned(),
            status: task.status(),
            start_time: task.start_time(),
            finished_time: task.finished_time(),
            in_error_time: task.in_error_time(),
            execution_duration: task.execution_duration(),
            execution_host: task.execution_host().map(str::to_owned),
            progress: task.progress(),
            executions_left: task.executions_left(),
        })
    }

    /// Delay before re-executing a task that already failed
    /// `execution_number` times: grows by one second per attempt, capped at
    /// one minute after ten attempts.
    pub fn next_waiting_time(&self, execution_number: u32) -> Duration {
        let mut wait = self.restart_waiting_timer_ms;
        if execution_number > 10 {
            return Duration::from_millis(60_000);
        }
        for n in 1..=u64::from(execution_number) {
            wait += n * 1000;
        }
        Duration::from_millis(wait)
    }

    /// Searches upwards from `from` (through dependencies, joined branches
    /// and IF initiators) for a task called `name`.
    pub fn find_task_up(&self, name: &str, from: &TaskId) -> Option<TaskId> {
        let mut stack: Vec<&TaskId> = self.parents_of(from);
        stack.reverse();
        let mut visited: HashSet<&TaskId> = HashSet::new();

        while let Some(id) = stack.pop() {
            if !visited.insert(id) {
                continue;
            }
            let Some(task) = self.tasks.get(id) else {
                continue;
            };
            if task.name() == name {
                return Some(id.clone());
            }
            let mut parents = self.parents_of(id);
            parents.reverse();
            stack.extend(parents);
        }
        None
    }

    fn parents_of(&self, id: &TaskId) -> Vec<&TaskId> {
        let Some(task) = self.tasks.get(id) else {
            return Vec::new();
        };
        task.dependencies()
            .iter()
            .chain(task.joined_branches())
            .chain(task.if_branch())
            .collect()
    }

    /// Whether `task` depends on `parent`, directly or through IF edges.
    ///
    /// Joined branches count as one level up, an IF initiator as one level
    /// down; the path must come back to the starting level. A task with
    /// several parents depends on `parent` only if all of them do.
    pub fn depends_on(&self, task: &TaskId, parent: &TaskId) -> bool {
        self.depends_on_at_depth(task, parent, 0)
    }

    fn depends_on_at_depth(&self, task: &TaskId, parent: &TaskId, depth: i32) -> bool {
        if task == parent {
            return depth >= 0;
        }
        let Some(node) = self.tasks.get(task) else {
            return false;
        };
        if !node.joined_branches().is_empty() {
            node.joined_branches()
                .iter()
                .all(|b| self.depends_on_at_depth(b, parent, depth - 1))
        } else if let Some(initiator) = node.if_branch() {
            self.depends_on_at_depth(initiator, parent, depth + 1)
        } else if !node.dependencies().is_empty() {
            node.dependencies()
                .iter()
                .all(|d| self.depends_on_at_depth(d, parent, depth))
        } else {
            false
        }
    }

    /// Next free replication index among tasks sharing `base_name` and
    /// `iteration`.
    pub fn next_replication_index(&self, base_name: &str, iteration: u32) -> u32 {
        self.tasks
            .values()
            .filter(|t| t.initial_name() == base_name && t.iteration_index() == iteration)
            .map(|t| t.replication_index() + 1)
            .max()
            .unwrap_or(0)
    }

    fn task_count_u32(&self) -> u32 {
        u32::try_from(self.tasks.len()).unwrap_or(u32::MAX)
    }

    fn effective_on_task_error(&self, id: &TaskId) -> Result<OnTaskError> {
        let task = self.task(id)?;
        let policy = if task.attributes().on_task_error.is_set() {
            task.attributes().on_task_error
        } else {
            self.attributes.on_task_error
        };
        Ok(policy)
    }

    // ---------------------------------------------------------------------
    // Construction (used by the factory)
    // ---------------------------------------------------------------------

    /// Allocates the id the next inserted task will get.
    pub(crate) fn next_task_id(&self, name: &str, offset: u32) -> TaskId {
        TaskId::new(self.id, name, self.task_count_u32() + offset)
    }

    /// Inserts a task whose id was obtained from `next_task_id`.
    pub(crate) fn insert_task(&mut self, task: TaskNode) -> Result<()> {
        let expected = self.task_count_u32();
        if task.id().job() != self.id || task.id().index() != expected {
            return Err(JobflowError::IllegalState(format!(
                "task {} does not carry the next id of job {} (expected index {expected})",
                task.id(),
                self.id
            )));
        }
        self.counters.total += 1;
        self.counters.enter(task.status().class());
        if task.status() == TaskStatus::Faulty {
            self.faulty.insert(task.id().clone());
        }
        self.tasks.insert(task.id().clone(), task);
        Ok(())
    }

    pub(crate) fn add_dependency(&mut self, task: &TaskId, parent: &TaskId) -> Result<()> {
        self.task(parent)?;
        self.task_mut(task)?.add_dependency(parent.clone());
        Ok(())
    }

    pub(crate) fn set_matching_block(&mut self, task: &TaskId, name: &str) -> Result<()> {
        self.task_mut(task)?.set_matching_block(Some(name.to_owned()));
        Ok(())
    }

    pub(crate) fn set_if_branch(&mut self, task: &TaskId, initiator: &TaskId) -> Result<()> {
        self.task(initiator)?;
        self.task_mut(task)?.if_branch = Some(initiator.clone());
        Ok(())
    }

    pub(crate) fn set_joined_branches(&mut self, task: &TaskId, branches: Vec<TaskId>) -> Result<()> {
        for b in &branches {
            self.task(b)?;
        }
        self.task_mut(task)?.joined_branches = branches;
        Ok(())
    }

    pub(in crate::job) fn task_mut(&mut self, id: &TaskId) -> Result<&mut TaskNode> {
        self.tasks
            .get_mut(id)
            .ok_or_else(|| JobflowError::UnknownTask(id.to_string()))
    }

    // ---------------------------------------------------------------------
    // Status bookkeeping
    // ---------------------------------------------------------------------

    /// Changes a task status, enforcing the transition table and keeping the
    /// counters exact.
    pub(in crate::job) fn set_task_status(&mut self, id: &TaskId, to: TaskStatus) -> Result<()> {
        let task = self.task_mut(id)?;
        let from = task.status;
        if from == to {
            return Ok(());
        }
        if !from.can_transition_to(to) {
            return Err(JobflowError::IllegalTransition {
                task: id.clone(),
                from,
                to,
            });
        }
        task.status = to;
        self.account(id, from, to);
        Ok(())
    }

    /// Same as `set_task_status` without the transition check. Only used when
    /// an authoritative snapshot overrides local state.
    fn force_task_status(&mut self, id: &TaskId, to: TaskStatus) -> Result<()> {
        let task = self.task_mut(id)?;
        let from = task.status;
        if from == to {
            return Ok(());
        }
        task.status = to;
        self.account(id, from, to);
        Ok(())
    }

    fn account(&mut self, id: &TaskId, from: TaskStatus, to: TaskStatus) {
        self.counters.leave(from.class());
        self.counters.enter(to.class());
        if to == TaskStatus::Faulty {
            self.faulty.insert(id.clone());
        } else if from == TaskStatus::Faulty {
            self.faulty.remove(id);
        }
    }

    fn mark_stalled_if_idle(&mut self) {
        if self.status == JobStatus::Running && self.counters.running == 0 {
            debug!(job = %self.id, "no task running; job stalled");
            self.status = JobStatus::Stalled;
        }
    }

    fn finish_if_done(&mut self) {
        if self.status.is_terminal() || self.status == JobStatus::Pending {
            return;
        }
        if self.tasks.values().all(|t| t.status().is_terminal()) {
            self.terminate();
        }
    }

    // ---------------------------------------------------------------------
    // Lifecycle
    // ---------------------------------------------------------------------

    pub fn submit(&mut self) {
        self.submitted_time = Some(now_millis());
    }

    /// PENDING -> RUNNING: every task becomes PENDING and the entry points
    /// become eligible.
    pub fn start(&mut self) -> Result<BTreeSet<TaskId>> {
        if self.status != JobStatus::Pending {
            return Err(JobflowError::IllegalState(format!(
                "job {} cannot start from status {}",
                self.id, self.status
            )));
        }
        self.start_time = Some(now_millis());
        self.status = JobStatus::Running;

        let submitted: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.status() == TaskStatus::Submitted)
            .map(|t| t.id().clone())
            .collect();
        for id in &submitted {
            self.set_task_status(id, TaskStatus::Pending)?;
        }
        self.descriptor.rebuild(&self.tasks, self.status);

        info!(
            job = %self.id,
            name = %self.name,
            tasks = self.tasks.len(),
            "job started"
        );
        Ok(submitted.into_iter().collect())
    }

    /// Hands an eligible task to a node.
    pub fn start_task(&mut self, id: &TaskId, host: Option<String>) -> Result<()> {
        if !self.status.is_dispatching() {
            return Err(JobflowError::IllegalState(format!(
                "job {} does not dispatch tasks while {}",
                self.id, self.status
            )));
        }
        if !self.descriptor.is_eligible(id) {
            return Err(JobflowError::IllegalState(format!(
                "task {id} is not eligible"
            )));
        }
        let now = now_millis();
        self.set_task_status(id, TaskStatus::Running)?;
        self.descriptor.start(id, host.clone(), now);

        let task = self.task_mut(id)?;
        task.start_time = Some(now);
        task.finished_time = None;
        task.execution_host = host;
        task.progress = 0;

        if self.status == JobStatus::Stalled {
            self.status = JobStatus::Running;
        }
        debug!(job = %self.id, task = %id, "task started");
        Ok(())
    }

    /// Records the completion of a running task and applies its flow action.
    ///
    /// Falls back to plain termination when the action is CONTINUE, absent,
    /// or could not be applied. An IF initiator left without a decision
    /// skips both of its branches and its join.
    pub fn terminate_task(
        &mut self,
        error_occurred: bool,
        id: &TaskId,
        action: Option<&FlowAction>,
        result: &TaskResult,
    ) -> Result<ChangedTasksInfo> {
        if self.status.is_terminal() {
            return Err(JobflowError::IllegalState(format!(
                "job {} already ended with status {}",
                self.id, self.status
            )));
        }
        if self.task(id)?.status() != TaskStatus::Running {
            return Err(JobflowError::TaskNotRunning(id.clone()));
        }

        let now = now_millis();
        let to = if error_occurred {
            TaskStatus::Faulty
        } else {
            TaskStatus::Finished
        };
        self.set_task_status(id, to)?;
        {
            let task = self.task_mut(id)?;
            task.finished_time = Some(now);
            task.progress = 100;
            task.execution_duration = result
                .duration_ms
                .or_else(|| task.start_time.map(|start| now - start));
        }
        self.mark_stalled_if_idle();

        let mut changes = ChangedTasksInfo::new();
        changes.task_updated(id.clone());

        let did_action = match action {
            Some(action) => flow::apply_action(self, id, action, &mut changes),
            None => false,
        };
        if !did_action {
            self.descriptor.terminate(id, &self.tasks, self.status);
            if self.task(id)?.flow_script().map(|s| s.action()) == Some(FlowActionType::If) {
                changes.merge(self.skip_undecided_branches(id)?);
            }
        }

        info!(
            job = %self.id,
            task = %id,
            status = %to,
            new_tasks = changes.new_tasks().len(),
            skipped = changes.skipped_tasks().len(),
            "task terminated"
        );
        self.finish_if_done();
        Ok(changes)
    }

    /// Applies the job's error policy to a running task that ended in error.
    ///
    /// A task that ends FAULTY still applies the flow action it reported.
    pub fn task_error(
        &mut self,
        id: &TaskId,
        action: Option<&FlowAction>,
        result: &TaskResult,
    ) -> Result<TaskErrorOutcome> {
        let task = self.task(id)?;
        if task.status() != TaskStatus::Running {
            return Err(JobflowError::TaskNotRunning(id.clone()));
        }
        if task.executions_left() > 1 {
            let attempt = task.executions_done() + 1;
            self.task_waiting_on_error(id, false)?;
            let delay = self.next_waiting_time(attempt);
            info!(job = %self.id, task = %id, attempt, delay_ms = delay.as_millis() as u64, "task will be re-executed");
            return Ok(TaskErrorOutcome::Restart { delay });
        }

        match self.effective_on_task_error(id)? {
            OnTaskError::None | OnTaskError::ContinueJobExecution => {
                let changes = self.terminate_task(true, id, action, result)?;
                Ok(TaskErrorOutcome::Faulty(changes))
            }
            OnTaskError::SuspendTask => {
                self.set_task_in_error(id)?;
                Ok(TaskErrorOutcome::Suspended)
            }
            OnTaskError::PauseJob => {
                self.set_task_in_error(id)?;
                Ok(TaskErrorOutcome::JobPaused(self.set_paused()?))
            }
            OnTaskError::CancelJob => {
                let outcome = self.failed(Some(id), JobStatus::Canceled)?;
                Ok(TaskErrorOutcome::JobCanceled(outcome))
            }
        }
    }

    /// RUNNING -> WAITING_ON_ERROR / WAITING_ON_FAILURE; consumes one
    /// execution.
    pub fn task_waiting_on_error(&mut self, id: &TaskId, on_failure: bool) -> Result<()> {
        let to = if on_failure {
            TaskStatus::WaitingOnFailure
        } else {
            TaskStatus::WaitingOnError
        };
        self.set_task_status(id, to)?;
        self.descriptor.paused_task_on_error(id);
        let task = self.task_mut(id)?;
        task.executions_left = task.executions_left.saturating_sub(1);
        self.mark_stalled_if_idle();
        Ok(())
    }

    /// Holds a task IN_ERROR. The job becomes IN_ERROR unless it is paused.
    pub fn set_task_in_error(&mut self, id: &TaskId) -> Result<()> {
        if self.task(id)?.status() == TaskStatus::Running {
            self.task_waiting_on_error(id, false)?;
        }
        self.set_task_status(id, TaskStatus::InError)?;
        self.descriptor.paused_task_on_error(id);
        self.task_mut(id)?.in_error_time = Some(now_millis());
        if self.status != JobStatus::Paused {
            self.status = JobStatus::InError;
        }
        warn!(job = %self.id, task = %id, "task in error");
        Ok(())
    }

    /// Puts a task back into the eligible set: a lost running task, a task
    /// whose restart delay elapsed, or an IN_ERROR task restarted by hand.
    pub fn re_start_task(&mut self, id: &TaskId) -> Result<()> {
        let status = self.task(id)?.status();
        match status {
            TaskStatus::Running => {
                self.descriptor.re_start(id);
            }
            TaskStatus::WaitingOnError | TaskStatus::WaitingOnFailure | TaskStatus::InError => {
                self.descriptor.unpause(id);
            }
            TaskStatus::Pending | TaskStatus::Paused => {
                debug!(job = %self.id, task = %id, %status, "task already waiting to be scheduled");
                return Ok(());
            }
            other => {
                return Err(JobflowError::IllegalState(format!(
                    "task {id} cannot be restarted from status {other}"
                )));
            }
        }

        if self.status == JobStatus::Paused {
            self.set_task_status(id, TaskStatus::Paused)?;
            self.descriptor.pause(id);
        } else {
            self.set_task_status(id, TaskStatus::Pending)?;
        }
        let task = self.task_mut(id)?;
        task.progress = 0;
        task.in_error_time = None;

        if self.status == JobStatus::InError && self.counters.in_error == 0 {
            self.status = if self.counters.running > 0 {
                JobStatus::Running
            } else {
                JobStatus::Stalled
            };
        }
        self.mark_stalled_if_idle();
        debug!(job = %self.id, task = %id, "task restarted");
        Ok(())
    }

    /// Restarts a task held IN_ERROR.
    pub fn restart_in_error_task(&mut self, id: &TaskId) -> Result<()> {
        let status = self.task(id)?.status();
        if status != TaskStatus::InError {
            return Err(JobflowError::IllegalState(format!(
                "task {id} is {status}, not IN_ERROR"
            )));
        }
        self.re_start_task(id)
    }

    /// Ends the job with `job_status` (FAILED, CANCELED or KILLED).
    ///
    /// The causing task, if any, becomes FAILED (job FAILED) or FAULTY
    /// otherwise. Running tasks are ABORTED, waiting ones NOT_RESTARTED and
    /// every other non-terminal task NOT_STARTED.
    pub fn failed(&mut self, cause: Option<&TaskId>, job_status: JobStatus) -> Result<FailOutcome> {
        if !matches!(
            job_status,
            JobStatus::Failed | JobStatus::Canceled | JobStatus::Killed
        ) {
            return Err(JobflowError::IllegalState(format!(
                "{job_status} is not a failure status"
            )));
        }
        if self.status.is_terminal() {
            warn!(job = %self.id, status = %self.status, "job already terminated; ignoring failure");
            return Ok(FailOutcome::AlreadyTerminated(self.status));
        }
        if let Some(id) = cause {
            self.task(id)?;
        }

        let now = now_millis();
        let mut updated = BTreeSet::new();

        if let Some(id) = cause.filter(|_| job_status != JobStatus::Killed) {
            if !self.task(id)?.status().is_terminal() {
                let to = if job_status == JobStatus::Failed {
                    TaskStatus::Failed
                } else {
                    TaskStatus::Faulty
                };
                self.set_task_status(id, to)?;
                self.close_task_times(id, now)?;
                updated.insert(id.clone());
            }
        }

        self.descriptor.failed();
        self.finished_time = Some(now);
        self.status = job_status;

        let remaining: Vec<(TaskId, TaskStatus)> = self
            .tasks
            .values()
            .filter(|t| !t.status().is_terminal())
            .map(|t| (t.id().clone(), t.status()))
            .collect();
        for (id, status) in remaining {
            let to = match status {
                TaskStatus::Running => TaskStatus::Aborted,
                TaskStatus::WaitingOnError | TaskStatus::WaitingOnFailure => TaskStatus::NotRestarted,
                _ => TaskStatus::NotStarted,
            };
            self.set_task_status(&id, to)?;
            if to == TaskStatus::Aborted {
                self.close_task_times(&id, now)?;
            }
            updated.insert(id);
        }

        warn!(job = %self.id, status = %job_status, tasks = updated.len(), "job ended");
        Ok(FailOutcome::Failed { updated })
    }

    fn close_task_times(&mut self, id: &TaskId, now: i64) -> Result<()> {
        let task = self.task_mut(id)?;
        task.finished_time = Some(now);
        if let Some(start) = task.start_time {
            task.execution_duration = Some(now - start);
        }
        Ok(())
    }

    /// Marks the job FINISHED.
    pub fn terminate(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = JobStatus::Finished;
        self.finished_time = Some(now_millis());
        self.descriptor.failed();
        info!(
            job = %self.id,
            finished = self.counters.finished,
            faulty = self.counters.faulty,
            "job finished"
        );
    }

    /// Pauses every task that is not running, in error, or done.
    pub fn set_paused(&mut self) -> Result<BTreeSet<TaskId>> {
        if self.status.is_terminal() || self.status == JobStatus::Paused {
            return Ok(BTreeSet::new());
        }
        self.status = JobStatus::Paused;

        let pausable: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| {
                matches!(
                    t.status(),
                    TaskStatus::Submitted
                        | TaskStatus::Pending
                        | TaskStatus::WaitingOnError
                        | TaskStatus::WaitingOnFailure
                )
            })
            .map(|t| t.id().clone())
            .collect();
        for id in &pausable {
            self.set_task_status(id, TaskStatus::Paused)?;
            self.descriptor.pause(id);
        }
        info!(job = %self.id, paused = pausable.len(), "job paused");
        Ok(pausable.into_iter().collect())
    }

    /// Resumes a paused job. The job goes back to PENDING if it never
    /// started, otherwise to IN_ERROR, RUNNING or STALLED from its counters.
    pub fn set_unpause(&mut self) -> Result<BTreeSet<TaskId>> {
        if self.status != JobStatus::Paused {
            return Ok(BTreeSet::new());
        }
        let never_started = self.start_time.is_none();
        let paused: Vec<TaskId> = self
            .tasks
            .values()
            .filter(|t| t.status() == TaskStatus::Paused)
            .map(|t| t.id().clone())
            .collect();
        for id in &paused {
            if never_started {
                self.set_task_status(id, TaskStatus::Submitted)?;
            } else {
                self.set_task_status(id, TaskStatus::Pending)?;
                self.descriptor.unpause(id);
            }
        }
        self.status = if never_started {
            JobStatus::Pending
        } else if self.counters.in_error > 0 {
            JobStatus::InError
        } else if self.counters.running > 0 {
            JobStatus::Running
        } else {
            JobStatus::Stalled
        };
        info!(job = %self.id, resumed = paused.len(), status = %self.status, "job resumed");
        Ok(paused.into_iter().collect())
    }

    /// Marks a not-yet-run task SKIPPED and releases its children. An IF
    /// initiator takes both of its branches down with it.
    pub fn skip_task(&mut self, id: &TaskId) -> Result<ChangedTasksInfo> {
        self.skip_from(vec![id.clone()])
    }

    /// An IF initiator ended without a decision: neither branch nor the
    /// join can ever run.
    fn skip_undecided_branches(&mut self, initiator: &TaskId) -> Result<ChangedTasksInfo> {
        let mut seeds = self.if_subtrees(initiator);
        seeds.extend(self.join_of(initiator));
        self.skip_from(seeds)
    }

    fn if_subtrees(&self, initiator: &TaskId) -> Vec<TaskId> {
        self.tasks
            .values()
            .filter(|t| t.if_branch() == Some(initiator))
            .flat_map(|branch| {
                self.tasks
                    .keys()
                    .filter(|t| self.depends_on(t, branch.id()))
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    fn skip_from(&mut self, seeds: Vec<TaskId>) -> Result<ChangedTasksInfo> {
        let mut changes = ChangedTasksInfo::new();
        let mut stack = seeds;
        let mut skipped = Vec::new();

        while let Some(current) = stack.pop() {
            let status = self.task(&current)?.status();
            if status.is_terminal() || status == TaskStatus::Running {
                continue;
            }
            self.set_task_status(&current, TaskStatus::Skipped)?;
            let now = now_millis();
            let task = self.task_mut(&current)?;
            task.finished_time = Some(now);
            task.execution_duration = Some(0);
            changes.task_skipped(current.clone());

            stack.extend(self.if_subtrees(&current));
            if let Some(join) = self.join_of(&current) {
                stack.push(join);
            }
            skipped.push(current);
        }

        for id in &skipped {
            self.descriptor.recover_task(id, &self.tasks, self.status);
        }
        self.finish_if_done();
        Ok(changes)
    }

    /// Continuation task of an IF initiator, if it declares one.
    fn join_of(&self, initiator: &TaskId) -> Option<TaskId> {
        let node = self.tasks.get(initiator)?;
        let script = node.flow_script()?;
        if script.action() != FlowActionType::If {
            return None;
        }
        let continuation = script.target_continuation()?;
        self.tasks
            .values()
            .filter(|t| t.name() == continuation && !t.status().is_terminal())
            .find(|t| self.find_task_up(node.name(), t.id()).as_ref() == Some(initiator))
            .map(|t| t.id().clone())
    }

    /// Re-creates the scheduling view from task statuses, e.g. after the job
    /// was loaded from storage.
    pub fn rebuild_dependency_graph(&mut self) {
        self.descriptor.rebuild(&self.tasks, self.status);
    }

    /// Recovery: a task found finished in storage while the graph still
    /// considers it pending.
    pub fn recover_task(&mut self, id: &TaskId) -> Result<()> {
        if !self.task(id)?.status().satisfies_dependency() {
            return Err(JobflowError::IllegalState(format!(
                "task {id} has not completed and cannot be recovered"
            )));
        }
        self.descriptor.recover_task(id, &self.tasks, self.status);
        Ok(())
    }

    /// Marks an eligible task as run and finished without executing it.
    pub fn simulate_start_and_terminate(&mut self, id: &TaskId) -> Result<ChangedTasksInfo> {
        self.start_task(id, None)?;
        self.terminate_task(false, id, None, &TaskResult::default())
    }

    // ---------------------------------------------------------------------
    // Snapshots
    // ---------------------------------------------------------------------

    /// Overwrites a task with an authoritative snapshot.
    pub fn update_task_info(&mut self, info: &TaskInfo) -> Result<()> {
        if info.job_id != self.id {
            return Err(JobflowError::IllegalState(format!(
                "task info for job {} is not applicable to job {}",
                info.job_id, self.id
            )));
        }
        self.task(&info.task_id)?;
        self.force_task_status(&info.task_id, info.status)?;

        let task = self.task_mut(&info.task_id)?;
        task.start_time = info.start_time;
        task.finished_time = info.finished_time;
        task.in_error_time = info.in_error_time;
        task.execution_duration = info.execution_duration;
        task.execution_host = info.execution_host.clone();
        task.progress = info.progress;
        task.executions_left = info.executions_left;
        Ok(())
    }

    /// Applies an authoritative job snapshot, including the tasks it
    /// reports as skipped.
    pub fn update_job_info(&mut self, info: &JobInfo) -> Result<ChangedTasksInfo> {
        if info.job_id != self.id {
            return Err(JobflowError::IllegalState(format!(
                "job info for job {} is not applicable to job {}",
                info.job_id, self.id
            )));
        }
        self.attributes.priority = info.priority;
        self.to_be_removed = info.to_be_removed;

        let mut changes = ChangedTasksInfo::new();
        if let Some(skipped) = &info.tasks_skipped {
            for id in skipped {
                changes.merge(self.skip_task(id)?);
            }
        }
        if self.status != info.status && !self.status.is_terminal() {
            self.status = info.status;
            if info.status.is_terminal() {
                self.descriptor.failed();
                self.finished_time = info.finished_time.or(Some(now_millis()));
            }
        }
        Ok(changes)
    }
}
