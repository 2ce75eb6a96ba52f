// src/factory/mod.rs

//! Turns user job definitions into validated jobs.
//!
//! - [`flow_checker`] validates the structure of a task flow.
//! - [`kinds`] selects the validation rules of each job kind.
//! - [`attributes`] holds the explicit attribute mapping tables.
//!
//! Nothing is allocated until the definition is known to be valid: a
//! rejected definition never produces a partial job.

pub mod attributes;
pub mod flow_checker;
pub mod kinds;

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::model::{Branch, ExecutableDefinition, FlowDefinition, JobDefinition, TaskDefinition};
use crate::errors::{JobflowError, Result};
use crate::job::flow::next_cron_date;
use crate::job::model::DEFAULT_RESTART_WAITING_TIMER_MS;
use crate::job::{
    Executable, FlowActionType, FlowDecision, FlowScript, JobId, JobModel, TaskId, TaskNode,
};

pub use flow_checker::Block;

/// Which rule a malformed task flow broke.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FlowErrorKind {
    Name,
    Dependency,
    Recursion,
    Block,
    Replicate,
    Loop,
    If,
}

impl fmt::Display for FlowErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowErrorKind::Name => "NAME",
            FlowErrorKind::Dependency => "DEPENDENCY",
            FlowErrorKind::Recursion => "RECURSION",
            FlowErrorKind::Block => "BLOCK",
            FlowErrorKind::Replicate => "REPLICATE",
            FlowErrorKind::Loop => "LOOP",
            FlowErrorKind::If => "IF",
        };
        f.write_str(s)
    }
}

/// A structural error in a task flow, with the tasks it was detected on.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid taskflow: {message}; context: {}", tasks.join(", "))]
pub struct FlowError {
    pub kind: FlowErrorKind,
    pub message: String,
    pub tasks: Vec<String>,
}

impl FlowError {
    pub fn new<I, S>(kind: FlowErrorKind, message: impl Into<String>, tasks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        FlowError {
            kind,
            message: message.into(),
            tasks: tasks.into_iter().map(Into::into).collect(),
        }
    }

    /// First task the error was detected on.
    pub fn task(&self) -> Option<&str> {
        self.tasks.first().map(String::as_str)
    }
}

/// Builds jobs and hands out their ids.
#[derive(Debug, Clone)]
pub struct JobFactory {
    next_id: u64,
    restart_waiting_timer: Duration,
}

impl Default for JobFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl JobFactory {
    pub fn new() -> Self {
        JobFactory {
            next_id: 1,
            restart_waiting_timer: Duration::from_millis(DEFAULT_RESTART_WAITING_TIMER_MS),
        }
    }

    pub fn with_restart_waiting_timer(mut self, timer: Duration) -> Self {
        self.restart_waiting_timer = timer;
        self
    }

    /// Id the next created job will get.
    pub fn peek_next_id(&self) -> JobId {
        JobId::new(self.next_id)
    }

    /// Validates `definition` and builds a PENDING job owned by `owner`.
    pub fn create_job(&mut self, definition: &JobDefinition, owner: &str) -> Result<JobModel> {
        let section = &definition.job;
        if definition.tasks.is_empty() {
            info!(job = %section.name, "job has no task");
            return Err(JobflowError::JobCreation(
                "This job must contain tasks".to_string(),
            ));
        }

        let blocks = kinds::validator_for(section.kind)(&definition.tasks).inspect_err(|e| {
            error!(job = %section.name, error = %e, "job rejected");
        })?;

        // Everything that can fail on a single task is checked before the
        // job gets an id.
        let prepared = definition
            .tasks
            .iter()
            .map(|task| prepare_task(definition, task))
            .collect::<Result<Vec<_>>>()?;

        let id = JobId::new(self.next_id);
        self.next_id += 1;

        let mut job = JobModel::new(
            id,
            owner,
            section.name.clone(),
            section.kind,
            attributes::job_attributes(section),
        )
        .with_restart_waiting_timer(self.restart_waiting_timer);

        let mut ids: Vec<TaskId> = Vec::with_capacity(prepared.len());
        for (task, (executable, script)) in definition.tasks.iter().zip(prepared) {
            let task_id = job.next_task_id(&task.name, 0);
            let node = TaskNode::new(
                task_id.clone(),
                executable,
                attributes::task_attributes(section, task),
            )
            .with_flow(task.flow_block, script)
            .with_generic_information(task.generic_information.clone());
            job.insert_task(node)?;
            ids.push(task_id);
        }

        let id_of = |name: &str| -> Result<TaskId> {
            definition
                .tasks
                .iter()
                .position(|t| t.name == name)
                .map(|i| ids[i].clone())
                .ok_or_else(|| JobflowError::UnknownTask(name.to_owned()))
        };

        for (task, task_id) in definition.tasks.iter().zip(&ids) {
            for dep in &task.after {
                job.add_dependency(task_id, &id_of(dep)?)?;
            }
        }

        for block in &blocks {
            job.set_matching_block(&id_of(&block.start)?, &block.end)?;
            job.set_matching_block(&id_of(&block.end)?, &block.start)?;
        }

        link_if_branches(&mut job, definition, &blocks, &id_of)?;

        info!(
            job = %id,
            name = %section.name,
            kind = %section.kind,
            tasks = ids.len(),
            blocks = blocks.len(),
            "job created"
        );
        Ok(job)
    }
}

/// Executable and flow script of a task, checked but not yet placed in a job.
fn prepare_task(
    definition: &JobDefinition,
    task: &TaskDefinition,
) -> Result<(Executable, Option<FlowScript>)> {
    let max_executions = task
        .max_number_of_execution
        .unwrap_or(definition.job.max_number_of_execution);
    if max_executions == 0 {
        return Err(JobflowError::JobCreation(format!(
            "task '{}': max_number_of_execution must be at least 1",
            task.name
        )));
    }
    let executable = create_executable(task)?;
    let script = task.flow.as_ref().map(|flow| flow_script(task, flow)).transpose()?;
    Ok((executable, script))
}

fn create_executable(task: &TaskDefinition) -> Result<Executable> {
    match &task.executable {
        ExecutableDefinition::Native { command } => {
            if command.is_empty() || command.iter().all(|arg| arg.trim().is_empty()) {
                return Err(JobflowError::JobCreation(format!(
                    "task '{}': the command line is null or empty",
                    task.name
                )));
            }
            Ok(Executable::Native {
                command: command.clone(),
            })
        }
        ExecutableDefinition::Java { class, arguments } => {
            if class.trim().is_empty() {
                return Err(JobflowError::JobCreation(format!(
                    "task '{}': an executable class must be specified",
                    task.name
                )));
            }
            Ok(Executable::Java {
                class: class.clone(),
                arguments: arguments.clone(),
            })
        }
        ExecutableDefinition::Script { script, engine } => {
            if script.trim().is_empty() {
                return Err(JobflowError::JobCreation(format!(
                    "task '{}': the script is empty",
                    task.name
                )));
            }
            Ok(Executable::Script {
                engine: engine.clone(),
                script: script.clone(),
            })
        }
    }
}

fn flow_script(task: &TaskDefinition, flow: &FlowDefinition) -> Result<FlowScript> {
    let decision = FlowDecision {
        runs: flow.runs.unwrap_or(0),
        iterations: flow.iterations.unwrap_or(1),
        take_else: flow.branch == Some(Branch::Else),
    };

    let script = match flow.action {
        FlowActionType::Loop => {
            let target = flow.target.clone().unwrap_or_else(|| task.name.clone());
            FlowScript::loop_to(target, decision.iterations)
        }
        FlowActionType::If => {
            let (Some(target), Some(target_else)) = (&flow.target, &flow.target_else) else {
                return Err(JobflowError::JobCreation(format!(
                    "task '{}': IF needs both a target and an else target",
                    task.name
                )));
            };
            FlowScript::if_else(target.clone(), target_else.clone(), flow.continuation.clone())
        }
        FlowActionType::Replicate => FlowScript::replicate(decision.runs),
        FlowActionType::Continue => FlowScript::new(FlowActionType::Continue),
    };

    if let Some(cron) = &flow.cron {
        if flow.action != FlowActionType::Loop {
            return Err(JobflowError::JobCreation(format!(
                "task '{}': a cron expression is only allowed on LOOP actions",
                task.name
            )));
        }
        next_cron_date(cron)?;
    }

    Ok(script.with_decision(decision).with_cron(flow.cron.clone()))
}

/// Weak IF edges: each branch root remembers its initiator and the
/// continuation lists the last task of both branches.
fn link_if_branches(
    job: &mut JobModel,
    definition: &JobDefinition,
    blocks: &[Block],
    id_of: &dyn Fn(&str) -> Result<TaskId>,
) -> Result<()> {
    for task in definition.tasks.iter().filter(|t| t.is_if()) {
        let Some(flow) = &task.flow else {
            continue;
        };
        let initiator = id_of(&task.name)?;
        let mut joined = Vec::new();

        for branch in [&flow.target, &flow.target_else].into_iter().flatten() {
            let root = id_of(branch)?;
            job.set_if_branch(&root, &initiator)?;
            let end = blocks
                .iter()
                .find(|b| &b.start == branch)
                .map_or_else(|| Ok(root.clone()), |b| id_of(&b.end))?;
            joined.push(end);
        }

        if let Some(continuation) = flow.continuation.as_deref().filter(|c| !c.is_empty()) {
            let join = id_of(continuation)?;
            debug!(initiator = %initiator, join = %join, "IF branches joined");
            job.set_joined_branches(&join, joined)?;
        }
    }
    Ok(())
}
