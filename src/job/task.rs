// src/job/task.rs

//! A single task inside a job: identity, status, timing, and its edges to
//! other tasks of the same job.
//!
//! Three kinds of edges exist:
//! - `dependencies`: hard edges; the task runs once all of them are done.
//! - `if_branch`: the IF initiator whose decision selects this branch root.
//!   The task is not eligible until the initiator plugs it in as a dependency.
//! - `joined_branches`: the two branch ends an IF continuation waits on.

use std::collections::BTreeMap;

use super::attributes::TaskAttributes;
use super::executable::Executable;
use super::flow::{FlowBlock, FlowScript};
use super::ids::TaskId;
use super::status::TaskStatus;

pub const ITERATION_SEPARATOR: char = '#';
pub const REPLICATION_SEPARATOR: char = '*';

/// Generic information key holding the resolved start date of a cron loop.
pub const START_AT: &str = "START_AT";

#[derive(Debug, Clone)]
pub struct TaskNode {
    pub(in crate::job) id: TaskId,
    name: String,
    iteration: u32,
    replication: u32,
    pub(in crate::job) status: TaskStatus,
    pub(in crate::job) start_time: Option<i64>,
    pub(in crate::job) finished_time: Option<i64>,
    pub(in crate::job) in_error_time: Option<i64>,
    pub(in crate::job) execution_duration: Option<i64>,
    pub(in crate::job) execution_host: Option<String>,
    pub(in crate::job) progress: u8,
    pub(in crate::job) dependencies: Vec<TaskId>,
    pub(in crate::job) if_branch: Option<TaskId>,
    pub(in crate::job) joined_branches: Vec<TaskId>,
    matching_block: Option<String>,
    flow_block: FlowBlock,
    flow_script: Option<FlowScript>,
    pub(in crate::job) tag: Option<String>,
    executable: Executable,
    attributes: TaskAttributes,
    pub(in crate::job) generic_information: BTreeMap<String, String>,
    pub(in crate::job) executions_left: u32,
    pub(in crate::job) replicated_from: Option<TaskId>,
}

impl TaskNode {
    /// Creates a SUBMITTED task. The id is final; edges are added later by
    /// the owning job.
    pub(crate) fn new(id: TaskId, executable: Executable, attributes: TaskAttributes) -> Self {
        let name = id.readable_name().to_owned();
        TaskNode {
            iteration: iteration_index_from_name(&name),
            replication: replication_index_from_name(&name),
            name,
            id,
            status: TaskStatus::Submitted,
            start_time: None,
            finished_time: None,
            in_error_time: None,
            execution_duration: None,
            execution_host: None,
            progress: 0,
            dependencies: Vec::new(),
            if_branch: None,
            joined_branches: Vec::new(),
            matching_block: None,
            flow_block: FlowBlock::None,
            flow_script: None,
            tag: None,
            executions_left: attributes.max_number_of_execution,
            executable,
            attributes,
            generic_information: BTreeMap::new(),
            replicated_from: None,
        }
    }

    pub(crate) fn with_flow(mut self, block: FlowBlock, script: Option<FlowScript>) -> Self {
        self.flow_block = block;
        self.flow_script = script;
        self
    }

    pub(crate) fn with_generic_information(mut self, info: BTreeMap<String, String>) -> Self {
        self.generic_information = info;
        self
    }

    pub fn id(&self) -> &TaskId {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name without iteration and replication suffixes.
    pub fn initial_name(&self) -> &str {
        initial_name(&self.name)
    }

    pub fn iteration_index(&self) -> u32 {
        self.iteration
    }

    pub fn replication_index(&self) -> u32 {
        self.replication
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn start_time(&self) -> Option<i64> {
        self.start_time
    }

    pub fn finished_time(&self) -> Option<i64> {
        self.finished_time
    }

    pub fn in_error_time(&self) -> Option<i64> {
        self.in_error_time
    }

    pub fn execution_duration(&self) -> Option<i64> {
        self.execution_duration
    }

    pub fn execution_host(&self) -> Option<&str> {
        self.execution_host.as_deref()
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn dependencies(&self) -> &[TaskId] {
        &self.dependencies
    }

    pub fn if_branch(&self) -> Option<&TaskId> {
        self.if_branch.as_ref()
    }

    pub fn joined_branches(&self) -> &[TaskId] {
        &self.joined_branches
    }

    pub fn matching_block(&self) -> Option<&str> {
        self.matching_block.as_deref()
    }

    pub fn flow_block(&self) -> FlowBlock {
        self.flow_block
    }

    pub fn flow_script(&self) -> Option<&FlowScript> {
        self.flow_script.as_ref()
    }

    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn executable(&self) -> &Executable {
        &self.executable
    }

    pub fn attributes(&self) -> &TaskAttributes {
        &self.attributes
    }

    pub fn generic_information(&self) -> &BTreeMap<String, String> {
        &self.generic_information
    }

    pub fn executions_left(&self) -> u32 {
        self.executions_left
    }

    /// Executions already consumed by errors.
    pub fn executions_done(&self) -> u32 {
        self.attributes
            .max_number_of_execution
            .saturating_sub(self.executions_left)
    }

    /// Original task this one was duplicated from, if any.
    pub fn replicated_from(&self) -> Option<&TaskId> {
        self.replicated_from.as_ref()
    }

    /// Every task this one waits on: hard dependencies and joined branches.
    pub fn upstream(&self) -> impl Iterator<Item = &TaskId> {
        self.dependencies.iter().chain(self.joined_branches.iter())
    }

    /// Whether `id` is any kind of parent of this task.
    pub fn waits_on(&self, id: &TaskId) -> bool {
        self.dependencies.contains(id)
            || self.joined_branches.contains(id)
            || self.if_branch.as_ref() == Some(id)
    }

    pub(in crate::job) fn add_dependency(&mut self, id: TaskId) {
        if !self.dependencies.contains(&id) {
            self.dependencies.push(id);
        }
    }

    pub(in crate::job) fn set_matching_block(&mut self, name: Option<String>) {
        self.matching_block = name;
    }

    pub(in crate::job) fn set_iteration_index(&mut self, iteration: u32) {
        self.iteration = iteration;
        self.apply_suffixes();
    }

    pub(in crate::job) fn set_replication_index(&mut self, replication: u32) {
        self.replication = replication;
        self.apply_suffixes();
    }

    /// Re-derives the name, the matching block, and the flow targets from the
    /// current iteration and replication indices.
    fn apply_suffixes(&mut self) {
        let suffix = self.suffix();
        let with_suffix = |name: &str| format!("{}{}", initial_name(name), suffix);

        self.name = with_suffix(&self.name);
        self.matching_block = self.matching_block.as_deref().map(with_suffix);
        if let Some(script) = self.flow_script.as_mut() {
            script.rename_targets(with_suffix);
        }
    }

    fn suffix(&self) -> String {
        let mut suffix = String::new();
        if self.iteration > 0 {
            suffix.push(ITERATION_SEPARATOR);
            suffix.push_str(&self.iteration.to_string());
        }
        if self.replication > 0 {
            suffix.push(REPLICATION_SEPARATOR);
            suffix.push_str(&self.replication.to_string());
        }
        suffix
    }

    /// Fresh copy used by LOOP and REPLICATE: same definition, no edges, no
    /// run history. The id still points at the original until the owning job
    /// assigns a new one.
    pub(in crate::job) fn replica(&self) -> TaskNode {
        let mut copy = self.clone();
        copy.status = TaskStatus::Submitted;
        copy.start_time = None;
        copy.finished_time = None;
        copy.in_error_time = None;
        copy.execution_duration = None;
        copy.execution_host = None;
        copy.progress = 0;
        copy.dependencies.clear();
        copy.if_branch = None;
        copy.joined_branches.clear();
        copy.tag = None;
        copy.generic_information.remove(START_AT);
        copy.executions_left = copy.attributes.max_number_of_execution;
        copy.replicated_from = Some(self.id.clone());
        copy
    }
}

/// `"A#2*1"` -> `"A"`.
pub fn initial_name(name: &str) -> &str {
    let end = name
        .find([ITERATION_SEPARATOR, REPLICATION_SEPARATOR])
        .unwrap_or(name.len());
    &name[..end]
}

/// `"A#2*1"` -> `2`; `0` when there is no iteration suffix.
pub fn iteration_index_from_name(name: &str) -> u32 {
    name.split_once(ITERATION_SEPARATOR)
        .map(|(_, rest)| {
            let digits = rest.split(REPLICATION_SEPARATOR).next().unwrap_or_default();
            digits.parse().unwrap_or(0)
        })
        .unwrap_or(0)
}

/// `"A#2*1"` -> `1`; `0` when there is no replication suffix.
pub fn replication_index_from_name(name: &str) -> u32 {
    name.split_once(REPLICATION_SEPARATOR)
        .and_then(|(_, rest)| rest.parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::ids::JobId;

    fn node(name: &str) -> TaskNode {
        TaskNode::new(
            TaskId::new(JobId::new(1), name, 0),
            Executable::Script {
                engine: "sh".into(),
                script: "true".into(),
            },
            TaskAttributes::default(),
        )
    }

    #[test]
    fn name_suffix_parsing() {
        assert_eq!(initial_name("A#2*1"), "A");
        assert_eq!(initial_name("A*3"), "A");
        assert_eq!(initial_name("A"), "A");
        assert_eq!(iteration_index_from_name("A#2*1"), 2);
        assert_eq!(iteration_index_from_name("A*1"), 0);
        assert_eq!(replication_index_from_name("A#2*1"), 1);
        assert_eq!(replication_index_from_name("A#2"), 0);
    }

    #[test]
    fn renaming_updates_matching_block_and_targets() {
        let mut start = node("S");
        start.set_matching_block(Some("E".into()));
        let mut end = node("E").with_flow(FlowBlock::End, Some(FlowScript::loop_to("S", 3)));

        start.set_iteration_index(2);
        end.set_iteration_index(2);
        end.set_replication_index(1);

        assert_eq!(start.name(), "S#2");
        assert_eq!(start.matching_block(), Some("E#2"));
        assert_eq!(end.name(), "E#2*1");
        assert_eq!(end.flow_script().and_then(|s| s.target()), Some("S#2*1"));
    }

    #[test]
    fn replica_forgets_run_history() {
        let mut original = node("A");
        original.status = TaskStatus::Finished;
        original.progress = 100;
        original.dependencies.push(TaskId::new(JobId::new(1), "P", 7));

        let copy = original.replica();
        assert_eq!(copy.status(), TaskStatus::Submitted);
        assert_eq!(copy.progress(), 0);
        assert!(copy.dependencies().is_empty());
        assert_eq!(copy.replicated_from(), Some(original.id()));
    }
}
