#![allow(dead_code)]

use std::collections::BTreeMap;

use jobflow::config::model::{
    Branch, ExecutableDefinition, FlowDefinition, JobDefinition, JobSection, TaskDefinition,
};
use jobflow::factory::JobFactory;
use jobflow::job::{FlowActionType, FlowBlock, JobModel};
use jobflow::types::{JobKind, JobPriority, OnTaskError};

/// Builder for `JobDefinition` to simplify test setup.
pub struct JobDefinitionBuilder {
    definition: JobDefinition,
}

impl JobDefinitionBuilder {
    pub fn new(name: &str) -> Self {
        Self {
            definition: JobDefinition {
                job: JobSection {
                    name: name.to_string(),
                    kind: JobKind::TaskFlow,
                    description: None,
                    project_name: None,
                    priority: JobPriority::Normal,
                    on_task_error: OnTaskError::None,
                    restart_task_on_error: Default::default(),
                    max_number_of_execution: 1,
                    credentials: None,
                    input_space: None,
                    output_space: None,
                    global_space: None,
                    user_space: None,
                    variables: BTreeMap::new(),
                    generic_information: BTreeMap::new(),
                },
                tasks: Vec::new(),
            },
        }
    }

    pub fn with_task(mut self, task: TaskDefinition) -> Self {
        self.definition.tasks.push(task);
        self
    }

    pub fn kind(mut self, kind: JobKind) -> Self {
        self.definition.job.kind = kind;
        self
    }

    pub fn priority(mut self, priority: JobPriority) -> Self {
        self.definition.job.priority = priority;
        self
    }

    pub fn on_task_error(mut self, policy: OnTaskError) -> Self {
        self.definition.job.on_task_error = policy;
        self
    }

    pub fn max_number_of_execution(mut self, n: u32) -> Self {
        self.definition.job.max_number_of_execution = n;
        self
    }

    pub fn variable(mut self, key: &str, value: &str) -> Self {
        self.definition
            .job
            .variables
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> JobDefinition {
        self.definition
    }

    /// Builds the definition and runs it through a fresh factory.
    pub fn create(self, owner: &str) -> JobModel {
        JobFactory::new()
            .create_job(&self.definition, owner)
            .expect("Failed to build valid job from builder")
    }
}

/// Builder for `TaskDefinition`.
pub struct TaskDefinitionBuilder {
    task: TaskDefinition,
}

impl TaskDefinitionBuilder {
    /// A shell script task echoing its own name.
    pub fn new(name: &str) -> Self {
        Self {
            task: TaskDefinition {
                name: name.to_string(),
                executable: ExecutableDefinition::Script {
                    script: format!("echo {name}"),
                    engine: "shell".to_string(),
                },
                description: None,
                after: vec![],
                flow_block: FlowBlock::None,
                flow: None,
                on_task_error: None,
                restart_task_on_error: None,
                max_number_of_execution: None,
                wall_time: None,
                precious_result: false,
                run_as_me: false,
                variables: BTreeMap::new(),
                generic_information: BTreeMap::new(),
            },
        }
    }

    pub fn native(mut self, command: &[&str]) -> Self {
        self.task.executable = ExecutableDefinition::Native {
            command: command.iter().map(|s| s.to_string()).collect(),
        };
        self
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn block_start(mut self) -> Self {
        self.task.flow_block = FlowBlock::Start;
        self
    }

    pub fn block_end(mut self) -> Self {
        self.task.flow_block = FlowBlock::End;
        self
    }

    pub fn loop_to(mut self, target: &str, iterations: u32) -> Self {
        let flow = self.flow(FlowActionType::Loop);
        flow.target = Some(target.to_string());
        flow.iterations = Some(iterations);
        self
    }

    pub fn replicate(mut self, runs: i64) -> Self {
        self.flow(FlowActionType::Replicate).runs = Some(runs);
        self
    }

    pub fn if_else(mut self, target: &str, target_else: &str, continuation: Option<&str>) -> Self {
        let flow = self.flow(FlowActionType::If);
        flow.target = Some(target.to_string());
        flow.target_else = Some(target_else.to_string());
        flow.continuation = continuation.map(str::to_string);
        self
    }

    /// The IF decision picks the ELSE branch.
    pub fn take_else(mut self) -> Self {
        self.flow(FlowActionType::If).branch = Some(Branch::Else);
        self
    }

    pub fn cron(mut self, expr: &str) -> Self {
        self.flow(FlowActionType::Loop).cron = Some(expr.to_string());
        self
    }

    pub fn continue_action(mut self) -> Self {
        self.flow(FlowActionType::Continue);
        self
    }

    pub fn on_task_error(mut self, policy: OnTaskError) -> Self {
        self.task.on_task_error = Some(policy);
        self
    }

    pub fn max_number_of_execution(mut self, n: u32) -> Self {
        self.task.max_number_of_execution = Some(n);
        self
    }

    pub fn generic_information(mut self, key: &str, value: &str) -> Self {
        self.task
            .generic_information
            .insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> TaskDefinition {
        self.task
    }

    /// Flow section of the task, created with `action` if absent.
    fn flow(&mut self, action: FlowActionType) -> &mut FlowDefinition {
        self.task.flow.get_or_insert_with(|| FlowDefinition {
            action,
            target: None,
            target_else: None,
            continuation: None,
            cron: None,
            runs: None,
            iterations: None,
            branch: None,
        })
    }
}
