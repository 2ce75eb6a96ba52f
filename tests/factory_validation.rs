// tests/factory_validation.rs

mod common;
use crate::common::{JobDefinitionBuilder, TaskDefinitionBuilder, init_tracing};

use std::error::Error;
use std::fs;

use tempfile::TempDir;

use jobflow::config::{load_and_build, load_definition};
use jobflow::errors::JobflowError;
use jobflow::factory::{FlowErrorKind, JobFactory};
use jobflow::job::{Executable, FlowActionType, JobId, JobStatus, TaskStatus};
use jobflow::types::{JobKind, JobPriority, OnTaskError};

type TestResult = Result<(), Box<dyn Error>>;

fn build_from_toml(contents: &str) -> Result<jobflow::job::JobModel, JobflowError> {
    let tmp = TempDir::new().expect("tempdir");
    let path = tmp.path().join("job.toml");
    fs::write(&path, contents).expect("write job file");
    load_and_build(&path, &mut JobFactory::new(), "alice")
}

/// Runs a definition through the factory and returns the flow error kind
/// and message.
fn flow_error(contents: &str) -> (FlowErrorKind, String) {
    match build_from_toml(contents) {
        Err(JobflowError::Flow(e)) => (e.kind, e.message),
        other => panic!("expected a flow error, got {other:?}"),
    }
}

#[test]
fn valid_file_builds_a_pending_job() -> TestResult {
    init_tracing();
    let tmp = TempDir::new()?;
    let path = tmp.path().join("nightly.toml");
    fs::write(
        &path,
        r#"
[job]
name = "nightly"
priority = "high"
on_task_error = "continue_job_execution"
max_number_of_execution = 2

[[task]]
name = "prepare"
executable = { type = "native", command = ["./prepare.sh", "--all"] }

[[task]]
name = "process"
after = ["prepare"]
executable = { type = "script", script = "echo processing" }
flow = { action = "replicate", runs = 3 }

[[task]]
name = "work"
after = ["process"]
executable = { type = "java", class = "org.example.Work" }
max_number_of_execution = 1

[[task]]
name = "merge"
after = ["work"]
executable = { type = "script", script = "echo merge", engine = "bash" }
"#,
    )?;

    let mut factory = JobFactory::new();
    assert_eq!(factory.peek_next_id(), JobId::new(1));
    let job = load_and_build(&path, &mut factory, "alice")?;

    assert_eq!(job.id(), JobId::new(1));
    assert_eq!(factory.peek_next_id(), JobId::new(2));
    assert_eq!(job.owner(), "alice");
    assert_eq!(job.name(), "nightly");
    assert_eq!(job.kind(), JobKind::TaskFlow);
    assert_eq!(job.status(), JobStatus::Pending);
    assert_eq!(job.attributes().priority, JobPriority::High);
    assert_eq!(job.task_count(), 4);
    assert!(job.tasks().all(|t| t.status() == TaskStatus::Submitted));

    let prepare = job.task_by_name("prepare").unwrap();
    assert_eq!(prepare.attributes().max_number_of_execution, 2);
    assert_eq!(prepare.attributes().on_task_error, OnTaskError::ContinueJobExecution);
    assert!(matches!(prepare.executable(), Executable::Native { command } if command.len() == 2));

    let process = job.task_by_name("process").unwrap();
    assert_eq!(process.dependencies(), &[prepare.id().clone()]);
    let script = process.flow_script().unwrap();
    assert_eq!(script.action(), FlowActionType::Replicate);
    assert_eq!(script.decision().runs, 3);

    assert_eq!(job.task_by_name("work").unwrap().executions_left(), 1);
    assert_eq!(job.counters().total, 4);
    Ok(())
}

#[test]
fn definition_is_read_without_validation() -> TestResult {
    let tmp = TempDir::new()?;
    let path = tmp.path().join("raw.toml");
    fs::write(
        &path,
        r#"
[job]
name = "raw"

[[task]]
name = "a"
after = ["missing"]
executable = { type = "script", script = "true" }
"#,
    )?;
    let definition = load_definition(&path)?;
    assert_eq!(definition.tasks.len(), 1);
    assert_eq!(definition.job.max_number_of_execution, 1);
    Ok(())
}

#[test]
fn missing_file_is_an_io_error() {
    let err = load_and_build("/nonexistent/job.toml", &mut JobFactory::new(), "alice").unwrap_err();
    assert!(matches!(err, JobflowError::IoError(_)));
}

#[test]
fn malformed_toml_is_rejected() {
    let err = build_from_toml("[job\nname = ").unwrap_err();
    assert!(matches!(err, JobflowError::TomlError(_)));
}

#[test]
fn job_without_tasks_is_rejected() {
    let err = build_from_toml("[job]\nname = \"empty\"\n").unwrap_err();
    assert!(matches!(err, JobflowError::JobCreation(ref m) if m == "This job must contain tasks"));
}

#[test]
fn duplicate_names_are_rejected() {
    let (kind, message) = flow_error(
        r#"
[job]
name = "dup"
[[task]]
name = "a"
executable = { type = "script", script = "true" }
[[task]]
name = "a"
executable = { type = "script", script = "true" }
"#,
    );
    assert_eq!(kind, FlowErrorKind::Name);
    assert_eq!(message, "Task names are not unique");
}

#[test]
fn reserved_characters_in_names_are_rejected() {
    for name in ["a#1", "a*1"] {
        let definition = JobDefinitionBuilder::new("reserved")
            .with_task(TaskDefinitionBuilder::new(name).build())
            .build();
        let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
        match err {
            JobflowError::Flow(e) => {
                assert_eq!(e.kind, FlowErrorKind::Name);
                assert!(e.message.starts_with("Task name cannot contain special character"));
                assert_eq!(e.task(), Some(name));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }
}

#[test]
fn unknown_dependency_is_rejected() {
    let (kind, message) = flow_error(
        r#"
[job]
name = "unknown"
[[task]]
name = "a"
after = ["ghost"]
executable = { type = "script", script = "true" }
"#,
    );
    assert_eq!(kind, FlowErrorKind::Dependency);
    assert_eq!(message, "Unknown dependency 'ghost'");
}

#[test]
fn dependency_cycle_is_rejected() {
    let definition = JobDefinitionBuilder::new("cycle")
        .with_task(TaskDefinitionBuilder::new("a").after("c").build())
        .with_task(TaskDefinitionBuilder::new("b").after("a").build())
        .with_task(TaskDefinitionBuilder::new("c").after("b").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(matches!(err, JobflowError::Flow(ref e) if e.kind == FlowErrorKind::Recursion));
    assert!(err.to_string().starts_with("Invalid taskflow: Infinite recursion detected"));
}

#[test]
fn unmatched_blocks_are_rejected() {
    let definition = JobDefinitionBuilder::new("open-block")
        .with_task(TaskDefinitionBuilder::new("a").block_start().build())
        .with_task(TaskDefinitionBuilder::new("b").after("a").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e) if e.message == "Unmatched start block"),
        "{err}"
    );

    let definition = JobDefinitionBuilder::new("stray-end")
        .with_task(TaskDefinitionBuilder::new("a").build())
        .with_task(TaskDefinitionBuilder::new("b").after("a").block_end().build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e) if e.message == "Unmatched end block"),
        "{err}"
    );
}

#[test]
fn block_with_external_dependency_is_rejected() {
    // x feeds the middle of the [s .. e] block from outside
    let definition = JobDefinitionBuilder::new("leaky-block")
        .with_task(TaskDefinitionBuilder::new("s").block_start().build())
        .with_task(TaskDefinitionBuilder::new("x").build())
        .with_task(TaskDefinitionBuilder::new("m").after("s").after("x").build())
        .with_task(TaskDefinitionBuilder::new("e").after("m").block_end().build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    match err {
        JobflowError::Flow(e) => {
            assert_eq!(e.kind, FlowErrorKind::Block);
            assert_eq!(e.message, "Task Block starting at s has external dependencies");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn loop_scope_must_be_a_block() {
    let definition = JobDefinitionBuilder::new("bad-loop")
        .with_task(TaskDefinitionBuilder::new("a").build())
        .with_task(TaskDefinitionBuilder::new("b").after("a").loop_to("a", 2).build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    match err {
        JobflowError::Flow(e) => {
            assert_eq!(e.kind, FlowErrorKind::Loop);
            assert_eq!(e.message, "The scope of a LOOP action should be a Task Block");
        }
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn replicate_needs_a_merge_point() {
    let (kind, message) = flow_error(
        r#"
[job]
name = "no-merge"
[[task]]
name = "t"
executable = { type = "script", script = "true" }
flow = { action = "replicate", runs = 2 }
[[task]]
name = "c"
after = ["t"]
executable = { type = "script", script = "true" }
"#,
    );
    assert_eq!(kind, FlowErrorKind::Replicate);
    assert_eq!(message, "No merge point for REPLICATE block");
}

#[test]
fn replicate_target_needs_a_single_dependency() {
    let definition = JobDefinitionBuilder::new("two-parents")
        .with_task(TaskDefinitionBuilder::new("t").replicate(2).build())
        .with_task(TaskDefinitionBuilder::new("o").build())
        .with_task(TaskDefinitionBuilder::new("c").after("t").after("o").build())
        .with_task(TaskDefinitionBuilder::new("m").after("c").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e)
            if e.message == "The Target of a REPLICATE must have only one dependency"),
        "{err}"
    );
}

#[test]
fn if_targets_must_exist() {
    let definition = JobDefinitionBuilder::new("if-unknown")
        .with_task(TaskDefinitionBuilder::new("a").if_else("b", "ghost", None).build())
        .with_task(TaskDefinitionBuilder::new("b").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e) if e.message == "ELSE target is unknown"),
        "{err}"
    );
}

#[test]
fn if_continuation_must_exist() {
    let definition = JobDefinitionBuilder::new("if-no-join")
        .with_task(TaskDefinitionBuilder::new("a").if_else("b", "c", Some("j")).build())
        .with_task(TaskDefinitionBuilder::new("b").build())
        .with_task(TaskDefinitionBuilder::new("c").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e) if e.message == "IF continuation is unknown"),
        "{err}"
    );
}

#[test]
fn if_branch_with_dependencies_is_rejected() {
    let definition = JobDefinitionBuilder::new("if-dep")
        .with_task(TaskDefinitionBuilder::new("x").build())
        .with_task(TaskDefinitionBuilder::new("a").if_else("b", "c", None).build())
        .with_task(TaskDefinitionBuilder::new("b").after("x").build())
        .with_task(TaskDefinitionBuilder::new("c").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e) if e.message == "IF target task cannot have dependencies"),
        "{err}"
    );
}

#[test]
fn join_task_cannot_have_dependencies() {
    let definition = JobDefinitionBuilder::new("join-dep")
        .with_task(TaskDefinitionBuilder::new("x").build())
        .with_task(TaskDefinitionBuilder::new("a").if_else("b", "c", Some("j")).build())
        .with_task(TaskDefinitionBuilder::new("b").build())
        .with_task(TaskDefinitionBuilder::new("c").build())
        .with_task(TaskDefinitionBuilder::new("j").after("x").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::Flow(ref e) if e.message == "JOIN task cannot have dependencies"),
        "{err}"
    );
}

#[test]
fn empty_executables_are_rejected() {
    let definition = JobDefinitionBuilder::new("empty-cmd")
        .with_task(TaskDefinitionBuilder::new("a").native(&[]).build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(
        matches!(err, JobflowError::JobCreation(ref m) if m.contains("the command line is null or empty")),
        "{err}"
    );

    let err = build_from_toml(
        r#"
[job]
name = "empty-script"
[[task]]
name = "a"
executable = { type = "script", script = "   " }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, JobflowError::JobCreation(ref m) if m.contains("the script is empty")));

    let err = build_from_toml(
        r#"
[job]
name = "empty-class"
[[task]]
name = "a"
executable = { type = "java", class = "" }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, JobflowError::JobCreation(ref m) if m.contains("an executable class must be specified")));
}

#[test]
fn cron_is_only_allowed_on_loops() {
    let err = build_from_toml(
        r#"
[job]
name = "cron-replicate"
[[task]]
name = "t"
executable = { type = "script", script = "true" }
flow = { action = "replicate", runs = 2, cron = "* * * * *" }
[[task]]
name = "c"
after = ["t"]
executable = { type = "script", script = "true" }
[[task]]
name = "m"
after = ["c"]
executable = { type = "script", script = "true" }
"#,
    )
    .unwrap_err();
    assert!(matches!(err, JobflowError::JobCreation(ref m) if m.contains("only allowed on LOOP")), "{err}");
}

#[test]
fn invalid_cron_is_rejected() {
    let definition = JobDefinitionBuilder::new("bad-cron")
        .with_task(TaskDefinitionBuilder::new("a").loop_to("a", 2).cron("not a cron").build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(matches!(err, JobflowError::Cron(_)), "{err}");
}

#[test]
fn zero_executions_is_rejected() {
    let definition = JobDefinitionBuilder::new("zero")
        .with_task(TaskDefinitionBuilder::new("a").max_number_of_execution(0).build())
        .build();
    let err = JobFactory::new().create_job(&definition, "alice").unwrap_err();
    assert!(matches!(err, JobflowError::JobCreation(_)), "{err}");
}

#[test]
fn rejected_definition_does_not_consume_an_id() {
    let mut factory = JobFactory::new();
    let bad = JobDefinitionBuilder::new("bad")
        .with_task(TaskDefinitionBuilder::new("a").after("ghost").build())
        .build();
    assert!(factory.create_job(&bad, "alice").is_err());
    assert_eq!(factory.peek_next_id(), JobId::new(1));

    let good = JobDefinitionBuilder::new("good")
        .with_task(TaskDefinitionBuilder::new("a").build())
        .build();
    assert_eq!(factory.create_job(&good, "alice").unwrap().id(), JobId::new(1));
}

#[test]
fn parameter_sweeping_jobs_are_flat() {
    let flat = JobDefinitionBuilder::new("sweep")
        .kind(JobKind::ParameterSweeping)
        .with_task(TaskDefinitionBuilder::new("p1").build())
        .with_task(TaskDefinitionBuilder::new("p2").build())
        .build();
    let job = JobFactory::new().create_job(&flat, "alice").unwrap();
    assert_eq!(job.kind(), JobKind::ParameterSweeping);
    assert_eq!(job.task_count(), 2);

    let chained = JobDefinitionBuilder::new("sweep")
        .kind(JobKind::ParameterSweeping)
        .with_task(TaskDefinitionBuilder::new("p1").build())
        .with_task(TaskDefinitionBuilder::new("p2").after("p1").build())
        .build();
    let err = JobFactory::new().create_job(&chained, "alice").unwrap_err();
    assert!(matches!(err, JobflowError::Flow(ref e) if e.kind == FlowErrorKind::Dependency));
}

#[test]
fn task_policies_override_the_job() {
    let definition = JobDefinitionBuilder::new("policies")
        .on_task_error(OnTaskError::CancelJob)
        .max_number_of_execution(3)
        .with_task(TaskDefinitionBuilder::new("a").build())
        .with_task(
            TaskDefinitionBuilder::new("b")
                .on_task_error(OnTaskError::SuspendTask)
                .max_number_of_execution(1)
                .build(),
        )
        .build();
    let job = JobFactory::new().create_job(&definition, "alice").unwrap();

    let a = job.task_by_name("a").unwrap().attributes();
    assert_eq!(a.on_task_error, OnTaskError::CancelJob);
    assert_eq!(a.max_number_of_execution, 3);
    let b = job.task_by_name("b").unwrap().attributes();
    assert_eq!(b.on_task_error, OnTaskError::SuspendTask);
    assert_eq!(b.max_number_of_execution, 1);
}

#[test]
fn blocks_are_matched_on_both_ends() {
    let job = JobDefinitionBuilder::new("block")
        .with_task(TaskDefinitionBuilder::new("s").block_start().build())
        .with_task(TaskDefinitionBuilder::new("m").after("s").build())
        .with_task(TaskDefinitionBuilder::new("e").after("m").block_end().loop_to("s", 2).build())
        .create("alice");
    assert_eq!(job.task_by_name("s").unwrap().matching_block(), Some("e"));
    assert_eq!(job.task_by_name("e").unwrap().matching_block(), Some("s"));
    assert_eq!(job.task_by_name("m").unwrap().matching_block(), None);
}
