// tests/flow_if.rs

mod common;
use crate::common::{CoreDriver, JobDefinitionBuilder, TaskDefinitionBuilder, init_tracing, status_of};

use jobflow::engine::TaskCompletion;
use jobflow::job::{JobModel, JobStatus, TaskStatus};
use jobflow::types::OnTaskError;

/// A decides between B and C; J joins both branches.
fn joined_if(take_else: bool) -> JobModel {
    joined_if_with_policy(take_else, OnTaskError::None)
}

fn joined_if_with_policy(take_else: bool, policy: OnTaskError) -> JobModel {
    let mut initiator = TaskDefinitionBuilder::new("A").if_else("B", "C", Some("J"));
    if take_else {
        initiator = initiator.take_else();
    }
    JobDefinitionBuilder::new("if")
        .on_task_error(policy)
        .with_task(initiator.build())
        .with_task(TaskDefinitionBuilder::new("B").build())
        .with_task(TaskDefinitionBuilder::new("C").build())
        .with_task(TaskDefinitionBuilder::new("J").build())
        .create("alice")
}

#[test]
fn branches_wait_for_the_initiator() {
    init_tracing();
    let mut driver = CoreDriver::new();
    driver.submit(joined_if(false));
    assert_eq!(driver.dispatched, vec!["A"]);
}

#[test]
fn if_runs_the_selected_branch_and_skips_the_other() {
    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(joined_if(false));

    driver.complete_next();
    let job = driver.saved(id);
    assert_eq!(status_of(&job, "B"), TaskStatus::Running);
    assert_eq!(status_of(&job, "C"), TaskStatus::Skipped);
    assert_eq!(status_of(&job, "J"), TaskStatus::Pending);
    assert_eq!(driver.dispatched, vec!["A", "B"]);

    driver.run_until_quiet();
    assert_eq!(driver.dispatched, vec!["A", "B", "J"]);

    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(status_of(&job, "C"), TaskStatus::Skipped);
    assert_eq!(job.counters().finished, 4, "skipped tasks count as finished");
    assert_eq!(job.counters(), job.recount());
}

#[test]
fn else_decision_runs_the_other_branch() {
    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(joined_if(true));
    driver.run_until_quiet();

    assert_eq!(driver.dispatched, vec!["A", "C", "J"]);
    let job = driver.saved(id);
    assert_eq!(status_of(&job, "B"), TaskStatus::Skipped);
    assert_eq!(job.status(), JobStatus::Finished);
}

#[test]
fn skipped_branch_is_reported_to_the_sink() {
    use jobflow_test_utils::recording::Notification;

    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(joined_if(false));
    driver.complete_next();

    let c = driver.task_id(id, "C");
    let reported = driver.sink.events().into_iter().any(|n| match n {
        Notification::TasksChanged { changes, .. } => changes.skipped_tasks().contains(&c),
        Notification::JobState(_) => false,
    });
    assert!(reported);
}

#[test]
fn if_without_continuation_skips_a_whole_subtree() {
    init_tracing();
    // A decides between B -> B2 and C -> C2
    let job = JobDefinitionBuilder::new("loose-if")
        .with_task(TaskDefinitionBuilder::new("A").if_else("B", "C", None).build())
        .with_task(TaskDefinitionBuilder::new("B").build())
        .with_task(TaskDefinitionBuilder::new("B2").after("B").build())
        .with_task(TaskDefinitionBuilder::new("C").build())
        .with_task(TaskDefinitionBuilder::new("C2").after("C").build())
        .create("alice");
    let mut driver = CoreDriver::new();
    let id = driver.submit(job);
    driver.run_until_quiet();

    assert_eq!(driver.dispatched, vec!["A", "B", "B2"]);
    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(status_of(&job, "C"), TaskStatus::Skipped);
    assert_eq!(status_of(&job, "C2"), TaskStatus::Skipped);
}

#[test]
fn skipping_an_initiator_skips_both_branches() {
    let mut job = joined_if(false);
    job.submit();
    job.start().unwrap();
    let a = job.task_by_name("A").unwrap().id().clone();

    let changes = job.skip_task(&a).unwrap();
    assert_eq!(changes.skipped_tasks().len(), 4);
    assert_eq!(job.status(), JobStatus::Finished);
}

#[test]
fn faulty_initiator_still_applies_its_decision() {
    init_tracing();
    let mut driver = CoreDriver::new().fail("A", 1);
    let id = driver.submit(joined_if_with_policy(false, OnTaskError::ContinueJobExecution));
    driver.run_until_quiet();

    assert_eq!(driver.dispatched, vec!["A", "B", "J"]);
    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(status_of(&job, "A"), TaskStatus::Faulty);
    assert_eq!(status_of(&job, "B"), TaskStatus::Finished);
    assert_eq!(status_of(&job, "C"), TaskStatus::Skipped);
    assert_eq!(status_of(&job, "J"), TaskStatus::Finished);
    assert_eq!(job.counters(), job.recount());
}

#[test]
fn initiator_failing_without_a_decision_skips_both_branches() {
    use jobflow_test_utils::recording::Notification;

    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(joined_if_with_policy(false, OnTaskError::ContinueJobExecution));

    driver.complete_next_with(TaskCompletion::failure());
    driver.run_until_quiet();

    assert_eq!(driver.dispatched, vec!["A"]);
    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(status_of(&job, "A"), TaskStatus::Faulty);
    for name in ["B", "C", "J"] {
        assert_eq!(status_of(&job, name), TaskStatus::Skipped, "{name}");
    }
    assert!(job.tasks().all(|t| t.status().is_terminal()));
    assert_eq!(job.counters(), job.recount());

    let skipped: usize = driver
        .sink
        .events()
        .into_iter()
        .map(|n| match n {
            Notification::TasksChanged { changes, .. } => changes.skipped_tasks().len(),
            Notification::JobState(_) => 0,
        })
        .sum();
    assert_eq!(skipped, 3);
}

#[test]
fn initiator_finishing_without_a_decision_releases_tasks_after_the_join() {
    init_tracing();
    let job = JobDefinitionBuilder::new("if-then-more")
        .with_task(TaskDefinitionBuilder::new("A").if_else("B", "C", Some("J")).build())
        .with_task(TaskDefinitionBuilder::new("B").build())
        .with_task(TaskDefinitionBuilder::new("C").build())
        .with_task(TaskDefinitionBuilder::new("J").build())
        .with_task(TaskDefinitionBuilder::new("K").after("J").build())
        .create("alice");
    let mut driver = CoreDriver::new();
    let id = driver.submit(job);

    driver.complete_next_with(TaskCompletion::success());
    driver.run_until_quiet();

    assert_eq!(driver.dispatched, vec!["A", "K"]);
    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(status_of(&job, "J"), TaskStatus::Skipped);
    assert_eq!(status_of(&job, "K"), TaskStatus::Finished);
}
