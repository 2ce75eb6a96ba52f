// tests/flow_loop.rs

mod common;
use crate::common::{
    CoreDriver, JobDefinitionBuilder, TaskDefinitionBuilder, init_tracing, status_of, task_names,
};

use jobflow::engine::SchedulerEvent;
use jobflow::job::task::START_AT;
use jobflow::job::{JobModel, JobStatus, TaskStatus};

/// A -> [S -> E] -> Z, E loops back to S.
fn block_loop(iterations: u32, cron: Option<&str>) -> JobModel {
    let mut end = TaskDefinitionBuilder::new("E")
        .after("S")
        .block_end()
        .loop_to("S", iterations);
    if let Some(expr) = cron {
        end = end.cron(expr);
    }
    JobDefinitionBuilder::new("loop")
        .with_task(TaskDefinitionBuilder::new("A").build())
        .with_task(TaskDefinitionBuilder::new("S").after("A").block_start().build())
        .with_task(end.build())
        .with_task(TaskDefinitionBuilder::new("Z").after("E").build())
        .create("alice")
}

#[test]
fn block_loop_runs_the_requested_iterations() {
    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(block_loop(3, None));
    driver.run_until_quiet();

    assert_eq!(
        driver.dispatched,
        vec!["A", "S", "E", "S#1", "E#1", "S#2", "E#2", "Z"]
    );

    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    assert_eq!(
        task_names(&job),
        vec!["A", "S", "E", "Z", "S#1", "E#1", "S#2", "E#2"]
    );
    assert_eq!(job.counters().finished, 8);
    assert_eq!(job.counters(), job.recount());

    let s1 = job.task_by_name("S#1").unwrap();
    let e2 = job.task_by_name("E#2").unwrap();
    assert_eq!(s1.tag(), Some("LOOP-E-1"));
    assert_eq!(e2.tag(), Some("LOOP-E-2"));
    assert_eq!(s1.iteration_index(), 1);
    assert_eq!(s1.dependencies(), &[job.task_by_name("E").unwrap().id().clone()]);

    let z = job.task_by_name("Z").unwrap();
    assert_eq!(z.dependencies(), &[e2.id().clone()]);
}

#[test]
fn loop_copies_point_at_their_own_iteration() {
    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(block_loop(2, None));
    for _ in 0..3 {
        driver.complete_next();
    }

    let job = driver.saved(id);
    let e1 = job.task_by_name("E#1").unwrap();
    assert_eq!(e1.flow_script().and_then(|s| s.target()), Some("S#1"));
    assert_eq!(job.task_by_name("S#1").unwrap().matching_block(), Some("E#1"));
    assert_eq!(status_of(&job, "Z"), TaskStatus::Pending);
}

#[test]
fn single_task_can_loop_on_itself() {
    init_tracing();
    let job = JobDefinitionBuilder::new("self-loop")
        .with_task(TaskDefinitionBuilder::new("A").loop_to("A", 3).build())
        .with_task(TaskDefinitionBuilder::new("B").after("A").build())
        .create("alice");
    let mut driver = CoreDriver::new();
    let id = driver.submit(job);
    driver.run_until_quiet();

    assert_eq!(driver.dispatched, vec!["A", "A#1", "A#2", "B"]);
    let job = driver.saved(id);
    assert_eq!(job.status(), JobStatus::Finished);
    let a2 = job.task_by_name("A#2").unwrap();
    assert_eq!(
        job.task_by_name("B").unwrap().dependencies(),
        &[a2.id().clone()]
    );
}

#[test]
fn cron_loop_defers_the_next_iteration() {
    init_tracing();
    let mut driver = CoreDriver::new();
    let id = driver.submit(block_loop(3, Some("0 0 1 1 *")));
    for _ in 0..3 {
        driver.complete_next();
    }

    assert!(driver.in_flight().is_empty());
    assert_eq!(driver.wake_ups, 1);
    assert!(!driver.exit_requested, "a wake-up is pending");

    let job = driver.saved(id);
    let s1 = job.task_by_name("S#1").unwrap();
    assert_eq!(s1.status(), TaskStatus::Pending);
    assert!(s1.generic_information().contains_key(START_AT));
    let tag = s1.tag().unwrap();
    assert!(tag.starts_with("LOOP-E-"), "tag was {tag}");
    assert_ne!(tag, "LOOP-E-1");

    // still too early: the task stays deferred and a new wake-up is armed
    driver.step(SchedulerEvent::Tick);
    assert!(driver.in_flight().is_empty());
    assert_eq!(driver.wake_ups, 2);
}
