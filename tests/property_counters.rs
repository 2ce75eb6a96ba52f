// tests/property_counters.rs

mod common;
use crate::common::{CoreDriver, JobDefinitionBuilder, TaskDefinitionBuilder};

use std::collections::BTreeSet;

use proptest::prelude::*;

use jobflow::config::model::JobDefinition;
use jobflow::engine::SchedulerEvent;
use jobflow::job::JobStatus;
use jobflow::types::OnTaskError;

// Acyclic by construction: task N only depends on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = JobDefinition> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(proptest::collection::vec(any::<usize>(), 0..3), num_tasks)
            .prop_map(|raw_deps| {
                let mut builder = JobDefinitionBuilder::new("random")
                    .on_task_error(OnTaskError::ContinueJobExecution);
                for (i, potential) in raw_deps.into_iter().enumerate() {
                    let mut task = TaskDefinitionBuilder::new(&format!("task_{i}"));
                    if i > 0 {
                        let deps: BTreeSet<usize> = potential.into_iter().map(|d| d % i).collect();
                        for dep in deps {
                            task = task.after(&format!("task_{dep}"));
                        }
                    }
                    builder = builder.with_task(task.build());
                }
                builder.build()
            })
    })
}

#[derive(Debug, Clone, Copy)]
enum Step {
    Plain,
    Loop(u32),
    Replicate(i64),
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        2 => Just(Step::Plain),
        1 => (1..4u32).prop_map(Step::Loop),
        1 => (0..3i64).prop_map(Step::Replicate),
    ]
}

/// A chain of tasks, some looping on themselves, some replicating the next
/// task. A replicated task and its merge point are kept plain.
fn flow_chain_strategy(max_tasks: usize) -> impl Strategy<Value = (JobDefinition, usize)> {
    proptest::collection::vec(step_strategy(), 1..=max_tasks).prop_map(|mut steps| {
        let n = steps.len();
        let mut i = 0;
        while i < n {
            if let Step::Replicate(_) = steps[i] {
                if i + 2 < n {
                    steps[i + 1] = Step::Plain;
                    steps[i + 2] = Step::Plain;
                    i += 3;
                    continue;
                }
                steps[i] = Step::Plain;
            }
            i += 1;
        }

        let mut expected = n;
        let mut builder = JobDefinitionBuilder::new("flow-chain");
        for (i, step) in steps.iter().enumerate() {
            let name = format!("task_{i}");
            let mut task = TaskDefinitionBuilder::new(&name);
            if i > 0 {
                task = task.after(&format!("task_{}", i - 1));
            }
            match *step {
                Step::Plain => {}
                Step::Loop(iterations) => {
                    task = task.loop_to(&name, iterations);
                    expected += iterations as usize - 1;
                }
                Step::Replicate(runs) => {
                    task = task.replicate(runs);
                    expected += runs as usize;
                }
            }
            builder = builder.with_task(task.build());
        }
        (builder.build(), expected)
    })
}

fn build(definition: &JobDefinition) -> jobflow::job::JobModel {
    jobflow::factory::JobFactory::new()
        .create_job(definition, "alice")
        .expect("generated definitions are valid")
}

proptest! {
    #[test]
    fn random_dags_always_finish_with_consistent_counters(
        definition in dag_strategy(8),
        failing in proptest::collection::btree_set(0..8usize, 0..4),
    ) {
        let mut driver = CoreDriver::new();
        for i in &failing {
            driver = driver.fail(&format!("task_{i}"), 1);
        }
        let id = driver.submit(build(&definition));
        driver.run_until_quiet();

        let job = driver.saved(id);
        prop_assert_eq!(job.status(), JobStatus::Finished);
        prop_assert!(job.tasks().all(|t| t.status().is_terminal()));
        prop_assert_eq!(job.counters(), job.recount());
        prop_assert_eq!(job.counters().total, job.counters().sum_of_classes());
        prop_assert_eq!(job.counters().total as usize, definition.tasks.len());

        let expected_faulty = failing.iter().filter(|&&i| i < definition.tasks.len()).count();
        prop_assert_eq!(job.faulty_tasks().len(), expected_faulty);
        prop_assert!(driver.exit_requested);
    }

    #[test]
    fn tasks_are_dispatched_after_their_dependencies(definition in dag_strategy(8)) {
        let mut driver = CoreDriver::new();
        driver.submit(build(&definition));
        driver.run_until_quiet();

        prop_assert_eq!(driver.dispatched.len(), definition.tasks.len());
        let position = |name: &str| driver.dispatched.iter().position(|n| n == name);
        for task in &definition.tasks {
            let at = position(&task.name);
            prop_assert!(at.is_some());
            for dep in &task.after {
                prop_assert!(position(dep) < at, "{} ran before {}", task.name, dep);
            }
        }
    }

    #[test]
    fn loops_and_replicas_keep_names_unique((definition, expected) in flow_chain_strategy(7)) {
        let mut driver = CoreDriver::new();
        let id = driver.submit(build(&definition));
        driver.run_until_quiet();

        let job = driver.saved(id);
        prop_assert_eq!(job.status(), JobStatus::Finished);
        prop_assert_eq!(job.task_count(), expected);
        let names: BTreeSet<&str> = job.tasks().map(|t| t.name()).collect();
        prop_assert_eq!(names.len(), job.task_count());
        prop_assert_eq!(job.counters(), job.recount());
        prop_assert_eq!(job.counters().finished as usize, expected);
    }

    #[test]
    fn killing_a_job_midway_keeps_counters_consistent(
        definition in dag_strategy(8),
        completions in 0..8usize,
    ) {
        let mut driver = CoreDriver::new();
        let id = driver.submit(build(&definition));
        for _ in 0..completions {
            driver.complete_next();
        }
        let was_live = driver.core.context().job(id).is_some();
        driver.step(SchedulerEvent::KillJob { job: id });
        driver.run_until_quiet();

        let job = driver.saved(id);
        prop_assert!(job.status().is_terminal());
        if was_live {
            prop_assert_eq!(job.status(), JobStatus::Killed);
        }
        prop_assert!(job.tasks().all(|t| t.status().is_terminal()));
        prop_assert_eq!(job.counters(), job.recount());
        prop_assert_eq!(job.counters().running, 0);
    }
}
