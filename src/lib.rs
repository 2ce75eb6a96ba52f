// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod factory;
pub mod job;
pub mod logging;
pub mod notify;
pub mod store;
pub mod types;

use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::load_and_build;
use crate::config::model::SchedulerSettings;
use crate::engine::{CoreRuntime, Runtime, RuntimeOptions, SchedulerEvent};
use crate::exec::{FailurePlan, ProcessExecutor, SimulatedExecutor};
use crate::factory::JobFactory;
use crate::job::JobModel;
use crate::notify::TracingSink;
use crate::store::{InMemoryJobStore, JobStore};

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - job loading and validation
/// - the core runtime, its store and notification sink
/// - the executor (simulated or local processes)
/// - Ctrl-C handling
pub async fn run(args: CliArgs) -> Result<()> {
    let settings = settings_from_args(&args);
    let mut factory = JobFactory::new()
        .with_restart_waiting_timer(Duration::from_millis(settings.restart_waiting_time_ms));

    let mut jobs = Vec::with_capacity(args.jobs.len());
    for path in &args.jobs {
        let job = load_and_build(path, &mut factory, &args.owner)
            .with_context(|| format!("loading job {}", path.display()))?;
        jobs.push(job);
    }

    if args.dry_run {
        for job in &jobs {
            print_dry_run(job);
        }
        return Ok(());
    }

    let (rt_tx, rt_rx) = mpsc::channel::<SchedulerEvent>(256);

    // Ctrl-C → graceful shutdown.
    {
        let tx = rt_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            let _ = tx.send(SchedulerEvent::ShutdownRequested).await;
        });
    }

    for job in jobs {
        rt_tx
            .send(SchedulerEvent::JobSubmitted { job: Box::new(job) })
            .await?;
    }

    let store = InMemoryJobStore::new();
    let options = RuntimeOptions {
        exit_when_idle: settings.exit_when_idle,
        execution_host: settings.execution_host.clone(),
    };
    let core = CoreRuntime::new(Box::new(store.clone()), Box::new(TracingSink), options);

    if args.execute {
        let executor = ProcessExecutor::new(rt_tx.clone());
        Runtime::new(core, rt_rx, rt_tx, executor).run().await?;
    } else {
        let failures: FailurePlan = args.failures.iter().cloned().collect();
        let executor = SimulatedExecutor::new(rt_tx.clone())
            .with_task_duration(Duration::from_millis(args.task_duration_ms))
            .with_failures(failures);
        Runtime::new(core, rt_rx, rt_tx, executor).run().await?;
    }

    print_summary(&store)?;
    Ok(())
}

fn settings_from_args(args: &CliArgs) -> SchedulerSettings {
    let mut settings = SchedulerSettings::default();
    if let Some(ms) = args.restart_delay_ms {
        settings.restart_waiting_time_ms = ms;
    }
    if let Some(host) = &args.host {
        settings.execution_host = host.clone();
    }
    settings
}

/// Dry-run output: tasks, dependencies, blocks and flow scripts.
fn print_dry_run(job: &JobModel) {
    println!("jobflow dry-run");
    println!("  job {} '{}' ({})", job.id(), job.name(), job.kind());
    println!("  priority = {:?}", job.attributes().priority);
    println!("  on_task_error = {:?}", job.attributes().on_task_error);
    println!();

    println!("tasks ({}):", job.task_count());
    for task in job.tasks() {
        println!("  - {}", task.name());
        println!("      executable: {}", task.executable());
        if !task.dependencies().is_empty() {
            let deps: Vec<_> = task.dependencies().iter().map(|d| d.readable_name()).collect();
            println!("      after: {deps:?}");
        }
        if let Some(block) = task.matching_block() {
            println!("      block: {:?} (matches {block})", task.flow_block());
        }
        if let Some(initiator) = task.if_branch() {
            println!("      branch of: {}", initiator.readable_name());
        }
        if !task.joined_branches().is_empty() {
            let joined: Vec<_> = task
                .joined_branches()
                .iter()
                .map(|b| b.readable_name())
                .collect();
            println!("      joins: {joined:?}");
        }
        if let Some(script) = task.flow_script() {
            println!("      flow: {}", script.action());
            if let Some(target) = script.target() {
                println!("        target: {target}");
            }
            if let Some(target_else) = script.target_else() {
                println!("        else: {target_else}");
            }
            if let Some(continuation) = script.target_continuation() {
                println!("        continuation: {continuation}");
            }
            if let Some(cron) = script.cron() {
                println!("        cron: {cron}");
            }
        }
    }
    println!();

    debug!("dry-run complete (no execution)");
}

fn print_summary(store: &InMemoryJobStore) -> Result<()> {
    for id in store.job_ids()? {
        let job = store.load_job(id)?;
        let counters = job.counters();
        println!(
            "job {} '{}': {} ({} tasks, {} finished, {} faulty, {} failed)",
            job.id(),
            job.name(),
            job.status(),
            counters.total,
            counters.finished,
            counters.faulty,
            counters.failed
        );
        for task in job.tasks() {
            println!("  {:<24} {}", task.name(), task.status());
        }
    }
    info!("all jobs reported");
    Ok(())
}
