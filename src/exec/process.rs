// src/exec/process.rs

//! Executor that runs native commands and shell scripts as local processes.
//!
//! Other executables (Java classes, non-shell script engines) have no local
//! runtime here; they are reported as finished without running.

use std::future::Future;
use std::pin::Pin;
use std::process::Stdio;
use std::time::Instant;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::backend::{ExecutorBackend, completion_action};
use crate::engine::{DispatchedTask, SchedulerEvent, TaskCompletion};
use crate::errors::Result;
use crate::job::Executable;

const SHELL_ENGINES: &[&str] = &["shell", "sh", "bash"];

pub struct ProcessExecutor {
    runtime_tx: mpsc::Sender<SchedulerEvent>,
}

impl ProcessExecutor {
    pub fn new(runtime_tx: mpsc::Sender<SchedulerEvent>) -> Self {
        Self { runtime_tx }
    }
}

impl ExecutorBackend for ProcessExecutor {
    fn spawn_ready_tasks(
        &mut self,
        tasks: Vec<DispatchedTask>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        let tx = self.runtime_tx.clone();
        Box::pin(async move {
            for task in tasks {
                tokio::spawn(run_task(task, tx.clone()));
            }
            Ok(())
        })
    }
}

fn command_for(executable: &Executable) -> Option<Command> {
    match executable {
        Executable::Native { command } => {
            let (program, args) = command.split_first()?;
            let mut cmd = Command::new(program);
            cmd.args(args);
            Some(cmd)
        }
        Executable::Script { engine, script } if SHELL_ENGINES.contains(&engine.as_str()) => {
            let cmd = if cfg!(windows) {
                let mut c = Command::new("cmd");
                c.arg("/C").arg(script);
                c
            } else {
                let mut c = Command::new("sh");
                c.arg("-c").arg(script);
                c
            };
            Some(cmd)
        }
        _ => None,
    }
}

/// Runs one task and reports its completion. Spawn failures are reported as
/// task errors.
async fn run_task(task: DispatchedTask, runtime_tx: mpsc::Sender<SchedulerEvent>) {
    let started = Instant::now();
    let completion = match run_task_inner(&task).await {
        Ok(Some(output)) => TaskCompletion::success()
            .with_action(completion_action(&task))
            .with_output(output),
        Ok(None) => TaskCompletion::failure().with_action(completion_action(&task)),
        Err(err) => {
            error!(task = %task.task, error = %err, "task execution error");
            TaskCompletion::failure()
        }
    };
    let completion = completion.with_duration(started.elapsed());

    let event = SchedulerEvent::TaskCompleted {
        job: task.job,
        task: task.task,
        completion,
    };
    if runtime_tx.send(event).await.is_err() {
        debug!("runtime gone; dropping completion");
    }
}

/// `Ok(Some(stdout))` on success, `Ok(None)` when the process failed.
async fn run_task_inner(task: &DispatchedTask) -> anyhow::Result<Option<String>> {
    let Some(mut cmd) = command_for(&task.executable) else {
        warn!(task = %task.task, executable = %task.executable, "no local runtime; task reported finished");
        return Ok(Some(String::new()));
    };

    info!(task = %task.task, executable = %task.executable, "starting task process");

    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    let mut child = cmd
        .spawn()
        .with_context(|| format!("spawning process for task '{}'", task.name))?;

    // Always consume stderr so buffers don't fill; log at debug.
    if let Some(stderr) = child.stderr.take() {
        let name = task.name.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(task = %name, "stderr: {}", line);
            }
        });
    }

    let mut output = String::new();
    if let Some(stdout) = child.stdout.take() {
        let mut lines = BufReader::new(stdout).lines();
        while let Some(line) = lines
            .next_line()
            .await
            .with_context(|| format!("reading stdout of task '{}'", task.name))?
        {
            debug!(task = %task.name, "stdout: {}", line);
            output.push_str(&line);
            output.push('\n');
        }
    }

    let status = child
        .wait()
        .await
        .with_context(|| format!("waiting for process of task '{}'", task.name))?;
    let code = status.code().unwrap_or(-1);
    info!(task = %task.task, exit_code = code, success = status.success(), "task process exited");

    Ok(status.success().then_some(output))
}
