// src/engine/runtime.rs

use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::engine::DispatchedTask;
use crate::errors::Result;
use crate::exec::ExecutorBackend;

use super::core::CoreRuntime;
use super::{CoreCommand, SchedulerEvent};

/// Drives the core in response to [`SchedulerEvent`]s and delegates task
/// execution to an [`ExecutorBackend`].
///
/// This is a pure IO shell around `CoreRuntime`: it reads events, arms
/// timers that feed events back in, and hands dispatched tasks to the
/// executor.
pub struct Runtime<E: ExecutorBackend> {
    core: CoreRuntime,
    event_rx: mpsc::Receiver<SchedulerEvent>,
    event_tx: mpsc::Sender<SchedulerEvent>,
    executor: E,
}

impl<E: ExecutorBackend> fmt::Debug for Runtime<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl<E: ExecutorBackend> Runtime<E> {
    /// `event_tx` must feed `event_rx`; timers use it to post events back.
    pub fn new(
        core: CoreRuntime,
        event_rx: mpsc::Receiver<SchedulerEvent>,
        event_tx: mpsc::Sender<SchedulerEvent>,
        executor: E,
    ) -> Self {
        Self {
            core,
            event_rx,
            event_tx,
            executor,
        }
    }

    /// Main event loop. Returns the core so callers can inspect the final
    /// state.
    pub async fn run(mut self) -> Result<CoreRuntime> {
        info!("jobflow runtime started");

        while let Some(event) = self.event_rx.recv().await {
            debug!(?event, "runtime received event");

            let step = self.core.step(event);

            for command in step.commands {
                self.execute_command(command).await?;
            }

            if !step.keep_running {
                info!("core requested exit; stopping runtime");
                break;
            }
        }

        info!("runtime exiting");
        Ok(self.core)
    }

    async fn execute_command(&mut self, command: CoreCommand) -> Result<()> {
        match command {
            CoreCommand::DispatchTasks(tasks) => {
                self.spawn_ready(tasks).await?;
            }
            CoreCommand::ScheduleRestart { job, task, delay } => {
                debug!(%job, %task, delay_ms = delay.as_millis() as u64, "restart timer armed");
                self.post_after(delay, SchedulerEvent::RestartTask { job, task });
            }
            CoreCommand::ScheduleWakeUp { delay } => {
                debug!(delay_ms = delay.as_millis() as u64, "wake-up timer armed");
                self.post_after(delay, SchedulerEvent::Tick);
            }
            CoreCommand::RequestExit => {
                info!("core issued RequestExit command");
            }
        }
        Ok(())
    }

    fn post_after(&self, delay: Duration, event: SchedulerEvent) {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // The runtime may already be gone.
            let _ = tx.send(event).await;
        });
    }

    async fn spawn_ready(&mut self, tasks: Vec<DispatchedTask>) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }

        let names: Vec<_> = tasks.iter().map(|t| t.name.as_str()).collect();
        debug!(?names, "dispatching ready tasks");

        self.executor.spawn_ready_tasks(tasks).await
    }
}
