// src/job/flow/mod.rs

//! Control-flow actions applied when a task completes.
//!
//! - [`loop_action`] duplicates a block for its next iteration.
//! - [`if_action`] plugs the selected branch and skips the other one.
//! - [`replicate_action`] runs the following block several times in parallel.
//!
//! CONTINUE has no handler: the task is simply terminated.

mod action;
mod if_action;
mod loop_action;
mod replicate_action;
mod replication;
mod script;

pub use action::{FlowAction, FlowActionType, FlowBlock};
pub use loop_action::next_cron_date;
pub use script::{FlowDecision, FlowScript};

use tracing::{debug, error};

use crate::errors::Result;
use crate::job::changes::ChangedTasksInfo;
use crate::job::model::JobModel;
use crate::job::TaskId;

/// Applies one kind of flow action to a job.
///
/// Returns `Ok(true)` when the action took over the termination of the
/// initiator, `Ok(false)` when the caller must terminate it normally. An
/// error leaves the job untouched.
pub(in crate::job) trait FlowActionHandler {
    fn apply(
        &self,
        job: &mut JobModel,
        initiator: &TaskId,
        action: &FlowAction,
        changes: &mut ChangedTasksInfo,
    ) -> Result<bool>;
}

fn handler_for(kind: FlowActionType) -> Option<&'static dyn FlowActionHandler> {
    match kind {
        FlowActionType::Loop => Some(&loop_action::LoopHandler),
        FlowActionType::If => Some(&if_action::IfHandler),
        FlowActionType::Replicate => Some(&replicate_action::ReplicateHandler),
        FlowActionType::Continue => None,
    }
}

/// Runs the handler for `action`. A failing action is logged and reported as
/// not applied, so the initiator still terminates normally.
pub(in crate::job) fn apply_action(
    job: &mut JobModel,
    initiator: &TaskId,
    action: &FlowAction,
    changes: &mut ChangedTasksInfo,
) -> bool {
    let Some(handler) = handler_for(action.kind) else {
        debug!(task = %initiator, "CONTINUE");
        return false;
    };
    match handler.apply(job, initiator, action, changes) {
        Ok(applied) => applied,
        Err(err) => {
            error!(
                job = %job.id(),
                task = %initiator,
                action = %action.kind,
                error = %err,
                "flow action could not be applied; continuing"
            );
            false
        }
    }
}
