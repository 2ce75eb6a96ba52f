// src/factory/kinds.rs

//! Kind-specific validation, selected by [`JobKind`].

use super::flow_checker::{self, Block};
use super::{FlowError, FlowErrorKind};
use crate::config::model::TaskDefinition;
use crate::job::FlowBlock;
use crate::types::JobKind;

/// Validates the tasks of one kind of job and returns its task blocks.
pub type KindValidator = fn(&[TaskDefinition]) -> Result<Vec<Block>, FlowError>;

const VALIDATORS: &[(JobKind, KindValidator)] = &[
    (JobKind::TaskFlow, flow_checker::validate),
    (JobKind::ParameterSweeping, validate_parameter_sweeping),
];

pub fn validator_for(kind: JobKind) -> KindValidator {
    VALIDATORS
        .iter()
        .find(|(k, _)| *k == kind)
        .map_or(flow_checker::validate, |(_, v)| *v)
}

/// Parameter-sweeping jobs are flat: independent tasks, no control flow.
fn validate_parameter_sweeping(tasks: &[TaskDefinition]) -> Result<Vec<Block>, FlowError> {
    flow_checker::check_names(tasks)?;
    for task in tasks {
        if !task.after.is_empty() {
            return Err(FlowError::new(
                FlowErrorKind::Dependency,
                "Tasks of a parameter sweeping job cannot have dependencies",
                [task.name.as_str()],
            ));
        }
        if task.flow.is_some() || task.flow_block != FlowBlock::None {
            return Err(FlowError::new(
                FlowErrorKind::Block,
                "Tasks of a parameter sweeping job cannot declare control flow",
                [task.name.as_str()],
            ));
        }
    }
    Ok(Vec::new())
}
