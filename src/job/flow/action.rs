// src/job/flow/action.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// Kind of control-flow action a task may perform after it completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowActionType {
    Loop,
    If,
    Replicate,
    Continue,
}

impl FromStr for FlowActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "loop" => Ok(FlowActionType::Loop),
            "if" => Ok(FlowActionType::If),
            "replicate" => Ok(FlowActionType::Replicate),
            "continue" => Ok(FlowActionType::Continue),
            other => Err(format!("invalid flow action: {other}")),
        }
    }
}

impl fmt::Display for FlowActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FlowActionType::Loop => "LOOP",
            FlowActionType::If => "IF",
            FlowActionType::Replicate => "REPLICATE",
            FlowActionType::Continue => "CONTINUE",
        };
        f.write_str(s)
    }
}

/// Block delimiter role of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlowBlock {
    #[default]
    None,
    Start,
    End,
}

/// The action a task requests once it completes.
///
/// For IF, `target` is the selected branch and `target_else` the one that is
/// skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowAction {
    pub kind: FlowActionType,
    pub target: Option<String>,
    pub target_else: Option<String>,
    pub target_continuation: Option<String>,
    /// Number of additional copies for REPLICATE.
    pub dup_number: u32,
    /// Cron expression deferring the next LOOP iteration.
    pub cron_expr: Option<String>,
}

impl FlowAction {
    pub fn continue_action() -> Self {
        FlowAction {
            kind: FlowActionType::Continue,
            target: None,
            target_else: None,
            target_continuation: None,
            dup_number: 0,
            cron_expr: None,
        }
    }

    pub fn loop_to(target: impl Into<String>) -> Self {
        FlowAction {
            kind: FlowActionType::Loop,
            target: Some(target.into()),
            ..FlowAction::continue_action()
        }
    }

    pub fn loop_with_cron(target: impl Into<String>, cron: impl Into<String>) -> Self {
        FlowAction {
            cron_expr: Some(cron.into()),
            ..FlowAction::loop_to(target)
        }
    }

    /// `selected` runs, `other` is skipped, `continuation` joins them.
    pub fn if_branch(
        selected: impl Into<String>,
        other: impl Into<String>,
        continuation: Option<String>,
    ) -> Self {
        FlowAction {
            kind: FlowActionType::If,
            target: Some(selected.into()),
            target_else: Some(other.into()),
            target_continuation: continuation,
            ..FlowAction::continue_action()
        }
    }

    /// A negative run count from a script clamps to zero copies.
    pub fn replicate(runs: i64) -> Self {
        FlowAction {
            kind: FlowActionType::Replicate,
            dup_number: u32::try_from(runs.max(0)).unwrap_or(u32::MAX),
            ..FlowAction::continue_action()
        }
    }
}
