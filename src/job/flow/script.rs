// src/job/flow/script.rs

//! Flow scripts attached to tasks.
//!
//! The script body itself is evaluated by the executing node; the core only
//! needs to know the action kind and its target names. For dry runs and the
//! simulated executor, the script also carries a fixed decision so that it can
//! be "evaluated" locally.

use super::action::{FlowAction, FlowActionType};

/// Local stand-in for what a flow script would compute at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FlowDecision {
    /// REPLICATE: number of additional copies.
    pub runs: i64,
    /// LOOP: total number of block executions, the first one included.
    pub iterations: u32,
    /// IF: run the ELSE branch instead of the IF branch.
    pub take_else: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlowScript {
    action: FlowActionType,
    target: Option<String>,
    target_else: Option<String>,
    target_continuation: Option<String>,
    cron: Option<String>,
    decision: FlowDecision,
}

impl FlowScript {
    pub fn new(action: FlowActionType) -> Self {
        FlowScript {
            action,
            target: None,
            target_else: None,
            target_continuation: None,
            cron: None,
            decision: FlowDecision::default(),
        }
    }

    pub fn loop_to(target: impl Into<String>, iterations: u32) -> Self {
        let mut script = FlowScript::new(FlowActionType::Loop);
        script.target = Some(target.into());
        script.decision.iterations = iterations;
        script
    }

    pub fn if_else(
        target: impl Into<String>,
        target_else: impl Into<String>,
        continuation: Option<String>,
    ) -> Self {
        let mut script = FlowScript::new(FlowActionType::If);
        script.target = Some(target.into());
        script.target_else = Some(target_else.into());
        script.target_continuation = continuation;
        script
    }

    pub fn replicate(runs: i64) -> Self {
        let mut script = FlowScript::new(FlowActionType::Replicate);
        script.decision.runs = runs;
        script
    }

    pub fn with_cron(mut self, cron: Option<String>) -> Self {
        self.cron = cron;
        self
    }

    pub fn with_decision(mut self, decision: FlowDecision) -> Self {
        self.decision = decision;
        self
    }

    pub fn action(&self) -> FlowActionType {
        self.action
    }

    pub fn target(&self) -> Option<&str> {
        self.target.as_deref()
    }

    pub fn target_else(&self) -> Option<&str> {
        self.target_else.as_deref()
    }

    pub fn target_continuation(&self) -> Option<&str> {
        self.target_continuation.as_deref()
    }

    pub fn cron(&self) -> Option<&str> {
        self.cron.as_deref()
    }

    pub fn decision(&self) -> FlowDecision {
        self.decision
    }

    /// Rewrites every target name with `rename`. Used when the owning task is
    /// duplicated and its targets must point into the same iteration or
    /// replica.
    pub(crate) fn rename_targets(&mut self, rename: impl Fn(&str) -> String) {
        match self.action {
            FlowActionType::Loop => {
                self.target = self.target.as_deref().map(&rename);
            }
            FlowActionType::If => {
                self.target = self.target.as_deref().map(&rename);
                self.target_else = self.target_else.as_deref().map(&rename);
                self.target_continuation = self.target_continuation.as_deref().map(&rename);
            }
            FlowActionType::Replicate | FlowActionType::Continue => {}
        }
    }

    /// Produces the action for a task at the given loop iteration.
    pub fn evaluate(&self, iteration: u32) -> FlowAction {
        match self.action {
            FlowActionType::Loop => match &self.target {
                Some(target) if iteration + 1 < self.decision.iterations => FlowAction {
                    cron_expr: self.cron.clone(),
                    ..FlowAction::loop_to(target.clone())
                },
                _ => FlowAction::continue_action(),
            },
            FlowActionType::If => {
                let (Some(target), Some(target_else)) = (&self.target, &self.target_else) else {
                    return FlowAction::continue_action();
                };
                let (selected, other) = if self.decision.take_else {
                    (target_else, target)
                } else {
                    (target, target_else)
                };
                FlowAction::if_branch(
                    selected.clone(),
                    other.clone(),
                    self.target_continuation.clone(),
                )
            }
            FlowActionType::Replicate => FlowAction::replicate(self.decision.runs),
            FlowActionType::Continue => FlowAction::continue_action(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loop_stops_after_requested_iterations() {
        let script = FlowScript::loop_to("S", 3);
        assert_eq!(script.evaluate(0).kind, FlowActionType::Loop);
        assert_eq!(script.evaluate(1).kind, FlowActionType::Loop);
        assert_eq!(script.evaluate(2).kind, FlowActionType::Continue);
    }

    #[test]
    fn else_decision_swaps_branches() {
        let script = FlowScript::if_else("B", "C", Some("J".into())).with_decision(FlowDecision {
            take_else: true,
            ..FlowDecision::default()
        });
        let action = script.evaluate(0);
        assert_eq!(action.target.as_deref(), Some("C"));
        assert_eq!(action.target_else.as_deref(), Some("B"));
        assert_eq!(action.target_continuation.as_deref(), Some("J"));
    }

    #[test]
    fn negative_runs_clamp_to_zero() {
        assert_eq!(FlowScript::replicate(-4).evaluate(0).dup_number, 0);
    }
}
