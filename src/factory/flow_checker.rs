// src/factory/flow_checker.rs

//! Structural validation of a task flow before any task is created.
//!
//! The checker works on a doubly linked view of the definitions:
//! dependency edges (`children` / `parents`), IF edges (`targets` /
//! `target_of`) and join edges (`joins` / `joined_by`). It never touches the
//! definitions themselves.

use std::collections::{HashMap, HashSet};

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use super::{FlowError, FlowErrorKind};
use crate::config::model::TaskDefinition;
use crate::job::task::{ITERATION_SEPARATOR, REPLICATION_SEPARATOR};
use crate::job::{FlowActionType, FlowBlock};

type CheckResult<T> = std::result::Result<T, FlowError>;

/// A matched START / END pair, by task name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub start: String,
    pub end: String,
}

/// Validates `tasks` as a task flow and returns the blocks it declares.
pub fn validate(tasks: &[TaskDefinition]) -> CheckResult<Vec<Block>> {
    check_names(tasks)?;
    let mut checker = FlowChecker::new(tasks)?;
    checker.check_recursion()?;
    checker.check_blocks()?;
    checker.check_replicate()?;
    checker.check_loop()?;
    checker.check_if()?;

    let blocks = checker
        .blocks
        .iter()
        .map(|&(start, end)| Block {
            start: checker.name(start).to_owned(),
            end: checker.name(end).to_owned(),
        })
        .collect::<Vec<_>>();
    debug!(tasks = tasks.len(), blocks = blocks.len(), "task flow is valid");
    Ok(blocks)
}

/// Names must be unique and free of the iteration / replication separators.
pub fn check_names(tasks: &[TaskDefinition]) -> CheckResult<()> {
    let mut seen = HashSet::new();
    for task in tasks {
        let name = task.name.as_str();
        for separator in [ITERATION_SEPARATOR, REPLICATION_SEPARATOR] {
            if name.contains(separator) {
                return Err(FlowError::new(
                    FlowErrorKind::Name,
                    format!("Task name cannot contain special character '{separator}'"),
                    [name],
                ));
            }
        }
        if !seen.insert(name) {
            return Err(FlowError::new(
                FlowErrorKind::Name,
                "Task names are not unique",
                [name],
            ));
        }
    }
    Ok(())
}

#[derive(Debug)]
struct TaskTree<'a> {
    def: &'a TaskDefinition,
    children: Vec<usize>,
    parents: Vec<usize>,
    targets: Vec<usize>,
    target_of: Option<usize>,
    target_join: Option<usize>,
    joins: Vec<usize>,
    joined_by: Option<usize>,
    join_trigger: bool,
}

impl<'a> TaskTree<'a> {
    fn new(def: &'a TaskDefinition) -> Self {
        TaskTree {
            def,
            children: Vec::new(),
            parents: Vec::new(),
            targets: Vec::new(),
            target_of: None,
            target_join: None,
            joins: Vec::new(),
            joined_by: None,
            join_trigger: false,
        }
    }

    fn action(&self) -> Option<FlowActionType> {
        self.def.flow_action()
    }

    fn flow_target(&self) -> Option<&'a str> {
        self.def.flow.as_ref().and_then(|f| f.target.as_deref())
    }

    fn flow_target_else(&self) -> Option<&'a str> {
        self.def.flow.as_ref().and_then(|f| f.target_else.as_deref())
    }

    fn flow_continuation(&self) -> Option<&'a str> {
        self.def
            .flow
            .as_ref()
            .and_then(|f| f.continuation.as_deref())
            .filter(|c| !c.is_empty())
    }
}

struct FlowChecker<'a> {
    tasks: Vec<TaskTree<'a>>,
    by_name: HashMap<&'a str, usize>,
    roots: Vec<usize>,
    blocks: Vec<(usize, usize)>,
}

impl<'a> FlowChecker<'a> {
    fn new(defs: &'a [TaskDefinition]) -> CheckResult<Self> {
        let mut checker = FlowChecker {
            tasks: defs.iter().map(TaskTree::new).collect(),
            by_name: defs
                .iter()
                .enumerate()
                .map(|(i, d)| (d.name.as_str(), i))
                .collect(),
            roots: Vec::new(),
            blocks: Vec::new(),
        };
        checker.link_dependencies()?;
        checker.link_if_targets()?;
        checker.link_joins();
        Ok(checker)
    }

    fn name(&self, index: usize) -> &'a str {
        self.tasks[index].def.name.as_str()
    }

    fn find(&self, name: Option<&str>) -> Option<usize> {
        name.and_then(|n| self.by_name.get(n).copied())
    }

    fn link_dependencies(&mut self) -> CheckResult<()> {
        for down in 0..self.tasks.len() {
            let def = self.tasks[down].def;
            if def.after.is_empty() {
                self.roots.push(down);
                continue;
            }
            for dep in &def.after {
                let Some(&up) = self.by_name.get(dep.as_str()) else {
                    return Err(FlowError::new(
                        FlowErrorKind::Dependency,
                        format!("Unknown dependency '{dep}'"),
                        [def.name.as_str()],
                    ));
                };
                if self.tasks[down].parents.contains(&up) {
                    continue;
                }
                self.tasks[up].children.push(down);
                self.tasks[down].parents.push(up);
            }
        }
        Ok(())
    }

    fn link_if_targets(&mut self) -> CheckResult<()> {
        for initiator in 0..self.tasks.len() {
            if self.tasks[initiator].action() != Some(FlowActionType::If) {
                continue;
            }
            let branches = [
                ("IF", self.tasks[initiator].flow_target()),
                ("ELSE", self.tasks[initiator].flow_target_else()),
            ];
            for (label, name) in branches {
                let Some(name) = name else {
                    continue;
                };
                let Some(&target) = self.by_name.get(name) else {
                    return Err(FlowError::new(
                        FlowErrorKind::If,
                        format!("{label} target is unknown"),
                        [name],
                    ));
                };
                if self.tasks[target].target_of.is_some() {
                    return Err(FlowError::new(
                        FlowErrorKind::If,
                        "Task is target of multiple IF actions",
                        [name],
                    ));
                }
                self.tasks[target].target_of = Some(initiator);
                self.tasks[initiator].targets.push(target);
            }
            if let Some(continuation) = self.tasks[initiator].flow_continuation() {
                let Some(&join) = self.by_name.get(continuation) else {
                    return Err(FlowError::new(
                        FlowErrorKind::If,
                        "IF continuation is unknown",
                        [continuation],
                    ));
                };
                self.tasks[initiator].target_join = Some(join);
            }
        }
        Ok(())
    }

    /// Walks down each branch of every IF with a continuation to find the
    /// task the continuation joins.
    fn link_joins(&mut self) {
        for initiator in 0..self.tasks.len() {
            if self.tasks[initiator].action() != Some(FlowActionType::If) {
                continue;
            }
            let Some(join) = self.tasks[initiator].target_join else {
                continue;
            };
            let branches = [
                self.find(self.tasks[initiator].flow_target()),
                self.find(self.tasks[initiator].flow_target_else()),
            ];
            for branch in branches.into_iter().flatten() {
                let end = self.branch_end(branch);
                self.tasks[join].joins.push(end);
                self.tasks[end].joined_by = Some(join);
            }
        }
    }

    fn branch_end(&self, start: usize) -> usize {
        let mut open_joins: Vec<&str> = Vec::new();
        let mut visited = HashSet::new();
        let mut current = start;
        loop {
            visited.insert(current);
            let tree = &self.tasks[current];
            if let Some(join) = tree.flow_continuation() {
                open_joins.push(join);
            }
            let next = tree
                .children
                .first()
                .copied()
                .or_else(|| self.find(tree.flow_target_else()))
                .or_else(|| open_joins.pop().and_then(|j| self.find(Some(j))));
            match next {
                Some(next) if !visited.contains(&next) => current = next,
                _ => return current,
            }
        }
    }

    fn check_recursion(&self) -> CheckResult<()> {
        let mut graph: DiGraphMap<usize, ()> = DiGraphMap::new();
        for (index, tree) in self.tasks.iter().enumerate() {
            graph.add_node(index);
            for &child in tree.children.iter().chain(&tree.targets) {
                graph.add_edge(index, child, ());
            }
            if let Some(join) = tree.joined_by {
                graph.add_edge(index, join, ());
            }
        }
        match toposort(&graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(FlowError::new(
                FlowErrorKind::Recursion,
                "Infinite recursion detected",
                [self.name(cycle.node_id())],
            )),
        }
    }

    fn check_blocks(&mut self) -> CheckResult<()> {
        let mut done = HashSet::new();
        for root in self.roots.clone() {
            let mut env = Vec::new();
            let mut joins = Vec::new();
            self.dfs_blocks(root, &mut done, &mut env, &mut joins)?;
            if let Some(&start) = env.first() {
                return Err(FlowError::new(
                    FlowErrorKind::Block,
                    "Unmatched start block",
                    [self.name(start)],
                ));
            }
        }
        for &(start, end) in &self.blocks {
            self.check_block_down(end, start, &mut HashSet::new())?;
            self.check_block_up(start, end, &mut HashSet::new())?;
        }
        Ok(())
    }

    /// Pairs START and END tags in depth-first order. `env` holds the open
    /// START tasks, `joins` the continuations still to visit.
    fn dfs_blocks(
        &mut self,
        node: usize,
        done: &mut HashSet<usize>,
        env: &mut Vec<usize>,
        joins: &mut Vec<usize>,
    ) -> CheckResult<()> {
        let tree = &self.tasks[node];
        if !tree.joins.is_empty() && !tree.join_trigger {
            return Ok(());
        }
        if let Some(initiator) = tree.target_of {
            if !done.contains(&initiator) {
                return Ok(());
            }
        }
        if !done.insert(node) {
            return Ok(());
        }

        let flow_block = tree.def.flow_block;
        match flow_block {
            FlowBlock::Start => env.push(node),
            FlowBlock::End => {
                let Some(start) = env.pop() else {
                    return Err(FlowError::new(
                        FlowErrorKind::Block,
                        "Unmatched end block",
                        [self.name(node)],
                    ));
                };
                self.blocks.push((start, node));
            }
            FlowBlock::None => {}
        }

        let mut next = self.tasks[node].children.clone();
        if next.is_empty() {
            if self.tasks[node].action() == Some(FlowActionType::If) {
                if let Some(join) = self.tasks[node].target_join {
                    joins.push(join);
                }
                next.extend(self.tasks[node].targets.iter().copied());
            } else if let Some(join) = joins.pop() {
                self.tasks[join].join_trigger = true;
                next.push(join);
            }
        }

        for child in next {
            self.dfs_blocks(child, done, env, joins)?;
        }
        Ok(())
    }

    /// Every flow leaving the block start must reach the block end.
    fn check_block_down(
        &self,
        end: usize,
        node: usize,
        visited: &mut HashSet<usize>,
    ) -> CheckResult<()> {
        if node == end || !visited.insert(node) {
            return Ok(());
        }
        let tree = &self.tasks[node];
        let next: Vec<usize> = tree
            .children
            .iter()
            .chain(&tree.targets)
            .chain(&tree.joined_by)
            .copied()
            .collect();
        if next.is_empty() {
            return Err(FlowError::new(
                FlowErrorKind::Block,
                format!("Task Block ending at {} does not join all its flows", self.name(end)),
                [self.name(node)],
            ));
        }
        for child in next {
            self.check_block_down(end, child, visited)?;
        }
        Ok(())
    }

    /// Every task of the block must come from the block start.
    fn check_block_up(
        &self,
        start: usize,
        node: usize,
        visited: &mut HashSet<usize>,
    ) -> CheckResult<()> {
        if node == start || !visited.insert(node) {
            return Ok(());
        }
        let tree = &self.tasks[node];
        let previous: Vec<usize> = tree
            .parents
            .iter()
            .chain(&tree.joins)
            .chain(&tree.target_of)
            .copied()
            .collect();
        if previous.is_empty() {
            return Err(FlowError::new(
                FlowErrorKind::Block,
                format!("Task Block starting at {} has external dependencies", self.name(start)),
                [self.name(node)],
            ));
        }
        for parent in previous {
            self.check_block_up(start, parent, visited)?;
        }
        Ok(())
    }

    fn block_starting_at(&self, start: usize) -> Option<(usize, usize)> {
        self.blocks.iter().rev().find(|(s, _)| *s == start).copied()
    }

    fn check_replicate(&self) -> CheckResult<()> {
        for tree in &self.tasks {
            if tree.action() != Some(FlowActionType::Replicate) {
                continue;
            }
            for &child in &tree.children {
                let target = &self.tasks[child];
                if target.parents.len() != 1 {
                    return Err(FlowError::new(
                        FlowErrorKind::Replicate,
                        "The Target of a REPLICATE must have only one dependency",
                        [self.name(child)],
                    ));
                }
                if target.def.flow_block == FlowBlock::End {
                    return Err(FlowError::new(
                        FlowErrorKind::Replicate,
                        "The target of a REPLICATE cannot be the end of a task block",
                        [self.name(child)],
                    ));
                }
                let end = self
                    .block_starting_at(child)
                    .map_or(child, |(_, end)| end);
                if self.tasks[end].children.is_empty() {
                    return Err(FlowError::new(
                        FlowErrorKind::Replicate,
                        "No merge point for REPLICATE block",
                        [self.name(end)],
                    ));
                }
                if matches!(
                    self.tasks[end].action(),
                    Some(FlowActionType::Replicate | FlowActionType::If)
                ) {
                    return Err(FlowError::new(
                        FlowErrorKind::Replicate,
                        "Last action of a REPLICATE block cannot perform IF or REPLICATE action",
                        [self.name(end)],
                    ));
                }
            }
        }
        Ok(())
    }

    fn check_loop(&self) -> CheckResult<()> {
        for (index, tree) in self.tasks.iter().enumerate() {
            if tree.action() != Some(FlowActionType::Loop) {
                continue;
            }
            let Some(target) = self.find(tree.flow_target()) else {
                return Err(FlowError::new(
                    FlowErrorKind::Loop,
                    "LOOP action has no target",
                    [self.name(index)],
                ));
            };
            let is_block = self.blocks.contains(&(target, index))
                || (target == index && tree.def.flow_block == FlowBlock::None);
            if !is_block {
                return Err(FlowError::new(
                    FlowErrorKind::Loop,
                    "The scope of a LOOP action should be a Task Block",
                    [self.name(index), self.name(target)],
                ));
            }
            if self.tasks[target].parents.len() > 1 {
                return Err(FlowError::new(
                    FlowErrorKind::Loop,
                    "The Target of a LOOP must have only one dependency",
                    [self.name(target)],
                ));
            }
        }
        Ok(())
    }

    fn check_if(&self) -> CheckResult<()> {
        for (index, tree) in self.tasks.iter().enumerate() {
            if tree.action() != Some(FlowActionType::If) {
                continue;
            }
            let Some(target_if) = self.find(tree.flow_target()) else {
                return Err(FlowError::new(
                    FlowErrorKind::If,
                    "IF action has no target",
                    [self.name(index)],
                ));
            };
            let Some(target_else) = self.find(tree.flow_target_else()) else {
                return Err(FlowError::new(
                    FlowErrorKind::If,
                    "IF action has no ELSE target",
                    [self.name(index)],
                ));
            };
            if target_if == target_else {
                return Err(FlowError::new(
                    FlowErrorKind::If,
                    "IF and ELSE targets are the same",
                    [self.name(target_if), self.name(target_else)],
                ));
            }
            match tree.target_join {
                None => self.check_loose_if(target_if, target_else)?,
                Some(join) => self.check_joined_if(target_if, target_else, join)?,
            }
        }
        Ok(())
    }

    /// IF without continuation: both branches are free-standing subtrees.
    fn check_loose_if(&self, target_if: usize, target_else: usize) -> CheckResult<()> {
        if !self.tasks[target_if].parents.is_empty() {
            return Err(FlowError::new(
                FlowErrorKind::If,
                "IF target task cannot have dependencies",
                [self.name(target_if)],
            ));
        }
        if !self.tasks[target_else].parents.is_empty() {
            return Err(FlowError::new(
                FlowErrorKind::If,
                "IF target task ELSE cannot have dependencies",
                [self.name(target_else)],
            ));
        }

        for target in [target_if, target_else] {
            let mut branch = HashSet::new();
            let mut stack = vec![target];
            while let Some(current) = stack.pop() {
                if !branch.insert(current) {
                    continue;
                }
                let tree = &self.tasks[current];
                stack.extend(tree.children.iter().chain(&tree.targets).copied());
            }
            for &task in branch.iter().filter(|&&t| t != target) {
                if let Err(inner) = self.check_block_up(target, task, &mut HashSet::new()) {
                    return Err(FlowError::new(
                        FlowErrorKind::If,
                        format!("IF block at {} has external dependencies", self.name(target)),
                        inner.tasks,
                    ));
                }
            }
        }
        Ok(())
    }

    /// IF with continuation: both branches are blocks (or single tasks)
    /// merged by the continuation task.
    fn check_joined_if(&self, target_if: usize, target_else: usize, join: usize) -> CheckResult<()> {
        let if_block = self.branch_block(target_if, "IF action target is not a Task Block")?;
        let else_block = self.branch_block(target_else, "IF action ELSE target is not a Task Block")?;

        for &joined in &self.tasks[join].joins {
            if joined != if_block.1 && joined != else_block.1 {
                return Err(FlowError::new(
                    FlowErrorKind::If,
                    "JOIN task merges multiple IF actions",
                    [self.name(join)],
                ));
            }
        }

        let checks = [
            (!self.tasks[if_block.0].parents.is_empty(), "IF task block cannot have dependencies", if_block.0),
            (!self.tasks[if_block.1].children.is_empty(), "IF task block cannot have children", if_block.1),
            (!self.tasks[else_block.0].parents.is_empty(), "ELSE task block cannot have dependencies", else_block.0),
            (!self.tasks[else_block.1].children.is_empty(), "ELSE task block cannot have children", else_block.1),
            (!self.tasks[join].parents.is_empty(), "JOIN task cannot have dependencies", join),
        ];
        for (failed, message, task) in checks {
            if failed {
                return Err(FlowError::new(FlowErrorKind::If, message, [self.name(task)]));
            }
        }
        Ok(())
    }

    fn branch_block(&self, target: usize, message: &str) -> CheckResult<(usize, usize)> {
        if let Some(block) = self.block_starting_at(target) {
            return Ok(block);
        }
        let tree = &self.tasks[target];
        if tree.children.is_empty() && tree.targets.is_empty() {
            Ok((target, target))
        } else {
            Err(FlowError::new(FlowErrorKind::If, message, [self.name(target)]))
        }
    }
}
