//! Candidate to active transition
//!
//! A commit diffs the two trees into units (node paths and `path value`
//! lines), pushes them through the apply callbacks of their grammar leaves and
//! only then replaces the active configuration with a copy of the candidate.
use std::collections::HashSet;
use std::error;
use std::fmt;
use std::sync::Arc;

use itertools::Itertools;
use log::{debug, error, info, trace, warn};

use crate::command::{ApplyFn, CommandTree, MatchError, MatchMode, Privilege};
use crate::conf::{decode, ConfNode};
use crate::dispatch::Context;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Direction {
    Apply,
    Remove,
}

impl Direction {
    pub fn inverse(self) -> Self {
        match self {
            Direction::Apply => Direction::Remove,
            Direction::Remove => Direction::Apply,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Apply => write!(f, "apply"),
            Direction::Remove => write!(f, "remove"),
        }
    }
}

/// One concrete configuration line (values still encoded) to push or withdraw
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitAction {
    pub line: String,
    pub direction: Direction,
}

impl CommitAction {
    pub fn new(line: &str, direction: Direction) -> Self {
        Self {
            line: line.to_string(),
            direction,
        }
    }

    pub fn inverse(&self) -> Self {
        Self {
            line: self.line.clone(),
            direction: self.direction.inverse(),
        }
    }

    pub fn tokens(&self) -> Vec<&str> {
        self.line.split_whitespace().collect()
    }

    /// Last token of the line, decoded
    pub fn value(&self) -> String {
        decode(self.line.split_whitespace().last().unwrap_or(""))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyError {
    pub reason: String,
}

impl ApplyError {
    pub fn new(reason: String) -> Self {
        ApplyError { reason }
    }
}

impl fmt::Display for ApplyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "ApplyError: {}", self.reason)
    }
}

impl error::Error for ApplyError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitError {
    /// Configuration line no longer matches the grammar. [line, error]
    Unresolved(String, MatchError),
    /// Apply callback failed, applied actions were rolled back. [action, error]
    Apply(CommitAction, ApplyError),
}

impl fmt::Display for CommitError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use CommitError::*;
        match self {
            Unresolved(l, e) => write!(f, "unresolved [{}]: {}", l, e),
            Apply(a, e) => write!(f, "{} [{}]: {}", a.direction, a.line, e),
        }
    }
}

impl error::Error for CommitError {}

/// Units present on one side only.
/// Removals are ordered deepest first, additions shallowest first.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Diff {
    pub removed: Vec<String>,
    pub added: Vec<String>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }

    /// Human readable change list, deepest units only, values decoded.
    /// Removals are rendered as `no <line>`.
    pub fn lines(&self) -> Vec<String> {
        let removed = outermost(&self.removed)
            .into_iter()
            .map(|unit| format!("no {}", decode_unit(unit)));
        let added = outermost(&self.added)
            .into_iter()
            .map(|unit| decode_unit(unit));
        removed.chain(added).collect()
    }
}

// Units with no longer unit below them, in tree order
fn outermost(units: &[String]) -> Vec<&String> {
    units
        .iter()
        .filter(|unit| {
            let prefix = format!("{} ", unit);
            !units.iter().any(|other| other.starts_with(&prefix))
        })
        .sorted()
        .collect()
}

fn decode_unit(unit: &str) -> String {
    unit.split_whitespace().map(decode).join(" ")
}

fn depth(unit: &str) -> usize {
    unit.split_whitespace().count()
}

pub fn diff(active: &ConfNode, candidate: &ConfNode) -> Diff {
    let old = active.units();
    let new = candidate.units();
    let old_set: HashSet<&String> = old.iter().collect();
    let new_set: HashSet<&String> = new.iter().collect();

    let mut removed: Vec<String> = old.iter().filter(|u| !new_set.contains(u)).cloned().collect();
    let mut added: Vec<String> = new.iter().filter(|u| !old_set.contains(u)).cloned().collect();
    removed.sort_by_key(|unit| std::cmp::Reverse(depth(unit)));
    added.sort_by_key(|unit| depth(unit));
    Diff { removed, added }
}

/// Action paired with the callback that carries it out
#[derive(Clone)]
pub struct PlannedAction {
    pub action: CommitAction,
    apply: ApplyFn,
}

impl fmt::Debug for PlannedAction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_tuple("PlannedAction").field(&self.action).finish()
    }
}

/// Resolve every unit to the apply callback of its grammar leaf.
/// Units without a callback are skipped. Unresolvable units fail when
/// `strict`, otherwise they are logged and skipped.
pub fn plan(
    tree: &CommandTree,
    units: &[String],
    direction: Direction,
    strict: bool,
) -> Result<Vec<PlannedAction>, CommitError> {
    let mut planned = Vec::new();
    for unit in units {
        match tree.find(unit, Privilege::Config, MatchMode::Validate) {
            Ok(node) => match &node.apply {
                Some(apply) => planned.push(PlannedAction {
                    action: CommitAction::new(unit, direction),
                    apply: Arc::clone(apply),
                }),
                None => trace!("No apply callback for [{}]", unit),
            },
            Err(err) if strict => return Err(CommitError::Unresolved(unit.clone(), err)),
            Err(err) => warn!("Skipping [{}]: {}", unit, err),
        }
    }
    Ok(planned)
}

/// Run the actions in order. On the first failure every applied action is
/// undone in reverse order before the failure is returned.
pub fn execute(actions: &[PlannedAction]) -> Result<usize, CommitError> {
    for (i, step) in actions.iter().enumerate() {
        debug!("{} [{}]", step.action.direction, step.action.line);
        if let Err(err) = (step.apply)(&step.action) {
            warn!("{} [{}] failed: {}", step.action.direction, step.action.line, err);
            undo(&actions[..i]);
            return Err(CommitError::Apply(step.action.clone(), err));
        }
    }
    Ok(actions.len())
}

fn undo(applied: &[PlannedAction]) {
    for step in applied.iter().rev() {
        let inverse = step.action.inverse();
        debug!("Rollback: {} [{}]", inverse.direction, inverse.line);
        if let Err(err) = (step.apply)(&inverse) {
            error!("Rollback of [{}] failed: {}", inverse.line, err);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitReport {
    pub removed: usize,
    pub added: usize,
    /// Actions that reached an apply callback
    pub applied: usize,
}

/// Push the candidate configuration to the apply callbacks and make it active.
/// The active configuration is untouched when any step fails.
pub fn commit(ctx: &mut Context) -> Result<CommitReport, CommitError> {
    let diff = diff(&ctx.active, &ctx.candidate);
    let tree = Arc::clone(ctx.tree());
    let mut actions = plan(&tree, &diff.removed, Direction::Remove, true)?;
    actions.extend(plan(&tree, &diff.added, Direction::Apply, true)?);
    let applied = execute(&actions)?;

    ctx.active = ctx.candidate.clone();
    ctx.negated.clear();
    let report = CommitReport {
        removed: diff.removed.len(),
        added: diff.added.len(),
        applied,
    };
    info!(
        "Commit: {} unit(s) removed, {} added, {} action(s) applied",
        report.removed, report.added, report.applied
    );
    Ok(report)
}
