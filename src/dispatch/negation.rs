use std::error;
use std::fmt;
use std::sync::Arc;

use log::{debug, info};

use super::{prefixed, Context, Session};
use crate::command::{MatchError, MatchMode, Privilege};
use crate::commit::{self, CommitError, Direction};
use crate::conf::{encode, ValueError};

#[derive(Debug)]
pub enum NegationError {
    MissingArgument,
    /// Matched an operational command. [path]
    NotConfig(String),
    /// Nothing in the candidate configuration matches. [line]
    NotFound(String),
    Match(MatchError),
    Value(ValueError),
    /// A remove callback failed, the candidate is unchanged
    Apply(CommitError),
}

impl fmt::Display for NegationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use NegationError::*;
        match self {
            MissingArgument => write!(f, "missing argument"),
            NotConfig(p) => write!(f, "not a configuration command: [{}]", p),
            NotFound(l) => write!(f, "configuration not found: [{}]", l),
            Match(e) => write!(f, "{}", e),
            Value(e) => write!(f, "{}", e),
            Apply(e) => write!(f, "{}", e),
        }
    }
}

impl error::Error for NegationError {}

impl From<MatchError> for NegationError {
    fn from(error: MatchError) -> Self {
        NegationError::Match(error)
    }
}

impl From<ValueError> for NegationError {
    fn from(error: ValueError) -> Self {
        NegationError::Value(error)
    }
}

impl From<CommitError> for NegationError {
    fn from(error: CommitError) -> Self {
        NegationError::Apply(error)
    }
}

/// Remove what `no <line>` names from the candidate configuration.
///
/// The named item is either one value of a node or a whole node with its
/// subtree. Remove callbacks run first; emptied ancestors are pruned after.
pub fn remove_by_negation(
    ctx: &mut Context,
    line: &str,
    session: &dyn Session,
) -> Result<(), NegationError> {
    let arg: Vec<&str> = line.split_whitespace().skip(1).collect();
    if arg.is_empty() {
        return Err(NegationError::MissingArgument);
    }
    let lookup = prefixed(session.edit_path(), &arg.join(" "));

    let tree = Arc::clone(ctx.tree());
    let walk = tree.walk(&lookup, session.privilege(), MatchMode::Validate)?;
    if !walk.node.config {
        return Err(NegationError::NotConfig(walk.node.path.clone()));
    }

    // Shorten the line until it names an existing node. Only wildcard
    // absorbed tokens, or a single value token, may be dropped.
    let canonical = &walk.canonical;
    let full = canonical.len();
    let shortest = full.saturating_sub(walk.absorbed.max(1)).max(1);
    let found = (shortest..=full)
        .rev()
        .find(|&len| ctx.candidate.get(&canonical[..len].join(" ")).is_ok())
        .ok_or_else(|| NegationError::NotFound(walk.line()))?;
    let path = canonical[..found].join(" ");

    if found < full && walk.absorbed == 0 {
        let value = encode(&canonical[found]);
        let node = ctx.candidate.get(&path)?;
        if !node.values.contains(&value) {
            return Err(ValueError::ValueNotFound(path, value).into());
        }
        let unit = format!("{} {}", path, value);
        let actions = commit::plan(&tree, &[unit], Direction::Remove, false)?;
        commit::execute(&actions)?;
        ctx.negated.extend(actions.into_iter().map(|step| step.action.line));

        let node = ctx.candidate.get_mut(&path)?;
        node.value_remove(&value)?;
        if !node.is_empty() {
            debug!("[{}] keeps {} value(s)", path, node.values.len());
            return Ok(());
        }
    } else {
        let mut units = ctx.candidate.get(&path)?.units();
        units.reverse();
        let actions = commit::plan(&tree, &units, Direction::Remove, false)?;
        commit::execute(&actions)?;
        ctx.negated.extend(actions.into_iter().map(|step| step.action.line));
    }

    ctx.candidate.remove(&path)?;
    let keep = |ancestor: &str| {
        tree.find(ancestor, Privilege::Config, MatchMode::Validate)
            .map(|node| node.config && node.handler.is_some())
            .unwrap_or(false)
    };
    let pruned = ctx.candidate.prune(&path, &keep);
    info!("Removed [{}] from candidate, pruned {} ancestor(s)", path, pruned.len());
    Ok(())
}
