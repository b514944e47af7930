//! Line dispatch
//!
//! A raw line is matched against the grammar (first verbatim, then under the
//! session's edit path), privilege is enforced and the leaf handler runs.
mod negation;
mod session;

pub use negation::{remove_by_negation, NegationError};
pub use session::{CaptureSession, HistoryEntry, Session, SessionState, MAX_HISTORY};

use std::error;
use std::fmt;
use std::sync::Arc;

use log::{debug, trace};

use crate::command::{CommandTree, MatchError, MatchMode, Privilege};
use crate::commit::CommitError;
use crate::conf::store::{SnapshotStore, StoreError};
use crate::conf::{ConfNode, ValueError};

#[derive(Debug)]
pub enum DispatchError {
    Match(MatchError),
    /// Operational node without a handler. [path]
    MissingHandler(String),
    Value(ValueError),
    Negation(NegationError),
    Commit(CommitError),
    Store(StoreError),
    /// Handler refused the line. [reason]
    Failed(String),
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use DispatchError::*;
        match self {
            Match(e) => write!(f, "{}", e),
            MissingHandler(p) => write!(f, "no handler for [{}]", p),
            Value(e) => write!(f, "{}", e),
            Negation(e) => write!(f, "no: {}", e),
            Commit(e) => write!(f, "commit failed: {}", e),
            Store(e) => write!(f, "{}", e),
            Failed(reason) => write!(f, "{}", reason),
        }
    }
}

impl error::Error for DispatchError {}

impl From<MatchError> for DispatchError {
    fn from(error: MatchError) -> Self {
        DispatchError::Match(error)
    }
}

impl From<ValueError> for DispatchError {
    fn from(error: ValueError) -> Self {
        DispatchError::Value(error)
    }
}

impl From<NegationError> for DispatchError {
    fn from(error: NegationError) -> Self {
        DispatchError::Negation(error)
    }
}

impl From<CommitError> for DispatchError {
    fn from(error: CommitError) -> Self {
        DispatchError::Commit(error)
    }
}

impl From<StoreError> for DispatchError {
    fn from(error: StoreError) -> Self {
        DispatchError::Store(error)
    }
}

/// Everything a handler may touch: the grammar, both configurations
/// and the snapshot store
pub struct Context {
    tree: Arc<CommandTree>,
    pub daemon: String,
    pub candidate: ConfNode,
    pub active: ConfNode,
    pub store: Option<SnapshotStore>,
    /// Units withdrawn by `no` since the last commit, in removal order
    pub negated: Vec<String>,
}

impl Context {
    pub fn new(daemon: &str, tree: Arc<CommandTree>) -> Self {
        Self {
            tree,
            daemon: daemon.to_string(),
            candidate: ConfNode::new(),
            active: ConfNode::new(),
            store: None,
            negated: Vec::new(),
        }
    }

    pub fn with_store(mut self, store: SnapshotStore) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tree(&self) -> &Arc<CommandTree> {
        &self.tree
    }

    /// Candidate differs from the active configuration
    pub fn is_changed(&self) -> bool {
        self.active != self.candidate
    }

    pub fn candidate_from_active(&mut self) {
        self.candidate = self.active.clone();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Context")
            .field("daemon", &self.daemon)
            .field("candidate", &self.candidate)
            .field("active", &self.active)
            .field("store", &self.store)
            .field("negated", &self.negated)
            .finish()
    }
}

/// `line` under the session's nested configuration mode
pub fn prefixed(edit_path: &str, line: &str) -> String {
    if edit_path.is_empty() {
        line.to_string()
    } else {
        format!("{} {}", edit_path, line)
    }
}

pub fn dispatch(
    ctx: &mut Context,
    raw: &str,
    session: &mut dyn Session,
    level: Privilege,
) -> Result<(), DispatchError> {
    session.history_add(raw);

    let line = raw.trim_start();
    if line.trim_end().is_empty() || line.starts_with('!') || line.starts_with('#') {
        return Ok(());
    }

    let tree = Arc::clone(&ctx.tree);
    let lookup = match tree.find(line, level, MatchMode::Validate) {
        Ok(node) if !node.config => line.to_string(),
        _ => prefixed(session.edit_path(), line),
    };
    let walk = tree.walk(&lookup, level, MatchMode::Validate)?;
    let node = walk.node;
    trace!("[{}] matched [{}]", lookup, node.path);

    match &node.handler {
        Some(handler) => handler(ctx, node, &lookup, session),
        None if node.config => {
            let path = walk.line();
            debug!("Edit path set to [{}]", path);
            session.set_edit_path(path);
            Ok(())
        }
        None => Err(DispatchError::MissingHandler(node.path.clone())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{apply_fn, handler, CommandKind, KeywordRegistry, Lister};
    use crate::conf::config_set;

    fn context() -> Context {
        let lister: Lister = Arc::new(|| (vec!["eth0".to_string()], vec![String::new()]));
        let mut tree = CommandTree::new(KeywordRegistry::new(lister));
        let set = handler(|ctx, node, line, _| Ok(config_set(&mut ctx.candidate, node, line)?));
        let echo = handler(|_, node, line, session| {
            session.sendln(&format!("{}|{}", node.path, line));
            Ok(())
        });
        let conf = CommandKind::Config;
        let level = Privilege::Config;
        tree.install(CommandKind::Plain, "show version", Privilege::Exec, echo, None, "")
            .unwrap();
        for path in &[
            "interface {IFNAME} description {ANY}",
            "interface {IFNAME} shutdown",
            "hostname (HOSTNAME)",
        ] {
            tree.install(conf, path, level, set.clone(), Some(apply_fn(|_| Ok(()))), "")
                .unwrap();
        }
        Context::new("test", Arc::new(tree))
    }

    #[test]
    fn test_history_recorded_first() {
        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Exec);
        assert!(dispatch(&mut ctx, "bogus", &mut session, Privilege::Exec).is_err());
        dispatch(&mut ctx, "", &mut session, Privilege::Exec).unwrap();
        let lines: Vec<_> = session.history().iter().map(|h| h.line.as_str()).collect();
        assert_eq!(lines, vec!["bogus", ""]);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Exec);
        for line in &["", "   ", "! comment", "# comment", "  !indented"] {
            dispatch(&mut ctx, line, &mut session, Privilege::Exec).unwrap();
        }
        assert!(session.output.is_empty());
    }

    #[test]
    fn test_handler_gets_full_line() {
        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Exec);
        dispatch(&mut ctx, "  sh ver", &mut session, Privilege::Exec).unwrap();
        assert_eq!(session.output, vec!["show version|sh ver"]);
    }

    #[test]
    fn test_privilege_enforced() {
        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Exec);
        let err = dispatch(&mut ctx, "hostname r1", &mut session, Privilege::Exec).unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Match(MatchError::Prohibited(_, Privilege::Config))
        ));
    }

    #[test]
    fn test_edit_path_mode() {
        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Config);
        dispatch(&mut ctx, "int eth0", &mut session, Privilege::Config).unwrap();
        assert_eq!(session.edit_path(), "interface eth0");
        dispatch(&mut ctx, "desc  uplink port", &mut session, Privilege::Config).unwrap();
        dispatch(&mut ctx, "shutdown", &mut session, Privilege::Config).unwrap();
        // operational commands still resolve from the root
        dispatch(&mut ctx, "show version", &mut session, Privilege::Config).unwrap();
        assert_eq!(
            ctx.candidate.lines(),
            vec![
                "interface eth0 description  uplink port",
                "interface eth0 shutdown",
            ]
        );
    }

    #[test]
    fn test_missing_handler() {
        let mut ctx = context();
        let mut session = CaptureSession::new(Privilege::Exec);
        let err = dispatch(&mut ctx, "show", &mut session, Privilege::Exec).unwrap_err();
        assert!(matches!(err, DispatchError::MissingHandler(_)));
    }
}
