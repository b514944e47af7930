//! Command grammar tree
//!
//! Commands are installed as whitespace separated paths. A token is one of:
//! - a literal keyword, matched by unique prefix (`interface`, `int`)
//! - a typed placeholder `{NAME}`, validated by the keyword registry
//! - a single-value placeholder `(NAME)`, validated like `{NAME}` but the
//!   configured value replaces the previous one (last write wins)
//! - the wildcard `{ANY}`, which absorbs every remaining token
mod keyword;

pub use keyword::{KeywordError, KeywordRegistry, Lister, Predicate};

use std::error;
use std::fmt;
use std::sync::Arc;

use log::trace;

use crate::commit::{ApplyError, CommitAction};
use crate::dispatch::{Context, DispatchError, Session};

pub const ANY: &str = "{ANY}";

/// Session privilege levels, lowest first
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Privilege {
    Guest,
    User,
    Exec,
    Enable,
    Config,
}

impl fmt::Display for Privilege {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let word = match self {
            Privilege::Guest => "guest",
            Privilege::User => "user",
            Privilege::Exec => "exec",
            Privilege::Enable => "enable",
            Privilege::Config => "config",
        };
        write!(f, "{}", word)
    }
}

/// Dispatch-time action of a command leaf, called with the full input line
pub type Handler = Arc<
    dyn Fn(&mut Context, &CommandNode, &str, &mut dyn Session) -> Result<(), DispatchError>
        + Send
        + Sync,
>;

/// Commit/negation-time action of a configuration leaf
pub type ApplyFn = Arc<dyn Fn(&CommitAction) -> Result<(), ApplyError> + Send + Sync>;

pub fn handler<F>(f: F) -> Handler
where
    F: Fn(&mut Context, &CommandNode, &str, &mut dyn Session) -> Result<(), DispatchError>
        + Send
        + Sync
        + 'static,
{
    Arc::new(f)
}

pub fn apply_fn<F>(f: F) -> ApplyFn
where
    F: Fn(&CommitAction) -> Result<(), ApplyError> + Send + Sync + 'static,
{
    Arc::new(f)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Token<'a> {
    Literal(&'a str),
    /// `{NAME}`
    Placeholder(&'a str),
    /// `(NAME)`
    Single(&'a str),
    /// `{ANY}`
    Any,
}

impl<'a> Token<'a> {
    pub fn classify(label: &'a str) -> Self {
        if label.len() > 2 {
            if label.starts_with('{') && label.ends_with('}') {
                if label == ANY {
                    return Token::Any;
                }
                return Token::Placeholder(&label[1..label.len() - 1]);
            }
            if label.starts_with('(') && label.ends_with(')') {
                return Token::Single(&label[1..label.len() - 1]);
            }
        }
        Token::Literal(label)
    }

    pub fn is_literal(&self) -> bool {
        matches!(self, Token::Literal(_))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CommandKind {
    /// Operational command (show, commit, ...)
    Plain,
    /// Configuration command, stored in the candidate tree
    Config,
}

/// How placeholder tokens are matched
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchMode {
    /// Placeholders accept a token only if their keyword predicate does
    Validate,
    /// Placeholders accept any token
    Loose,
    /// Grammar paths matched against themselves: placeholders only match
    /// identical labels, literals still match by prefix
    Identity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    /// No child accepted the token. [token, parent path]
    NotFound(String, String),
    /// More than one child accepted the token. [token, parent path, candidates]
    Ambiguous(String, String, Vec<String>),
    /// Node requires a higher privilege. [path, required]
    Prohibited(String, Privilege),
}

impl fmt::Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use MatchError::*;
        match self {
            NotFound(t, p) => write!(f, "command not found: '{}' under [{}]", t, p),
            Ambiguous(t, p, c) => write!(
                f,
                "ambiguous command: '{}' under [{}] matches {}",
                t,
                p,
                c.join(", ")
            ),
            Prohibited(p, l) => write!(f, "command [{}] requires {} level", p, l),
        }
    }
}

impl error::Error for MatchError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallError {
    EmptyPath,
    /// [path]
    Duplicate(String),
    /// Configuration command installed without an apply callback. [path]
    MissingApply(String),
    /// Operational command installed with an apply callback. [path]
    UnexpectedApply(String),
    /// The wildcard must be the only child of its parent. [path]
    WildcardSiblings(String),
    /// New node overlaps an existing sibling. [path, reason]
    Ambiguous(String, String),
    /// New node can not be reached by matching its own path. [path, reason]
    Unreachable(String, String),
    /// Description given for a path that was never installed. [path]
    UnknownPath(String),
}

impl fmt::Display for InstallError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Grammar install error: ")?;
        use InstallError::*;
        match self {
            EmptyPath => write!(f, "empty command path"),
            Duplicate(p) => write!(f, "[{}] already exists", p),
            MissingApply(p) => write!(f, "config command [{}] lacks apply callback", p),
            UnexpectedApply(p) => write!(f, "non-config command [{}] has apply callback", p),
            WildcardSiblings(p) => write!(f, "[{}] would give {} siblings", p, ANY),
            Ambiguous(p, r) => write!(f, "[{}] is ambiguous: {}", p, r),
            Unreachable(p, r) => write!(f, "[{}] is unreachable: {}", p, r),
            UnknownPath(p) => write!(f, "[{}] is not installed", p),
        }
    }
}

impl error::Error for InstallError {}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpandError {
    /// [line tokens, path tokens]
    LengthMismatch(usize, usize),
}

impl fmt::Display for ExpandError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExpandError::LengthMismatch(l, p) => {
                write!(f, "length mismatch: line={} path={}", l, p)
            }
        }
    }
}

impl error::Error for ExpandError {}

pub struct CommandNode {
    /// Grammar path from root, tokens joined by one space
    pub path: String,
    pub label: String,
    pub description: String,
    pub min_level: Privilege,
    pub handler: Option<Handler>,
    pub apply: Option<ApplyFn>,
    pub config: bool,
    children: Vec<CommandNode>,
}

impl CommandNode {
    fn new(path: String, label: &str, min_level: Privilege, config: bool) -> Self {
        Self {
            path,
            label: label.to_string(),
            description: String::new(),
            min_level,
            handler: None,
            apply: None,
            config,
            children: Vec::new(),
        }
    }

    pub fn children(&self) -> &[CommandNode] {
        &self.children
    }

    pub fn token(&self) -> Token {
        Token::classify(&self.label)
    }

    pub fn is_leaf(&self) -> bool {
        self.handler.is_some()
    }

    fn child_index(&self, label: &str) -> Result<usize, usize> {
        self.children
            .binary_search_by(|c| c.label.as_str().cmp(label))
    }

    fn sole_wildcard(&self) -> Option<&CommandNode> {
        match self.children.as_slice() {
            [only] if only.label == ANY => Some(only),
            _ => None,
        }
    }
}

impl fmt::Debug for CommandNode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("CommandNode")
            .field("path", &self.path)
            .field("min_level", &self.min_level)
            .field("config", &self.config)
            .field("handler", &self.handler.is_some())
            .field("apply", &self.apply.is_some())
            .field("children", &self.children)
            .finish()
    }
}

/// Result of walking an input line down the grammar
#[derive(Debug)]
pub struct Walk<'a> {
    pub node: &'a CommandNode,
    /// Full literal labels, placeholder input tokens and absorbed tokens
    pub canonical: Vec<String>,
    /// Number of trailing tokens absorbed by `{ANY}`
    pub absorbed: usize,
}

impl<'a> Walk<'a> {
    pub fn line(&self) -> String {
        self.canonical.join(" ")
    }
}

#[derive(Debug)]
pub struct CommandTree {
    root: CommandNode,
    keywords: KeywordRegistry,
}

impl CommandTree {
    pub fn new(keywords: KeywordRegistry) -> Self {
        Self {
            root: CommandNode::new(String::new(), "", Privilege::Guest, false),
            keywords,
        }
    }

    pub fn root(&self) -> &CommandNode {
        &self.root
    }

    pub fn keywords(&self) -> &KeywordRegistry {
        &self.keywords
    }

    pub fn keywords_mut(&mut self) -> &mut KeywordRegistry {
        &mut self.keywords
    }

    /// Install a command leaf at `path`, creating intermediate nodes as needed.
    /// Nothing is left behind when the install is rejected.
    pub fn install(
        &mut self,
        kind: CommandKind,
        path: &str,
        min_level: Privilege,
        handler: Handler,
        apply: Option<ApplyFn>,
        description: &str,
    ) -> Result<(), InstallError> {
        let tokens: Vec<&str> = path.split_whitespace().collect();
        if tokens.is_empty() {
            return Err(InstallError::EmptyPath);
        }
        let full_path = tokens.join(" ");
        let config = kind == CommandKind::Config;
        match (config, apply.is_some()) {
            (true, false) => return Err(InstallError::MissingApply(full_path)),
            (false, true) => return Err(InstallError::UnexpectedApply(full_path)),
            _ => (),
        }

        // Find where the new path leaves the existing tree
        let mut depth = 0;
        let mut parent = &self.root;
        while depth < tokens.len() {
            match parent.child_index(tokens[depth]) {
                Ok(idx) => {
                    parent = &parent.children[idx];
                    depth += 1;
                }
                Err(_) => break,
            }
        }
        if depth == tokens.len() {
            return Err(InstallError::Duplicate(full_path));
        }
        check_siblings(parent, tokens[depth], &full_path)?;

        let intermediate_level = if config { min_level } else { Privilege::Exec };
        {
            let mut node = self.node_mut(&tokens[..depth]);
            for (i, token) in tokens.iter().enumerate().skip(depth) {
                let idx = match node.child_index(token) {
                    Ok(idx) | Err(idx) => idx,
                };
                let child_path = tokens[..=i].join(" ");
                let child = CommandNode::new(child_path, token, intermediate_level, config);
                node.children.insert(idx, child);
                node = &mut node.children[idx];
            }
            node.description = description.to_string();
            node.min_level = min_level;
            node.handler = Some(handler);
            node.apply = apply;
        }

        let rematch = match self.walk(&full_path, Privilege::Config, MatchMode::Identity) {
            Ok(walk) if walk.node.path == full_path => Ok(()),
            Ok(walk) => Err(InstallError::Unreachable(
                full_path.clone(),
                format!("shadowed by [{}]", walk.node.path),
            )),
            Err(err @ MatchError::Ambiguous(..)) => {
                Err(InstallError::Ambiguous(full_path.clone(), err.to_string()))
            }
            Err(err) => Err(InstallError::Unreachable(full_path.clone(), err.to_string())),
        };
        if rematch.is_err() {
            let parent = self.node_mut(&tokens[..depth]);
            if let Ok(idx) = parent.child_index(tokens[depth]) {
                parent.children.remove(idx);
            }
            return rematch;
        }
        trace!("Installed [{}] level={} config={}", full_path, min_level, config);
        Ok(())
    }

    /// Set the description of an existing node (leaf or intermediate)
    pub fn describe(&mut self, path: &str, description: &str) -> Result<(), InstallError> {
        let mut node = &mut self.root;
        for token in path.split_whitespace() {
            let idx = node
                .child_index(token)
                .map_err(|_| InstallError::UnknownPath(path.to_string()))?;
            node = &mut node.children[idx];
        }
        node.description = description.to_string();
        Ok(())
    }

    /// Paths of nodes installed without a description
    pub fn missing_descriptions(&self) -> Vec<String> {
        let mut missing = Vec::new();
        self.visit(&mut |node, _depth| {
            if node.description.is_empty() {
                missing.push(node.path.clone());
            }
        });
        missing
    }

    /// Depth-first visit of every node below the root
    pub fn visit(&self, f: &mut dyn FnMut(&CommandNode, usize)) {
        fn visit_node(node: &CommandNode, depth: usize, f: &mut dyn FnMut(&CommandNode, usize)) {
            for child in &node.children {
                f(child, depth);
                visit_node(child, depth + 1, f);
            }
        }
        visit_node(&self.root, 0, f);
    }

    pub fn find(
        &self,
        line: &str,
        level: Privilege,
        mode: MatchMode,
    ) -> Result<&CommandNode, MatchError> {
        self.walk(line, level, mode).map(|walk| walk.node)
    }

    /// Match `line` token by token, keeping the canonical form of every token
    pub fn walk(&self, line: &str, level: Privilege, mode: MatchMode) -> Result<Walk, MatchError> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let mut canonical = Vec::with_capacity(tokens.len());
        let mut absorbed = 0;
        let mut node = &self.root;

        for (i, token) in tokens.iter().enumerate() {
            if let Some(wildcard) = node.sole_wildcard() {
                trace!("{} absorbs [{}] under [{}]", ANY, tokens[i..].join(" "), node.path);
                canonical.extend(tokens[i..].iter().map(|t| t.to_string()));
                absorbed = tokens.len() - i;
                node = wildcard;
                break;
            }
            let matches: Vec<&CommandNode> = node
                .children
                .iter()
                .filter(|child| self.accepts(child, token, mode))
                .collect();
            match matches.as_slice() {
                [] => return Err(MatchError::NotFound(token.to_string(), node.path.clone())),
                [child] => {
                    canonical.push(if child.token().is_literal() {
                        child.label.clone()
                    } else {
                        token.to_string()
                    });
                    node = *child;
                }
                _ => {
                    return Err(MatchError::Ambiguous(
                        token.to_string(),
                        node.path.clone(),
                        matches.iter().map(|c| c.label.clone()).collect(),
                    ))
                }
            }
        }

        if level < node.min_level {
            return Err(MatchError::Prohibited(node.path.clone(), node.min_level));
        }
        Ok(Walk {
            node,
            canonical,
            absorbed,
        })
    }

    fn accepts(&self, child: &CommandNode, token: &str, mode: MatchMode) -> bool {
        match (child.token(), mode) {
            (Token::Literal(label), MatchMode::Identity) => {
                Token::classify(token).is_literal() && label.starts_with(token)
            }
            (Token::Literal(label), _) => label.starts_with(token),
            (_, MatchMode::Identity) => child.label == token,
            (Token::Any, _) => false,
            (_, MatchMode::Loose) => true,
            (Token::Placeholder(name), MatchMode::Validate)
            | (Token::Single(name), MatchMode::Validate) => {
                self.keywords.validate(name, token).is_ok()
            }
        }
    }

    fn node_mut(&mut self, tokens: &[&str]) -> &mut CommandNode {
        let mut node = &mut self.root;
        for token in tokens {
            match node.child_index(token) {
                Ok(idx) => node = &mut node.children[idx],
                Err(_) => break,
            }
        }
        node
    }
}

fn check_siblings(parent: &CommandNode, token: &str, path: &str) -> Result<(), InstallError> {
    let new = Token::classify(token);
    if new == Token::Any && !parent.children.is_empty() {
        return Err(InstallError::WildcardSiblings(path.to_string()));
    }
    // a sole {ANY} child absorbs the whole level, nothing may join it
    if parent.sole_wildcard().is_some() {
        return Err(InstallError::WildcardSiblings(path.to_string()));
    }
    if let Token::Literal(label) = new {
        let overlap = parent.children.iter().find(|c| match c.token() {
            Token::Literal(other) => other.starts_with(label) || label.starts_with(other),
            _ => false,
        });
        if let Some(other) = overlap {
            return Err(InstallError::Ambiguous(
                path.to_string(),
                format!("'{}' overlaps sibling '{}'", label, other.label),
            ));
        }
    }
    Ok(())
}

/// Substitute the placeholders of `grammar_path` with the co-positioned
/// tokens of `line`
pub fn expand(line: &str, grammar_path: &str) -> Result<String, ExpandError> {
    let line_tokens: Vec<&str> = line.split_whitespace().collect();
    let path_tokens: Vec<&str> = grammar_path.split_whitespace().collect();
    if line_tokens.len() != path_tokens.len() {
        return Err(ExpandError::LengthMismatch(
            line_tokens.len(),
            path_tokens.len(),
        ));
    }
    let expanded: Vec<&str> = path_tokens
        .iter()
        .zip(line_tokens.iter())
        .map(|(label, token)| {
            if Token::classify(label).is_literal() {
                *label
            } else {
                *token
            }
        })
        .collect();
    Ok(expanded.join(" "))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn noop() -> Handler {
        handler(|_, _, _, _| Ok(()))
    }

    fn no_apply() -> Option<ApplyFn> {
        Some(apply_fn(|_| Ok(())))
    }

    fn tree() -> CommandTree {
        let lister: Lister = Arc::new(|| {
            let names = (0..6).map(|i| format!("eth{}", i)).collect();
            (names, vec![String::new(); 6])
        });
        CommandTree::new(KeywordRegistry::new(lister))
    }

    fn sample() -> CommandTree {
        let mut tree = tree();
        let plain = CommandKind::Plain;
        let conf = CommandKind::Config;
        tree.install(plain, "configure", Privilege::Enable, noop(), None, "Enter configuration mode")
            .unwrap();
        tree.install(plain, "commit", Privilege::Config, noop(), None, "Commit").unwrap();
        tree.install(plain, "show interface", Privilege::Exec, noop(), None, "").unwrap();
        tree.install(plain, "show version", Privilege::Exec, noop(), None, "").unwrap();
        tree.install(plain, "no {ANY}", Privilege::Config, noop(), None, "").unwrap();
        tree.install(conf, "interface {IFNAME} description {ANY}", Privilege::Config, noop(), no_apply(), "")
            .unwrap();
        tree.install(conf, "interface {IFNAME} ipv4 address {IFADDR}", Privilege::Config, noop(), no_apply(), "")
            .unwrap();
        tree.install(conf, "interface {IFNAME} ipv6 address {IFADDR6}", Privilege::Config, noop(), no_apply(), "")
            .unwrap();
        tree.install(conf, "hostname (HOSTNAME)", Privilege::Config, noop(), no_apply(), "")
            .unwrap();
        tree
    }

    #[test]
    fn test_classify() {
        assert_eq!(Token::classify("interface"), Token::Literal("interface"));
        assert_eq!(Token::classify("{IFNAME}"), Token::Placeholder("IFNAME"));
        assert_eq!(Token::classify("(HOSTNAME)"), Token::Single("HOSTNAME"));
        assert_eq!(Token::classify("{ANY}"), Token::Any);
        assert_eq!(Token::classify("{}"), Token::Literal("{}"));
    }

    #[test]
    fn test_unique_prefix_matches_full_label() {
        let tree = sample();
        let level = Privilege::Config;
        for prefix in &["conf", "co", "configure"] {
            let node = tree.find(prefix, level, MatchMode::Validate).unwrap();
            assert_eq!(node.path, "configure", "prefix {}", prefix);
        }
        let node = tree.find("sh ver", level, MatchMode::Validate).unwrap();
        assert_eq!(node.path, "show version");
    }

    #[test]
    fn test_shared_prefix_is_ambiguous() {
        let tree = sample();
        match tree.find("c", Privilege::Config, MatchMode::Validate) {
            Err(MatchError::Ambiguous(token, _, candidates)) => {
                assert_eq!(token, "c");
                assert_eq!(candidates, vec!["commit", "configure"]);
            }
            other => panic!("expected ambiguous, got {:?}", other),
        }
        assert!(matches!(
            tree.find("int eth0 ipv", Privilege::Config, MatchMode::Validate),
            Err(MatchError::Ambiguous(..))
        ));
    }

    #[test]
    fn test_not_found() {
        let tree = sample();
        assert!(matches!(
            tree.find("xyz", Privilege::Config, MatchMode::Validate),
            Err(MatchError::NotFound(..))
        ));
        // eth9 is rejected by the IFNAME predicate
        assert!(matches!(
            tree.find("interface eth9 description x", Privilege::Config, MatchMode::Validate),
            Err(MatchError::NotFound(..))
        ));
        // but accepted when placeholders are not validated
        assert!(tree
            .find("interface eth9 description x", Privilege::Config, MatchMode::Loose)
            .is_ok());
    }

    #[test]
    fn test_prohibited() {
        let tree = sample();
        assert!(matches!(
            tree.find("commit", Privilege::Exec, MatchMode::Validate),
            Err(MatchError::Prohibited(_, Privilege::Config))
        ));
        assert!(tree.find("show version", Privilege::Exec, MatchMode::Validate).is_ok());
    }

    #[test]
    fn test_wildcard_absorbs_anything() {
        let tree = sample();
        let lines = [
            "no x",
            "no interface eth0 description  a  b",
            "no {weird} (tokens) !#",
            "no 1 2 3 4 5 6 7 8 9",
        ];
        for line in &lines {
            let walk = tree.walk(line, Privilege::Config, MatchMode::Validate).unwrap();
            assert_eq!(walk.node.path, "no {ANY}");
            assert_eq!(walk.absorbed, line.split_whitespace().count() - 1);
        }
    }

    #[test]
    fn test_walk_canonical() {
        let tree = sample();
        let walk = tree
            .walk("int eth1 desc  hello   world", Privilege::Config, MatchMode::Validate)
            .unwrap();
        assert_eq!(walk.node.path, "interface {IFNAME} description {ANY}");
        assert_eq!(walk.line(), "interface eth1 description hello world");
        assert_eq!(walk.absorbed, 2);
    }

    #[test]
    fn test_install_duplicate() {
        let mut tree = sample();
        let err = tree
            .install(CommandKind::Plain, "show version", Privilege::Exec, noop(), None, "")
            .unwrap_err();
        assert_eq!(err, InstallError::Duplicate("show version".to_string()));
        // intermediate nodes count as existing paths too
        assert!(matches!(
            tree.install(CommandKind::Plain, "show", Privilege::Exec, noop(), None, ""),
            Err(InstallError::Duplicate(_))
        ));
    }

    #[test]
    fn test_install_apply_mismatch() {
        let mut tree = sample();
        assert!(matches!(
            tree.install(CommandKind::Config, "ip routing", Privilege::Config, noop(), None, ""),
            Err(InstallError::MissingApply(_))
        ));
        assert!(matches!(
            tree.install(CommandKind::Plain, "reload", Privilege::Enable, noop(), no_apply(), ""),
            Err(InstallError::UnexpectedApply(_))
        ));
    }

    #[test]
    fn test_install_unreachable_under_wildcard() {
        let mut tree = sample();
        let path = "interface {IFNAME} description {ANY} unreachable";
        let err = tree
            .install(CommandKind::Config, path, Privilege::Config, noop(), no_apply(), "")
            .unwrap_err();
        assert!(matches!(err, InstallError::Unreachable(..)), "{:?}", err);
        // rejected node was detached
        let desc = tree
            .find("interface {IFNAME} description {ANY}", Privilege::Config, MatchMode::Identity)
            .unwrap();
        assert!(desc.children().is_empty());
    }

    #[test]
    fn test_install_ambiguous_literal() {
        let mut tree = sample();
        let path = "interface {IFNAME} ip address {IFADDR}";
        assert!(matches!(
            tree.install(CommandKind::Config, path, Privilege::Config, noop(), no_apply(), ""),
            Err(InstallError::Ambiguous(..))
        ));
        assert!(matches!(
            tree.install(CommandKind::Plain, "show versions", Privilege::Exec, noop(), None, ""),
            Err(InstallError::Ambiguous(..))
        ));
        assert!(tree
            .find("interface eth0 ip", Privilege::Config, MatchMode::Validate)
            .is_err());
    }

    #[test]
    fn test_install_wildcard_siblings() {
        let mut tree = sample();
        assert!(matches!(
            tree.install(CommandKind::Plain, "show {ANY}", Privilege::Exec, noop(), None, ""),
            Err(InstallError::WildcardSiblings(_))
        ));
    }

    #[test]
    fn test_install_beside_sole_wildcard() {
        let mut tree = sample();
        assert!(matches!(
            tree.install(CommandKind::Plain, "no debug", Privilege::Config, noop(), None, ""),
            Err(InstallError::WildcardSiblings(_))
        ));
        assert!(matches!(
            tree.install(CommandKind::Plain, "no {IFNAME}", Privilege::Config, noop(), None, ""),
            Err(InstallError::WildcardSiblings(_))
        ));
        // the wildcard still absorbs everything after "no"
        let node = tree
            .find("no hostname x", Privilege::Config, MatchMode::Validate)
            .unwrap();
        assert_eq!(node.path, "no {ANY}");
        let node = tree.find("no debug", Privilege::Config, MatchMode::Validate).unwrap();
        assert_eq!(node.path, "no {ANY}");
        assert_eq!(tree.find("no", Privilege::Config, MatchMode::Identity).unwrap().children().len(), 1);
    }

    #[test]
    fn test_install_placeholder_siblings_allowed() {
        let mut tree = sample();
        tree.install(
            CommandKind::Plain,
            "ping {IPADDR}",
            Privilege::Exec,
            noop(),
            None,
            "",
        )
        .unwrap();
        tree.install(
            CommandKind::Plain,
            "ping {HOSTNAME}",
            Privilege::Exec,
            noop(),
            None,
            "",
        )
        .unwrap();
        // both placeholders accept an address, resolved at match time
        assert!(matches!(
            tree.find("ping 1.1.1.1", Privilege::Exec, MatchMode::Validate),
            Err(MatchError::Ambiguous(..))
        ));
    }

    #[test]
    fn test_intermediate_nodes() {
        let tree = sample();
        let node = tree
            .find("interface eth0 ipv4", Privilege::Config, MatchMode::Validate)
            .unwrap();
        assert!(node.config);
        assert!(node.handler.is_none());
        assert!(node.apply.is_none());
        assert_eq!(node.min_level, Privilege::Config);
        let show = tree.find("show", Privilege::Exec, MatchMode::Validate).unwrap();
        assert!(!show.config);
        assert_eq!(show.min_level, Privilege::Exec);
    }

    #[test]
    fn test_describe() {
        let mut tree = sample();
        assert!(tree.missing_descriptions().contains(&"show".to_string()));
        tree.describe("show", "Show information").unwrap();
        assert!(!tree.missing_descriptions().contains(&"show".to_string()));
        assert!(tree.describe("nope", "x").is_err());
    }

    #[test]
    fn test_expand() {
        assert_eq!(
            expand("int eth0 ipv4 addr 1.1.1.1/8", "interface {IFNAME} ipv4 address {IFADDR}"),
            Ok("interface eth0 ipv4 address 1.1.1.1/8".to_string())
        );
        assert_eq!(
            expand("hostname r1", "hostname (HOSTNAME)"),
            Ok("hostname r1".to_string())
        );
        assert_eq!(
            expand("hostname", "hostname (HOSTNAME)"),
            Err(ExpandError::LengthMismatch(1, 2))
        );
    }

    proptest! {
        #[test]
        fn prop_unique_prefix_resolves(conf in 3usize..=9, show in 1usize..=4, version in 1usize..=7) {
            let tree = sample();
            let node = tree.find(&"configure"[..conf], Privilege::Config, MatchMode::Validate).unwrap();
            prop_assert_eq!(&node.path, "configure");
            let line = format!("{} {}", &"show"[..show], &"version"[..version]);
            let walk = tree.walk(&line, Privilege::Config, MatchMode::Validate).unwrap();
            prop_assert_eq!(&walk.node.path, "show version");
            prop_assert_eq!(walk.line(), "show version");
        }

        #[test]
        fn prop_wildcard_absorbs_any_tokens(tokens in prop::collection::vec("[!-~]{1,8}", 1..8)) {
            let tree = sample();
            let line = format!("no {}", tokens.join(" "));
            let walk = tree.walk(&line, Privilege::Config, MatchMode::Validate).unwrap();
            prop_assert_eq!(&walk.node.path, "no {ANY}");
            prop_assert_eq!(walk.absorbed, tokens.len());
            prop_assert_eq!(walk.line(), line);
        }
    }
}
