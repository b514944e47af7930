//! Configuration trees
//!
//! The candidate and active configurations are both plain `ConfNode` trees.
//! Paths hold concrete tokens (placeholders already substituted) and values
//! are opaque single tokens, see [`encode`].
mod encode;
pub mod store;

pub use encode::{decode, encode};

use std::error;
use std::fmt;

use log::{debug, error};

use crate::command::{expand, CommandNode, ExpandError, Token};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueError {
    /// [path]
    PathNotFound(String),
    /// [path, value]
    ValueNotFound(String, String),
    /// Line carries nothing for the value position. [grammar path]
    MissingValue(String),
    Expand(ExpandError),
}

impl fmt::Display for ValueError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        use ValueError::*;
        match self {
            PathNotFound(p) => write!(f, "config node not found: [{}]", p),
            ValueNotFound(p, v) => write!(f, "value '{}' not found under [{}]", decode(v), p),
            MissingValue(p) => write!(f, "missing value for [{}]", p),
            Expand(e) => write!(f, "could not expand: {}", e),
        }
    }
}

impl error::Error for ValueError {}

impl From<ExpandError> for ValueError {
    fn from(error: ExpandError) -> Self {
        ValueError::Expand(error)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConfNode {
    pub path: String,
    pub values: Vec<String>,
    children: Vec<ConfNode>,
}

impl ConfNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn label(&self) -> &str {
        last_token(&self.path)
    }

    pub fn children(&self) -> &[ConfNode] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.children.is_empty()
    }

    fn child_index(&self, label: &str) -> Result<usize, usize> {
        self.children.binary_search_by(|c| c.label().cmp(label))
    }

    pub fn get(&self, path: &str) -> Result<&ConfNode, ValueError> {
        let mut node = self;
        for token in path.split_whitespace() {
            match node.child_index(token) {
                Ok(idx) => node = &node.children[idx],
                Err(_) => return Err(ValueError::PathNotFound(path.to_string())),
            }
        }
        Ok(node)
    }

    pub fn get_mut(&mut self, path: &str) -> Result<&mut ConfNode, ValueError> {
        let mut node = self;
        for token in path.split_whitespace() {
            match node.child_index(token) {
                Ok(idx) => node = &mut node.children[idx],
                Err(_) => return Err(ValueError::PathNotFound(path.to_string())),
            }
        }
        Ok(node)
    }

    /// Expand `line` against the grammar `leaf_path` and create the node.
    /// Also returns whether the node already existed.
    pub fn set(&mut self, leaf_path: &str, line: &str) -> Result<(&mut ConfNode, bool), ValueError> {
        let concrete = expand(line, leaf_path)?;
        Ok(self.set_path(&concrete))
    }

    /// Create every missing node along a concrete path
    pub fn set_path(&mut self, path: &str) -> (&mut ConfNode, bool) {
        let tokens: Vec<&str> = path.split_whitespace().collect();
        let mut existed = true;
        let mut node = self;
        for (i, token) in tokens.iter().enumerate() {
            let idx = match node.child_index(token) {
                Ok(idx) => idx,
                Err(idx) => {
                    existed = false;
                    let child = ConfNode {
                        path: tokens[..=i].join(" "),
                        ..Default::default()
                    };
                    node.children.insert(idx, child);
                    idx
                }
            };
            node = &mut node.children[idx];
        }
        (node, existed)
    }

    pub fn value_set(&mut self, value: String) {
        debug!("[{}] value set to {}", self.path, value);
        self.values = vec![value];
    }

    /// Append `value` unless present. Returns false for a duplicate.
    pub fn value_add(&mut self, value: String) -> bool {
        if self.values.contains(&value) {
            return false;
        }
        debug!("[{}] value {} added", self.path, value);
        self.values.push(value);
        true
    }

    pub fn value_remove(&mut self, value: &str) -> Result<(), ValueError> {
        match self.values.iter().position(|v| v == value) {
            Some(idx) => {
                self.values.remove(idx);
                debug!("[{}] value {} removed", self.path, value);
                Ok(())
            }
            None => Err(ValueError::ValueNotFound(self.path.clone(), value.to_string())),
        }
    }

    /// Detach the node at `path` with its whole subtree
    pub fn remove(&mut self, path: &str) -> Result<ConfNode, ValueError> {
        let (parent_path, label) = split_last_token(path);
        let parent = self.get_mut(parent_path)?;
        let idx = parent
            .child_index(label)
            .map_err(|_| ValueError::PathNotFound(path.to_string()))?;
        debug!("[{}] removed", path);
        Ok(parent.children.remove(idx))
    }

    /// Collapse the now empty ancestors of `path`, bottom-up.
    ///
    /// The cascade stops at an ancestor with children, one that `keep`
    /// accepts, or one holding values. Returns the removed paths.
    pub fn prune(&mut self, path: &str, keep: &dyn Fn(&str) -> bool) -> Vec<String> {
        let mut removed = Vec::new();
        let mut current = split_last_token(path).0;
        while !current.is_empty() {
            let node = match self.get(current) {
                Ok(node) => node,
                Err(_) => break,
            };
            if !node.children.is_empty() || keep(current) {
                break;
            }
            if !node.values.is_empty() {
                error!(
                    "Prune invariant violation: [{}] holds {} value(s), cascade halted",
                    current,
                    node.values.len()
                );
                break;
            }
            if self.remove(current).is_ok() {
                removed.push(current.to_string());
            }
            current = split_last_token(current).0;
        }
        removed
    }

    /// Configuration dump, one line per value (or per bare leaf), values decoded
    pub fn lines(&self) -> Vec<String> {
        fn collect(node: &ConfNode, lines: &mut Vec<String>) {
            for child in &node.children {
                if child.is_empty() {
                    lines.push(child.path.clone());
                }
                for value in &child.values {
                    lines.push(format!("{} {}", child.path, decode(value)));
                }
                collect(child, lines);
            }
        }
        let mut lines = Vec::new();
        collect(self, &mut lines);
        lines
    }

    /// Indented dump, one label per line
    pub fn tree_lines(&self) -> Vec<String> {
        fn collect(node: &ConfNode, depth: usize, lines: &mut Vec<String>) {
            for child in &node.children {
                let indent = "  ".repeat(depth);
                lines.push(format!("{}{}", indent, child.label()));
                for value in &child.values {
                    lines.push(format!("{}  = {}", indent, decode(value)));
                }
                collect(child, depth + 1, lines);
            }
        }
        let mut lines = Vec::new();
        collect(self, 0, &mut lines);
        lines
    }

    /// Every node path and every `path value` line, depth first.
    /// These are the units compared by a commit.
    pub fn units(&self) -> Vec<String> {
        fn collect(node: &ConfNode, units: &mut Vec<String>) {
            for child in &node.children {
                units.push(child.path.clone());
                for value in &child.values {
                    units.push(format!("{} {}", child.path, value));
                }
                collect(child, units);
            }
        }
        let mut units = Vec::new();
        if !self.path.is_empty() {
            units.push(self.path.clone());
            for value in &self.values {
                units.push(format!("{} {}", self.path, value));
            }
        }
        collect(self, &mut units);
        units
    }
}

pub fn last_token(path: &str) -> &str {
    path.split_whitespace().last().unwrap_or("")
}

/// Split "a b c" into ("a b", "c")
pub fn split_last_token(path: &str) -> (&str, &str) {
    let path = path.trim_end();
    match path.rfind(char::is_whitespace) {
        Some(idx) => (path[..idx].trim_end(), &path[idx + 1..]),
        None => ("", path),
    }
}

/// Text following the first `count` tokens of `line`, past exactly one separator.
/// Interior and trailing whitespace are preserved.
pub fn remainder_after(line: &str, count: usize) -> Option<&str> {
    let mut rest = line.trim_start();
    for _ in 0..count {
        rest = rest.trim_start();
        let end = rest.find(char::is_whitespace)?;
        rest = &rest[end..];
    }
    let mut chars = rest.chars();
    if count > 0 {
        chars.next()?;
    }
    Some(chars.as_str())
}

fn split_value<'a>(leaf_path: &str, line: &'a str) -> Result<(String, String, &'a str), ValueError> {
    let path_tokens: Vec<&str> = leaf_path.split_whitespace().collect();
    let line_tokens: Vec<&str> = line.split_whitespace().collect();
    if path_tokens.len() != line_tokens.len() || path_tokens.is_empty() {
        return Err(ExpandError::LengthMismatch(line_tokens.len(), path_tokens.len()).into());
    }
    let n = path_tokens.len() - 1;
    Ok((path_tokens[..n].join(" "), line_tokens[..n].join(" "), line_tokens[n]))
}

/// The whole line is the node path
pub fn set_simple(root: &mut ConfNode, leaf_path: &str, line: &str) -> Result<bool, ValueError> {
    root.set(leaf_path, line).map(|(_, existed)| existed)
}

/// Last token replaces the value of its parent node
pub fn single_value_set(root: &mut ConfNode, leaf_path: &str, line: &str) -> Result<(), ValueError> {
    let (path, line_path, value) = split_value(leaf_path, line)?;
    let (node, _) = root.set(&path, &line_path)?;
    node.value_set(encode(value));
    Ok(())
}

/// Last token is appended to the values of its parent node.
/// Returns false if it was already there.
pub fn multi_value_add(root: &mut ConfNode, leaf_path: &str, line: &str) -> Result<bool, ValueError> {
    let (path, line_path, value) = split_value(leaf_path, line)?;
    let (node, _) = root.set(&path, &line_path)?;
    Ok(node.value_add(encode(value)))
}

/// Everything after the keyword preceding `{ANY}` becomes the single value
pub fn free_text_set(root: &mut ConfNode, leaf_path: &str, line: &str) -> Result<(), ValueError> {
    let n = leaf_path.split_whitespace().count().saturating_sub(1);
    let text = remainder_after(line, n)
        .filter(|text| !text.is_empty())
        .ok_or_else(|| ValueError::MissingValue(leaf_path.to_string()))?;
    let path: Vec<&str> = leaf_path.split_whitespace().take(n).collect();
    let line_path: Vec<&str> = line.split_whitespace().take(n).collect();
    let (node, _) = root.set(&path.join(" "), &line_path.join(" "))?;
    node.value_set(encode(text));
    Ok(())
}

/// Store `line` the way the last token of the grammar leaf asks for:
/// `{ANY}` as free text, `(NAME)` as a single value, anything else as a path
pub fn config_set(root: &mut ConfNode, node: &CommandNode, line: &str) -> Result<(), ValueError> {
    match node.token() {
        Token::Any => free_text_set(root, &node.path, line),
        Token::Single(_) => single_value_set(root, &node.path, line),
        _ => set_simple(root, &node.path, line).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_then_get() {
        let cases = [
            ("interface {IFNAME} shutdown", "int eth0 shut"),
            ("router bgp {ASN} neighbor {IPADDR}", "router bgp 65000 neighbor 10.0.0.1"),
            ("ip routing", "ip routing"),
            ("a b c d e f g h i j", "a b c d e f g h i j"),
        ];
        let mut root = ConfNode::new();
        for (leaf, line) in &cases {
            let expanded = expand(line, leaf).unwrap();
            let (node, existed) = root.set(leaf, line).unwrap();
            assert!(!existed);
            assert_eq!(node.path, expanded);
            assert_eq!(root.get(&expanded).unwrap().path, expanded);
        }
        let (_, existed) = root.set("ip routing", "ip routing").unwrap();
        assert!(existed);
    }

    #[test]
    fn test_get_absent() {
        let root = ConfNode::new();
        assert_eq!(
            root.get("hostname"),
            Err(ValueError::PathNotFound("hostname".to_string()))
        );
    }

    #[test]
    fn test_children_sorted() {
        let mut root = ConfNode::new();
        root.set_path("interface eth2");
        root.set_path("interface eth0");
        root.set_path("hostname");
        let labels: Vec<_> = root.children().iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["hostname", "interface"]);
        let ifaces = root.get("interface").unwrap();
        let labels: Vec<_> = ifaces.children().iter().map(|c| c.label()).collect();
        assert_eq!(labels, vec!["eth0", "eth2"]);
    }

    #[test]
    fn test_single_value_last_write_wins() {
        let mut root = ConfNode::new();
        single_value_set(&mut root, "hostname (HOSTNAME)", "hostname r1").unwrap();
        single_value_set(&mut root, "hostname (HOSTNAME)", "hostname r2").unwrap();
        assert_eq!(root.get("hostname").unwrap().values, vec!["r2"]);
    }

    #[test]
    fn test_multi_value_add() {
        let leaf = "interface {IFNAME} ipv4 address {IFADDR}";
        let mut root = ConfNode::new();
        assert!(multi_value_add(&mut root, leaf, "interface eth2 ipv4 address 2.2.2.2/2").unwrap());
        assert!(multi_value_add(&mut root, leaf, "interface eth2 ipv4 address 1.1.1.1/1").unwrap());
        assert!(!multi_value_add(&mut root, leaf, "interface eth2 ipv4 address 1.1.1.1/1").unwrap());
        let node = root.get("interface eth2 ipv4 address").unwrap();
        assert_eq!(node.values, vec!["2.2.2.2/2", "1.1.1.1/1"]);
    }

    #[test]
    fn test_value_remove() {
        let mut root = ConfNode::new();
        let (node, _) = root.set("a {X}", "a b").unwrap();
        node.value_add("x".to_string());
        node.value_add("y".to_string());
        node.value_remove("x").unwrap();
        assert_eq!(node.values, vec!["y"]);
        assert!(matches!(
            node.value_remove("x"),
            Err(ValueError::ValueNotFound(_, _))
        ));
    }

    #[test]
    fn test_free_text_keeps_spacing() {
        let leaf = "interface {IFNAME} description {ANY}";
        let mut root = ConfNode::new();
        free_text_set(&mut root, leaf, "int eth0 desc  aa  bb   ccc").unwrap();
        free_text_set(&mut root, leaf, "int eth1 desc ddd   eee   fff ").unwrap();
        let eth0 = root.get("interface eth0 description").unwrap();
        assert_eq!(decode(&eth0.values[0]), " aa  bb   ccc");
        let eth1 = root.get("interface eth1 description").unwrap();
        assert_eq!(decode(&eth1.values[0]), "ddd   eee   fff ");
        assert!(matches!(
            free_text_set(&mut root, leaf, "int eth2 desc "),
            Err(ValueError::MissingValue(_))
        ));
    }

    #[test]
    fn test_remainder_after() {
        assert_eq!(remainder_after("a b c", 1), Some("b c"));
        assert_eq!(remainder_after("  a   b  c ", 1), Some("  b  c "));
        assert_eq!(remainder_after("a b", 2), None);
        assert_eq!(remainder_after("a", 0), Some("a"));
    }

    #[test]
    fn test_split_last_token() {
        assert_eq!(split_last_token("a b c"), ("a b", "c"));
        assert_eq!(split_last_token("a"), ("", "a"));
        assert_eq!(split_last_token(""), ("", ""));
    }

    #[test]
    fn test_prune_collapses_empty_ancestors() {
        let mut root = ConfNode::new();
        root.set_path("a b c d");
        root.set_path("x");
        root.remove("a b c d").unwrap();
        let removed = root.prune("a b c d", &|_| false);
        assert_eq!(removed, vec!["a b c", "a b", "a"]);
        assert!(root.get("a").is_err());
        assert!(root.get("x").is_ok());
    }

    #[test]
    fn test_prune_stops_at_kept_and_shared() {
        let mut root = ConfNode::new();
        root.set_path("b c d e f g h");
        root.set_path("b c x");
        root.remove("b c d e f g h").unwrap();
        let removed = root.prune("b c d e f g h", &|path| path == "b c d e f");
        assert_eq!(removed, vec!["b c d e f g"]);
        assert!(root.get("b c d e f").is_ok());

        root.remove("b c d e f").unwrap();
        let removed = root.prune("b c d e f", &|_| false);
        assert_eq!(removed, vec!["b c d e", "b c d"]);
        assert!(root.get("b c x").is_ok());
    }

    #[test]
    fn test_prune_never_removes_valued_ancestor() {
        let mut root = ConfNode::new();
        root.set_path("a b c").0.value_add("v".to_string());
        root.set_path("a b c d e");
        root.remove("a b c d e").unwrap();
        let removed = root.prune("a b c d e", &|_| false);
        assert_eq!(removed, vec!["a b c d"]);
        assert_eq!(root.get("a b c").unwrap().values, vec!["v"]);
        assert!(root.get("a").is_ok());
    }

    #[test]
    fn test_lines_and_units() {
        let mut root = ConfNode::new();
        single_value_set(&mut root, "hostname (HOSTNAME)", "hostname r1").unwrap();
        free_text_set(
            &mut root,
            "interface {IFNAME} description {ANY}",
            "interface eth0 description  two  words",
        )
        .unwrap();
        set_simple(&mut root, "ip routing", "ip routing").unwrap();
        assert_eq!(
            root.lines(),
            vec![
                "hostname r1",
                "interface eth0 description  two  words",
                "ip routing",
            ]
        );
        assert_eq!(
            root.units(),
            vec![
                "hostname",
                "hostname r1",
                "interface",
                "interface eth0",
                "interface eth0 description",
                "interface eth0 description %20two%20%20words",
                "ip",
                "ip routing",
            ]
        );
        assert_eq!(
            root.tree_lines(),
            vec![
                "hostname",
                "  = r1",
                "interface",
                "  eth0",
                "    description",
                "      =  two  words",
                "ip",
                "  routing",
            ]
        );
    }
}
