//! Tree-structured persisted nodes.
//!
//! A node has a name, an ordered list of scalar key/value pairs and an ordered
//! list of child nodes. Keys are not required to be unique; lookups return the
//! first match, the same way the host save format behaves.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::str::FromStr;

/// A named node holding scalar values and child nodes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigNode {
    pub name: String,
    values: Vec<(String, String)>,
    nodes: Vec<ConfigNode>,
}

impl ConfigNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
            nodes: Vec::new(),
        }
    }

    /// Append a value, keeping any existing value with the same key
    pub fn add_value(&mut self, key: impl Into<String>, value: impl Display) {
        self.values.push((key.into(), value.to_string()));
    }

    /// Replace the first value with this key, or append it
    pub fn set_value(&mut self, key: &str, value: impl Display) {
        match self.values.iter_mut().find(|(k, _)| k == key) {
            Some((_, v)) => *v = value.to_string(),
            None => self.add_value(key, value),
        }
    }

    pub fn with_value(mut self, key: impl Into<String>, value: impl Display) -> Self {
        self.add_value(key, value);
        self
    }

    pub fn has_value(&self, key: &str) -> bool {
        self.values.iter().any(|(k, _)| k == key)
    }

    /// Raw string value for the first matching key
    pub fn get_value(&self, key: &str) -> Option<&str> {
        self.values
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Parse a value, returning `None` if it is absent or malformed
    pub fn parse_value<T: FromStr>(&self, key: &str) -> Option<T> {
        self.get_value(key).and_then(|v| v.trim().parse().ok())
    }

    /// Parse a value, falling back to `default` if it is absent or malformed
    pub fn value_or<T: FromStr>(&self, key: &str, default: T) -> T {
        self.parse_value(key).unwrap_or(default)
    }

    pub fn values(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn value_count(&self) -> usize {
        self.values.len()
    }

    /// Append a child node and return a mutable reference to it
    pub fn add_node(&mut self, node: ConfigNode) -> &mut ConfigNode {
        self.nodes.push(node);
        let last = self.nodes.len() - 1;
        &mut self.nodes[last]
    }

    pub fn with_node(mut self, node: ConfigNode) -> Self {
        self.nodes.push(node);
        self
    }

    /// First child node with this name
    pub fn get_node(&self, name: &str) -> Option<&ConfigNode> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &ConfigNode> {
        self.nodes.iter()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_first_match_wins() {
        let mut node = ConfigNode::new("ROOT");
        node.add_value("a", 1);
        node.add_value("a", 2);
        assert_eq!(node.get_value("a"), Some("1"));
        assert_eq!(node.value_count(), 2);

        node.set_value("a", 5);
        assert_eq!(node.parse_value::<i32>("a"), Some(5));
        node.set_value("b", true);
        assert!(node.value_or("b", false));
    }

    #[test]
    fn test_malformed_value_falls_back() {
        let node = ConfigNode::new("X").with_value("n", "not a number");
        assert_eq!(node.parse_value::<f64>("n"), None);
        assert_eq!(node.value_or("n", 3.5), 3.5);
        assert_eq!(node.value_or("missing", 7u32), 7);
    }

    #[test]
    fn test_child_nodes() {
        let mut root = ConfigNode::new("ROOT");
        root.add_node(ConfigNode::new("CHILD")).add_value("k", "v");
        root.add_node(ConfigNode::new("CHILD"));

        assert_eq!(root.node_count(), 2);
        let first = root.get_node("CHILD").expect("child exists");
        assert_eq!(first.get_value("k"), Some("v"));
        assert!(root.get_node("OTHER").is_none());
    }
}
