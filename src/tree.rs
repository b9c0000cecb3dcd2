//! Arena representation of a hierarchical chart of accounts.
//!
//! Nodes live in a flat `Vec` and refer to their children by [`NodeId`]. Trees built from
//! loosely structured JSON skip malformed nodes instead of failing the whole document.

use crate::error::{AnalyticsError, Result};
use crate::schema::{AccountNodeDocument, BalanceFields};
use log::warn;
use serde_json::{Map, Value};

/// Depth at which tree construction and traversal stop descending.
pub const DEFAULT_MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(pub usize);

#[derive(Debug, Clone, PartialEq)]
pub struct AccountNode {
    pub label: String,
    pub code: Option<String>,
    pub balances: BalanceFields,
    pub children: Vec<NodeId>,
}

impl AccountNode {
    pub fn new(label: impl Into<String>, code: Option<&str>, balances: BalanceFields) -> Self {
        Self {
            label: label.into(),
            code: code.map(str::to_string),
            balances,
            children: Vec::new(),
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

/// A node that was dropped while building or walking a tree.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedNode {
    /// Labels of the ancestors under which the node was found.
    pub parent_path: Vec<String>,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct AccountTree {
    nodes: Vec<AccountNode>,
    roots: Vec<NodeId>,
    skipped: Vec<SkippedNode>,
}

impl AccountTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a node, optionally attaching it under `parent`.
    pub fn add_node(&mut self, node: AccountNode, parent: Option<NodeId>) -> Result<NodeId> {
        if let Some(p) = parent {
            self.check(p)?;
        }
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        Ok(id)
    }

    /// Links an existing node under another one. The arena does not forbid cycles;
    /// traversals guard against them with a depth limit.
    pub fn link(&mut self, parent: NodeId, child: NodeId) -> Result<()> {
        self.check(parent)?;
        self.check(child)?;
        self.nodes[parent.0].children.push(child);
        Ok(())
    }

    pub fn get(&self, id: NodeId) -> Option<&AccountNode> {
        self.nodes.get(id.0)
    }

    pub fn node(&self, id: NodeId) -> Result<&AccountNode> {
        self.nodes.get(id.0).ok_or(AnalyticsError::InvalidNode(id.0))
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &AccountNode)> {
        self.nodes.iter().enumerate().map(|(i, n)| (NodeId(i), n))
    }

    /// Nodes dropped while the tree was built from raw input.
    pub fn skipped(&self) -> &[SkippedNode] {
        &self.skipped
    }

    fn check(&self, id: NodeId) -> Result<()> {
        if id.0 < self.nodes.len() {
            Ok(())
        } else {
            Err(AnalyticsError::InvalidNode(id.0))
        }
    }

    /// Builds a tree from typed documents. Every document becomes one root.
    pub fn from_documents(documents: &[AccountNodeDocument]) -> Self {
        let mut tree = Self::new();
        for doc in documents {
            tree.insert_document(doc, None);
        }
        tree
    }

    fn insert_document(&mut self, doc: &AccountNodeDocument, parent: Option<NodeId>) {
        let node = AccountNode::new(doc.label.trim(), doc.code.as_deref(), doc.balances.clone());
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }
        for child in &doc.children {
            self.insert_document(child, Some(id));
        }
    }

    /// Builds a tree from a raw JSON value: one node object or an array of them.
    pub fn from_value(value: &Value) -> Self {
        Self::from_value_with_depth(value, DEFAULT_MAX_DEPTH)
    }

    pub fn from_value_with_depth(value: &Value, max_depth: usize) -> Self {
        let mut tree = Self::new();
        let mut path = Vec::new();
        match value {
            Value::Array(items) => {
                for item in items {
                    tree.insert_value(item, None, &mut path, 0, max_depth);
                }
            }
            other => tree.insert_value(other, None, &mut path, 0, max_depth),
        }
        tree
    }

    fn insert_value(
        &mut self,
        value: &Value,
        parent: Option<NodeId>,
        path: &mut Vec<String>,
        depth: usize,
        max_depth: usize,
    ) {
        if depth >= max_depth {
            self.skip(path, format!("maximum depth {} exceeded", max_depth));
            return;
        }

        let Some(map) = value.as_object() else {
            self.skip(path, "node is not an object".to_string());
            return;
        };

        let node = match parse_node(map) {
            Ok(node) => node,
            Err(reason) => {
                self.skip(path, reason);
                return;
            }
        };

        let id = NodeId(self.nodes.len());
        path.push(node.label.clone());
        self.nodes.push(node);
        match parent {
            Some(p) => self.nodes[p.0].children.push(id),
            None => self.roots.push(id),
        }

        match map.get("children") {
            Some(Value::Array(children)) => {
                for child in children {
                    self.insert_value(child, Some(id), path, depth + 1, max_depth);
                }
            }
            None | Some(Value::Null) => {}
            Some(_) => self.skip(path, "children is not an array".to_string()),
        }
        path.pop();
    }

    fn skip(&mut self, path: &[String], reason: String) {
        warn!(
            "Skipping malformed account node under [{}]: {}",
            path.join(" > "),
            reason
        );
        self.skipped.push(SkippedNode {
            parent_path: path.to_vec(),
            reason,
        });
    }
}

fn parse_node(map: &Map<String, Value>) -> std::result::Result<AccountNode, String> {
    let label = ["label", "descricao"]
        .iter()
        .find_map(|k| map.get(*k).and_then(Value::as_str))
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .ok_or_else(|| "missing label".to_string())?;

    let code = ["code", "conta"].iter().find_map(|k| match map.get(*k) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    let balance_map: Map<String, Value> = map
        .iter()
        .filter(|(k, _)| k.as_str() != "children")
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let balances: BalanceFields = serde_json::from_value(Value::Object(balance_map))
        .map_err(|e| format!("unreadable balance fields: {}", e))?;

    Ok(AccountNode {
        label: label.to_string(),
        code,
        balances,
        children: Vec::new(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_value_builds_arena() {
        let value = json!({
            "conta": "1",
            "descricao": "ATIVO",
            "children": [
                {"conta": "1.1", "descricao": "ATIVO CIRCULANTE", "children": [
                    {"conta": "1.1.01", "descricao": "Caixa", "saldo_atual": 10.0}
                ]},
                {"conta": "1.2", "descricao": "ATIVO NÃO CIRCULANTE", "children": []}
            ]
        });

        let tree = AccountTree::from_value(&value);
        assert_eq!(tree.len(), 4);
        assert_eq!(tree.roots().len(), 1);
        assert!(tree.skipped().is_empty());

        let root = tree.node(tree.roots()[0]).unwrap();
        assert_eq!(root.label, "ATIVO");
        assert_eq!(root.children.len(), 2);
    }

    #[test]
    fn test_malformed_nodes_are_skipped_with_subtree() {
        let value = json!([
            {"descricao": "RECEITAS", "children": [
                "not a node",
                {"conta": "3.1", "children": [
                    {"descricao": "orphan", "saldo_atual": 5.0}
                ]},
                {"descricao": "Serviços", "saldo_atual": 1.0}
            ]}
        ]);

        let tree = AccountTree::from_value(&value);
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.skipped().len(), 2);
        assert_eq!(tree.skipped()[0].parent_path, vec!["RECEITAS".to_string()]);
        assert_eq!(tree.skipped()[1].reason, "missing label");
    }

    #[test]
    fn test_depth_guard_skips_deep_subtrees() {
        let mut value = json!({"descricao": "leaf", "saldo_atual": 1.0});
        for i in 0..10 {
            value = json!({"descricao": format!("level {}", i), "children": [value]});
        }

        let tree = AccountTree::from_value_with_depth(&value, 5);
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.skipped().len(), 1);
    }

    #[test]
    fn test_add_node_rejects_unknown_parent() {
        let mut tree = AccountTree::new();
        let node = AccountNode::new("X", None, BalanceFields::default());
        assert!(tree.add_node(node, Some(NodeId(3))).is_err());
    }

    #[test]
    fn test_from_documents() {
        let doc = AccountNodeDocument::new("PASSIVO", Some("2"))
            .with_child(AccountNodeDocument::new("Fornecedores", Some("2.1.01")).with_balance(-20.0));
        let tree = AccountTree::from_documents(&[doc]);
        assert_eq!(tree.len(), 2);
        let root = tree.node(tree.roots()[0]).unwrap();
        let child = tree.node(root.children[0]).unwrap();
        assert_eq!(child.balances.resolve(), -20.0);
    }
}
