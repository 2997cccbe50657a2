//! Arena search tree over operation sequences
//!
//! Nodes live in a flat id -> node map with explicit parent and child ids.
//! Ids are handed out from a per-tree counter and never reused, even after
//! a node is deleted.

use super::node::SearchNode;
use crate::actions::Operation;
use crate::core::types::NodeId;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value given to the root of a fresh tree
pub const ROOT_VALUE: f64 = 5.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "TreeRecord", try_from = "TreeRecord")]
pub struct SearchTree {
    nodes: BTreeMap<NodeId, SearchNode>,
    optimal_node_id: NodeId,
    next_id: u32,
}

/// Persisted shape of a tree
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TreeRecord {
    nodes: Vec<SearchNode>,
    optimal_node_id: Option<NodeId>,
    /// Next id to assign
    node_id: u32,
}

impl From<SearchTree> for TreeRecord {
    fn from(tree: SearchTree) -> Self {
        TreeRecord {
            nodes: tree.nodes.into_values().collect(),
            optimal_node_id: Some(tree.optimal_node_id),
            node_id: tree.next_id,
        }
    }
}

impl TryFrom<TreeRecord> for SearchTree {
    type Error = String;

    fn try_from(record: TreeRecord) -> Result<Self, Self::Error> {
        if record.nodes.is_empty() {
            return Ok(SearchTree::new());
        }
        let mut nodes = BTreeMap::new();
        for node in record.nodes {
            if node.id.0 >= record.node_id {
                return Err(format!(
                    "node {} is not below the id counter {}",
                    node.id, record.node_id
                ));
            }
            if nodes.insert(node.id, node).is_some() {
                return Err("duplicate node id".into());
            }
        }
        for node in nodes.values() {
            if let Some(parent) = node.parent_id {
                let linked = nodes
                    .get(&parent)
                    .map(|p| p.children_ids.contains(&node.id))
                    .unwrap_or(false);
                if !linked {
                    return Err(format!("node {} is not linked from parent {}", node.id, parent));
                }
            }
            if let Some(missing) = node.children_ids.iter().find(|c| !nodes.contains_key(c)) {
                return Err(format!("node {} lists missing child {}", node.id, missing));
            }
        }
        let optimal_node_id = match record.optimal_node_id {
            Some(id) if nodes.contains_key(&id) => id,
            _ => best_node(&nodes),
        };
        Ok(SearchTree {
            nodes,
            optimal_node_id,
            next_id: record.node_id,
        })
    }
}

/// Highest value node, lowest id on ties
fn best_node(nodes: &BTreeMap<NodeId, SearchNode>) -> NodeId {
    let mut best: Option<&SearchNode> = None;
    for node in nodes.values() {
        if best.map(|b| node.value > b.value).unwrap_or(true) {
            best = Some(node);
        }
    }
    best.map(|n| n.id).unwrap_or(NodeId::ROOT)
}

impl Default for SearchTree {
    fn default() -> Self {
        Self::new()
    }
}

impl SearchTree {
    /// A tree holding only the root (id 0, value 5)
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(NodeId::ROOT, SearchNode::root(ROOT_VALUE));
        Self {
            nodes,
            optimal_node_id: NodeId::ROOT,
            next_id: 1,
        }
    }

    pub fn get_node(&self, id: NodeId) -> Option<&SearchNode> {
        self.nodes.get(&id)
    }

    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut SearchNode> {
        self.nodes.get_mut(&id)
    }

    pub fn root(&self) -> Option<&SearchNode> {
        self.nodes.get(&NodeId::ROOT)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &SearchNode> {
        self.nodes.values()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn optimal_node_id(&self) -> NodeId {
        self.optimal_node_id
    }

    pub fn next_id(&self) -> u32 {
        self.next_id
    }

    /// Add a child of `parent` holding the full path `operations`
    ///
    /// `operations` must extend the parent's path by at least one operation.
    /// Returns None (tree untouched) when the parent is missing or the path
    /// does not extend it.
    pub fn expand(
        &mut self,
        parent: NodeId,
        value: f64,
        operations: Vec<Operation>,
    ) -> Option<NodeId> {
        let parent_node = self.nodes.get(&parent)?;
        let extends = operations.len() > parent_node.operations.len()
            && parent_node
                .operations
                .iter()
                .zip(&operations)
                .all(|(a, b)| a.same_action(b));
        if !extends {
            return None;
        }

        let id = NodeId(self.next_id);
        self.next_id += 1;
        self.nodes.insert(
            id,
            SearchNode {
                id,
                parent_id: Some(parent),
                value,
                operations,
                children_ids: Vec::new(),
                n_visits: 0,
                fixed: false,
            },
        );
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children_ids.push(id);
        }

        let best = self
            .nodes
            .get(&self.optimal_node_id)
            .map(|n| n.value)
            .unwrap_or(f64::NEG_INFINITY);
        if value > best {
            self.optimal_node_id = id;
        }
        Some(id)
    }

    /// Last operation of every child of `node`, in creation order
    pub fn child_operations(&self, node: NodeId) -> Vec<Operation> {
        let Some(node) = self.nodes.get(&node) else {
            return Vec::new();
        };
        node.children_ids
            .iter()
            .filter_map(|c| self.nodes.get(c))
            .filter_map(|c| c.last_operation().cloned())
            .collect()
    }

    /// Remove a childless, non-root node
    ///
    /// Returns false without touching the tree if the node is missing, has
    /// children, or is the root.
    pub fn delete_node(&mut self, id: NodeId) -> bool {
        let parent = match self.nodes.get(&id) {
            Some(node) if node.children_ids.is_empty() => node.parent_id,
            _ => return false,
        };
        let Some(parent) = parent else {
            return false;
        };
        if let Some(p) = self.nodes.get_mut(&parent) {
            p.children_ids.retain(|c| *c != id);
        }
        self.nodes.remove(&id);
        if self.optimal_node_id == id {
            self.optimal_node_id = best_node(&self.nodes);
        }
        true
    }

    /// Mark a node exhausted; returns false if it does not exist
    pub fn set_fixed(&mut self, id: NodeId) -> bool {
        match self.nodes.get_mut(&id) {
            Some(node) => {
                node.fixed = true;
                true
            }
            None => false,
        }
    }

    pub fn visit(&mut self, id: NodeId) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.n_visits += 1;
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::OperationKind;
    use crate::core::types::ObjectId;

    fn op(object: i64) -> Operation {
        Operation::on_object(OperationKind::Click, ObjectId(object))
    }

    #[test]
    fn test_new_tree_has_seeded_root() {
        let tree = SearchTree::new();
        let root = tree.root().unwrap();
        assert_eq!(root.id, NodeId::ROOT);
        assert_eq!(root.value, 5.0);
        assert!(!root.fixed);
        assert!(root.parent_id.is_none());
        assert_eq!(tree.optimal_node_id(), NodeId::ROOT);
        assert_eq!(tree.next_id(), 1);
    }

    #[test]
    fn test_expand_links_parent_and_child() {
        let mut tree = SearchTree::new();
        let a = tree.expand(NodeId::ROOT, 3.0, vec![op(1)]).unwrap();
        let b = tree.expand(a, 3.0, vec![op(1), op(2)]).unwrap();

        assert_eq!(tree.get_node(b).unwrap().parent_id, Some(a));
        assert_eq!(tree.get_node(a).unwrap().children_ids, vec![b]);
        assert_eq!(tree.get_node(b).unwrap().depth(), 2);
        // 3 does not beat the root's 5
        assert_eq!(tree.optimal_node_id(), NodeId::ROOT);

        let c = tree.expand(NodeId::ROOT, 7.0, vec![op(3)]).unwrap();
        assert_eq!(tree.optimal_node_id(), c);
    }

    #[test]
    fn test_expand_rejects_path_that_does_not_extend_parent() {
        let mut tree = SearchTree::new();
        let a = tree.expand(NodeId::ROOT, 3.0, vec![op(1)]).unwrap();

        assert!(tree.expand(a, 3.0, vec![op(1)]).is_none());
        assert!(tree.expand(a, 3.0, vec![op(9), op(2)]).is_none());
        assert!(tree.expand(NodeId(42), 3.0, vec![op(1)]).is_none());
        assert_eq!(tree.len(), 2);
        assert_eq!(tree.next_id(), 2);
    }

    #[test]
    fn test_child_operations_returns_last_step() {
        let mut tree = SearchTree::new();
        let a = tree.expand(NodeId::ROOT, 3.0, vec![op(1)]).unwrap();
        tree.expand(a, 3.0, vec![op(1), op(2)]).unwrap();
        tree.expand(a, 3.0, vec![op(1), op(3)]).unwrap();

        assert_eq!(tree.child_operations(a), vec![op(2), op(3)]);
        assert_eq!(tree.child_operations(NodeId::ROOT), vec![op(1)]);
        assert!(tree.child_operations(NodeId(99)).is_empty());
    }

    #[test]
    fn test_delete_node_guarded_by_children() {
        let mut tree = SearchTree::new();
        let a = tree.expand(NodeId::ROOT, 3.0, vec![op(1)]).unwrap();
        let b = tree.expand(a, 3.0, vec![op(1), op(2)]).unwrap();

        let before = tree.clone();
        assert!(!tree.delete_node(a));
        assert_eq!(tree, before);

        assert!(tree.delete_node(b));
        assert!(tree.get_node(a).unwrap().children_ids.is_empty());
        assert!(!tree.delete_node(b));
        assert!(!tree.delete_node(NodeId::ROOT));

        // ids are never reused
        let c = tree.expand(a, 3.0, vec![op(1), op(4)]).unwrap();
        assert_eq!(c, NodeId(3));
    }

    #[test]
    fn test_deleting_optimal_node_moves_pointer() {
        let mut tree = SearchTree::new();
        let a = tree.expand(NodeId::ROOT, 9.0, vec![op(1)]).unwrap();
        assert_eq!(tree.optimal_node_id(), a);
        assert!(tree.delete_node(a));
        assert_eq!(tree.optimal_node_id(), NodeId::ROOT);
    }

    #[test]
    fn test_json_round_trip() {
        let mut tree = SearchTree::new();
        let a = tree.expand(NodeId::ROOT, 3.0, vec![op(1)]).unwrap();
        tree.expand(a, 8.0, vec![op(1), op(2)]).unwrap();
        tree.set_fixed(a);
        tree.visit(a);

        let json = tree.to_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["node_id"], 3);
        assert_eq!(value["optimal_node_id"], 2);
        assert_eq!(value["nodes"].as_array().unwrap().len(), 3);

        let restored = SearchTree::from_json(&json).unwrap();
        assert_eq!(restored, tree);
    }

    #[test]
    fn test_corrupt_record_rejected() {
        let json = r#"{"nodes":[{"node_id":0,"parent_id":null,"value":5.0,"operations":[],"children_ids":[4],"n_visits":0,"is_fixed":false}],"optimal_node_id":0,"node_id":1}"#;
        assert!(SearchTree::from_json(json).is_err());
    }

    #[test]
    fn test_empty_record_becomes_fresh_tree() {
        let tree = SearchTree::from_json(r#"{"nodes":[],"optimal_node_id":null,"node_id":0}"#).unwrap();
        assert_eq!(tree, SearchTree::new());
    }
}
