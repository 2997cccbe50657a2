use crate::actions::Operation;
use crate::core::types::NodeId;
use serde::{Deserialize, Serialize};

/// One operation-sequence prefix tried from a state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchNode {
    #[serde(rename = "node_id")]
    pub id: NodeId,
    pub parent_id: Option<NodeId>,
    pub value: f64,
    /// Full path from the root; one longer than the parent's
    pub operations: Vec<Operation>,
    pub children_ids: Vec<NodeId>,
    #[serde(default)]
    pub n_visits: u32,
    /// No untried operations remain reachable from here
    #[serde(rename = "is_fixed", default)]
    pub fixed: bool,
}

impl SearchNode {
    pub fn root(value: f64) -> Self {
        Self {
            id: NodeId::ROOT,
            parent_id: None,
            value,
            operations: Vec::new(),
            children_ids: Vec::new(),
            n_visits: 0,
            fixed: false,
        }
    }

    pub fn depth(&self) -> usize {
        self.operations.len()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The incremental operation that produced this node
    pub fn last_operation(&self) -> Option<&Operation> {
        self.operations.last()
    }
}
