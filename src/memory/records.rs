//! Rows of long-term memory

use crate::actions::Operation;
use crate::core::types::{ClusterId, Fingerprint, NodeId, ObjectId, Screen, SkillId, StateId};
use crate::tree::SearchTree;
use serde::{Deserialize, Serialize};

/// A visually distinct game state and everything learned in it
#[derive(Debug, Clone)]
pub struct State {
    pub id: StateId,
    pub fingerprint: Fingerprint,
    pub tree: SearchTree,
    /// Objects detected in this state, in discovery order
    pub object_ids: Vec<ObjectId>,
    pub cluster_ids: Vec<ClusterId>,
}

impl State {
    pub fn add_object(&mut self, id: ObjectId) {
        if !self.object_ids.contains(&id) {
            self.object_ids.push(id);
        }
    }

    pub fn add_cluster(&mut self, id: ClusterId) {
        if !self.cluster_ids.contains(&id) {
            self.cluster_ids.push(id);
        }
    }
}

/// A detected UI element as stored
#[derive(Debug, Clone)]
pub struct ObjectRecord {
    pub id: ObjectId,
    pub state_id: StateId,
    pub name: Option<String>,
    pub image: Screen,
    pub hash: u64,
    pub area: u32,
}

/// A learned skill without its reference images
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Skill {
    pub id: SkillId,
    pub name: String,
    pub description: String,
    pub operations: Vec<Operation>,
    pub fitness: i64,
    /// Times the skill has been tried, counting its discovery
    pub trials: u32,
    pub state_id: StateId,
    /// Node whose path produced the skill
    pub node_id: Option<NodeId>,
}

/// A skill accepted by the judge, ready to persist
#[derive(Debug, Clone)]
pub struct NewSkill {
    pub name: String,
    pub description: String,
    pub operations: Vec<Operation>,
    pub state_id: StateId,
    pub node_id: NodeId,
    pub image_before: Screen,
    pub image_after: Screen,
}

/// Fitness and trial count of a freshly minted skill
pub const INITIAL_FITNESS: i64 = 0;
pub const INITIAL_TRIALS: u32 = 1;

/// Skills sharing one goal, selectable as a single arm
#[derive(Debug, Clone, PartialEq)]
pub struct SkillCluster {
    pub id: ClusterId,
    pub name: String,
    pub description: String,
    pub members: Vec<SkillId>,
    /// Pseudo-count of the Explore arm
    pub explore_count: u32,
    /// Fingerprint of the state the cluster was formed in
    pub fingerprint: Fingerprint,
}

/// Explore pseudo-count of a fresh cluster
pub const INITIAL_EXPLORE_COUNT: u32 = 1;

impl SkillCluster {
    /// Add a member; returns false if it was already present
    pub fn add_member(&mut self, id: SkillId) -> bool {
        if self.members.contains(&id) {
            return false;
        }
        self.members.push(id);
        true
    }

    pub fn remove_member(&mut self, id: SkillId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| *m != id);
        self.members.len() != before
    }
}
