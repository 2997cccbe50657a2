//! Long-term memory: states, objects, skills and skill clusters

pub mod records;
pub mod state_index;
pub mod store;

pub use records::{NewSkill, ObjectRecord, Skill, SkillCluster, State};
pub use state_index::StateIndex;
pub use store::MemoryStore;
