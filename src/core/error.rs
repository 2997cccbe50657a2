use crate::core::types::{ClusterId, NodeId, SkillId, StateId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AgentError {
    #[error("State not found: {0}")]
    StateNotFound(StateId),

    #[error("Search node {node} not found in tree of state {state}")]
    NodeNotFound { state: StateId, node: NodeId },

    #[error("Skill not found: {0}")]
    SkillNotFound(SkillId),

    #[error("Skill cluster not found: {0}")]
    ClusterNotFound(ClusterId),

    #[error("Judge error: {0}")]
    Judge(String),

    #[error("Judge call failed after {attempts} attempts: {last_error}")]
    JudgeExhausted { attempts: u32, last_error: String },

    #[error("Perception error: {0}")]
    Perception(String),

    #[error("Actuation error: {0}")]
    Actuation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl AgentError {
    /// Errors that must stop the run rather than fail a single step
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::JudgeExhausted { .. }
                | AgentError::Corrupt(_)
                | AgentError::Storage(_)
                | AgentError::Config(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, AgentError>;
