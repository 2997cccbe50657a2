//! Skill selection policy

pub mod selection;

pub use selection::{
    explore_score, sample_arm, skill_score, softmax, temperature, Choice, Selection,
    SelectionPolicy,
};
