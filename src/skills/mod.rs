//! Skill lifecycle
//!
//! Skills are minted from exploration, grouped into clusters that act as a
//! single selectable goal, and retired once enough trials show they do not
//! pay off.

pub mod evolution;
pub mod generate;
pub mod merge;

pub use evolution::{evolve, prune_clusters, retired_skills, EvolutionOutcome};
pub use generate::generate_and_save_skill;
pub use merge::{merge_and_save, MergeOutcome};
