//! Bottom-Up Agent - learns reusable skills for a game by exploring its screens

pub mod actions;
pub mod actuation;
pub mod agent;
pub mod core;
pub mod exploit;
pub mod explore;
pub mod guidance;
pub mod judge;
pub mod llm;
pub mod memory;
pub mod perception;
pub mod policy;
pub mod skills;
pub mod tree;
