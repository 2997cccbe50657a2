//! Per-state search trees over operation sequences

pub mod node;
pub mod search_tree;

pub use node::SearchNode;
pub use search_tree::{SearchTree, ROOT_VALUE};
