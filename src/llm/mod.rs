//! Model endpoints
//!
//! Transport only: prompts and decoding of decisions live in `judge`.

pub mod action_text;
pub mod client;

pub use client::{LlmClient, ModelReply, ModelRequest, ToolCall, ToolSpec, Usage};
