//! Operations the agent performs on the game window

pub mod operation;

pub use operation::{Operation, OperationKind, OperationParams, ScrollDirection};
