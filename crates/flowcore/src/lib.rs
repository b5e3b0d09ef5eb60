//! Core abstractions for the flow engine
//!
//! This crate provides the fundamental types and traits that all other
//! components depend on: values, ports, the node extension point, the
//! persisted topology shape and flow events. It knows nothing about graph
//! execution.

mod error;
pub mod events;
mod frame;
mod node;
mod port;
mod topology;
mod value;
mod variables;

pub use error::{FlowError, NodeError, WorkflowError};
pub use events::*;
pub use frame::CallFrame;
pub use node::{Node, NodeContext};
pub use port::{ConnectionId, Direction, NodeId, PortKind, PortRef, PortSpec};
pub use topology::{AlgorithmMode, ConnectionData, FlowData, InputData, NodeData, OutputData};
pub use value::Value;
pub use variables::Variables;

/// Result type for flow operations
pub type Result<T> = std::result::Result<T, FlowError>;
