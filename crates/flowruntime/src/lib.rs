//! Flow execution runtime
//!
//! This crate holds the graph container, the executors deciding how updates
//! propagate, the node registry, saving and reloading flows, sub-flow calls
//! and the session tying them together.

mod context;
mod executor;
mod flow;
mod loader;
mod registry;
mod session;
mod subflow;

pub use executor::{DataOptimizedExecutor, DefaultExecutor, ExecutionRoot, Executor};
pub use flow::{Connection, Flow, InputPort, Lifecycle, NodeEntry, OutputPort};
pub use registry::{NodeFactory, NodeMetadata, NodeRegistry, PortDefinition};
pub use session::{Session, SessionConfig};
pub use subflow::{
    SharedSubflow, Subflow, SubflowCallFactory, SubflowCallNode, SubflowInputNode,
    SubflowOutputNode,
};
