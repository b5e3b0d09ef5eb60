use thiserror::Error;

/// Everything that can go wrong around a flow, for callers that do not care
/// which layer failed
#[derive(Error, Debug)]
pub enum FlowError {
    #[error("Node error: {0}")]
    Node(#[from] NodeError),

    #[error("Flow structure error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Failures raised by node logic. These are contained at the update
/// boundary and never abort the surrounding propagation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum NodeError {
    #[error("Missing required input: {0}")]
    MissingInput(String),

    #[error("Invalid input type for '{field}': expected {expected}, got {actual}")]
    InvalidInputType {
        field: String,
        expected: String,
        actual: String,
    },

    /// The node's own settings are unusable, e.g. a variable name that does
    /// not exist
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    /// Saved state could not be applied
    #[error("Invalid node state: {0}")]
    State(String),
}

/// Structural failures. Raised while building or reconstructing a flow.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WorkflowError {
    #[error("Invalid flow: {0}")]
    Invalid(String),

    /// No factory or legacy alias matches the identifier
    #[error("Unknown node type: {0}")]
    UnknownNodeType(String),

    /// A saved connection points at a missing node or port, or joins ports
    /// that cannot be connected
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    #[error("Node type already registered: {0}")]
    DuplicateIdentifier(String),
}
