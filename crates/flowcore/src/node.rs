use crate::{events::LogLevel, AlgorithmMode, CallFrame, NodeError, NodeId, PortKind, PortSpec, Value};

/// Core trait that every node kind implements.
///
/// A node only ever sees its own ports through the [`NodeContext`] handed to
/// it; when and where its effects propagate is decided by the flow's executor.
pub trait Node {
    /// Registry identifier (e.g. "math.add", "debug.log")
    fn identifier(&self) -> &str;

    /// Human readable name, defaults to the identifier
    fn title(&self) -> &str {
        self.identifier()
    }

    /// Inputs a freshly created node starts with
    fn init_inputs(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    /// Outputs a freshly created node starts with
    fn init_outputs(&self) -> Vec<PortSpec> {
        Vec::new()
    }

    /// Called when an input received a signal (`Some(index)`) or when the
    /// node is asked to re-evaluate generally (`None`).
    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>)
        -> Result<(), NodeError>;

    /// Called once the node is live in a flow. When a flow is loaded this
    /// runs before any connection is built.
    fn on_placed(&mut self, _ctx: &mut dyn NodeContext) {}

    /// Called when the node is removed from its flow
    fn on_removed(&mut self) {}

    /// Opaque per-node state persisted with the flow
    fn get_state(&self) -> serde_json::Value {
        serde_json::Value::Null
    }

    fn set_state(&mut self, _state: &serde_json::Value) -> Result<(), NodeError> {
        Ok(())
    }

    /// Whether connections built while loading a saved flow must not cause
    /// updates in this node
    fn blocks_initial_updates(&self) -> bool {
        false
    }
}

/// What a running node can reach: its own ports, the script variables,
/// the log channel and, inside a sub-flow, the active call frame.
pub trait NodeContext {
    fn node_id(&self) -> NodeId;

    fn algorithm_mode(&self) -> AlgorithmMode;

    /// Switch the flow's algorithm mode. Takes effect once the running
    /// event is over.
    fn set_algorithm_mode(&mut self, mode: AlgorithmMode);

    fn input_count(&self) -> usize;

    fn output_count(&self) -> usize;

    fn input_kind(&self, index: usize) -> Option<PortKind>;

    fn output_kind(&self, index: usize) -> Option<PortKind>;

    /// Current value of a data input. Depending on the algorithm mode this
    /// may pull synchronously from upstream.
    fn read_input(&mut self, index: usize) -> Value;

    /// Last value written to one of this node's outputs
    fn output_value(&self, index: usize) -> Value;

    fn write_output(&mut self, index: usize, value: Value);

    fn fire_output(&mut self, index: usize);

    fn var(&self, name: &str) -> Option<Value>;

    /// Returns `false` when no variable with that name exists. Nodes
    /// watching the variable are updated.
    fn set_var(&mut self, name: &str, value: Value) -> bool;

    /// Get a general update whenever the variable is set
    fn watch_var(&mut self, name: &str);

    fn unwatch_var(&mut self, name: &str);

    fn log(&mut self, level: LogLevel, message: &str);

    /// Frame of the sub-flow call currently running this flow, if any
    fn call_frame(&mut self) -> Option<&mut CallFrame>;

    /// Number of sub-flow calls enclosing the current execution
    fn call_depth(&self) -> usize;

    fn info(&mut self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    fn warn(&mut self, message: &str) {
        self.log(LogLevel::Warning, message);
    }

    /// Read a data input that must hold a number
    fn require_number(&mut self, index: usize) -> Result<f64, NodeError> {
        let value = self.read_input(index);
        value.as_f64().ok_or_else(|| NodeError::InvalidInputType {
            field: format!("input {}", index),
            expected: "number".to_string(),
            actual: value.type_name().to_string(),
        })
    }
}
