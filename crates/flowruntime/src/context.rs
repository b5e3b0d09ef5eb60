use crate::flow::Flow;
use flowcore::{AlgorithmMode, CallFrame, LogLevel, NodeContext, NodeId, PortKind, Value};

/// The context a node sees while one of its hooks runs: a view of its own
/// ports backed by the flow it lives in.
pub(crate) struct FlowNodeContext<'a> {
    flow: &'a mut Flow,
    node: NodeId,
}

impl<'a> FlowNodeContext<'a> {
    pub(crate) fn new(flow: &'a mut Flow, node: NodeId) -> Self {
        Self { flow, node }
    }
}

impl NodeContext for FlowNodeContext<'_> {
    fn node_id(&self) -> NodeId {
        self.node
    }

    fn algorithm_mode(&self) -> AlgorithmMode {
        self.flow.algorithm_mode()
    }

    fn set_algorithm_mode(&mut self, mode: AlgorithmMode) {
        self.flow.set_algorithm_mode(mode);
    }

    fn input_count(&self) -> usize {
        self.flow.node(self.node).map_or(0, |n| n.inputs().len())
    }

    fn output_count(&self) -> usize {
        self.flow.output_count(self.node)
    }

    fn input_kind(&self, index: usize) -> Option<PortKind> {
        self.flow.input_port(self.node, index).map(|p| p.kind())
    }

    fn output_kind(&self, index: usize) -> Option<PortKind> {
        self.flow.output_port(self.node, index).map(|p| p.kind())
    }

    fn read_input(&mut self, index: usize) -> Value {
        self.flow.read_input(self.node, index)
    }

    fn output_value(&self, index: usize) -> Value {
        self.flow.output_value(self.node, index)
    }

    fn write_output(&mut self, index: usize, value: Value) {
        self.flow.write_output(self.node, index, value);
    }

    fn fire_output(&mut self, index: usize) {
        self.flow.fire_output(self.node, index);
    }

    fn var(&self, name: &str) -> Option<Value> {
        self.flow.variables().borrow().get(name).cloned()
    }

    fn set_var(&mut self, name: &str, value: Value) -> bool {
        self.flow.set_var(name, value)
    }

    fn watch_var(&mut self, name: &str) {
        self.flow.watch_var(self.node, name);
    }

    fn unwatch_var(&mut self, name: &str) {
        self.flow.unwatch_var(self.node, name);
    }

    fn log(&mut self, level: LogLevel, message: &str) {
        self.flow.log_node(self.node, level, message);
    }

    fn call_frame(&mut self) -> Option<&mut CallFrame> {
        self.flow.call_frame_mut()
    }

    fn call_depth(&self) -> usize {
        self.flow.call_depth()
    }
}
