//! Reusable nested graphs invoked synchronously from a call node.
//!
//! A [`Subflow`] owns a nested [`Flow`] with two proxy nodes: the input proxy
//! whose outputs are the parameters, and the output proxy whose inputs are
//! the returns. A [`SubflowCallNode`] placed in any other flow shows the same
//! parameters as inputs and the returns as outputs. Calling it builds a
//! [`CallFrame`], runs the nested flow to completion with that frame
//! installed, and forwards what the frame collected.

use crate::flow::Flow;
use crate::registry::{NodeFactory, NodeMetadata, PortDefinition};
use flowcore::{
    AlgorithmMode, CallFrame, Node, NodeContext, NodeError, NodeId, PortKind, PortSpec, Value,
    Variables,
};
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

pub type SharedSubflow = Rc<RefCell<Subflow>>;

const INPUT_PROXY: &str = "subflow.input";
const OUTPUT_PROXY: &str = "subflow.output";

pub struct Subflow {
    name: String,
    flow: Flow,
    input_node: NodeId,
    output_node: NodeId,
}

impl Subflow {
    pub fn new(name: impl Into<String>, mode: AlgorithmMode) -> Self {
        Self::with_variables(name, mode, Rc::new(RefCell::new(Variables::new())))
    }

    pub fn with_variables(
        name: impl Into<String>,
        mode: AlgorithmMode,
        variables: Rc<RefCell<Variables>>,
    ) -> Self {
        let mut flow = Flow::with_variables(mode, variables);
        let input_node = flow.add_node(Box::new(SubflowInputNode));
        let output_node = flow.add_node(Box::new(SubflowOutputNode));
        Self {
            name: name.into(),
            flow,
            input_node,
            output_node,
        }
    }

    pub fn shared(self) -> SharedSubflow {
        Rc::new(RefCell::new(self))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Registry identifier of the nodes calling this sub-flow
    pub fn call_identifier(&self) -> String {
        format!("subflow.{}", self.name)
    }

    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    pub fn flow_mut(&mut self) -> &mut Flow {
        &mut self.flow
    }

    pub fn input_node(&self) -> NodeId {
        self.input_node
    }

    pub fn output_node(&self) -> NodeId {
        self.output_node
    }

    pub fn parameters(&self) -> Vec<PortSpec> {
        self.flow
            .node(self.input_node)
            .map(|n| {
                n.outputs()
                    .iter()
                    .map(|p| PortSpec {
                        kind: p.kind(),
                        label: p.label().to_string(),
                        default: Value::Null,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn returns(&self) -> Vec<PortSpec> {
        self.flow
            .node(self.output_node)
            .map(|n| {
                n.inputs()
                    .iter()
                    .map(|p| PortSpec {
                        kind: p.kind(),
                        label: p.label().to_string(),
                        default: p.default().clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn add_parameter(&mut self, spec: PortSpec) -> Option<usize> {
        self.flow.add_output(self.input_node, spec)
    }

    pub fn remove_parameter(&mut self, index: usize) -> bool {
        self.flow.remove_output(self.input_node, index)
    }

    pub fn add_return(&mut self, spec: PortSpec) -> Option<usize> {
        self.flow.add_input(self.output_node, spec)
    }

    pub fn remove_return(&mut self, index: usize) -> bool {
        self.flow.remove_input(self.output_node, index)
    }

    /// Reshape every call node of this sub-flow inside `flow` so its ports
    /// match the current parameters and returns. Returns the number of call
    /// nodes visited.
    pub fn sync_callers(&self, flow: &mut Flow) -> usize {
        let identifier = self.call_identifier();
        let callers: Vec<NodeId> = flow
            .nodes()
            .filter(|id| flow.node(*id).is_some_and(|n| n.identifier() == identifier))
            .collect();
        let parameters = self.parameters();
        let returns = self.returns();
        for node in &callers {
            sync_inputs(flow, *node, &parameters);
            sync_outputs(flow, *node, &returns);
        }
        callers.len()
    }

    /// Run the nested flow once for `frame` and hand the frame back with the
    /// data returns held and the exec returns recorded.
    pub fn call(&mut self, frame: CallFrame) -> Result<CallFrame, NodeError> {
        debug!(subflow = %self.name, depth = frame.depth(), caller = %frame.caller(), "sub-flow call");
        let trigger = frame.trigger();
        let previous = self.flow.enter_call(frame);

        self.flow.update_node(self.input_node, None);
        if let Some(index) = trigger {
            if self.flow.output_port(self.input_node, index).map(|p| p.kind())
                == Some(PortKind::Exec)
            {
                self.flow.fire_output(self.input_node, index);
            }
        }

        // the nested run is over; collect every data return exactly once
        let data_returns: Vec<usize> = self
            .flow
            .node(self.output_node)
            .map(|n| {
                n.inputs()
                    .iter()
                    .enumerate()
                    .filter(|(_, p)| p.kind() == PortKind::Data)
                    .map(|(i, _)| i)
                    .collect()
            })
            .unwrap_or_default();
        for index in data_returns {
            let value = self.flow.read_input(self.output_node, index);
            if let Some(frame) = self.flow.call_frame_mut() {
                frame.hold(index, value);
            }
        }

        self.flow.exit_call(previous).ok_or_else(|| {
            NodeError::ExecutionFailed(format!("sub-flow '{}' lost its call frame", self.name))
        })
    }
}

fn same_port(kind: PortKind, label: &str, spec: &PortSpec) -> bool {
    kind == spec.kind && label == spec.label
}

// keep ports that still line up with the target list, drop the others,
// then append whatever is missing
fn sync_inputs(flow: &mut Flow, node: NodeId, target: &[PortSpec]) {
    let mut index = 0;
    let mut matched = 0;
    while let Some(port) = flow.input_port(node, index) {
        if target
            .get(matched)
            .is_some_and(|spec| same_port(port.kind(), port.label(), spec))
        {
            index += 1;
            matched += 1;
        } else {
            flow.remove_input(node, index);
        }
    }
    for spec in &target[matched..] {
        flow.add_input(node, spec.clone());
    }
}

fn sync_outputs(flow: &mut Flow, node: NodeId, target: &[PortSpec]) {
    let mut index = 0;
    let mut matched = 0;
    while let Some(port) = flow.output_port(node, index) {
        if target
            .get(matched)
            .is_some_and(|spec| same_port(port.kind(), port.label(), spec))
        {
            index += 1;
            matched += 1;
        } else {
            flow.remove_output(node, index);
        }
    }
    for spec in &target[matched..] {
        flow.add_output(node, spec.clone());
    }
}

/// Input proxy: republishes the arguments of the active call frame on its
/// parameter outputs
pub struct SubflowInputNode;

impl Node for SubflowInputNode {
    fn identifier(&self) -> &str {
        INPUT_PROXY
    }

    fn title(&self) -> &str {
        "Input"
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        let Some(args) = ctx.call_frame().map(|f| f.args().to_vec()) else {
            return Ok(());
        };
        for (index, value) in args.into_iter().enumerate() {
            if ctx.output_kind(index) == Some(PortKind::Data) {
                ctx.write_output(index, value);
            }
        }
        Ok(())
    }
}

/// Output proxy: records exec returns on the frame. Data returns are read
/// by the sub-flow once the nested run is over.
pub struct SubflowOutputNode;

impl Node for SubflowOutputNode {
    fn identifier(&self) -> &str {
        OUTPUT_PROXY
    }

    fn title(&self) -> &str {
        "Output"
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        let Some(index) = input else {
            return Ok(());
        };
        if ctx.input_kind(index) == Some(PortKind::Exec) {
            if let Some(frame) = ctx.call_frame() {
                frame.fire(index);
            }
        }
        Ok(())
    }
}

/// Node invoking a sub-flow from another flow
pub struct SubflowCallNode {
    identifier: String,
    subflow: SharedSubflow,
}

impl SubflowCallNode {
    pub fn new(subflow: SharedSubflow) -> Self {
        let identifier = subflow.borrow().call_identifier();
        Self {
            identifier,
            subflow,
        }
    }
}

impl Node for SubflowCallNode {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        self.subflow
            .try_borrow()
            .map(|s| s.parameters())
            .unwrap_or_default()
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        self.subflow
            .try_borrow()
            .map(|s| s.returns())
            .unwrap_or_default()
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        let mut args = Vec::with_capacity(ctx.input_count());
        for index in 0..ctx.input_count() {
            let value = match ctx.input_kind(index) {
                Some(PortKind::Data) => ctx.read_input(index),
                _ => Value::Null,
            };
            args.push(value);
        }
        let trigger = input.filter(|i| ctx.input_kind(*i) == Some(PortKind::Exec));
        let frame = CallFrame::new(ctx.node_id(), ctx.call_depth() + 1, args, trigger);

        let frame = {
            let mut subflow = self.subflow.try_borrow_mut().map_err(|_| {
                NodeError::ExecutionFailed(format!(
                    "{} is already running, recursive calls are not supported",
                    self.identifier
                ))
            })?;
            subflow.call(frame)?
        };

        // unchanged returns are not pushed again
        for (index, value) in frame.returns().iter().enumerate() {
            if let Some(value) = value {
                if *value != ctx.output_value(index) {
                    ctx.write_output(index, value.clone());
                }
            }
        }
        for index in frame.fired() {
            ctx.fire_output(*index);
        }
        Ok(())
    }
}

/// Registry factory producing call nodes for one sub-flow
pub struct SubflowCallFactory {
    identifier: String,
    subflow: SharedSubflow,
}

impl SubflowCallFactory {
    pub fn new(subflow: SharedSubflow) -> Self {
        let identifier = subflow.borrow().call_identifier();
        Self {
            identifier,
            subflow,
        }
    }
}

impl NodeFactory for SubflowCallFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SubflowCallNode {
            identifier: self.identifier.clone(),
            subflow: Rc::clone(&self.subflow),
        }))
    }

    fn node_type(&self) -> &str {
        &self.identifier
    }

    fn metadata(&self) -> NodeMetadata {
        let Ok(subflow) = self.subflow.try_borrow() else {
            return NodeMetadata::default();
        };
        NodeMetadata {
            description: format!("Calls the '{}' sub-flow", subflow.name()),
            category: "subflow".to_string(),
            inputs: subflow
                .parameters()
                .into_iter()
                .map(|p| PortDefinition::new(p.label, format!("{:?} parameter", p.kind)))
                .collect(),
            outputs: subflow
                .returns()
                .into_iter()
                .map(|p| PortDefinition::new(p.label, format!("{:?} return", p.kind)))
                .collect(),
        }
    }
}
