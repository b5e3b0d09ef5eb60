//! Exec flow control nodes

use flowcore::{Node, NodeContext, NodeError, PortSpec};
use flowruntime::{NodeFactory, NodeMetadata, PortDefinition};

/// Fires its exec output whenever it is updated. The usual entry point of
/// an exec flow.
pub struct StartNode;

impl Node for StartNode {
    fn identifier(&self) -> &str {
        "control.start"
    }

    fn title(&self) -> &str {
        "Start"
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("go")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        ctx.fire_output(0);
        Ok(())
    }
}

/// Routes the exec signal by a condition
pub struct BranchNode;

impl Node for BranchNode {
    fn identifier(&self) -> &str {
        "control.branch"
    }

    fn title(&self) -> &str {
        "Branch"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("in"), PortSpec::data("condition")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("true"), PortSpec::exec("false")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        if input != Some(0) {
            return Ok(());
        }
        let condition = ctx.read_input(1);
        ctx.fire_output(if condition.is_truthy() { 0 } else { 1 });
        Ok(())
    }
}

/// Fires each of its outputs in order
pub struct SequenceNode {
    steps: usize,
}

impl SequenceNode {
    pub fn new(steps: usize) -> Self {
        Self { steps }
    }
}

impl Default for SequenceNode {
    fn default() -> Self {
        Self::new(2)
    }
}

impl Node for SequenceNode {
    fn identifier(&self) -> &str {
        "control.sequence"
    }

    fn title(&self) -> &str {
        "Sequence"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("in")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        (0..self.steps)
            .map(|i| PortSpec::exec(format!("then {}", i)))
            .collect()
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        if input != Some(0) {
            return Ok(());
        }
        // ports may have been added since creation
        for index in 0..ctx.output_count() {
            ctx.fire_output(index);
        }
        Ok(())
    }

    fn get_state(&self) -> serde_json::Value {
        serde_json::json!({ "steps": self.steps })
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), NodeError> {
        if let Some(steps) = state.get("steps").and_then(|s| s.as_u64()) {
            self.steps = steps as usize;
        }
        Ok(())
    }
}

pub struct StartNodeFactory;

impl NodeFactory for StartNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(StartNode))
    }

    fn node_type(&self) -> &str {
        "control.start"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Starts an exec chain when updated".to_string(),
            category: "control".to_string(),
            inputs: vec![],
            outputs: vec![PortDefinition::new("go", "Exec signal")],
        }
    }
}

pub struct BranchNodeFactory;

impl NodeFactory for BranchNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(BranchNode))
    }

    fn node_type(&self) -> &str {
        "control.branch"
    }

    fn legacy_identifiers(&self) -> Vec<String> {
        vec!["If_Node".to_string()]
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Continues on 'true' or 'false' depending on the condition".to_string(),
            category: "control".to_string(),
            inputs: vec![
                PortDefinition::new("in", "Exec signal"),
                PortDefinition::new("condition", "Checked for truthiness"),
            ],
            outputs: vec![
                PortDefinition::new("true", "Fired when the condition holds"),
                PortDefinition::new("false", "Fired otherwise"),
            ],
        }
    }
}

pub struct SequenceNodeFactory;

impl NodeFactory for SequenceNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SequenceNode::default()))
    }

    fn node_type(&self) -> &str {
        "control.sequence"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Fires every output in order".to_string(),
            category: "control".to_string(),
            inputs: vec![PortDefinition::new("in", "Exec signal")],
            outputs: vec![],
        }
    }
}
