use flowcore::{Node, NodeContext, NodeError, PortSpec, Value};
use flowruntime::{NodeFactory, NodeMetadata, PortDefinition};
use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize)]
struct ConstantState {
    #[serde(default)]
    value: Value,
}

/// Emits a fixed value. The value is persisted as node state.
#[derive(Debug, Default)]
pub struct ConstantNode {
    value: Value,
}

impl ConstantNode {
    pub fn new(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
        }
    }
}

impl Node for ConstantNode {
    fn identifier(&self) -> &str {
        "value.constant"
    }

    fn title(&self) -> &str {
        "Constant"
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("value")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        ctx.write_output(0, self.value.clone());
        Ok(())
    }

    fn get_state(&self) -> serde_json::Value {
        serde_json::to_value(ConstantState {
            value: self.value.clone(),
        })
        .unwrap_or_default()
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), NodeError> {
        let state: ConstantState = serde_json::from_value(state.clone())
            .map_err(|e| NodeError::State(format!("constant: {}", e)))?;
        self.value = state.value;
        Ok(())
    }
}

pub struct ConstantNodeFactory;

impl NodeFactory for ConstantNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(ConstantNode::default()))
    }

    fn node_type(&self) -> &str {
        "value.constant"
    }

    fn legacy_identifiers(&self) -> Vec<String> {
        vec!["Val_Node".to_string()]
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Outputs a value stored with the flow".to_string(),
            category: "value".to_string(),
            inputs: vec![],
            outputs: vec![PortDefinition::new("value", "The stored value")],
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct VariableState {
    #[serde(default)]
    name: String,
}

/// Reads a session variable and emits it again whenever the variable is set
#[derive(Debug, Default)]
pub struct GetVariableNode {
    name: String,
    watching: Option<String>,
}

impl GetVariableNode {
    /// Follow the configured name. The state may change after placement.
    fn follow(&mut self, ctx: &mut dyn NodeContext) {
        if self.watching.as_deref() == Some(self.name.as_str()) {
            return;
        }
        if let Some(old) = self.watching.take() {
            ctx.unwatch_var(&old);
        }
        if !self.name.is_empty() {
            ctx.watch_var(&self.name);
            self.watching = Some(self.name.clone());
        }
    }
}

impl Node for GetVariableNode {
    fn identifier(&self) -> &str {
        "value.get_var"
    }

    fn title(&self) -> &str {
        "Get Variable"
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("value")]
    }

    fn on_placed(&mut self, ctx: &mut dyn NodeContext) {
        self.follow(ctx);
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        self.follow(ctx);
        let value = ctx
            .var(&self.name)
            .ok_or_else(|| NodeError::Configuration(format!("unknown variable '{}'", self.name)))?;
        ctx.write_output(0, value);
        Ok(())
    }

    fn get_state(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name })
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), NodeError> {
        let state: VariableState = serde_json::from_value(state.clone())
            .map_err(|e| NodeError::State(format!("get_var: {}", e)))?;
        self.name = state.name;
        Ok(())
    }
}

/// Writes a session variable when signalled
#[derive(Debug, Default)]
pub struct SetVariableNode {
    name: String,
}

impl Node for SetVariableNode {
    fn identifier(&self) -> &str {
        "value.set_var"
    }

    fn title(&self) -> &str {
        "Set Variable"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("in"), PortSpec::data("value")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("out")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        if input != Some(0) {
            return Ok(());
        }
        let value = ctx.read_input(1);
        if !ctx.set_var(&self.name, value) {
            return Err(NodeError::Configuration(format!(
                "unknown variable '{}'",
                self.name
            )));
        }
        ctx.fire_output(0);
        Ok(())
    }

    fn get_state(&self) -> serde_json::Value {
        serde_json::json!({ "name": self.name })
    }

    fn set_state(&mut self, state: &serde_json::Value) -> Result<(), NodeError> {
        let state: VariableState = serde_json::from_value(state.clone())
            .map_err(|e| NodeError::State(format!("set_var: {}", e)))?;
        self.name = state.name;
        Ok(())
    }
}

pub struct GetVariableNodeFactory;

impl NodeFactory for GetVariableNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(GetVariableNode::default()))
    }

    fn node_type(&self) -> &str {
        "value.get_var"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Reads the variable named in the node state, again on every change"
                .to_string(),
            category: "value".to_string(),
            inputs: vec![],
            outputs: vec![PortDefinition::new("value", "Current value")],
        }
    }
}

pub struct SetVariableNodeFactory;

impl NodeFactory for SetVariableNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(SetVariableNode::default()))
    }

    fn node_type(&self) -> &str {
        "value.set_var"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Writes the variable named in the node state".to_string(),
            category: "value".to_string(),
            inputs: vec![
                PortDefinition::new("in", "Exec signal"),
                PortDefinition::new("value", "New value"),
            ],
            outputs: vec![PortDefinition::new("out", "Fired after the write")],
        }
    }
}
