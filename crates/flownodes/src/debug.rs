use flowcore::{Node, NodeContext, NodeError, PortSpec, Value};
use flowruntime::{NodeFactory, NodeMetadata, PortDefinition};

fn describe(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "(no message)".to_string(),
        other => other.to_plain_json().to_string(),
    }
}

/// Simple debug node that logs its input and passes it on
pub struct DebugNode;

impl Node for DebugNode {
    fn identifier(&self) -> &str {
        "debug.log"
    }

    fn title(&self) -> &str {
        "Log"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("message")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("message")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        let message = ctx.read_input(0);
        ctx.info(&format!("DEBUG: {}", describe(&message)));
        ctx.write_output(0, message);
        Ok(())
    }
}

pub struct DebugNodeFactory;

impl NodeFactory for DebugNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(DebugNode))
    }

    fn node_type(&self) -> &str {
        "debug.log"
    }

    fn legacy_identifiers(&self) -> Vec<String> {
        vec!["Log_Node".to_string()]
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs input values for debugging".to_string(),
            category: "debug".to_string(),
            inputs: vec![PortDefinition::new("message", "Value to log")],
            outputs: vec![PortDefinition::new("message", "The same value")],
        }
    }
}

/// Exec counterpart of [`DebugNode`]: logs when signalled, then continues
pub struct PrintNode;

impl Node for PrintNode {
    fn identifier(&self) -> &str {
        "debug.print"
    }

    fn title(&self) -> &str {
        "Print"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("in"), PortSpec::data("message")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::exec("out")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        if input != Some(0) {
            return Ok(());
        }
        let message = ctx.read_input(1);
        ctx.info(&describe(&message));
        ctx.fire_output(0);
        Ok(())
    }
}

pub struct PrintNodeFactory;

impl NodeFactory for PrintNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(PrintNode))
    }

    fn node_type(&self) -> &str {
        "debug.print"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Logs a value each time it is signalled".to_string(),
            category: "debug".to_string(),
            inputs: vec![
                PortDefinition::new("in", "Exec signal"),
                PortDefinition::new("message", "Value to log"),
            ],
            outputs: vec![PortDefinition::new("out", "Fired after logging")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn describe_strings_verbatim() {
        assert_eq!(describe(&Value::from("hi")), "hi");
        assert_eq!(describe(&Value::Number(2.5)), "2.5");
        assert_eq!(describe(&Value::Null), "(no message)");
    }
}
