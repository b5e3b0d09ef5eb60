use flowcore::{Node, NodeContext, NodeError, PortSpec, Value};
use flowruntime::{NodeFactory, NodeMetadata, PortDefinition};

/// Parse JSON string to Value
pub struct JsonParseNode;

impl Node for JsonParseNode {
    fn identifier(&self) -> &str {
        "transform.json_parse"
    }

    fn title(&self) -> &str {
        "Parse JSON"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("json")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("parsed")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        let input = ctx.read_input(0);
        if input.is_null() {
            return Err(NodeError::MissingInput("json".to_string()));
        }
        let text = input.as_str().ok_or_else(|| NodeError::InvalidInputType {
            field: "json".to_string(),
            expected: "string".to_string(),
            actual: input.type_name().to_string(),
        })?;

        let parsed: serde_json::Value = serde_json::from_str(text)
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON parse error: {}", e)))?;

        ctx.write_output(0, Value::Json(parsed));
        Ok(())
    }
}

pub struct JsonParseNodeFactory;

impl NodeFactory for JsonParseNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonParseNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_parse"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Parse JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortDefinition::new("json", "JSON text")],
            outputs: vec![PortDefinition::new("parsed", "Parsed document")],
        }
    }
}

/// Stringify Value to JSON
pub struct JsonStringifyNode;

impl Node for JsonStringifyNode {
    fn identifier(&self) -> &str {
        "transform.json_stringify"
    }

    fn title(&self) -> &str {
        "Stringify JSON"
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("value")]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("json")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        let value = ctx.read_input(0);

        let json_str = serde_json::to_string_pretty(&value.to_plain_json())
            .map_err(|e| NodeError::ExecutionFailed(format!("JSON stringify error: {}", e)))?;

        ctx.write_output(0, Value::String(json_str));
        Ok(())
    }
}

pub struct JsonStringifyNodeFactory;

impl NodeFactory for JsonStringifyNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(JsonStringifyNode))
    }

    fn node_type(&self) -> &str {
        "transform.json_stringify"
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: "Convert value to JSON string".to_string(),
            category: "transform".to_string(),
            inputs: vec![PortDefinition::new("value", "Any value")],
            outputs: vec![PortDefinition::new("json", "Pretty printed JSON")],
        }
    }
}
