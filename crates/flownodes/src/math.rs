use flowcore::{Node, NodeContext, NodeError, PortSpec, Value};
use flowruntime::{NodeFactory, NodeMetadata, PortDefinition};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

impl MathOp {
    pub const ALL: [MathOp; 4] = [MathOp::Add, MathOp::Subtract, MathOp::Multiply, MathOp::Divide];

    pub fn identifier(self) -> &'static str {
        match self {
            MathOp::Add => "math.add",
            MathOp::Subtract => "math.subtract",
            MathOp::Multiply => "math.multiply",
            MathOp::Divide => "math.divide",
        }
    }

    fn title(self) -> &'static str {
        match self {
            MathOp::Add => "Add",
            MathOp::Subtract => "Subtract",
            MathOp::Multiply => "Multiply",
            MathOp::Divide => "Divide",
        }
    }

    fn legacy_identifier(self) -> &'static str {
        match self {
            MathOp::Add => "Add_Node",
            MathOp::Subtract => "Subtract_Node",
            MathOp::Multiply => "Multiply_Node",
            MathOp::Divide => "Divide_Node",
        }
    }

    fn apply(self, a: f64, b: f64) -> Result<f64, NodeError> {
        match self {
            MathOp::Add => Ok(a + b),
            MathOp::Subtract => Ok(a - b),
            MathOp::Multiply => Ok(a * b),
            MathOp::Divide if b == 0.0 => {
                Err(NodeError::ExecutionFailed("division by zero".to_string()))
            }
            MathOp::Divide => Ok(a / b),
        }
    }
}

/// Passive two-operand arithmetic. Unconnected operands default to 0,
/// except the divisor which defaults to 1.
pub struct BinaryOpNode {
    op: MathOp,
}

impl BinaryOpNode {
    pub fn new(op: MathOp) -> Self {
        Self { op }
    }
}

impl Node for BinaryOpNode {
    fn identifier(&self) -> &str {
        self.op.identifier()
    }

    fn title(&self) -> &str {
        self.op.title()
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        let identity = if self.op == MathOp::Divide { 1.0 } else { 0.0 };
        vec![
            PortSpec::data("a").with_default(0.0),
            PortSpec::data("b").with_default(identity),
        ]
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        vec![PortSpec::data("result")]
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, _input: Option<usize>) -> Result<(), NodeError> {
        let a = ctx.require_number(0)?;
        let b = ctx.require_number(1)?;
        let result = self.op.apply(a, b)?;
        ctx.write_output(0, Value::Number(result));
        Ok(())
    }
}

pub struct BinaryOpNodeFactory {
    op: MathOp,
}

impl BinaryOpNodeFactory {
    pub fn new(op: MathOp) -> Self {
        Self { op }
    }
}

impl NodeFactory for BinaryOpNodeFactory {
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok(Box::new(BinaryOpNode::new(self.op)))
    }

    fn node_type(&self) -> &str {
        self.op.identifier()
    }

    fn legacy_identifiers(&self) -> Vec<String> {
        vec![self.op.legacy_identifier().to_string()]
    }

    fn metadata(&self) -> NodeMetadata {
        NodeMetadata {
            description: format!("{} two numbers", self.op.title()),
            category: "math".to_string(),
            inputs: vec![
                PortDefinition::new("a", "Left operand"),
                PortDefinition::new("b", "Right operand"),
            ],
            outputs: vec![PortDefinition::new("result", "Result")],
        }
    }
}
