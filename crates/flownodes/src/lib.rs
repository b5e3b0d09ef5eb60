//! Standard node library
//!
//! Collection of built-in nodes for common operations

mod control;
mod debug;
mod math;
mod transform;
mod value;

pub use control::{BranchNode, SequenceNode, StartNode};
pub use debug::{DebugNode, PrintNode};
pub use math::{BinaryOpNode, MathOp};
pub use transform::{JsonParseNode, JsonStringifyNode};
pub use value::{ConstantNode, GetVariableNode, SetVariableNode};

use flowcore::WorkflowError;
use flowruntime::NodeRegistry;
use std::rc::Rc;

/// Register all standard nodes with a registry
pub fn register_all(registry: &mut NodeRegistry) -> Result<(), WorkflowError> {
    registry.register(Rc::new(debug::DebugNodeFactory))?;
    registry.register(Rc::new(debug::PrintNodeFactory))?;
    registry.register(Rc::new(transform::JsonParseNodeFactory))?;
    registry.register(Rc::new(transform::JsonStringifyNodeFactory))?;
    registry.register(Rc::new(value::ConstantNodeFactory))?;
    registry.register(Rc::new(value::GetVariableNodeFactory))?;
    registry.register(Rc::new(value::SetVariableNodeFactory))?;
    registry.register(Rc::new(control::StartNodeFactory))?;
    registry.register(Rc::new(control::BranchNodeFactory))?;
    registry.register(Rc::new(control::SequenceNodeFactory))?;
    for op in MathOp::ALL {
        registry.register(Rc::new(math::BinaryOpNodeFactory::new(op)))?;
    }
    Ok(())
}
