use crate::{NodeId, Value};

/// One sub-flow invocation.
///
/// The calling node builds a frame, hands it to the sub-flow for the length
/// of the nested run and gets it back afterwards. Values the nested output
/// proxy produces are held here until the run is over, so the caller sees
/// each return exactly once per call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallFrame {
    caller: NodeId,
    depth: usize,
    args: Vec<Value>,
    trigger: Option<usize>,
    returns: Vec<Option<Value>>,
    fired: Vec<usize>,
}

impl CallFrame {
    pub fn new(caller: NodeId, depth: usize, args: Vec<Value>, trigger: Option<usize>) -> Self {
        Self {
            caller,
            depth,
            args,
            trigger,
            returns: Vec::new(),
            fired: Vec::new(),
        }
    }

    /// The node that issued the call, in the caller's flow
    pub fn caller(&self) -> NodeId {
        self.caller
    }

    /// 1 for a call issued from a top-level flow
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or_default()
    }

    /// Parameter whose signal started the call
    pub fn trigger(&self) -> Option<usize> {
        self.trigger
    }

    /// Hold a data return until the nested run settles
    pub fn hold(&mut self, index: usize, value: Value) {
        if self.returns.len() <= index {
            self.returns.resize(index + 1, None);
        }
        self.returns[index] = Some(value);
    }

    /// Record an exec return
    pub fn fire(&mut self, index: usize) {
        self.fired.push(index);
    }

    pub fn returns(&self) -> &[Option<Value>] {
        &self.returns
    }

    pub fn fired(&self) -> &[usize] {
        &self.fired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hold_overwrites_and_grows() {
        let mut frame = CallFrame::new(NodeId::new(3), 1, vec![Value::Number(1.0)], None);
        frame.hold(2, Value::Bool(true));
        frame.hold(2, Value::Bool(false));
        assert_eq!(frame.returns(), &[None, None, Some(Value::Bool(false))]);
        assert_eq!(frame.arg(0), Value::Number(1.0));
        assert_eq!(frame.arg(5), Value::Null);
    }
}
