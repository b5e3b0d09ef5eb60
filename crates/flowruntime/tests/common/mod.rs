#![allow(dead_code)]

use flowcore::{FlowEvent, FlowListener, Node, NodeContext, NodeError, PortKind, PortSpec, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// One recorded `on_update` call: the trigger and the data inputs as read
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub input: Option<usize>,
    pub values: Vec<Value>,
}

pub type Calls = Rc<RefCell<Vec<Call>>>;

type Behavior = Box<dyn FnMut(&mut dyn NodeContext, Option<usize>, &[Value]) -> Result<(), NodeError>>;

/// Configurable test node that records every update it gets
pub struct Probe {
    identifier: &'static str,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
    calls: Calls,
    behavior: Behavior,
    block_initial: bool,
}

impl Probe {
    pub fn new(identifier: &'static str) -> Self {
        Self {
            identifier,
            inputs: Vec::new(),
            outputs: Vec::new(),
            calls: Calls::default(),
            behavior: Box::new(|_, _, _| Ok(())),
            block_initial: false,
        }
    }

    pub fn input(mut self, spec: PortSpec) -> Self {
        self.inputs.push(spec);
        self
    }

    pub fn output(mut self, spec: PortSpec) -> Self {
        self.outputs.push(spec);
        self
    }

    pub fn record(mut self, calls: &Calls) -> Self {
        self.calls = Rc::clone(calls);
        self
    }

    pub fn blocking_initial_updates(mut self) -> Self {
        self.block_initial = true;
        self
    }

    pub fn run<F>(mut self, behavior: F) -> Self
    where
        F: FnMut(&mut dyn NodeContext, Option<usize>, &[Value]) -> Result<(), NodeError> + 'static,
    {
        self.behavior = Box::new(behavior);
        self
    }

    pub fn boxed(self) -> Box<dyn Node> {
        Box::new(self)
    }
}

impl Node for Probe {
    fn identifier(&self) -> &str {
        self.identifier
    }

    fn init_inputs(&self) -> Vec<PortSpec> {
        self.inputs.clone()
    }

    fn init_outputs(&self) -> Vec<PortSpec> {
        self.outputs.clone()
    }

    fn blocks_initial_updates(&self) -> bool {
        self.block_initial
    }

    fn on_update(&mut self, ctx: &mut dyn NodeContext, input: Option<usize>) -> Result<(), NodeError> {
        let mut values = Vec::new();
        for index in 0..ctx.input_count() {
            if ctx.input_kind(index) == Some(PortKind::Data) {
                values.push(ctx.read_input(index));
            }
        }
        self.calls.borrow_mut().push(Call {
            input,
            values: values.clone(),
        });
        (self.behavior)(ctx, input, &values)
    }
}

fn number(value: &Value) -> f64 {
    value.as_f64().unwrap_or(0.0)
}

/// One data input, one data output, copies the input
pub fn pass(calls: &Calls) -> Box<dyn Node> {
    Probe::new("test.pass")
        .input(PortSpec::data("in"))
        .output(PortSpec::data("out"))
        .record(calls)
        .run(|ctx, _, values| {
            ctx.write_output(0, values[0].clone());
            Ok(())
        })
        .boxed()
}

/// Like [`pass`] with a default on the input
pub fn pass_with_default(calls: &Calls, default: f64) -> Box<dyn Node> {
    Probe::new("test.pass")
        .input(PortSpec::data("in").with_default(default))
        .output(PortSpec::data("out"))
        .record(calls)
        .run(|ctx, _, values| {
            ctx.write_output(0, values[0].clone());
            Ok(())
        })
        .boxed()
}

/// Two data inputs, one data output with their sum
pub fn sum(calls: &Calls) -> Box<dyn Node> {
    Probe::new("test.sum")
        .input(PortSpec::data("a").with_default(0.0))
        .input(PortSpec::data("b").with_default(0.0))
        .output(PortSpec::data("sum"))
        .record(calls)
        .run(|ctx, _, values| {
            ctx.write_output(0, Value::Number(number(&values[0]) + number(&values[1])));
            Ok(())
        })
        .boxed()
}

/// No inputs, one data output written from outside
pub fn source() -> Box<dyn Node> {
    Probe::new("test.source")
        .output(PortSpec::data("out"))
        .boxed()
}

/// Records every flow event
#[derive(Default)]
pub struct EventLog {
    pub events: RefCell<Vec<FlowEvent>>,
}

impl FlowListener for EventLog {
    fn on_event(&self, event: &FlowEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

pub fn calls() -> Calls {
    Calls::default()
}
