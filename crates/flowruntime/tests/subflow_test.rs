mod common;

use common::{calls, pass, source, sum, Call, Calls, Probe};
use flowcore::{
    AlgorithmMode, FlowEvent, NodeContext, NodeId, PortRef, PortSpec, Value, WorkflowError,
};
use flowruntime::{Flow, NodeMetadata, Session, SessionConfig, SharedSubflow};

fn session(mode: AlgorithmMode) -> Session {
    Session::with_config(SessionConfig {
        default_mode: mode,
        ..SessionConfig::default()
    })
}

fn call_node(session: &Session, name: &str) -> Box<dyn flowcore::Node> {
    session
        .registry()
        .create_node(&format!("subflow.{}", name))
        .unwrap()
}

/// x -> (b, c) -> d = b + c -> y
fn doubling_subflow(session: &mut Session, join: &Calls) -> SharedSubflow {
    let subflow = session.create_subflow("double").unwrap();
    {
        let mut sub = subflow.borrow_mut();
        sub.add_parameter(PortSpec::data("x"));
        sub.add_return(PortSpec::data("y"));
        let (input, output) = (sub.input_node(), sub.output_node());
        let flow = sub.flow_mut();
        let branch = calls();
        let b = flow.add_node(pass(&branch));
        let c = flow.add_node(pass(&branch));
        let d = flow.add_node(sum(join));
        flow.connect(PortRef::output(input, 0), PortRef::input(b, 0)).unwrap();
        flow.connect(PortRef::output(input, 0), PortRef::input(c, 0)).unwrap();
        flow.connect(PortRef::output(b, 0), PortRef::input(d, 0)).unwrap();
        flow.connect(PortRef::output(c, 0), PortRef::input(d, 1)).unwrap();
        flow.connect(PortRef::output(d, 0), PortRef::input(output, 0)).unwrap();
    }
    subflow
}

fn caller_flow(session: &Session, name: &str, sink: &Calls) -> (Flow, NodeId, NodeId) {
    let mut flow = session.create_flow();
    let src = flow.add_node(source());
    let call = flow.add_node(call_node(session, name));
    let out = flow.add_node(pass(sink));
    flow.connect(PortRef::output(src, 0), PortRef::input(call, 0)).unwrap();
    flow.connect(PortRef::output(call, 0), PortRef::input(out, 0)).unwrap();
    sink.borrow_mut().clear();
    (flow, src, call)
}

#[test]
fn test_subflow_joins_once_per_call() {
    for mode in [AlgorithmMode::Data, AlgorithmMode::DataOptimized] {
        let mut session = session(mode);
        let (join, sink) = (calls(), calls());
        doubling_subflow(&mut session, &join);
        let (mut flow, src, call) = caller_flow(&session, "double", &sink);
        join.borrow_mut().clear();

        flow.write_output(src, 0, Value::Number(3.0));

        assert_eq!(
            *sink.borrow(),
            vec![Call {
                input: Some(0),
                values: vec![Value::Number(6.0)],
            }],
            "mode {}",
            mode
        );
        assert_eq!(flow.output_value(call, 0), Value::Number(6.0));
        let expected_joins = if mode == AlgorithmMode::DataOptimized { 1 } else { 2 };
        assert_eq!(join.borrow().len(), expected_joins);
    }
}

#[test]
fn test_unchanged_returns_are_not_forwarded() {
    for mode in [AlgorithmMode::Data, AlgorithmMode::DataOptimized] {
        let mut session = session(mode);
        let (join, sink) = (calls(), calls());
        doubling_subflow(&mut session, &join);
        let (mut flow, src, call) = caller_flow(&session, "double", &sink);
        join.borrow_mut().clear();

        flow.write_output(src, 0, Value::Number(3.0));
        flow.write_output(src, 0, Value::Number(3.0));
        assert_eq!(sink.borrow().len(), 1, "mode {}", mode);
        // the sub-flow still ran for both calls
        let joins_per_call = if mode == AlgorithmMode::DataOptimized { 1 } else { 2 };
        assert_eq!(join.borrow().len(), 2 * joins_per_call);

        flow.write_output(src, 0, Value::Number(4.0));
        assert_eq!(sink.borrow().len(), 2);
        assert_eq!(sink.borrow()[1].values, vec![Value::Number(8.0)]);
        assert_eq!(flow.output_value(call, 0), Value::Number(8.0));
    }
}

#[test]
fn test_call_node_ports_mirror_the_subflow() {
    let mut session = session(AlgorithmMode::Data);
    let join = calls();
    let subflow = doubling_subflow(&mut session, &join);
    let mut flow = session.create_flow();
    let call = flow.add_node(call_node(&session, "double"));

    let entry = flow.node(call).unwrap();
    assert_eq!(entry.identifier(), "subflow.double");
    assert_eq!(entry.inputs().len(), 1);
    assert_eq!(entry.inputs()[0].label(), "x");
    assert_eq!(entry.outputs()[0].label(), "y");

    let metadata = session.registry().get_metadata("subflow.double").unwrap();
    assert_eq!(metadata.category, "subflow");
    assert_eq!(metadata.inputs.len(), 1);
    assert_eq!(subflow.borrow().call_identifier(), "subflow.double");
    assert!(matches!(
        session.create_subflow("double"),
        Err(WorkflowError::DuplicateIdentifier(_))
    ));
}

#[test]
fn test_nested_calls_track_depth() {
    let mut session = session(AlgorithmMode::DataOptimized);

    let inner = session.create_subflow("inner").unwrap();
    {
        let mut sub = inner.borrow_mut();
        sub.add_parameter(PortSpec::data("x"));
        sub.add_return(PortSpec::data("depth"));
        let (input, output) = (sub.input_node(), sub.output_node());
        let flow = sub.flow_mut();
        let probe = Probe::new("test.depth")
            .input(PortSpec::data("x"))
            .output(PortSpec::data("depth"))
            .run(|ctx, _, _| {
                let depth = ctx.call_depth() as f64;
                ctx.write_output(0, Value::Number(depth));
                Ok(())
            })
            .boxed();
        let probe = flow.add_node(probe);
        flow.connect(PortRef::output(input, 0), PortRef::input(probe, 0)).unwrap();
        flow.connect(PortRef::output(probe, 0), PortRef::input(output, 0)).unwrap();
    }

    let outer = session.create_subflow("outer").unwrap();
    {
        let inner_call = call_node(&session, "inner");
        let mut sub = outer.borrow_mut();
        sub.add_parameter(PortSpec::data("x"));
        sub.add_return(PortSpec::data("depth"));
        let (input, output) = (sub.input_node(), sub.output_node());
        let flow = sub.flow_mut();
        let call = flow.add_node(inner_call);
        flow.connect(PortRef::output(input, 0), PortRef::input(call, 0)).unwrap();
        flow.connect(PortRef::output(call, 0), PortRef::input(output, 0)).unwrap();
    }

    let sink = calls();
    let (mut flow, src, _) = caller_flow(&session, "outer", &sink);
    flow.write_output(src, 0, Value::Number(1.0));

    assert_eq!(sink.borrow().last().unwrap().values, vec![Value::Number(2.0)]);
    assert_eq!(flow.call_depth(), 0);
    assert!(inner.borrow().flow().call_frame().is_none());
    assert!(outer.borrow().flow().call_frame().is_none());
}

#[test]
fn test_recursive_call_fails_without_aborting_the_caller() {
    let mut session = session(AlgorithmMode::Data);
    let subflow = session.create_subflow("loop").unwrap();
    {
        let self_call = call_node(&session, "loop");
        let mut sub = subflow.borrow_mut();
        sub.add_parameter(PortSpec::data("x"));
        sub.add_return(PortSpec::data("y"));
        let (input, output) = (sub.input_node(), sub.output_node());
        let flow = sub.flow_mut();
        let call = flow.add_node(self_call);
        flow.add_input(call, PortSpec::data("x"));
        flow.add_output(call, PortSpec::data("y"));
        flow.connect(PortRef::output(input, 0), PortRef::input(call, 0)).unwrap();
        flow.connect(PortRef::output(call, 0), PortRef::input(output, 0)).unwrap();
    }

    let sink = calls();
    let (mut flow, src, _) = caller_flow(&session, "loop", &sink);
    let mut events = session.subscribe_events();

    flow.write_output(src, 0, Value::Number(1.0));

    assert_eq!(sink.borrow().len(), 1);
    let mut failures = Vec::new();
    while let Ok(received) = events.try_recv() {
        if let FlowEvent::NodeFailed { error, .. } = received.event {
            failures.push(error);
        }
    }
    assert_eq!(failures.len(), 1);
    assert!(failures[0].contains("already running"));
}

#[test]
fn test_exec_returns_fire_after_data_returns() {
    let mut session = session(AlgorithmMode::Data);
    let subflow = session.create_subflow("gate").unwrap();
    {
        let mut sub = subflow.borrow_mut();
        sub.add_parameter(PortSpec::exec("run"));
        sub.add_parameter(PortSpec::data("x"));
        sub.add_return(PortSpec::exec("done"));
        sub.add_return(PortSpec::data("y"));
        let (input, output) = (sub.input_node(), sub.output_node());
        let flow = sub.flow_mut();
        let step = Probe::new("test.step")
            .input(PortSpec::exec("in"))
            .input(PortSpec::data("x"))
            .output(PortSpec::exec("next"))
            .output(PortSpec::data("y"))
            .run(|ctx, input, values| {
                if input == Some(0) {
                    let x = values[0].as_f64().unwrap_or(0.0);
                    ctx.write_output(1, Value::Number(x * 10.0));
                    ctx.fire_output(0);
                }
                Ok(())
            })
            .boxed();
        let step = flow.add_node(step);
        flow.connect(PortRef::output(input, 0), PortRef::input(step, 0)).unwrap();
        flow.connect(PortRef::output(input, 1), PortRef::input(step, 1)).unwrap();
        flow.connect(PortRef::output(step, 0), PortRef::input(output, 0)).unwrap();
        flow.connect(PortRef::output(step, 1), PortRef::input(output, 1)).unwrap();
    }

    let mut flow = session.create_flow();
    let trigger = flow.add_node(Probe::new("test.trigger").output(PortSpec::exec("go")).boxed());
    let src = flow.add_node(source());
    let call = flow.add_node(call_node(&session, "gate"));
    let printed = calls();
    let printer = flow.add_node(
        Probe::new("test.printer")
            .input(PortSpec::exec("in"))
            .input(PortSpec::data("value"))
            .record(&printed)
            .boxed(),
    );
    flow.connect(PortRef::output(trigger, 0), PortRef::input(call, 0)).unwrap();
    flow.connect(PortRef::output(src, 0), PortRef::input(call, 1)).unwrap();
    flow.connect(PortRef::output(call, 0), PortRef::input(printer, 0)).unwrap();
    flow.connect(PortRef::output(call, 1), PortRef::input(printer, 1)).unwrap();

    flow.write_output(src, 0, Value::Number(4.0));
    printed.borrow_mut().clear();
    flow.fire_output(trigger, 0);

    assert_eq!(
        *printed.borrow(),
        vec![Call {
            input: Some(0),
            values: vec![Value::Number(40.0)],
        }]
    );
}

#[test]
fn test_sync_callers_follows_parameter_edits() {
    let mut session = session(AlgorithmMode::Data);
    let subflow = session.create_subflow("shape").unwrap();
    {
        let mut sub = subflow.borrow_mut();
        sub.add_parameter(PortSpec::data("a"));
        sub.add_parameter(PortSpec::data("b"));
        sub.add_return(PortSpec::data("r"));
    }
    let mut flow = session.create_flow();
    let src = flow.add_node(source());
    let call = flow.add_node(call_node(&session, "shape"));
    let connection = flow.connect(PortRef::output(src, 0), PortRef::input(call, 1)).unwrap();

    {
        let mut sub = subflow.borrow_mut();
        assert!(sub.remove_parameter(0));
        sub.add_parameter(PortSpec::exec("go"));
        sub.add_return(PortSpec::data("r2"));
    }
    assert_eq!(subflow.borrow().sync_callers(&mut flow), 1);

    let entry = flow.node(call).unwrap();
    let inputs: Vec<&str> = entry.inputs().iter().map(|p| p.label()).collect();
    let outputs: Vec<&str> = entry.outputs().iter().map(|p| p.label()).collect();
    assert_eq!(inputs, vec!["b", "go"]);
    assert_eq!(outputs, vec!["r", "r2"]);
    assert_eq!(flow.connection(connection).unwrap().to, PortRef::input(call, 0));
}

#[test]
fn test_flows_with_call_nodes_reload_through_the_session() {
    let mut session = session(AlgorithmMode::DataOptimized);
    let join = calls();
    doubling_subflow(&mut session, &join);
    let sink = calls();
    let registered = sink.clone();
    session
        .registry_mut()
        .register_fn("test.pass", NodeMetadata::default(), move || pass(&registered))
        .unwrap();
    session
        .registry_mut()
        .register_fn("test.source", NodeMetadata::default(), source)
        .unwrap();

    let (flow, _, _) = caller_flow(&session, "double", &sink);
    let mut reloaded = session.load_flow(&flow.to_data()).unwrap();
    let ids: Vec<_> = reloaded.nodes().collect();
    reloaded.write_output(ids[0], 0, Value::Number(5.0));
    assert_eq!(reloaded.output_value(ids[2], 0), Value::Number(10.0));

    assert!(session.remove_subflow("double"));
    assert!(!session.registry().contains("subflow.double"));
    assert!(matches!(
        session.load_flow(&flow.to_data()),
        Err(WorkflowError::UnknownNodeType(_))
    ));
}
