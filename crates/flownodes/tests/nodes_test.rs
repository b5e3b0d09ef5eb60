use flowcore::{AlgorithmMode, FlowData, FlowEvent, NodeData, PortRef, TimestampedEvent, Value};
use flownodes::{
    register_all, BinaryOpNode, BranchNode, ConstantNode, JsonParseNode, JsonStringifyNode, MathOp,
    PrintNode, SequenceNode, StartNode,
};
use flowruntime::{Session, SessionConfig};
use tokio::sync::broadcast::Receiver;

fn session(mode: AlgorithmMode) -> Session {
    let mut session = Session::with_config(SessionConfig {
        default_mode: mode,
        ..SessionConfig::default()
    });
    register_all(session.registry_mut()).unwrap();
    session
}

fn drain(events: &mut Receiver<TimestampedEvent>) -> Vec<FlowEvent> {
    let mut received = Vec::new();
    while let Ok(event) = events.try_recv() {
        received.push(event.event);
    }
    received
}

fn logs(events: &[FlowEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::NodeLog { message, .. } => Some(message.clone()),
            _ => None,
        })
        .collect()
}

fn failures(events: &[FlowEvent]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            FlowEvent::NodeFailed { error, .. } => Some(error.clone()),
            _ => None,
        })
        .collect()
}

#[test]
fn test_register_all_lists_standard_nodes() {
    let mut session = session(AlgorithmMode::Data);
    let types = session.registry().list_node_types();
    for expected in [
        "control.branch",
        "control.sequence",
        "control.start",
        "debug.log",
        "debug.print",
        "math.add",
        "math.divide",
        "transform.json_parse",
        "value.constant",
        "value.get_var",
    ] {
        assert!(types.iter().any(|t| t == expected), "missing {}", expected);
    }
    assert_eq!(
        session.registry().get_metadata("math.multiply").unwrap().category,
        "math"
    );
    assert!(register_all(session.registry_mut()).is_err());
}

#[test]
fn test_arithmetic_chain() {
    for mode in [AlgorithmMode::Data, AlgorithmMode::Exec, AlgorithmMode::DataOptimized] {
        let session = session(mode);
        let mut flow = session.create_flow();
        let two = flow.add_node(Box::new(ConstantNode::new(2.0)));
        let three = flow.add_node(Box::new(ConstantNode::new(3.0)));
        let four = flow.add_node(Box::new(ConstantNode::new(4.0)));
        let add = flow.add_node(Box::new(BinaryOpNode::new(MathOp::Add)));
        let mul = flow.add_node(Box::new(BinaryOpNode::new(MathOp::Multiply)));
        flow.connect(PortRef::output(two, 0), PortRef::input(add, 0)).unwrap();
        flow.connect(PortRef::output(three, 0), PortRef::input(add, 1)).unwrap();
        flow.connect(PortRef::output(add, 0), PortRef::input(mul, 0)).unwrap();
        flow.connect(PortRef::output(four, 0), PortRef::input(mul, 1)).unwrap();

        for constant in [two, three, four] {
            flow.update_node(constant, None);
        }
        if mode == AlgorithmMode::Exec {
            // nothing is pushed, ask the end of the chain
            flow.update_node(mul, None);
        }
        assert_eq!(flow.output_value(mul, 0), Value::Number(20.0), "mode {}", mode);
    }
}

#[test]
fn test_math_errors_are_reported() {
    let session = session(AlgorithmMode::Data);
    let mut events = session.subscribe_events();
    let mut flow = session.create_flow();
    let text = flow.add_node(Box::new(ConstantNode::new("x")));
    let zero = flow.add_node(Box::new(ConstantNode::new(0.0)));
    let add = flow.add_node(Box::new(BinaryOpNode::new(MathOp::Add)));
    let div = flow.add_node(Box::new(BinaryOpNode::new(MathOp::Divide)));
    flow.connect(PortRef::output(text, 0), PortRef::input(add, 0)).unwrap();
    flow.connect(PortRef::output(zero, 0), PortRef::input(div, 1)).unwrap();
    drain(&mut events);

    flow.update_node(text, None);
    flow.update_node(zero, None);

    let failed = failures(&drain(&mut events));
    assert_eq!(failed.len(), 2);
    assert!(failed[0].contains("expected number, got string"));
    assert!(failed[1].contains("division by zero"));
    assert_eq!(flow.output_value(div, 0), Value::Null);
}

#[test]
fn test_json_parse_and_stringify() {
    let session = session(AlgorithmMode::DataOptimized);
    let mut flow = session.create_flow();
    let text = flow.add_node(Box::new(ConstantNode::new(r#"{"a": [1, 2]}"#)));
    let parse = flow.add_node(Box::new(JsonParseNode));
    let stringify = flow.add_node(Box::new(JsonStringifyNode));
    flow.connect(PortRef::output(text, 0), PortRef::input(parse, 0)).unwrap();
    flow.connect(PortRef::output(parse, 0), PortRef::input(stringify, 0)).unwrap();

    flow.update_node(text, None);

    assert_eq!(
        flow.output_value(parse, 0),
        Value::Json(serde_json::json!({ "a": [1, 2] }))
    );
    let Value::String(json) = flow.output_value(stringify, 0) else {
        panic!("expected a string");
    };
    let reparsed: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(reparsed, serde_json::json!({ "a": [1, 2] }));
}

#[test]
fn test_branch_and_sequence_route_exec_signals() {
    let session = session(AlgorithmMode::Exec);
    let mut events = session.subscribe_events();
    let mut flow = session.create_flow();
    let start = flow.add_node(Box::new(StartNode));
    let condition = flow.add_node(Box::new(ConstantNode::new(false)));
    let branch = flow.add_node(Box::new(BranchNode));
    let sequence = flow.add_node(Box::new(SequenceNode::default()));
    let yes = flow.add_node(Box::new(PrintNode));
    let first = flow.add_node(Box::new(PrintNode));
    let second = flow.add_node(Box::new(PrintNode));
    let (m1, m2, m3) = (
        flow.add_node(Box::new(ConstantNode::new("yes"))),
        flow.add_node(Box::new(ConstantNode::new("first"))),
        flow.add_node(Box::new(ConstantNode::new("second"))),
    );

    flow.connect(PortRef::output(start, 0), PortRef::input(branch, 0)).unwrap();
    flow.connect(PortRef::output(condition, 0), PortRef::input(branch, 1)).unwrap();
    flow.connect(PortRef::output(branch, 0), PortRef::input(yes, 0)).unwrap();
    flow.connect(PortRef::output(branch, 1), PortRef::input(sequence, 0)).unwrap();
    flow.connect(PortRef::output(sequence, 0), PortRef::input(first, 0)).unwrap();
    flow.connect(PortRef::output(sequence, 1), PortRef::input(second, 0)).unwrap();
    flow.connect(PortRef::output(m1, 0), PortRef::input(yes, 1)).unwrap();
    flow.connect(PortRef::output(m2, 0), PortRef::input(first, 1)).unwrap();
    flow.connect(PortRef::output(m3, 0), PortRef::input(second, 1)).unwrap();
    drain(&mut events);

    flow.update_node(start, None);

    assert_eq!(logs(&drain(&mut events)), vec!["first", "second"]);
}

#[test]
fn test_variables_through_nodes() {
    let session = session(AlgorithmMode::Data);
    assert!(session
        .variables()
        .borrow_mut()
        .create("greeting", Value::from("hello")));

    let mut data = FlowData::new(AlgorithmMode::Data);
    let start = data.add_node(NodeData::new("control.start"));
    let value = data.add_node(NodeData::new("value.constant").with_state(serde_json::json!({
        "value": { "type": "String", "value": "bye" }
    })));
    let set = data.add_node(
        NodeData::new("value.set_var").with_state(serde_json::json!({ "name": "greeting" })),
    );
    let get = data.add_node(
        NodeData::new("value.get_var").with_state(serde_json::json!({ "name": "greeting" })),
    );
    data.connect(start, 0, set, 0);
    data.connect(value, 0, set, 1);

    let mut flow = session.load_flow(&data).unwrap();
    let ids: Vec<_> = flow.nodes().collect();
    flow.update_node(ids[get], None);
    assert_eq!(flow.output_value(ids[get], 0), Value::from("hello"));

    flow.update_node(ids[value], None);
    flow.update_node(ids[start], None);
    // the getter follows the write on its own
    assert_eq!(flow.output_value(ids[get], 0), Value::from("bye"));
    assert_eq!(
        session.variables().borrow().get("greeting"),
        Some(&Value::from("bye"))
    );
}

#[test]
fn test_legacy_identifiers_load() {
    let session = session(AlgorithmMode::Data);
    let json = r#"{
        "algorithm_mode": "data flow",
        "nodes": [
            { "identifier": "Val_Node",
              "state": { "value": { "type": "Number", "value": 5.0 } } },
            { "identifier": "Add_Node" },
            { "identifier": "Log_Node" }
        ],
        "connections": [
            { "from_node": 0, "from_output": 0, "to_node": 1, "to_input": 0 },
            { "from_node": 1, "from_output": 0, "to_node": 2, "to_input": 0 }
        ]
    }"#;
    let mut events = session.subscribe_events();
    let mut flow = session.load_flow_json(json).unwrap();
    let ids: Vec<_> = flow.nodes().collect();
    assert_eq!(flow.node(ids[0]).unwrap().identifier(), "value.constant");
    assert_eq!(flow.node(ids[1]).unwrap().identifier(), "math.add");
    drain(&mut events);

    flow.update_node(ids[0], None);
    assert_eq!(flow.output_value(ids[2], 0), Value::Number(5.0));
    assert_eq!(logs(&drain(&mut events)), vec!["DEBUG: 5.0"]);
}
