use flowcore::{
    AlgorithmMode, ConnectionId, EventBus, FlowEvent, FlowListener, LogLevel, NodeId, PortKind,
    PortRef,
};

#[test]
fn test_every_subscriber_sees_every_event() {
    let bus = EventBus::new(16);
    let mut first = bus.subscribe();
    let mut second = bus.subscribe();

    bus.emit(FlowEvent::NodeLog {
        node: NodeId::new(1),
        level: LogLevel::Info,
        message: "hello".to_string(),
    });
    bus.on_event(&FlowEvent::AlgorithmModeChanged {
        mode: AlgorithmMode::DataOptimized,
    });

    for rx in [&mut first, &mut second] {
        let a = rx.try_recv().unwrap();
        let b = rx.try_recv().unwrap();
        assert!(matches!(a.event, FlowEvent::NodeLog { .. }));
        assert!(a.timestamp <= b.timestamp);
        assert!(rx.try_recv().is_err());
    }
}

#[test]
fn test_emit_without_subscribers() {
    let bus = EventBus::new(1);
    bus.emit(FlowEvent::NodeRemoved {
        node: NodeId::new(0),
        uuid: uuid::Uuid::new_v4(),
    });
    let mut late = bus.subscribe();
    assert!(late.try_recv().is_err());
}

#[test]
fn test_event_json_shape() {
    let event = FlowEvent::ConnectionAdded {
        connection: ConnectionId::new(4),
        kind: PortKind::Exec,
        from: PortRef::output(NodeId::new(0), 1),
        to: PortRef::input(NodeId::new(2), 0),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "ConnectionAdded");
    assert_eq!(json["kind"], "exec");
    assert_eq!(json["to"]["direction"], "input");

    let back: FlowEvent = serde_json::from_value(json).unwrap();
    assert_eq!(back, event);
}
