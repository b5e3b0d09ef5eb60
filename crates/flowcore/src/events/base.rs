use crate::{AlgorithmMode, ConnectionId, NodeId, PortKind, PortRef};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Notifications a flow publishes after it changed or a node reported
/// something. Listeners observe, they cannot veto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FlowEvent {
    NodeAdded {
        node: NodeId,
        uuid: Uuid,
        identifier: String,
    },
    NodeRemoved {
        node: NodeId,
        uuid: Uuid,
    },
    ConnectionAdded {
        connection: ConnectionId,
        kind: PortKind,
        from: PortRef,
        to: PortRef,
    },
    ConnectionRemoved {
        connection: ConnectionId,
        kind: PortKind,
        from: PortRef,
        to: PortRef,
    },
    AlgorithmModeChanged {
        mode: AlgorithmMode,
    },
    /// A script variable was set through a flow
    VariableChanged {
        name: String,
    },
    NodeFailed {
        node: NodeId,
        title: String,
        error: String,
    },
    NodeLog {
        node: NodeId,
        level: LogLevel,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Receives flow events synchronously, after the mutation happened
pub trait FlowListener {
    fn on_event(&self, event: &FlowEvent);
}

/// A flow event stamped with the time it was published
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub event: FlowEvent,
    pub timestamp: DateTime<Utc>,
}

/// Rebroadcasts flow events to any number of decoupled subscribers
pub struct EventBus {
    sender: broadcast::Sender<TimestampedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: FlowEvent) {
        // no subscribers is fine
        let _ = self.sender.send(TimestampedEvent {
            event,
            timestamp: Utc::now(),
        });
    }
}

impl FlowListener for EventBus {
    fn on_event(&self, event: &FlowEvent) {
        self.emit(event.clone());
    }
}
