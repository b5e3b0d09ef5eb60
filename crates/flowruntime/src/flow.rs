use crate::context::FlowNodeContext;
use crate::executor::{DataOptimizedExecutor, DefaultExecutor, Executor};
use flowcore::{
    AlgorithmMode, CallFrame, ConnectionId, Direction, FlowEvent, FlowListener, LogLevel, Node,
    NodeId, PortKind, PortRef, PortSpec, Value, Variables,
};
use petgraph::stable_graph::{EdgeIndex, NodeIndex, StableDiGraph};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Setup stages a node goes through before it takes part in propagation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Uninitialized,
    PortsConfigured,
    Live,
}

#[derive(Debug, Clone)]
pub struct InputPort {
    kind: PortKind,
    label: String,
    default: Value,
    received: Option<Value>,
    connection: Option<ConnectionId>,
    extra: serde_json::Map<String, serde_json::Value>,
}

impl InputPort {
    fn from_spec(spec: PortSpec) -> Self {
        Self {
            kind: spec.kind,
            label: spec.label,
            default: spec.default,
            received: None,
            connection: None,
            extra: serde_json::Map::new(),
        }
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Value reported while the input is not connected
    pub fn default(&self) -> &Value {
        &self.default
    }

    /// Last value pushed through the connection
    pub fn received(&self) -> Option<&Value> {
        self.received.as_ref()
    }

    pub fn connection(&self) -> Option<ConnectionId> {
        self.connection
    }

    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra
    }
}

#[derive(Debug, Clone)]
pub struct OutputPort {
    kind: PortKind,
    label: String,
    value: Value,
    connections: Vec<ConnectionId>,
}

impl OutputPort {
    fn from_spec(spec: PortSpec) -> Self {
        Self {
            kind: spec.kind,
            label: spec.label,
            value: Value::Null,
            connections: Vec::new(),
        }
    }

    pub fn kind(&self) -> PortKind {
        self.kind
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn connections(&self) -> &[ConnectionId] {
        &self.connections
    }
}

/// A node as stored in a flow: ports, flags and the behaviour object
pub struct NodeEntry {
    uuid: Uuid,
    identifier: String,
    title: String,
    inputs: Vec<InputPort>,
    outputs: Vec<OutputPort>,
    updates_blocked: bool,
    lifecycle: Lifecycle,
    behavior: Option<Box<dyn Node>>,
}

impl NodeEntry {
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn inputs(&self) -> &[InputPort] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputPort] {
        &self.outputs
    }

    pub fn updates_blocked(&self) -> bool {
        self.updates_blocked
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Nodes owning an exec port only react to exec signals
    pub fn is_active(&self) -> bool {
        self.inputs.iter().any(|p| p.kind == PortKind::Exec)
            || self.outputs.iter().any(|p| p.kind == PortKind::Exec)
    }

    pub(crate) fn behavior(&self) -> Option<&dyn Node> {
        self.behavior.as_deref()
    }
}

#[derive(Debug, Clone, Copy)]
struct ConnectionEntry {
    kind: PortKind,
    from_output: usize,
    to_input: usize,
}

/// Public view of one connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub id: ConnectionId,
    pub kind: PortKind,
    pub from: PortRef,
    pub to: PortRef,
}

fn nx(id: NodeId) -> NodeIndex {
    NodeIndex::new(id.index())
}

fn ex(id: ConnectionId) -> EdgeIndex {
    EdgeIndex::new(id.index())
}

/// A graph of nodes and connections plus the executor deciding how updates
/// travel through it.
///
/// The edge set of the underlying graph is the connection set, so the
/// node-to-successor adjacency the executors walk can never drift from it.
pub struct Flow {
    graph: StableDiGraph<NodeEntry, ConnectionEntry>,
    mode: AlgorithmMode,
    pending_mode: Option<AlgorithmMode>,
    executor: Rc<dyn Executor>,
    optimized: Rc<DataOptimizedExecutor>,
    depth: usize,
    topology_version: u64,
    listeners: Vec<Rc<dyn FlowListener>>,
    variables: Rc<RefCell<Variables>>,
    var_watchers: HashMap<String, Vec<NodeId>>,
    call_frame: Option<CallFrame>,
}

impl Flow {
    pub fn new(mode: AlgorithmMode) -> Self {
        Self::with_variables(mode, Rc::new(RefCell::new(Variables::new())))
    }

    /// Create a flow that shares a variable store with other flows
    pub fn with_variables(mode: AlgorithmMode, variables: Rc<RefCell<Variables>>) -> Self {
        let optimized = Rc::new(DataOptimizedExecutor::new());
        let executor = Self::executor_for(mode, &optimized);
        Self {
            graph: StableDiGraph::default(),
            mode,
            pending_mode: None,
            executor,
            optimized,
            depth: 0,
            topology_version: 0,
            listeners: Vec::new(),
            variables,
            var_watchers: HashMap::new(),
            call_frame: None,
        }
    }

    fn executor_for(mode: AlgorithmMode, optimized: &Rc<DataOptimizedExecutor>) -> Rc<dyn Executor> {
        match mode {
            AlgorithmMode::DataOptimized => Rc::clone(optimized) as Rc<dyn Executor>,
            AlgorithmMode::Data | AlgorithmMode::Exec => Rc::new(DefaultExecutor),
        }
    }

    pub fn algorithm_mode(&self) -> AlgorithmMode {
        self.mode
    }

    /// Swap the bound executor. Inside a running event the swap waits until
    /// the outermost primitive returns.
    pub fn set_algorithm_mode(&mut self, mode: AlgorithmMode) {
        if self.depth > 0 {
            debug!(%mode, "deferring algorithm mode change until the event ends");
            self.pending_mode = Some(mode);
            return;
        }
        self.apply_mode(mode);
    }

    fn apply_mode(&mut self, mode: AlgorithmMode) {
        if mode == self.mode {
            return;
        }
        info!(from = %self.mode, to = %mode, "algorithm mode changed");
        self.mode = mode;
        self.executor = Self::executor_for(mode, &self.optimized);
        self.notify(FlowEvent::AlgorithmModeChanged { mode });
    }

    /// The batching executor, bound while the flow is in `DataOptimized` mode
    pub fn optimized_executor(&self) -> &DataOptimizedExecutor {
        &self.optimized
    }

    /// Incremented by every structural edit
    pub fn topology_version(&self) -> u64 {
        self.topology_version
    }

    pub fn add_listener(&mut self, listener: Rc<dyn FlowListener>) {
        self.listeners.push(listener);
    }

    pub fn variables(&self) -> &Rc<RefCell<Variables>> {
        &self.variables
    }

    /// Set a script variable, then update every node of this flow that
    /// watches it. Returns `false` when the variable does not exist.
    pub fn set_var(&mut self, name: &str, value: Value) -> bool {
        let changed = self.variables.borrow_mut().set(name, value);
        if !changed {
            return false;
        }
        debug!(variable = name, "variable changed");
        self.notify(FlowEvent::VariableChanged {
            name: name.to_string(),
        });
        let watchers = self.var_watchers.get(name).cloned().unwrap_or_default();
        for node in watchers {
            self.update_node(node, None);
        }
        true
    }

    /// Update `node` whenever `name` is set through this flow. Watching
    /// twice is a no-op.
    pub fn watch_var(&mut self, node: NodeId, name: &str) -> bool {
        if !self.contains_node(node) {
            return false;
        }
        let watchers = self.var_watchers.entry(name.to_string()).or_default();
        if !watchers.contains(&node) {
            watchers.push(node);
        }
        true
    }

    pub fn unwatch_var(&mut self, node: NodeId, name: &str) -> bool {
        let Some(watchers) = self.var_watchers.get_mut(name) else {
            return false;
        };
        let before = watchers.len();
        watchers.retain(|w| *w != node);
        let removed = watchers.len() != before;
        if watchers.is_empty() {
            self.var_watchers.remove(name);
        }
        removed
    }

    pub fn var_watchers(&self, name: &str) -> &[NodeId] {
        self.var_watchers.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn notify(&self, event: FlowEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    // ------------------------------------------------------------------
    // queries

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn connection_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Live nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.graph.node_indices().map(|idx| NodeId::new(idx.index()))
    }

    pub fn node(&self, id: NodeId) -> Option<&NodeEntry> {
        self.graph.node_weight(nx(id))
    }

    fn entry_mut(&mut self, id: NodeId) -> Option<&mut NodeEntry> {
        self.graph.node_weight_mut(nx(id))
    }

    pub fn contains_node(&self, id: NodeId) -> bool {
        self.graph.contains_node(nx(id))
    }

    pub fn node_by_uuid(&self, uuid: Uuid) -> Option<NodeId> {
        self.graph
            .node_indices()
            .find(|idx| self.graph[*idx].uuid == uuid)
            .map(|idx| NodeId::new(idx.index()))
    }

    pub fn connections(&self) -> impl Iterator<Item = Connection> + '_ {
        self.graph
            .edge_indices()
            .filter_map(|e| self.connection(ConnectionId::new(e.index())))
    }

    pub fn connection(&self, id: ConnectionId) -> Option<Connection> {
        let edge = ex(id);
        let entry = self.graph.edge_weight(edge)?;
        let (from, to) = self.graph.edge_endpoints(edge)?;
        Some(Connection {
            id,
            kind: entry.kind,
            from: PortRef::output(NodeId::new(from.index()), entry.from_output),
            to: PortRef::input(NodeId::new(to.index()), entry.to_input),
        })
    }

    /// Direct successors, once per connection leaving the node
    pub fn successors(&self, id: NodeId) -> Vec<NodeId> {
        if !self.contains_node(id) {
            return Vec::new();
        }
        self.graph
            .neighbors_directed(nx(id), petgraph::Direction::Outgoing)
            .map(|idx| NodeId::new(idx.index()))
            .collect()
    }

    pub fn input_port(&self, node: NodeId, index: usize) -> Option<&InputPort> {
        self.node(node)?.inputs.get(index)
    }

    pub fn output_port(&self, node: NodeId, index: usize) -> Option<&OutputPort> {
        self.node(node)?.outputs.get(index)
    }

    /// Last value written to an output, `Null` for unknown ports
    pub fn output_value(&self, node: NodeId, index: usize) -> Value {
        self.output_port(node, index)
            .map(|p| p.value.clone())
            .unwrap_or_default()
    }

    pub fn set_input_default(&mut self, node: NodeId, index: usize, value: Value) -> bool {
        match self.entry_mut(node).and_then(|n| n.inputs.get_mut(index)) {
            Some(port) => {
                port.default = value;
                true
            }
            None => false,
        }
    }

    pub(crate) fn set_input_extra(
        &mut self,
        node: NodeId,
        index: usize,
        extra: serde_json::Map<String, serde_json::Value>,
    ) {
        if let Some(port) = self.entry_mut(node).and_then(|n| n.inputs.get_mut(index)) {
            port.extra = extra;
        }
    }

    pub fn set_updates_blocked(&mut self, node: NodeId, blocked: bool) -> bool {
        match self.entry_mut(node) {
            Some(entry) => {
                entry.updates_blocked = blocked;
                true
            }
            None => false,
        }
    }

    pub fn call_frame(&self) -> Option<&CallFrame> {
        self.call_frame.as_ref()
    }

    pub(crate) fn call_frame_mut(&mut self) -> Option<&mut CallFrame> {
        self.call_frame.as_mut()
    }

    pub fn call_depth(&self) -> usize {
        self.call_frame.as_ref().map_or(0, CallFrame::depth)
    }

    /// Install a call frame for a nested run, returning the one it replaces
    pub(crate) fn enter_call(&mut self, frame: CallFrame) -> Option<CallFrame> {
        self.call_frame.replace(frame)
    }

    pub(crate) fn exit_call(&mut self, previous: Option<CallFrame>) -> Option<CallFrame> {
        std::mem::replace(&mut self.call_frame, previous)
    }

    // ------------------------------------------------------------------
    // nodes

    /// Add a node with the ports it declares for itself
    pub fn add_node(&mut self, behavior: Box<dyn Node>) -> NodeId {
        let inputs = behavior.init_inputs();
        let outputs = behavior.init_outputs();
        self.add_node_with_ports(behavior, inputs, outputs)
    }

    /// Add a node with an explicit port layout, as when rebuilding a saved flow
    pub fn add_node_with_ports(
        &mut self,
        behavior: Box<dyn Node>,
        inputs: Vec<PortSpec>,
        outputs: Vec<PortSpec>,
    ) -> NodeId {
        let mut entry = NodeEntry {
            uuid: Uuid::new_v4(),
            identifier: behavior.identifier().to_string(),
            title: behavior.title().to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            updates_blocked: false,
            lifecycle: Lifecycle::Uninitialized,
            behavior: Some(behavior),
        };
        entry.inputs = inputs.into_iter().map(InputPort::from_spec).collect();
        entry.outputs = outputs.into_iter().map(OutputPort::from_spec).collect();
        entry.lifecycle = Lifecycle::PortsConfigured;

        let uuid = entry.uuid;
        let identifier = entry.identifier.clone();
        let id = NodeId::new(self.graph.add_node(entry).index());
        if let Some(entry) = self.entry_mut(id) {
            entry.lifecycle = Lifecycle::Live;
        }
        self.topology_version += 1;
        debug!(node = %id, %identifier, "node added");

        self.place(id);
        self.notify(FlowEvent::NodeAdded {
            node: id,
            uuid,
            identifier,
        });
        id
    }

    fn place(&mut self, node: NodeId) {
        let Some(mut behavior) = self.entry_mut(node).and_then(|n| n.behavior.take()) else {
            return;
        };
        behavior.on_placed(&mut FlowNodeContext::new(self, node));
        self.restore_behavior(node, behavior);
    }

    /// Sever every connection of the node, then remove it. The handle is
    /// dead afterwards; re-adding means creating a fresh node.
    pub fn remove_node(&mut self, node: NodeId) -> bool {
        let Some(entry) = self.node(node) else {
            return false;
        };
        let mut incident: Vec<ConnectionId> =
            entry.inputs.iter().filter_map(|p| p.connection).collect();
        for output in &entry.outputs {
            incident.extend(output.connections.iter().copied());
        }
        for connection in incident {
            self.remove_connection(connection);
        }

        if let Some(mut behavior) = self.entry_mut(node).and_then(|n| n.behavior.take()) {
            behavior.on_removed();
        }
        let Some(entry) = self.graph.remove_node(nx(node)) else {
            return false;
        };
        self.var_watchers.retain(|_, watchers| {
            watchers.retain(|w| *w != node);
            !watchers.is_empty()
        });
        self.topology_version += 1;
        debug!(%node, identifier = %entry.identifier, "node removed");
        self.notify(FlowEvent::NodeRemoved {
            node,
            uuid: entry.uuid,
        });
        true
    }

    pub fn add_input(&mut self, node: NodeId, spec: PortSpec) -> Option<usize> {
        let entry = self.entry_mut(node)?;
        entry.inputs.push(InputPort::from_spec(spec));
        let index = entry.inputs.len() - 1;
        self.topology_version += 1;
        Some(index)
    }

    pub fn add_output(&mut self, node: NodeId, spec: PortSpec) -> Option<usize> {
        let entry = self.entry_mut(node)?;
        entry.outputs.push(OutputPort::from_spec(spec));
        let index = entry.outputs.len() - 1;
        self.topology_version += 1;
        Some(index)
    }

    /// Disconnect and remove an input. Later inputs shift down by one.
    pub fn remove_input(&mut self, node: NodeId, index: usize) -> bool {
        let Some(port) = self.input_port(node, index) else {
            return false;
        };
        if let Some(connection) = port.connection {
            self.remove_connection(connection);
        }
        let Some(entry) = self.entry_mut(node) else {
            return false;
        };
        entry.inputs.remove(index);
        let shifted: Vec<ConnectionId> = entry.inputs[index..]
            .iter()
            .filter_map(|p| p.connection)
            .collect();
        for connection in shifted {
            if let Some(weight) = self.graph.edge_weight_mut(ex(connection)) {
                weight.to_input -= 1;
            }
        }
        self.topology_version += 1;
        true
    }

    /// Disconnect and remove an output. Later outputs shift down by one.
    pub fn remove_output(&mut self, node: NodeId, index: usize) -> bool {
        let Some(port) = self.output_port(node, index) else {
            return false;
        };
        for connection in port.connections.clone() {
            self.remove_connection(connection);
        }
        let Some(entry) = self.entry_mut(node) else {
            return false;
        };
        entry.outputs.remove(index);
        let shifted: Vec<ConnectionId> = entry.outputs[index..]
            .iter()
            .flat_map(|p| p.connections.iter().copied())
            .collect();
        for connection in shifted {
            if let Some(weight) = self.graph.edge_weight_mut(ex(connection)) {
                weight.from_output -= 1;
            }
        }
        self.topology_version += 1;
        true
    }

    // ------------------------------------------------------------------
    // connections

    fn port_kind(&self, port: PortRef) -> Option<PortKind> {
        match port.direction {
            Direction::Input => self.input_port(port.node, port.index).map(InputPort::kind),
            Direction::Output => self.output_port(port.node, port.index).map(OutputPort::kind),
        }
    }

    /// Whether a connect action between the two ports is legal. Pure.
    pub fn check_connection_validity(&self, p1: PortRef, p2: PortRef) -> bool {
        if p1.node == p2.node || p1.direction == p2.direction {
            return false;
        }
        match (self.port_kind(p1), self.port_kind(p2)) {
            (Some(k1), Some(k2)) => k1 == k2,
            _ => false,
        }
    }

    fn normalize(p1: PortRef, p2: PortRef) -> (PortRef, PortRef) {
        if p1.direction == Direction::Output {
            (p1, p2)
        } else {
            (p2, p1)
        }
    }

    /// Connection between exactly these two ports, in either order
    pub fn find_connection(&self, p1: PortRef, p2: PortRef) -> Option<ConnectionId> {
        let (out, inp) = Self::normalize(p1, p2);
        let connection = self.input_port(inp.node, inp.index)?.connection?;
        let view = self.connection(connection)?;
        (view.from == out).then_some(connection)
    }

    /// Connect two ports given in any order. Returns `None` when the request
    /// is invalid or the input is already taken.
    pub fn connect(&mut self, p1: PortRef, p2: PortRef) -> Option<ConnectionId> {
        if !self.check_connection_validity(p1, p2) {
            debug!(%p1, %p2, "rejected invalid connection");
            return None;
        }
        let (out, inp) = Self::normalize(p1, p2);
        if self.input_port(inp.node, inp.index)?.connection.is_some() {
            debug!(input = %inp, "rejected connection to an occupied input");
            return None;
        }
        Some(self.add_connection(out, inp))
    }

    pub fn disconnect(&mut self, connection: ConnectionId) -> bool {
        self.remove_connection(connection)
    }

    /// Editing-layer helper: removes an identical existing connection, or
    /// connects the ports when there is none.
    pub fn connect_or_toggle(&mut self, p1: PortRef, p2: PortRef) -> Option<ConnectionId> {
        if !self.check_connection_validity(p1, p2) {
            return None;
        }
        if let Some(existing) = self.find_connection(p1, p2) {
            self.remove_connection(existing);
            return None;
        }
        self.connect(p1, p2)
    }

    fn add_connection(&mut self, out: PortRef, inp: PortRef) -> ConnectionId {
        let kind = self.port_kind(out).unwrap_or(PortKind::Data);
        let edge = self.graph.add_edge(
            nx(out.node),
            nx(inp.node),
            ConnectionEntry {
                kind,
                from_output: out.index,
                to_input: inp.index,
            },
        );
        let id = ConnectionId::new(edge.index());

        let source_value = self.output_value(out.node, out.index);
        if let Some(port) = self.entry_mut(out.node).and_then(|n| n.outputs.get_mut(out.index)) {
            port.connections.push(id);
        }
        if let Some(port) = self.entry_mut(inp.node).and_then(|n| n.inputs.get_mut(inp.index)) {
            port.connection = Some(id);
        }
        self.topology_version += 1;
        debug!(connection = %id, from = %out, to = %inp, "connection added");
        self.notify(FlowEvent::ConnectionAdded {
            connection: id,
            kind,
            from: out,
            to: inp,
        });

        // a fresh data input pulls the upstream value once
        if kind == PortKind::Data {
            if let Some(port) = self.entry_mut(inp.node).and_then(|n| n.inputs.get_mut(inp.index)) {
                port.received = Some(source_value);
            }
            self.update_node(inp.node, Some(inp.index));
        }
        id
    }

    fn remove_connection(&mut self, connection: ConnectionId) -> bool {
        let Some(view) = self.connection(connection) else {
            return false;
        };
        self.graph.remove_edge(ex(connection));
        if let Some(port) = self
            .entry_mut(view.from.node)
            .and_then(|n| n.outputs.get_mut(view.from.index))
        {
            port.connections.retain(|c| *c != connection);
        }
        if let Some(port) = self
            .entry_mut(view.to.node)
            .and_then(|n| n.inputs.get_mut(view.to.index))
        {
            port.connection = None;
            port.received = None;
        }
        self.topology_version += 1;
        debug!(%connection, from = %view.from, to = %view.to, "connection removed");
        self.notify(FlowEvent::ConnectionRemoved {
            connection,
            kind: view.kind,
            from: view.from,
            to: view.to,
        });
        true
    }

    // ------------------------------------------------------------------
    // node primitives, all routed through the bound executor

    fn dispatch<R>(&mut self, f: impl FnOnce(&dyn Executor, &mut Flow) -> R) -> R {
        let executor = Rc::clone(&self.executor);
        self.depth += 1;
        let result = f(executor.as_ref(), self);
        self.depth -= 1;
        if self.depth == 0 {
            if let Some(mode) = self.pending_mode.take() {
                self.apply_mode(mode);
            }
        }
        result
    }

    /// Ask a node to re-evaluate: `Some(index)` when an input received a
    /// signal, `None` for a general update. No-op while updates are blocked.
    pub fn update_node(&mut self, node: NodeId, input: Option<usize>) {
        let Some(entry) = self.node(node) else {
            warn!(%node, "update of unknown node ignored");
            return;
        };
        if entry.updates_blocked {
            debug!(%node, title = %entry.title, "update blocked");
            return;
        }
        self.dispatch(|executor, flow| executor.update_node(flow, node, input));
    }

    /// Current value of a data input as the active algorithm sees it
    pub fn read_input(&mut self, node: NodeId, index: usize) -> Value {
        self.dispatch(|executor, flow| executor.input(flow, node, index))
    }

    pub fn write_output(&mut self, node: NodeId, index: usize, value: Value) {
        if self.output_port(node, index).map(OutputPort::kind) != Some(PortKind::Data) {
            warn!(%node, index, "write to a missing or non-data output ignored");
            return;
        }
        self.dispatch(|executor, flow| executor.set_output_value(flow, node, index, value));
    }

    pub fn fire_output(&mut self, node: NodeId, index: usize) {
        if self.output_port(node, index).map(OutputPort::kind) != Some(PortKind::Exec) {
            warn!(%node, index, "fire of a missing or non-exec output ignored");
            return;
        }
        self.dispatch(|executor, flow| executor.fire_exec_output(flow, node, index));
    }

    // ------------------------------------------------------------------
    // mechanics shared by the executors

    /// Run the node's `on_update`, containing any error it returns
    pub(crate) fn invoke(&mut self, node: NodeId, input: Option<usize>) {
        let Some(entry) = self.entry_mut(node) else {
            return;
        };
        let uuid = entry.uuid;
        let Some(mut behavior) = entry.behavior.take() else {
            warn!(%node, "node is already updating, skipping re-entrant update");
            return;
        };
        debug!(%node, title = behavior.title(), ?input, "update");

        let result = behavior.on_update(&mut FlowNodeContext::new(self, node), input);

        let title = behavior.title().to_string();
        if self.node(node).is_some_and(|n| n.uuid == uuid) {
            self.restore_behavior(node, behavior);
        }
        if let Err(err) = result {
            error!(%node, %title, error = %err, "node update failed");
            self.notify(FlowEvent::NodeFailed {
                node,
                title,
                error: err.to_string(),
            });
        }
    }

    fn restore_behavior(&mut self, node: NodeId, behavior: Box<dyn Node>) {
        if let Some(entry) = self.entry_mut(node) {
            entry.behavior = Some(behavior);
        }
    }

    pub(crate) fn store_output(&mut self, node: NodeId, index: usize, value: Value) {
        if let Some(port) = self.entry_mut(node).and_then(|n| n.outputs.get_mut(index)) {
            port.value = value;
        }
    }

    pub(crate) fn output_connections(&self, node: NodeId, index: usize) -> Vec<ConnectionId> {
        self.output_port(node, index)
            .map(|p| p.connections.clone())
            .unwrap_or_default()
    }

    pub(crate) fn output_count(&self, node: NodeId) -> usize {
        self.node(node).map_or(0, |n| n.outputs.len())
    }

    /// Push a value (data) or a signal (exec) across a connection
    pub(crate) fn activate(&mut self, connection: ConnectionId, value: Value) {
        let Some(view) = self.connection(connection) else {
            return;
        };
        debug!(%connection, kind = ?view.kind, "connection activated");
        match view.kind {
            PortKind::Data => self.receive(view.to.node, view.to.index, value),
            PortKind::Exec => self.receive(view.to.node, view.to.index, Value::Null),
        }
    }

    /// An input got a value or a signal. Stores data, then triggers the
    /// node unless it is an active node and this is only a data input.
    fn receive(&mut self, node: NodeId, index: usize, value: Value) {
        let Some(entry) = self.entry_mut(node) else {
            return;
        };
        let active = entry.is_active();
        let Some(port) = entry.inputs.get_mut(index) else {
            return;
        };
        let kind = port.kind;
        if kind == PortKind::Data {
            port.received = Some(value);
        }
        if kind == PortKind::Exec || !active {
            self.update_node(node, Some(index));
        }
    }

    /// Request the value of a connection's source output. In exec mode the
    /// source node is updated first so it can compute the value on demand.
    pub(crate) fn pull(&mut self, connection: ConnectionId) -> Value {
        let Some(view) = self.connection(connection) else {
            return Value::Null;
        };
        if self.mode == AlgorithmMode::Exec {
            self.update_node(view.from.node, None);
        }
        self.output_value(view.from.node, view.from.index)
    }

    pub(crate) fn connection_target(&self, connection: ConnectionId) -> Option<NodeId> {
        self.graph
            .edge_endpoints(ex(connection))
            .map(|(_, to)| NodeId::new(to.index()))
    }

    pub(crate) fn log_node(&self, node: NodeId, level: LogLevel, message: &str) {
        let title = self.node(node).map(NodeEntry::title).unwrap_or_default();
        match level {
            LogLevel::Debug => debug!(%node, %title, "{}", message),
            LogLevel::Info => info!(%node, %title, "{}", message),
            LogLevel::Warning => warn!(%node, %title, "{}", message),
            LogLevel::Error => error!(%node, %title, "{}", message),
        }
        self.notify(FlowEvent::NodeLog {
            node,
            level,
            message: message.to_string(),
        });
    }
}

impl Default for Flow {
    fn default() -> Self {
        Self::new(AlgorithmMode::default())
    }
}
