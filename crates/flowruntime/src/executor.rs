//! Execution strategies.
//!
//! An executor intercepts the primitive node actions (`update`, reading an
//! input, writing a data output, firing an exec output) and decides when
//! their effects travel along connections.

use crate::flow::Flow;
use flowcore::{AlgorithmMode, NodeId, PortKind, Value};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

/// Strategy bound to a flow for one algorithm mode
pub trait Executor {
    fn update_node(&self, flow: &mut Flow, node: NodeId, input: Option<usize>);

    fn input(&self, flow: &mut Flow, node: NodeId, index: usize) -> Value;

    fn set_output_value(&self, flow: &mut Flow, node: NodeId, index: usize, value: Value);

    fn fire_exec_output(&self, flow: &mut Flow, node: NodeId, index: usize);
}

/// Disconnected inputs report their default. Connected ones report what was
/// pushed to them, except in exec mode (or before anything arrived) where
/// the value is pulled from upstream.
fn input_value(flow: &mut Flow, node: NodeId, index: usize) -> Value {
    let Some(port) = flow.input_port(node, index) else {
        return Value::Null;
    };
    if port.kind() == PortKind::Exec {
        return Value::Null;
    }
    let Some(connection) = port.connection() else {
        return port.default().clone();
    };
    if flow.algorithm_mode() != AlgorithmMode::Exec {
        if let Some(value) = port.received() {
            return value.clone();
        }
    }
    flow.pull(connection)
}

/// Propagates everything immediately and depth first. Used for the data
/// and exec modes.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultExecutor;

impl Executor for DefaultExecutor {
    fn update_node(&self, flow: &mut Flow, node: NodeId, input: Option<usize>) {
        flow.invoke(node, input);
    }

    fn input(&self, flow: &mut Flow, node: NodeId, index: usize) -> Value {
        input_value(flow, node, index)
    }

    fn set_output_value(&self, flow: &mut Flow, node: NodeId, index: usize, value: Value) {
        flow.store_output(node, index, value.clone());
        // in exec mode consumers pull on demand
        if flow.algorithm_mode() == AlgorithmMode::Exec {
            return;
        }
        for connection in flow.output_connections(node, index) {
            flow.activate(connection, value.clone());
        }
    }

    fn fire_exec_output(&self, flow: &mut Flow, node: NodeId, index: usize) {
        for connection in flow.output_connections(node, index) {
            flow.activate(connection, Value::Null);
        }
    }
}

/// What started the current event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExecutionRoot {
    Node(NodeId),
    Output(NodeId, usize),
}

#[derive(Debug, Default)]
struct PendingUpdate {
    inputs: Vec<usize>,
    general: bool,
}

impl PendingUpdate {
    fn record(&mut self, input: Option<usize>) {
        match input {
            Some(index) if !self.inputs.contains(&index) => self.inputs.push(index),
            Some(_) => {}
            None => self.general = true,
        }
    }

    /// The single input that fired, or `None` when the update has to be a
    /// general one
    fn trigger(&self) -> Option<usize> {
        match self.inputs.as_slice() {
            [index] if !self.general => Some(*index),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedCounts {
    root: ExecutionRoot,
    topology_version: u64,
    counts: HashMap<NodeId, usize>,
}

#[derive(Debug, Default)]
struct EventState {
    root: Option<ExecutionRoot>,
    waiting: HashMap<NodeId, usize>,
    updated: HashSet<(NodeId, usize)>,
    pending: HashMap<NodeId, PendingUpdate>,
    settled: HashSet<NodeId>,
    cache: Option<CachedCounts>,
    computed: usize,
}

impl EventState {
    /// Nodes reached by this event that have not propagated yet hold back
    /// their updates and writes
    fn defers(&self, node: NodeId) -> bool {
        self.waiting.contains_key(&node) && !self.settled.contains(&node)
    }
}

/// Batched data flow.
///
/// When an event starts, the executor counts for every node reachable from
/// the root how many connections from reachable predecessors still feed it.
/// A node runs only once that count drops to zero and its written outputs
/// are pushed once, after it ran. Every connection therefore activates at
/// most once per event, no matter how many paths merge downstream.
#[derive(Debug, Default)]
pub struct DataOptimizedExecutor {
    state: RefCell<EventState>,
}

impl DataOptimizedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Root of the running event, if any
    pub fn execution_root(&self) -> Option<ExecutionRoot> {
        self.state.borrow().root
    }

    /// How many times waiting counts were computed instead of reused
    pub fn computed_tables(&self) -> usize {
        self.state.borrow().computed
    }

    fn start(&self, flow: &Flow, root: ExecutionRoot) {
        let topology_version = flow.topology_version();
        let mut state = self.state.borrow_mut();
        state.root = Some(root);
        state.updated.clear();
        state.pending.clear();
        state.settled.clear();

        let cached = state
            .cache
            .as_ref()
            .filter(|c| c.root == root && c.topology_version == topology_version)
            .map(|c| c.counts.clone());
        let waiting = match cached {
            Some(counts) => counts,
            None => {
                let counts = waiting_counts(flow, root);
                state.computed += 1;
                state.cache = Some(CachedCounts {
                    root,
                    topology_version,
                    counts: counts.clone(),
                });
                counts
            }
        };
        state.waiting = waiting;
        debug!(?root, reachable = state.waiting.len(), "execution started");
    }

    fn stop(&self) {
        let mut state = self.state.borrow_mut();
        debug!(root = ?state.root, "execution finished");
        state.root = None;
        state.waiting.clear();
        state.updated.clear();
        state.pending.clear();
        state.settled.clear();
    }

    fn in_event(&self) -> bool {
        self.state.borrow().root.is_some()
    }

    /// The node is done: push its updated outputs
    fn settle(&self, flow: &mut Flow, node: NodeId) {
        self.state.borrow_mut().settled.insert(node);
        for index in 0..flow.output_count(node) {
            self.propagate_output(flow, node, index);
        }
    }

    /// Push an output if it was updated in this event, then count the
    /// connections as satisfied for their destinations either way
    fn propagate_output(&self, flow: &mut Flow, node: NodeId, index: usize) {
        let connections = flow.output_connections(node, index);
        let updated = self.state.borrow().updated.contains(&(node, index));
        if updated {
            let value = flow.output_value(node, index);
            for connection in &connections {
                flow.activate(*connection, value.clone());
            }
        }
        for connection in connections {
            if let Some(target) = flow.connection_target(connection) {
                self.decrease_wait(flow, target);
            }
        }
    }

    fn decrease_wait(&self, flow: &mut Flow, node: NodeId) {
        let pending = {
            let mut state = self.state.borrow_mut();
            if state.settled.contains(&node) {
                return;
            }
            match state.waiting.get_mut(&node) {
                Some(count) if *count > 0 => {
                    *count -= 1;
                    if *count > 0 {
                        return;
                    }
                }
                _ => return,
            }
            state.pending.remove(&node)
        };
        if let Some(pending) = pending {
            flow.invoke(node, pending.trigger());
        }
        self.settle(flow, node);
    }

    fn record_output(&self, flow: &mut Flow, node: NodeId, index: usize, value: Option<Value>) {
        if let Some(value) = value {
            flow.store_output(node, index, value);
        }
        self.state.borrow_mut().updated.insert((node, index));
    }

    fn push_now(&self, flow: &mut Flow, node: NodeId, index: usize) {
        let value = flow.output_value(node, index);
        for connection in flow.output_connections(node, index) {
            flow.activate(connection, value.clone());
        }
    }

    fn output_effect(&self, flow: &mut Flow, node: NodeId, index: usize, value: Option<Value>) {
        if !self.in_event() {
            self.start(flow, ExecutionRoot::Output(node, index));
            self.record_output(flow, node, index, value);
            self.propagate_output(flow, node, index);
            self.stop();
            return;
        }
        let defers = self.state.borrow().defers(node);
        if defers {
            self.record_output(flow, node, index, value);
        } else {
            // no waiting count covers this node, nothing to wait for
            if let Some(value) = value {
                flow.store_output(node, index, value);
            }
            self.push_now(flow, node, index);
        }
    }
}

impl Executor for DataOptimizedExecutor {
    fn update_node(&self, flow: &mut Flow, node: NodeId, input: Option<usize>) {
        if !self.in_event() {
            self.start(flow, ExecutionRoot::Node(node));
            flow.invoke(node, input);
            self.settle(flow, node);
            self.stop();
            return;
        }
        {
            let mut state = self.state.borrow_mut();
            if state.defers(node) {
                state.pending.entry(node).or_default().record(input);
                return;
            }
        }
        flow.invoke(node, input);
    }

    fn input(&self, flow: &mut Flow, node: NodeId, index: usize) -> Value {
        input_value(flow, node, index)
    }

    fn set_output_value(&self, flow: &mut Flow, node: NodeId, index: usize, value: Value) {
        self.output_effect(flow, node, index, Some(value));
    }

    fn fire_exec_output(&self, flow: &mut Flow, node: NodeId, index: usize) {
        self.output_effect(flow, node, index, None);
    }
}

/// Count, for every node reachable from the root, the connections reaching
/// it from visited nodes. An output root only seeds its own connections.
fn waiting_counts(flow: &Flow, root: ExecutionRoot) -> HashMap<NodeId, usize> {
    let mut counts: HashMap<NodeId, usize> = HashMap::new();
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut queue: VecDeque<NodeId> = VecDeque::new();

    match root {
        ExecutionRoot::Node(node) => {
            counts.insert(node, 0);
            queue.push_back(node);
        }
        ExecutionRoot::Output(node, index) => {
            for connection in flow.output_connections(node, index) {
                if let Some(target) = flow.connection_target(connection) {
                    *counts.entry(target).or_default() += 1;
                    queue.push_back(target);
                }
            }
        }
    }

    while let Some(node) = queue.pop_front() {
        if !visited.insert(node) {
            continue;
        }
        for successor in flow.successors(node) {
            *counts.entry(successor).or_default() += 1;
            queue.push_back(successor);
        }
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::{Node, NodeContext, NodeError, PortRef, PortSpec};

    struct Relay;

    impl Node for Relay {
        fn identifier(&self) -> &str {
            "test.relay"
        }

        fn init_inputs(&self) -> Vec<PortSpec> {
            vec![PortSpec::data("a"), PortSpec::data("b")]
        }

        fn init_outputs(&self) -> Vec<PortSpec> {
            vec![PortSpec::data("out")]
        }

        fn on_update(
            &mut self,
            _ctx: &mut dyn NodeContext,
            _input: Option<usize>,
        ) -> Result<(), NodeError> {
            Ok(())
        }
    }

    #[test]
    fn waiting_counts_follow_diamond() {
        let mut flow = Flow::new(AlgorithmMode::DataOptimized);
        let a = flow.add_node(Box::new(Relay));
        let b = flow.add_node(Box::new(Relay));
        let c = flow.add_node(Box::new(Relay));
        let d = flow.add_node(Box::new(Relay));
        let lone = flow.add_node(Box::new(Relay));
        flow.connect(PortRef::output(a, 0), PortRef::input(b, 0)).unwrap();
        flow.connect(PortRef::output(a, 0), PortRef::input(c, 0)).unwrap();
        flow.connect(PortRef::output(b, 0), PortRef::input(d, 0)).unwrap();
        flow.connect(PortRef::output(c, 0), PortRef::input(d, 1)).unwrap();

        let counts = waiting_counts(&flow, ExecutionRoot::Node(a));
        assert_eq!(counts[&a], 0);
        assert_eq!(counts[&b], 1);
        assert_eq!(counts[&c], 1);
        assert_eq!(counts[&d], 2);
        assert!(!counts.contains_key(&lone));

        let counts = waiting_counts(&flow, ExecutionRoot::Output(b, 0));
        assert_eq!(counts.len(), 1);
        assert_eq!(counts[&d], 1);
    }

    #[test]
    fn pending_trigger_is_single_input_or_general() {
        let mut pending = PendingUpdate::default();
        pending.record(Some(1));
        pending.record(Some(1));
        assert_eq!(pending.trigger(), Some(1));
        pending.record(Some(0));
        assert_eq!(pending.trigger(), None);

        let mut general = PendingUpdate::default();
        general.record(None);
        assert_eq!(general.trigger(), None);
    }
}
