//! Saving a flow's topology and rebuilding it from saved data.

use crate::flow::Flow;
use crate::registry::NodeRegistry;
use flowcore::{
    ConnectionData, FlowData, InputData, Node, NodeData, NodeId, OutputData, PortKind, PortRef,
    PortSpec, WorkflowError,
};
use std::collections::{HashMap, HashSet};
use tracing::{info, warn};

impl Flow {
    /// Persisted topology of the whole flow
    pub fn to_data(&self) -> FlowData {
        let nodes: Vec<NodeId> = self.nodes().collect();
        self.nodes_to_data(&nodes)
    }

    /// Persisted topology of a subset of nodes. Only connections between
    /// nodes of the subset are kept.
    pub fn nodes_to_data(&self, nodes: &[NodeId]) -> FlowData {
        let positions: HashMap<NodeId, usize> =
            nodes.iter().enumerate().map(|(i, id)| (*id, i)).collect();

        let mut data = FlowData::new(self.algorithm_mode());
        for id in nodes {
            let Some(entry) = self.node(*id) else {
                continue;
            };
            let state = entry
                .behavior()
                .map(|b| b.get_state())
                .unwrap_or_default();
            let inputs = entry
                .inputs()
                .iter()
                .map(|port| InputData {
                    kind: port.kind(),
                    label: port.label().to_string(),
                    value: (port.kind() == PortKind::Data && !port.default().is_null())
                        .then(|| port.default().clone()),
                    extra: port.extra().clone(),
                })
                .collect();
            let outputs = entry
                .outputs()
                .iter()
                .map(|port| OutputData {
                    kind: port.kind(),
                    label: port.label().to_string(),
                })
                .collect();
            data.nodes.push(NodeData {
                identifier: entry.identifier().to_string(),
                state,
                inputs,
                outputs,
            });
        }

        for (from_node, id) in nodes.iter().enumerate() {
            let Some(entry) = self.node(*id) else {
                continue;
            };
            for (from_output, port) in entry.outputs().iter().enumerate() {
                for connection in port.connections() {
                    let Some(view) = self.connection(*connection) else {
                        continue;
                    };
                    let Some(to_node) = positions.get(&view.to.node) else {
                        continue;
                    };
                    data.connections.push(ConnectionData {
                        from_node,
                        from_output,
                        to_node: *to_node,
                        to_input: view.to.index,
                    });
                }
            }
        }
        data
    }

    /// Rebuild a flow from saved data
    pub fn from_data(data: &FlowData, registry: &NodeRegistry) -> Result<Flow, WorkflowError> {
        let mut flow = Flow::new(data.algorithm_mode);
        flow.load(data, registry)?;
        Ok(flow)
    }

    /// Persisted topology as pretty-printed JSON
    pub fn to_json(&self) -> flowcore::Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_data())?)
    }

    /// Rebuild a flow from its JSON form
    pub fn from_json(json: &str, registry: &NodeRegistry) -> flowcore::Result<Flow> {
        let data: FlowData = serde_json::from_str(json)?;
        Ok(Flow::from_data(&data, registry)?)
    }

    /// Add the saved nodes and connections to this flow and adopt the saved
    /// algorithm mode. Every identifier and connection is checked before
    /// the flow is touched, so a failed load leaves it as it was.
    pub fn load(
        &mut self,
        data: &FlowData,
        registry: &NodeRegistry,
    ) -> Result<Vec<NodeId>, WorkflowError> {
        let prepared = prepare_nodes(&data.nodes, registry)?;
        check_connections(&prepared, &data.connections)?;

        // connect-time updates run under the loaded mode
        let previous_mode = self.algorithm_mode();
        self.set_algorithm_mode(data.algorithm_mode);

        let nodes = self.add_prepared_nodes(&data.nodes, prepared);

        // connections built while loading must not cause updates here
        let blocked: Vec<NodeId> = nodes
            .iter()
            .copied()
            .filter(|id| {
                self.node(*id)
                    .and_then(|n| n.behavior())
                    .is_some_and(|b| b.blocks_initial_updates())
            })
            .collect();
        for id in &blocked {
            self.set_updates_blocked(*id, true);
        }

        let wired = self.connect_nodes_from_data(&nodes, &data.connections);

        for id in &blocked {
            self.set_updates_blocked(*id, false);
        }
        if let Err(err) = wired {
            warn!(error = %err, "load failed while wiring, removing its nodes");
            for id in &nodes {
                self.remove_node(*id);
            }
            self.set_algorithm_mode(previous_mode);
            return Err(err);
        }

        info!(
            nodes = nodes.len(),
            connections = data.connections.len(),
            mode = %data.algorithm_mode,
            "flow loaded"
        );
        Ok(nodes)
    }

    fn add_prepared_nodes(
        &mut self,
        records: &[NodeData],
        prepared: Vec<PreparedNode>,
    ) -> Vec<NodeId> {
        let mut created = Vec::with_capacity(prepared.len());
        for (record, node) in records.iter().zip(prepared) {
            let id = self.add_node_with_ports(node.behavior, node.inputs, node.outputs);
            for (index, port) in record.inputs.iter().enumerate() {
                if !port.extra.is_empty() {
                    self.set_input_extra(id, index, port.extra.clone());
                }
            }
            created.push(id);
        }
        created
    }

    fn connect_nodes_from_data(
        &mut self,
        nodes: &[NodeId],
        connections: &[ConnectionData],
    ) -> Result<(), WorkflowError> {
        for c in connections {
            let (Some(from), Some(to)) = (nodes.get(c.from_node), nodes.get(c.to_node)) else {
                return Err(WorkflowError::InvalidConnection(format!(
                    "node index out of range: {} -> {}",
                    c.from_node, c.to_node
                )));
            };
            let out = PortRef::output(*from, c.from_output);
            let inp = PortRef::input(*to, c.to_input);
            if self.connect(out, inp).is_none() {
                return Err(WorkflowError::InvalidConnection(format!(
                    "cannot connect {} to {}",
                    out, inp
                )));
            }
        }
        Ok(())
    }
}

/// A saved node resolved to its behavior and port layout, not yet placed
struct PreparedNode {
    behavior: Box<dyn Node>,
    inputs: Vec<PortSpec>,
    outputs: Vec<PortSpec>,
}

fn prepare_nodes(
    records: &[NodeData],
    registry: &NodeRegistry,
) -> Result<Vec<PreparedNode>, WorkflowError> {
    let mut prepared = Vec::with_capacity(records.len());
    for record in records {
        let mut behavior = registry.create_node(&record.identifier)?;
        if let Err(err) = behavior.set_state(&record.state) {
            warn!(identifier = %record.identifier, error = %err, "failed to restore node state");
        }

        let (inputs, outputs) = if record.inputs.is_empty() && record.outputs.is_empty() {
            (behavior.init_inputs(), behavior.init_outputs())
        } else {
            let inputs = record
                .inputs
                .iter()
                .map(|port| PortSpec {
                    kind: port.kind,
                    label: port.label.clone(),
                    default: port.value.clone().unwrap_or_default(),
                })
                .collect();
            let outputs = record
                .outputs
                .iter()
                .map(|port| PortSpec {
                    kind: port.kind,
                    label: port.label.clone(),
                    default: Default::default(),
                })
                .collect();
            (inputs, outputs)
        };
        prepared.push(PreparedNode {
            behavior,
            inputs,
            outputs,
        });
    }
    Ok(prepared)
}

/// The rules `Flow::connect` applies, checked against the saved layout:
/// endpoints exist, differ, agree on kind, and no input is fed twice.
fn check_connections(
    nodes: &[PreparedNode],
    connections: &[ConnectionData],
) -> Result<(), WorkflowError> {
    let mut fed: HashSet<(usize, usize)> = HashSet::new();
    for c in connections {
        let (Some(from), Some(to)) = (nodes.get(c.from_node), nodes.get(c.to_node)) else {
            return Err(WorkflowError::InvalidConnection(format!(
                "node index out of range: {} -> {}",
                c.from_node, c.to_node
            )));
        };
        let describe = || {
            format!(
                "node {} output {} -> node {} input {}",
                c.from_node, c.from_output, c.to_node, c.to_input
            )
        };
        if c.from_node == c.to_node {
            return Err(WorkflowError::InvalidConnection(format!(
                "{}: a node cannot feed itself",
                describe()
            )));
        }
        let (Some(out), Some(inp)) = (from.outputs.get(c.from_output), to.inputs.get(c.to_input))
        else {
            return Err(WorkflowError::InvalidConnection(format!(
                "{}: no such port",
                describe()
            )));
        };
        if out.kind != inp.kind {
            return Err(WorkflowError::InvalidConnection(format!(
                "{}: {:?} output into {:?} input",
                describe(),
                out.kind,
                inp.kind
            )));
        }
        if !fed.insert((c.to_node, c.to_input)) {
            return Err(WorkflowError::InvalidConnection(format!(
                "{}: input is already connected",
                describe()
            )));
        }
    }
    Ok(())
}
