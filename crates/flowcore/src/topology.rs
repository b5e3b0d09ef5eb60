use crate::{PortKind, Value};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How a flow propagates updates
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlgorithmMode {
    /// Push-eager: written outputs reach their successors immediately
    #[default]
    #[serde(rename = "data", alias = "data flow")]
    Data,
    /// Pull/trigger driven: data is requested backwards, exec signals push
    #[serde(rename = "exec", alias = "exec flow")]
    Exec,
    /// Batched data flow: every connection fires at most once per event
    #[serde(rename = "data_opt")]
    DataOptimized,
}

impl AlgorithmMode {
    pub fn as_str(self) -> &'static str {
        match self {
            AlgorithmMode::Data => "data",
            AlgorithmMode::Exec => "exec",
            AlgorithmMode::DataOptimized => "data_opt",
        }
    }
}

impl fmt::Display for AlgorithmMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlgorithmMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "data" | "data flow" => Ok(AlgorithmMode::Data),
            "exec" | "exec flow" => Ok(AlgorithmMode::Exec),
            "data_opt" => Ok(AlgorithmMode::DataOptimized),
            other => Err(format!("unknown algorithm mode '{}'", other)),
        }
    }
}

/// Persisted topology of one flow.
///
/// Connections address nodes and ports by their position in `nodes` and in
/// each node's `inputs`/`outputs`, so the whole node list has to be rebuilt
/// before any connection can be wired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowData {
    pub algorithm_mode: AlgorithmMode,
    pub nodes: Vec<NodeData>,
    pub connections: Vec<ConnectionData>,
}

impl FlowData {
    pub fn new(algorithm_mode: AlgorithmMode) -> Self {
        Self {
            algorithm_mode,
            nodes: Vec::new(),
            connections: Vec::new(),
        }
    }

    /// Append a node record and return its index
    pub fn add_node(&mut self, node: NodeData) -> usize {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    pub fn connect(&mut self, from_node: usize, from_output: usize, to_node: usize, to_input: usize) {
        self.connections.push(ConnectionData {
            from_node,
            from_output,
            to_node,
            to_input,
        });
    }
}

/// Persisted node record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub identifier: String,
    #[serde(default)]
    pub state: serde_json::Value,
    #[serde(default)]
    pub inputs: Vec<InputData>,
    #[serde(default)]
    pub outputs: Vec<OutputData>,
}

impl NodeData {
    pub fn new(identifier: impl Into<String>) -> Self {
        Self {
            identifier: identifier.into(),
            state: serde_json::Value::Null,
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: serde_json::Value) -> Self {
        self.state = state;
        self
    }

    pub fn with_input(mut self, kind: PortKind, label: impl Into<String>) -> Self {
        self.inputs.push(InputData {
            kind,
            label: label.into(),
            value: None,
            extra: serde_json::Map::new(),
        });
        self
    }

    pub fn with_output(mut self, kind: PortKind, label: impl Into<String>) -> Self {
        self.outputs.push(OutputData {
            kind,
            label: label.into(),
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputData {
    pub kind: PortKind,
    #[serde(default)]
    pub label: String,
    /// Default of an unconnected data input
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Port configuration owned by the editing layer
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputData {
    pub kind: PortKind,
    #[serde(default)]
    pub label: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionData {
    pub from_node: usize,
    pub from_output: usize,
    pub to_node: usize,
    pub to_input: usize,
}
