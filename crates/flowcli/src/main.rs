// crates/flowcli/src/main.rs

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use flowcore::{AlgorithmMode, FlowData, FlowEvent, LogLevel, NodeData, PortKind, TimestampedEvent, Value};
use flowruntime::{Flow, Session};
use std::path::PathBuf;
use tokio::sync::broadcast::{error::TryRecvError, Receiver};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "flow")]
#[command(about = "Flow Engine CLI", long_about = None)]
struct Cli {
    /// Show engine debug logs
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a flow file and update some of its nodes
    Run {
        /// Path to flow JSON file
        #[arg(short, long)]
        file: PathBuf,

        /// Index of a node to update, repeatable. Defaults to every node
        /// without inputs.
        #[arg(short, long = "trigger")]
        triggers: Vec<usize>,

        /// Override the algorithm mode stored in the file (data, exec, data_opt)
        #[arg(short, long)]
        mode: Option<AlgorithmMode>,

        /// Script variables as a JSON object
        #[arg(short, long)]
        input: Option<String>,
    },

    /// Check that a flow file can be loaded
    Validate {
        /// Path to flow JSON file
        file: PathBuf,
    },

    /// List available node types
    Nodes,

    /// Create a new example flow
    Init {
        /// Output file path
        #[arg(short, long, default_value = "flow.json")]
        output: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    match cli.command {
        Commands::Run {
            file,
            triggers,
            mode,
            input,
        } => run_flow(file, triggers, mode, input),
        Commands::Validate { file } => validate_flow(file),
        Commands::Nodes => list_nodes(),
        Commands::Init { output } => create_example_flow(output),
    }
}

fn session() -> Result<Session> {
    let mut session = Session::new();
    flownodes::register_all(session.registry_mut())?;
    Ok(session)
}

fn read_flow_file(file: &PathBuf) -> Result<FlowData> {
    let json = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let data = serde_json::from_str(&json)
        .with_context(|| format!("{} is not a flow file", file.display()))?;
    Ok(data)
}

fn run_flow(
    file: PathBuf,
    triggers: Vec<usize>,
    mode: Option<AlgorithmMode>,
    input: Option<String>,
) -> Result<()> {
    println!("🚀 Loading flow from: {}", file.display());
    let mut data = read_flow_file(&file)?;
    if let Some(mode) = mode {
        data.algorithm_mode = mode;
    }

    let session = session()?;
    if let Some(input) = input {
        let json: serde_json::Value = serde_json::from_str(&input)?;
        let serde_json::Value::Object(vars) = json else {
            return Err(anyhow!("Input must be a JSON object"));
        };
        let mut variables = session.variables().borrow_mut();
        for (name, value) in vars {
            if !variables.create(&name, Value::from_plain_json(value)) {
                return Err(anyhow!("invalid variable name '{}'", name));
            }
        }
    }

    let mut events = session.subscribe_events();
    let mut flow = session.load_flow(&data)?;
    let ids: Vec<_> = flow.nodes().collect();
    println!("📋 Mode: {}", flow.algorithm_mode());
    println!("   Nodes: {}", flow.node_count());
    println!("   Connections: {}", flow.connection_count());
    println!();
    // what happened while wiring is not part of the run
    let skipped = drain(&mut events).len();
    debug!(skipped, "discarded load events");

    let roots: Vec<usize> = if triggers.is_empty() {
        ids.iter()
            .enumerate()
            .filter(|(_, id)| flow.node(**id).is_some_and(|n| n.inputs().is_empty()))
            .map(|(index, _)| index)
            .collect()
    } else {
        triggers
    };

    for index in roots {
        let id = *ids
            .get(index)
            .ok_or_else(|| anyhow!("no node at index {}", index))?;
        let title = flow.node(id).map(|n| n.title().to_string()).unwrap_or_default();
        println!("▶️  Updating node {} ({})", index, title);
        info!(node = %id, "triggering update");
        flow.update_node(id, None);
        for event in drain(&mut events) {
            print_event(&flow, &event);
        }
    }

    print_outputs(&flow, &ids);
    Ok(())
}

fn drain(events: &mut Receiver<TimestampedEvent>) -> Vec<TimestampedEvent> {
    let mut received = Vec::new();
    loop {
        match events.try_recv() {
            Ok(event) => received.push(event),
            Err(TryRecvError::Lagged(missed)) => {
                println!("  ⚠️  {} events were dropped", missed);
            }
            Err(_) => break,
        }
    }
    received
}

fn print_event(flow: &Flow, event: &TimestampedEvent) {
    let title = |node| flow.node(node).map(|n| n.title().to_string()).unwrap_or_default();
    match &event.event {
        FlowEvent::NodeLog {
            node,
            level,
            message,
        } => {
            let icon = match level {
                LogLevel::Debug | LogLevel::Info => "ℹ️ ",
                LogLevel::Warning => "⚠️ ",
                LogLevel::Error => "❌",
            };
            println!("     {} [{}] {}", icon, title(*node), message);
        }
        FlowEvent::NodeFailed { title, error, .. } => {
            println!("  ❌ {} failed: {}", title, error);
        }
        FlowEvent::AlgorithmModeChanged { mode } => {
            println!("  🔀 Algorithm mode is now {}", mode);
        }
        _ => {}
    }
}

fn print_outputs(flow: &Flow, ids: &[flowcore::NodeId]) {
    println!();
    println!("📤 Outputs:");
    for (index, id) in ids.iter().enumerate() {
        let Some(node) = flow.node(*id) else {
            continue;
        };
        let values: Vec<_> = node
            .outputs()
            .iter()
            .filter(|port| port.kind() == PortKind::Data && !port.value().is_null())
            .collect();
        if values.is_empty() {
            continue;
        }
        println!("   Node {} ({}):", index, node.title());
        for port in values {
            println!("     {}: {}", port.label(), port.value().to_plain_json());
        }
    }
}

fn validate_flow(file: PathBuf) -> Result<()> {
    println!("🔍 Validating flow: {}", file.display());

    let json = std::fs::read_to_string(&file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let session = session()?;
    let flow = Flow::from_json(&json, session.registry())?;

    println!("✅ Flow is valid:");
    println!("   Mode: {}", flow.algorithm_mode());
    println!("   Nodes: {}", flow.node_count());
    println!("   Connections: {}", flow.connection_count());
    Ok(())
}

fn list_nodes() -> Result<()> {
    println!("📦 Available Node Types:");
    println!();

    let session = session()?;
    let registry = session.registry();
    for node_type in registry.list_node_types() {
        if let Some(metadata) = registry.get_metadata(&node_type) {
            println!("  • {} ({})", node_type, metadata.category);
            println!("    {}", metadata.description);
        } else {
            println!("  • {}", node_type);
        }
    }
    Ok(())
}

fn create_example_flow(output: PathBuf) -> Result<()> {
    let constant = |value: f64| {
        NodeData::new("value.constant").with_state(serde_json::json!({
            "value": Value::Number(value)
        }))
    };

    let mut data = FlowData::new(AlgorithmMode::DataOptimized);
    let a = data.add_node(constant(2.0));
    let b = data.add_node(constant(3.0));
    let add = data.add_node(NodeData::new("math.add"));
    let double = data.add_node(NodeData::new("math.multiply"));
    let log = data.add_node(NodeData::new("debug.log"));

    data.connect(a, 0, add, 0);
    data.connect(b, 0, add, 1);
    data.connect(add, 0, double, 0);
    data.connect(b, 0, double, 1);
    data.connect(double, 0, log, 0);

    let json = serde_json::to_string_pretty(&data)?;
    std::fs::write(&output, json)?;

    println!("✨ Created example flow: {}", output.display());
    println!();
    println!("Run it with:");
    println!("  flow run --file {}", output.display());
    Ok(())
}
