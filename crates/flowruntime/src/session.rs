use crate::flow::Flow;
use crate::registry::NodeRegistry;
use crate::subflow::{SharedSubflow, Subflow, SubflowCallFactory};
use flowcore::{AlgorithmMode, EventBus, FlowData, FlowListener, TimestampedEvent, Variables, WorkflowError};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::sync::broadcast;
use tracing::info;

/// Owns everything flows of one project share: the node registry, the
/// variable store, the event bus and the sub-flows.
pub struct Session {
    config: SessionConfig,
    registry: NodeRegistry,
    event_bus: Rc<EventBus>,
    variables: Rc<RefCell<Variables>>,
    subflows: HashMap<String, SharedSubflow>,
}

impl Session {
    /// Create a new session with default settings
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    /// Create a new session with custom configuration
    pub fn with_config(config: SessionConfig) -> Self {
        Self::with_registry(NodeRegistry::new(), config)
    }

    /// Create a new session with a pre-configured registry
    pub fn with_registry(registry: NodeRegistry, config: SessionConfig) -> Self {
        let event_bus = Rc::new(EventBus::new(config.event_buffer_size));
        Self {
            config,
            registry,
            event_bus,
            variables: Rc::new(RefCell::new(Variables::new())),
            subflows: HashMap::new(),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Get access to the node registry for registering node types
    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    pub fn variables(&self) -> &Rc<RefCell<Variables>> {
        &self.variables
    }

    /// Get the event bus for direct access
    pub fn event_bus(&self) -> &Rc<EventBus> {
        &self.event_bus
    }

    /// Subscribe to the events of every flow created by this session
    pub fn subscribe_events(&self) -> broadcast::Receiver<TimestampedEvent> {
        self.event_bus.subscribe()
    }

    /// Empty flow in the configured default mode, wired to the session's
    /// variables and event bus
    pub fn create_flow(&self) -> Flow {
        let mut flow = Flow::with_variables(self.config.default_mode, Rc::clone(&self.variables));
        flow.add_listener(Rc::clone(&self.event_bus) as Rc<dyn FlowListener>);
        flow
    }

    /// Rebuild a saved flow using the session's registry
    pub fn load_flow(&self, data: &FlowData) -> Result<Flow, WorkflowError> {
        let mut flow = self.create_flow();
        flow.load(data, &self.registry)?;
        Ok(flow)
    }

    /// Parse and rebuild a saved flow
    pub fn load_flow_json(&self, json: &str) -> flowcore::Result<Flow> {
        let data: FlowData = serde_json::from_str(json)?;
        Ok(self.load_flow(&data)?)
    }

    /// Create a sub-flow and register `subflow.<name>` so call nodes can be
    /// created and reloaded through the registry
    pub fn create_subflow(&mut self, name: &str) -> Result<SharedSubflow, WorkflowError> {
        if self.subflows.contains_key(name) {
            return Err(WorkflowError::DuplicateIdentifier(name.to_string()));
        }
        let mut subflow = Subflow::with_variables(
            name,
            self.config.default_mode,
            Rc::clone(&self.variables),
        );
        subflow
            .flow_mut()
            .add_listener(Rc::clone(&self.event_bus) as Rc<dyn FlowListener>);
        let subflow = subflow.shared();

        self.registry
            .register(Rc::new(SubflowCallFactory::new(Rc::clone(&subflow))))?;
        self.subflows.insert(name.to_string(), Rc::clone(&subflow));
        info!(subflow = name, "sub-flow created");
        Ok(subflow)
    }

    pub fn subflow(&self, name: &str) -> Option<SharedSubflow> {
        self.subflows.get(name).cloned()
    }

    pub fn subflow_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.subflows.keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop a sub-flow and its call-node factory. Call nodes already placed
    /// keep the sub-flow alive until they are removed.
    pub fn remove_subflow(&mut self, name: &str) -> bool {
        let Some(subflow) = self.subflows.remove(name) else {
            return false;
        };
        let identifier = subflow.borrow().call_identifier();
        self.registry.unregister(&identifier);
        true
    }
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration for a session
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub default_mode: AlgorithmMode,
    pub event_buffer_size: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_mode: AlgorithmMode::Data,
            event_buffer_size: 1000,
        }
    }
}
