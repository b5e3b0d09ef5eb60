use flowcore::{Node, NodeError, WorkflowError};
use std::collections::HashMap;
use std::rc::Rc;

/// Factory trait for creating node instances
pub trait NodeFactory {
    /// Create a fresh instance; persisted state is applied afterwards
    fn create(&self) -> Result<Box<dyn Node>, NodeError>;

    /// Get node type identifier
    fn node_type(&self) -> &str;

    /// Identifiers this node type was saved under in the past
    fn legacy_identifiers(&self) -> Vec<String> {
        Vec::new()
    }

    /// Optional: Get node metadata (description, input/output schema, etc.)
    fn metadata(&self) -> NodeMetadata {
        NodeMetadata::default()
    }
}

/// Metadata about a node type
#[derive(Debug, Clone)]
pub struct NodeMetadata {
    pub description: String,
    pub category: String,
    pub inputs: Vec<PortDefinition>,
    pub outputs: Vec<PortDefinition>,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            description: String::new(),
            category: "general".to_string(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PortDefinition {
    pub name: String,
    pub description: String,
}

impl PortDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
        }
    }
}

struct FnFactory<F> {
    node_type: String,
    metadata: NodeMetadata,
    create: F,
}

impl<F> NodeFactory for FnFactory<F>
where
    F: Fn() -> Box<dyn Node>,
{
    fn create(&self) -> Result<Box<dyn Node>, NodeError> {
        Ok((self.create)())
    }

    fn node_type(&self) -> &str {
        &self.node_type
    }

    fn metadata(&self) -> NodeMetadata {
        self.metadata.clone()
    }
}

/// Registry of available node types.
///
/// Lookup goes to the identifier map first and only consults the legacy
/// alias map on a miss.
#[derive(Default)]
pub struct NodeRegistry {
    factories: HashMap<String, Rc<dyn NodeFactory>>,
    aliases: HashMap<String, String>,
}

impl NodeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node factory together with its legacy identifiers
    pub fn register(&mut self, factory: Rc<dyn NodeFactory>) -> Result<(), WorkflowError> {
        let node_type = factory.node_type().to_string();
        if self.factories.contains_key(&node_type) {
            return Err(WorkflowError::DuplicateIdentifier(node_type));
        }
        tracing::info!("Registering node type: {}", node_type);
        for alias in factory.legacy_identifiers() {
            self.aliases.insert(alias, node_type.clone());
        }
        self.factories.insert(node_type, factory);
        Ok(())
    }

    /// Register a closure as the factory of a node type
    pub fn register_fn<F>(
        &mut self,
        node_type: impl Into<String>,
        metadata: NodeMetadata,
        create: F,
    ) -> Result<(), WorkflowError>
    where
        F: Fn() -> Box<dyn Node> + 'static,
    {
        self.register(Rc::new(FnFactory {
            node_type: node_type.into(),
            metadata,
            create,
        }))
    }

    /// Resolve `old` to `node_type` when no factory is registered under `old`
    pub fn register_alias(&mut self, old: impl Into<String>, node_type: impl Into<String>) {
        self.aliases.insert(old.into(), node_type.into());
    }

    pub fn unregister(&mut self, node_type: &str) -> bool {
        self.aliases.retain(|_, target| target != node_type);
        self.factories.remove(node_type).is_some()
    }

    /// Factory for an identifier, falling back to the alias map
    pub fn resolve(&self, identifier: &str) -> Option<&Rc<dyn NodeFactory>> {
        self.factories.get(identifier).or_else(|| {
            self.aliases
                .get(identifier)
                .and_then(|target| self.factories.get(target))
        })
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.resolve(identifier).is_some()
    }

    /// Create a node instance from its identifier
    pub fn create_node(&self, identifier: &str) -> Result<Box<dyn Node>, WorkflowError> {
        let factory = self
            .resolve(identifier)
            .ok_or_else(|| WorkflowError::UnknownNodeType(identifier.to_string()))?;

        factory
            .create()
            .map_err(|e| WorkflowError::Invalid(format!("Failed to create node: {}", e)))
    }

    /// Get all registered node types, sorted
    pub fn list_node_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Get metadata for a node type
    pub fn get_metadata(&self, node_type: &str) -> Option<NodeMetadata> {
        self.resolve(node_type).map(|f| f.metadata())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowcore::NodeContext;

    struct Marker(&'static str);

    impl Node for Marker {
        fn identifier(&self) -> &str {
            self.0
        }

        fn on_update(
            &mut self,
            _ctx: &mut dyn NodeContext,
            _input: Option<usize>,
        ) -> Result<(), NodeError> {
            Ok(())
        }
    }

    struct RenamedFactory;

    impl NodeFactory for RenamedFactory {
        fn create(&self) -> Result<Box<dyn Node>, NodeError> {
            Ok(Box::new(Marker("math.sum")))
        }

        fn node_type(&self) -> &str {
            "math.sum"
        }

        fn legacy_identifiers(&self) -> Vec<String> {
            vec!["AddNode".to_string()]
        }
    }

    #[test]
    fn resolves_legacy_identifiers_on_miss() {
        let mut registry = NodeRegistry::new();
        registry.register(Rc::new(RenamedFactory)).unwrap();
        registry.register_alias("old.sum", "math.sum");

        assert_eq!(registry.create_node("AddNode").unwrap().identifier(), "math.sum");
        assert_eq!(registry.create_node("old.sum").unwrap().identifier(), "math.sum");
        assert_eq!(
            registry.create_node("missing").err(),
            Some(WorkflowError::UnknownNodeType("missing".to_string()))
        );
    }

    #[test]
    fn direct_identifier_wins_over_alias() {
        let mut registry = NodeRegistry::new();
        registry.register(Rc::new(RenamedFactory)).unwrap();
        registry
            .register_fn("AddNode", NodeMetadata::default(), || {
                Box::new(Marker("AddNode")) as Box<dyn Node>
            })
            .unwrap();

        assert_eq!(registry.create_node("AddNode").unwrap().identifier(), "AddNode");
        assert_eq!(registry.list_node_types(), vec!["AddNode", "math.sum"]);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let mut registry = NodeRegistry::new();
        registry.register(Rc::new(RenamedFactory)).unwrap();
        assert_eq!(
            registry.register(Rc::new(RenamedFactory)),
            Err(WorkflowError::DuplicateIdentifier("math.sum".to_string()))
        );
        assert!(registry.unregister("math.sum"));
        assert!(!registry.contains("AddNode"));
    }
}
