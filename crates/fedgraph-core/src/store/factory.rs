use std::collections::HashMap;
use std::sync::Arc;

use super::memory::{InMemoryStore, IN_MEMORY_STORE_CLASS};
use super::{GraphHandle, StoreProperties};
use crate::error::{GraphError, Result};
use crate::schema::Schema;

pub type GraphBuilder = Arc<dyn Fn(&str, Schema, StoreProperties) -> Result<Arc<dyn GraphHandle>> + Send + Sync>;

/// Builds backend graphs from their persisted description, keyed by store
/// class. Used for `AddGraph` and for restoring the registry at startup.
#[derive(Clone)]
pub struct GraphFactory {
    builders: HashMap<String, GraphBuilder>,
}

impl Default for GraphFactory {
    fn default() -> Self {
        let mut builders: HashMap<String, GraphBuilder> = HashMap::new();
        builders.insert(
            IN_MEMORY_STORE_CLASS.to_string(),
            Arc::new(|graph_id: &str, schema: Schema, properties: StoreProperties| {
                let graph = InMemoryStore::graph_with_properties(graph_id, schema, properties)?;
                Ok(Arc::new(graph) as Arc<dyn GraphHandle>)
            }),
        );
        Self { builders }
    }
}

impl GraphFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, store_class: impl Into<String>, builder: GraphBuilder) -> Result<()> {
        let store_class = store_class.into();
        if self.builders.contains_key(&store_class) {
            return Err(GraphError::AlreadyExists(format!("store class {}", store_class)));
        }
        self.builders.insert(store_class, builder);
        Ok(())
    }

    pub fn supports(&self, store_class: &str) -> bool {
        self.builders.contains_key(store_class)
    }

    pub fn create(&self, graph_id: &str, schema: Schema, properties: StoreProperties) -> Result<Arc<dyn GraphHandle>> {
        let builder = self.builders.get(&properties.store_class).ok_or_else(|| {
            GraphError::IllegalArgument(format!("unknown store class {}", properties.store_class))
        })?;
        builder(graph_id, schema, properties)
    }
}
