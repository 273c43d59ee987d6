pub mod cache;
pub mod error;
pub mod federation;
pub mod function;
pub mod named_view;
pub mod operation;
pub mod schema;
pub mod store;
pub mod view;

pub use error::{GraphError, Result};
pub use federation::{FederatedAccess, FederatedStore, FederationEngine, GraphRegistry, MergeFunction};
pub use named_view::{NamedViewCache, NamedViewDetail, ViewParameterDetail};
pub use operation::{Operation, OperationChain, Output};
pub use schema::{Schema, SchemaConfig};
pub use store::{Context, Graph, GraphFactory, GraphHandle, InMemoryStore, Store, StoreProperties};
pub use view::{View, ViewElementDefinition, ViewEngine};
