//! Graph federation: the registry of backend graphs, per-graph access
//! control, the fan-out engine and result merging.

pub mod access;
pub mod engine;
pub mod merge;
pub mod registry;
pub mod store;

pub use access::FederatedAccess;
pub use engine::{FederatedResult, FederationEngine, GraphFailure};
pub use merge::{merge_schemas, MergeContext, MergeContextKey, MergeFunction};
pub use registry::{GraphEntry, GraphRegistry, GraphSerialisable, GRAPH_KEY_PREFIX};
pub use store::{FederatedStore, FEDERATED_STORE_CLASS};
