//! Error types for operation dispatch, views and federation

use thiserror::Error;

use crate::schema::ValidationResult;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("Validation failed: {0}")]
    Validation(ValidationResult),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Illegal argument: {0}")]
    IllegalArgument(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Failed to execute operation on graph {graph_id}: {source}")]
    Backend {
        graph_id: String,
        #[source]
        source: Box<GraphError>,
    },

    #[error("Function error: {0}")]
    Function(String),

    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

impl GraphError {
    pub fn backend(graph_id: impl Into<String>, source: GraphError) -> Self {
        GraphError::Backend {
            graph_id: graph_id.into(),
            source: Box::new(source),
        }
    }
}

impl From<anyhow::Error> for GraphError {
    fn from(err: anyhow::Error) -> Self {
        GraphError::Cache(err.to_string())
    }
}

impl From<serde_json::Error> for GraphError {
    fn from(err: serde_json::Error) -> Self {
        GraphError::Serialization(err.to_string())
    }
}

impl From<fedgraph_common::ModelError> for GraphError {
    fn from(err: fedgraph_common::ModelError) -> Self {
        GraphError::Function(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
