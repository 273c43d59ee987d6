//! Stores, the per-store operation dispatcher and the graph handle the
//! federation layer talks to.

pub mod dispatcher;
pub mod factory;
pub mod handlers;
pub mod memory;

pub use dispatcher::{ChainOptimiser, OperationDispatcher, OperationHandler};
pub use factory::GraphFactory;
pub use memory::InMemoryStore;

use async_trait::async_trait;
use fedgraph_common::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{Duration, Instant};

use crate::error::{GraphError, Result};
use crate::operation::{Operation, OperationChain, Output};
use crate::schema::Schema;

/// Per-request execution state: the caller, a job id for log correlation,
/// and the shared cancellation signal and deadline.
#[derive(Debug, Clone)]
pub struct Context {
    user: User,
    job_id: String,
    deadline: Option<Instant>,
    cancelled: Arc<AtomicBool>,
    pub variables: BTreeMap<String, serde_json::Value>,
}

impl Context {
    pub fn new(user: User) -> Self {
        Self {
            user,
            job_id: uuid::Uuid::new_v4().to_string(),
            deadline: None,
            cancelled: Arc::new(AtomicBool::new(false)),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Signals every execution sharing this context to stop at its next
    /// boundary.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Fails with [`GraphError::Cancelled`] once cancelled or past the deadline.
    pub fn check_active(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(GraphError::Cancelled(format!("job {} was cancelled", self.job_id)));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(GraphError::Cancelled(format!("job {} passed its deadline", self.job_id)));
            }
        }
        Ok(())
    }

    /// Context for one sub-execution: same user, job and cancellation
    /// signal; the tighter of the two deadlines.
    pub fn child(&self, timeout: Option<Duration>) -> Context {
        let mut child = self.clone();
        if let Some(timeout) = timeout {
            let candidate = Instant::now() + timeout;
            child.deadline = Some(match self.deadline {
                Some(existing) if existing < candidate => existing,
                _ => candidate,
            });
        }
        child
    }
}

/// Backend settings: the store class selects an implementation in the
/// [`GraphFactory`]; the rest is passed through to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreProperties {
    pub store_class: String,
    #[serde(default)]
    pub properties: BTreeMap<String, serde_json::Value>,
}

impl StoreProperties {
    pub fn new(store_class: impl Into<String>) -> Self {
        Self {
            store_class: store_class.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(memory::IN_MEMORY_STORE_CLASS)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    fn graph_id(&self) -> &str;

    fn properties(&self) -> &StoreProperties;

    /// The schema as seen by the context's user.
    async fn schema(&self, ctx: &Context) -> Result<Schema>;
}

/// What the federation layer needs from a backend graph.
#[async_trait]
pub trait GraphHandle: Send + Sync {
    fn graph_id(&self) -> &str;

    fn properties(&self) -> &StoreProperties;

    async fn schema(&self, ctx: &Context) -> Result<Schema>;

    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<Option<Output>>;
}

/// A store with its dispatcher.
pub struct Graph<S: Store> {
    store: Arc<S>,
    dispatcher: OperationDispatcher<S>,
}

impl<S: Store> Graph<S> {
    pub fn new(store: Arc<S>, dispatcher: OperationDispatcher<S>) -> Self {
        Self { store, dispatcher }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn dispatcher(&self) -> &OperationDispatcher<S> {
        &self.dispatcher
    }

    pub async fn execute_op(&self, operation: impl Into<Operation>, ctx: &Context) -> Result<Option<Output>> {
        self.execute(OperationChain::new(vec![operation.into()]), ctx).await
    }
}

#[async_trait]
impl<S: Store> GraphHandle for Graph<S> {
    fn graph_id(&self) -> &str {
        self.store.graph_id()
    }

    fn properties(&self) -> &StoreProperties {
        self.store.properties()
    }

    async fn schema(&self, ctx: &Context) -> Result<Schema> {
        self.store.schema(ctx).await
    }

    async fn execute(&self, chain: OperationChain, ctx: &Context) -> Result<Option<Output>> {
        self.dispatcher.execute(&self.store, chain, ctx).await
    }
}
