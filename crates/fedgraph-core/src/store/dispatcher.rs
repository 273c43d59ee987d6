use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use super::{Context, Store};
use crate::error::{GraphError, Result};
use crate::operation::{Operation, OperationChain, Output};
use crate::schema::ValidationResult;

#[async_trait]
pub trait OperationHandler<S: Store>: Send + Sync {
    /// Schema-dependent checks, run for every operation of a chain before
    /// any of them executes.
    async fn prepare(&self, _operation: &Operation, _store: &S, _ctx: &Context) -> Result<ValidationResult> {
        Ok(ValidationResult::ok())
    }

    async fn execute(&self, operation: Operation, store: &S, ctx: &Context) -> Result<Option<Output>>;
}

/// Rewrites a chain before execution.
#[async_trait]
pub trait ChainOptimiser: Send + Sync {
    fn name(&self) -> &str;

    async fn optimise(&self, chain: OperationChain, ctx: &Context) -> Result<OperationChain>;
}

pub struct OperationDispatcher<S: Store> {
    handlers: HashMap<String, Arc<dyn OperationHandler<S>>>,
    optimisers: Vec<Arc<dyn ChainOptimiser>>,
}

impl<S: Store> Default for OperationDispatcher<S> {
    fn default() -> Self {
        Self {
            handlers: HashMap::new(),
            optimisers: Vec::new(),
        }
    }
}

impl<S: Store> OperationDispatcher<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Each kind maps to exactly one handler.
    pub fn register(&mut self, kind: impl Into<String>, handler: Arc<dyn OperationHandler<S>>) -> Result<()> {
        let kind = kind.into();
        if self.handlers.contains_key(&kind) {
            return Err(GraphError::AlreadyExists(format!("a handler for {} is already registered", kind)));
        }
        self.handlers.insert(kind, handler);
        Ok(())
    }

    /// Optimisers run in registration order.
    pub fn add_optimiser(&mut self, optimiser: Arc<dyn ChainOptimiser>) {
        self.optimisers.push(optimiser);
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.handlers.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        kinds
    }

    fn handler(&self, kind: &str) -> Result<&Arc<dyn OperationHandler<S>>> {
        self.handlers
            .get(kind)
            .ok_or_else(|| GraphError::UnsupportedOperation(format!("{} is not supported by this store", kind)))
    }

    async fn validate(&self, store: &S, chain: &OperationChain, ctx: &Context) -> Result<()> {
        let mut result = ValidationResult::ok();
        for (index, operation) in chain.operations.iter().enumerate() {
            let handler = self.handler(operation.kind())?;
            let prefix = format!("operations[{}]", index);
            result.merge(operation.validate().prefixed(&prefix));
            result.merge(handler.prepare(operation, store, ctx).await?.prefixed(&prefix));
        }
        result.into_result()
    }

    /// Flattens, validates and optimises the chain, then runs it step by
    /// step. The first failure aborts the chain.
    pub async fn execute(&self, store: &S, chain: OperationChain, ctx: &Context) -> Result<Option<Output>> {
        let mut chain = chain.flatten();
        self.validate(store, &chain, ctx).await?;

        if !self.optimisers.is_empty() {
            for optimiser in &self.optimisers {
                chain = optimiser.optimise(chain, ctx).await?.flatten();
                tracing::debug!("Optimiser {} produced {} operations", optimiser.name(), chain.len());
            }
            self.validate(store, &chain, ctx).await?;
        }

        let mut carried: Option<Output> = None;
        for mut operation in chain.operations {
            ctx.check_active()?;
            if let Some(output) = carried.take() {
                if operation.accepts_input() && !operation.has_input() {
                    operation.set_input(output)?;
                }
            }
            let handler = self.handler(operation.kind())?;
            tracing::debug!(
                "[{}] Dispatching {} on graph {}",
                ctx.job_id(),
                operation.kind(),
                store.graph_id()
            );
            carried = handler.execute(operation, store, ctx).await?;
        }
        Ok(carried)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Count, CustomOperation, Limit};
    use crate::schema::Schema;
    use crate::store::StoreProperties;
    use fedgraph_common::User;
    use std::sync::Mutex;

    struct NullStore {
        properties: StoreProperties,
    }

    #[async_trait]
    impl Store for NullStore {
        fn graph_id(&self) -> &str {
            "null"
        }

        fn properties(&self) -> &StoreProperties {
            &self.properties
        }

        async fn schema(&self, _ctx: &Context) -> Result<Schema> {
            Ok(Schema::empty())
        }
    }

    /// Records the kinds it ran and emits a fixed output.
    struct Recording {
        seen: Arc<Mutex<Vec<String>>>,
        output: Option<Output>,
    }

    #[async_trait]
    impl OperationHandler<NullStore> for Recording {
        async fn execute(&self, operation: Operation, _store: &NullStore, _ctx: &Context) -> Result<Option<Output>> {
            let mut seen = self.seen.lock().unwrap();
            seen.push(format!("{}:{}", operation.kind(), operation.has_input()));
            Ok(self.output.clone())
        }
    }

    fn null_store() -> NullStore {
        NullStore {
            properties: StoreProperties::new("Null"),
        }
    }

    #[test]
    fn test_duplicate_registration_fails() {
        let mut dispatcher: OperationDispatcher<NullStore> = OperationDispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        dispatcher
            .register("Count", Arc::new(Recording { seen: seen.clone(), output: None }))
            .unwrap();
        let err = dispatcher
            .register("Count", Arc::new(Recording { seen, output: None }))
            .unwrap_err();
        assert!(matches!(err, GraphError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn test_unknown_kind_is_unsupported() {
        let dispatcher: OperationDispatcher<NullStore> = OperationDispatcher::new();
        let ctx = Context::new(User::default());
        let chain = OperationChain::from(Operation::from(CustomOperation::new("Teleport", serde_json::Value::Null)));
        let err = dispatcher.execute(&null_store(), chain, &ctx).await.unwrap_err();
        match err {
            GraphError::UnsupportedOperation(msg) => assert!(msg.contains("Teleport")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_output_is_wired_into_next_step() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher: OperationDispatcher<NullStore> = OperationDispatcher::new();
        dispatcher
            .register(
                "Source",
                Arc::new(Recording { seen: seen.clone(), output: Some(Output::Long(5)) }),
            )
            .unwrap();
        dispatcher
            .register("Count", Arc::new(Recording { seen: seen.clone(), output: Some(Output::Long(1)) }))
            .unwrap();
        dispatcher
            .register("Limit", Arc::new(Recording { seen: seen.clone(), output: None }))
            .unwrap();

        let chain = OperationChain::from(Operation::from(CustomOperation::new("Source", serde_json::Value::Null)))
            .then(Count::default())
            .then(Limit::new(1));
        let ctx = Context::new(User::default());
        let result = dispatcher.execute(&null_store(), chain, &ctx).await.unwrap();

        assert_eq!(result, None);
        let seen = seen.lock().unwrap().clone();
        // Custom ops accept input but the first has none to receive.
        assert_eq!(seen, vec!["Source:false", "Count:true", "Limit:true"]);
    }

    struct AppendCount;

    #[async_trait]
    impl ChainOptimiser for AppendCount {
        fn name(&self) -> &str {
            "append-count"
        }

        async fn optimise(&self, chain: OperationChain, _ctx: &Context) -> Result<OperationChain> {
            Ok(chain.then(Count::default()))
        }
    }

    #[tokio::test]
    async fn test_optimisers_rewrite_before_execution() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher: OperationDispatcher<NullStore> = OperationDispatcher::new();
        dispatcher
            .register("Count", Arc::new(Recording { seen: seen.clone(), output: Some(Output::Long(0)) }))
            .unwrap();
        dispatcher.add_optimiser(Arc::new(AppendCount));

        let ctx = Context::new(User::default());
        let result = dispatcher
            .execute(&null_store(), OperationChain::from(Count::default()), &ctx)
            .await
            .unwrap();
        assert_eq!(result, Some(Output::Long(0)));
        assert_eq!(seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_cancelled_context_stops_execution() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut dispatcher: OperationDispatcher<NullStore> = OperationDispatcher::new();
        dispatcher
            .register("Count", Arc::new(Recording { seen: seen.clone(), output: None }))
            .unwrap();
        let ctx = Context::new(User::default());
        ctx.cancel();
        let err = dispatcher
            .execute(&null_store(), OperationChain::from(Count::default()), &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::Cancelled(_)));
        assert!(seen.lock().unwrap().is_empty());
    }
}
