//! The federated store: a `Store` whose data lives in the registered
//! backend graphs.

use async_trait::async_trait;
use fedgraph_common::config::{AppConfig, FederationConfig};
use moka::future::Cache;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::time::Duration;

use super::access::FederatedAccess;
use super::engine::FederationEngine;
use super::registry::GraphRegistry;
use crate::cache::{open_cache, CacheService};
use crate::error::Result;
use crate::named_view::{register_named_view_support, NamedViewCache};
use crate::operation::{FederatedOperation, GraphInfo, Operation, OperationChain, Output};
use crate::schema::Schema;
use crate::store::handlers::{register_output_handlers, wrong_operation};
use crate::store::{Context, Graph, GraphFactory, OperationDispatcher, OperationHandler, Store, StoreProperties};

pub const FEDERATED_STORE_CLASS: &str = "FederatedStore";

pub struct FederatedStore {
    graph_id: String,
    properties: StoreProperties,
    registry: Arc<GraphRegistry>,
    engine: FederationEngine,
    factory: GraphFactory,
    schema_cache: Cache<String, Schema>,
}

impl FederatedStore {
    /// Opens the configured cache, restores persisted graphs and returns the
    /// ready graph.
    pub async fn open(graph_id: impl Into<String>, config: &AppConfig, factory: GraphFactory) -> Result<Graph<FederatedStore>> {
        let graph_id = graph_id.into();
        let cache = open_cache(&config.cache)?;
        let registry = GraphRegistry::new()
            .with_cache(cache.clone())
            .with_admin_auth(config.federation.admin_auth.clone())
            .with_default_graph_ids(config.federation.default_graph_ids.clone());
        let restored = registry.restore(&factory).await?;
        tracing::info!("Federated store {} restored {} graphs", graph_id, restored);

        Self::graph(graph_id, Arc::new(registry), &config.federation, factory, cache)
    }

    /// Builds the graph around an existing registry. Named views are kept in
    /// `cache`.
    pub fn graph(
        graph_id: impl Into<String>,
        registry: Arc<GraphRegistry>,
        config: &FederationConfig,
        factory: GraphFactory,
        cache: Arc<dyn CacheService>,
    ) -> Result<Graph<FederatedStore>> {
        let schema_cache = Cache::builder()
            .time_to_live(Duration::from_secs(config.schema_cache_ttl_secs))
            .max_capacity(config.schema_cache_max_entries)
            .build();
        let store = Arc::new(Self {
            graph_id: graph_id.into(),
            properties: StoreProperties::new(FEDERATED_STORE_CLASS),
            engine: FederationEngine::new(registry.clone(), config),
            registry,
            factory,
            schema_cache,
        });

        let mut dispatcher = OperationDispatcher::new();
        dispatcher.register("FederatedOperation", Arc::new(FederatedOperationHandler))?;
        for kind in ["AddElements", "GetElements", "GetAllElements"] {
            dispatcher.register(kind, Arc::new(AutoFederateHandler))?;
        }
        dispatcher.register("AddGraph", Arc::new(AddGraphHandler))?;
        dispatcher.register("RemoveGraph", Arc::new(RemoveGraphHandler))?;
        dispatcher.register("ChangeGraphAccess", Arc::new(ChangeGraphAccessHandler))?;
        dispatcher.register("ChangeGraphId", Arc::new(ChangeGraphIdHandler))?;
        dispatcher.register("GetAllGraphIds", Arc::new(GetAllGraphIdsHandler))?;
        dispatcher.register("GetAllGraphInfo", Arc::new(GetAllGraphInfoHandler))?;
        register_output_handlers(&mut dispatcher)?;
        register_named_view_support(
            &mut dispatcher,
            Arc::new(NamedViewCache::new(cache)),
            config.admin_auth.clone(),
        )?;

        Ok(Graph::new(store, dispatcher))
    }

    pub fn registry(&self) -> &Arc<GraphRegistry> {
        &self.registry
    }

    pub fn engine(&self) -> &FederationEngine {
        &self.engine
    }

    /// Merged schema of the given graphs, cached per registry generation and
    /// caller.
    pub async fn schema_for(&self, ctx: &Context, graph_ids: Option<&[String]>) -> Result<Schema> {
        let user = ctx.user();
        let key = serde_json::to_string(&(self.registry.generation(), &user.user_id, &user.op_auths, graph_ids))?;
        if let Some(schema) = self.schema_cache.get(&key).await {
            return Ok(schema);
        }
        let schema = self.engine.merged_schema(user, graph_ids).await?;
        self.schema_cache.insert(key, schema.clone()).await;
        Ok(schema)
    }
}

#[async_trait]
impl Store for FederatedStore {
    fn graph_id(&self) -> &str {
        &self.graph_id
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }

    async fn schema(&self, ctx: &Context) -> Result<Schema> {
        self.schema_for(ctx, None).await
    }
}

pub struct FederatedOperationHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for FederatedOperationHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::FederatedOperation(op) = operation else {
            return Err(wrong_operation("FederatedOperation", &operation));
        };
        let result = store.engine.execute(op, ctx).await?;
        if !result.failures.is_empty() || !result.skipped.is_empty() {
            tracing::warn!(
                "[{}] Federated operation merged {} graphs, {} failed, {} not started",
                ctx.job_id(),
                result.executed.len(),
                result.failures.len(),
                result.skipped.len()
            );
        }
        Ok(result.output)
    }
}

/// Element operations sent straight to the federated store run on the
/// default graphs with the default merge.
pub struct AutoFederateHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for AutoFederateHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let op = FederatedOperation::new(OperationChain::from(operation));
        Ok(store.engine.execute(op, ctx).await?.output)
    }
}

pub struct AddGraphHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for AddGraphHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::AddGraph(op) = operation else {
            return Err(wrong_operation("AddGraph", &operation));
        };
        let handle = store.factory.create(&op.graph_id, op.schema, op.store_properties)?;
        let access = FederatedAccess::new(ctx.user().user_id.clone())
            .graph_auths(op.graph_auths)
            .public(op.is_public)
            .disabled_by_default(op.disabled_by_default);
        store.registry.register(handle, access).await?;
        Ok(None)
    }
}

pub struct RemoveGraphHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for RemoveGraphHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::RemoveGraph(op) = operation else {
            return Err(wrong_operation("RemoveGraph", &operation));
        };
        let removed = store.registry.remove(&op.graph_id, ctx.user()).await?;
        Ok(Some(Output::Boolean(removed)))
    }
}

pub struct ChangeGraphAccessHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for ChangeGraphAccessHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::ChangeGraphAccess(op) = operation else {
            return Err(wrong_operation("ChangeGraphAccess", &operation));
        };
        store
            .registry
            .modify_access(&op.graph_id, ctx.user(), |access| op.apply_to(access))
            .await?;
        Ok(Some(Output::Boolean(true)))
    }
}

pub struct ChangeGraphIdHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for ChangeGraphIdHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::ChangeGraphId(op) = operation else {
            return Err(wrong_operation("ChangeGraphId", &operation));
        };
        store
            .registry
            .change_graph_id(&op.graph_id, &op.new_graph_id, ctx.user())
            .await?;
        Ok(Some(Output::Boolean(true)))
    }
}

pub struct GetAllGraphIdsHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for GetAllGraphIdsHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        if !matches!(operation, Operation::GetAllGraphIds(_)) {
            return Err(wrong_operation("GetAllGraphIds", &operation));
        }
        Ok(Some(Output::Strings(store.registry.graph_ids(ctx.user()).await)))
    }
}

pub struct GetAllGraphInfoHandler;

#[async_trait]
impl OperationHandler<FederatedStore> for GetAllGraphInfoHandler {
    async fn execute(&self, operation: Operation, store: &FederatedStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::GetAllGraphInfo(op) = operation else {
            return Err(wrong_operation("GetAllGraphInfo", &operation));
        };
        let ids = match op.graph_ids {
            Some(ids) => ids,
            None => store.registry.graph_ids(ctx.user()).await,
        };
        let entries = store.registry.visible_graphs(ctx.user(), Some(&ids)).await?;
        let info: BTreeMap<String, GraphInfo> = entries
            .into_iter()
            .map(|entry| {
                let info = GraphInfo {
                    store_class: entry.properties().store_class.clone(),
                    access: entry.access().clone(),
                    groups: entry.schema().groups().map(String::from).collect(),
                };
                (entry.graph_id().to_string(), info)
            })
            .collect();
        Ok(Some(Output::GraphInfo(info)))
    }
}
