use async_trait::async_trait;
use fedgraph_common::config::{AppConfig, CacheBackend, CacheConfig, FederationConfig};
use fedgraph_common::{Element, Entity, PropertyValue, User, ValueClass};
use fedgraph_core::cache::MemoryCache;
use fedgraph_core::federation::{FederatedAccess, FederatedStore, FederationEngine, GraphRegistry, MergeFunction};
use fedgraph_core::function::{BinaryOperator, FilterDef, Predicate};
use fedgraph_core::operation::{
    AddElements, AddGraph, Count, FederatedOperation, GetAllElements, GetAllGraphIds, GetSchema,
};
use fedgraph_core::schema::{ElementDefinition, TypeDefinition};
use fedgraph_core::store::Graph;
use fedgraph_core::{
    Context, GraphError, GraphFactory, GraphHandle, InMemoryStore, OperationChain, Output, Result, Schema,
    StoreProperties, View, ViewElementDefinition,
};
use std::sync::Arc;
use tokio::time::Duration;

fn schema() -> Schema {
    Schema::builder()
        .type_def("vertex.string", TypeDefinition::new(ValueClass::String))
        .type_def(
            "count.long",
            TypeDefinition::new(ValueClass::Long).with_aggregate_function(BinaryOperator::Sum),
        )
        .entity(
            "Entity",
            ElementDefinition::entity("vertex.string").property("count", "count.long"),
        )
        .build()
        .expect("schema should build")
}

fn other_schema() -> Schema {
    Schema::builder()
        .type_def("vertex.string", TypeDefinition::new(ValueClass::String))
        .entity("Other", ElementDefinition::entity("vertex.string"))
        .build()
        .expect("schema should build")
}

fn entity(vertex: &str, count: i64) -> Element {
    Entity::new("Entity", vertex).with_property("count", count).into()
}

fn alice() -> Context {
    Context::new(User::new("alice"))
}

async fn memory_graph(graph_id: &str, elements: Vec<Element>) -> Arc<dyn GraphHandle> {
    let graph = InMemoryStore::graph(graph_id, schema()).unwrap();
    if !elements.is_empty() {
        graph.execute_op(AddElements::new(elements), &alice()).await.unwrap();
    }
    Arc::new(graph)
}

struct FailingGraph {
    graph_id: String,
    properties: StoreProperties,
}

impl FailingGraph {
    fn handle(graph_id: &str) -> Arc<dyn GraphHandle> {
        Arc::new(Self {
            graph_id: graph_id.to_string(),
            properties: StoreProperties::new("Failing"),
        })
    }
}

#[async_trait]
impl GraphHandle for FailingGraph {
    fn graph_id(&self) -> &str {
        &self.graph_id
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }

    async fn schema(&self, _ctx: &Context) -> Result<Schema> {
        Ok(schema())
    }

    async fn execute(&self, _chain: OperationChain, _ctx: &Context) -> Result<Option<Output>> {
        Err(GraphError::Execution("backend unavailable".to_string()))
    }
}

struct SlowGraph {
    graph_id: String,
    properties: StoreProperties,
}

#[async_trait]
impl GraphHandle for SlowGraph {
    fn graph_id(&self) -> &str {
        &self.graph_id
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }

    async fn schema(&self, _ctx: &Context) -> Result<Schema> {
        Ok(schema())
    }

    async fn execute(&self, _chain: OperationChain, _ctx: &Context) -> Result<Option<Output>> {
        tokio::time::sleep(Duration::from_secs(10)).await;
        Ok(Some(Output::Elements(vec![entity("slow", 1)])))
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

async fn public_registry(graphs: Vec<Arc<dyn GraphHandle>>) -> Arc<GraphRegistry> {
    init_logging();
    let registry = GraphRegistry::new();
    for graph in graphs {
        registry
            .register(graph, FederatedAccess::new("alice").public(true))
            .await
            .unwrap();
    }
    Arc::new(registry)
}

fn federated(registry: Arc<GraphRegistry>) -> Graph<FederatedStore> {
    FederatedStore::graph(
        "federated",
        registry,
        &FederationConfig::default(),
        GraphFactory::default(),
        Arc::new(MemoryCache::new()),
    )
    .unwrap()
}

#[tokio::test]
async fn test_default_merge_aggregates_across_graphs() {
    let registry = public_registry(vec![
        memory_graph("a", vec![entity("x", 1)]).await,
        memory_graph("b", vec![entity("x", 1)]).await,
    ])
    .await;
    let graph = federated(registry);

    let output = graph
        .execute_op(FederatedOperation::new(GetAllElements::new()), &alice())
        .await
        .unwrap()
        .unwrap();
    let elements = output.into_elements().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].property("count"), Some(&PropertyValue::Long(2)));
}

#[tokio::test]
async fn test_concatenate_merge_keeps_each_graph_result() {
    let registry = public_registry(vec![
        memory_graph("a", vec![entity("x", 1)]).await,
        memory_graph("b", vec![entity("x", 1)]).await,
    ])
    .await;
    let graph = federated(registry);

    let op = FederatedOperation::new(GetAllElements::new()).merge(MergeFunction::Concatenate);
    let elements = graph.execute_op(op, &alice()).await.unwrap().unwrap().into_elements().unwrap();
    assert_eq!(elements.len(), 2);
    assert!(elements
        .iter()
        .all(|e| e.property("count") == Some(&PropertyValue::Long(1))));
}

#[tokio::test]
async fn test_counts_are_summed() {
    let registry = public_registry(vec![
        memory_graph("a", vec![entity("x", 1)]).await,
        memory_graph("b", vec![entity("y", 1), entity("z", 1)]).await,
    ])
    .await;
    let graph = federated(registry);

    let payload = OperationChain::new(vec![GetAllElements::new().into()]).then(Count::default());
    let output = graph.execute_op(FederatedOperation::new(payload), &alice()).await.unwrap();
    assert_eq!(output, Some(Output::Long(3)));
}

#[tokio::test]
async fn test_reapplied_view_matches_single_pass() {
    let view = View::new().entity(
        "Entity",
        ViewElementDefinition::new()
            .pre_aggregation_filter(FilterDef::new(
                ["count"],
                Predicate::IsLessThan {
                    value: PropertyValue::Long(6),
                    or_equal_to: false,
                },
            ))
            .post_aggregation_filter(FilterDef::new(
                ["count"],
                Predicate::IsMoreThan {
                    value: PropertyValue::Long(3),
                    or_equal_to: false,
                },
            )),
    );
    let raw_a = vec![entity("x", 1), entity("x", 2)];
    let raw_b = vec![entity("y", 3), entity("y", 5)];

    let single = memory_graph("all", raw_a.iter().chain(raw_b.iter()).cloned().collect()).await;
    let expected = single
        .execute(OperationChain::new(vec![GetAllElements::new().view(view.clone()).into()]), &alice())
        .await
        .unwrap();

    let registry = public_registry(vec![memory_graph("a", raw_a).await, memory_graph("b", raw_b).await]).await;
    let graph = federated(registry);
    let federated_output = graph
        .execute_op(FederatedOperation::new(GetAllElements::new().view(view)), &alice())
        .await
        .unwrap();

    assert_eq!(federated_output, expected);
    let elements = expected.unwrap().into_elements().unwrap();
    assert_eq!(elements.len(), 1);
    assert_eq!(elements[0].property("count"), Some(&PropertyValue::Long(8)));
}

#[tokio::test]
async fn test_skip_failed_merges_remaining_graphs_in_order() {
    let registry = public_registry(vec![
        FailingGraph::handle("a"),
        memory_graph("b", vec![entity("b1", 1)]).await,
        memory_graph("c", vec![entity("c1", 1)]).await,
    ])
    .await;
    let engine = FederationEngine::new(registry, &FederationConfig::default());

    let op = FederatedOperation::new(GetAllElements::new())
        .graph_ids(["a", "b", "c"])
        .merge(MergeFunction::Concatenate)
        .skip_failed(true);
    let result = engine.execute(op, &alice()).await.unwrap();

    assert_eq!(result.executed, vec!["b".to_string(), "c".to_string()]);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].graph_id, "a");
    let vertices: Vec<_> = result
        .output
        .unwrap()
        .into_elements()
        .unwrap()
        .iter()
        .map(|e| e.element_id())
        .collect();
    assert_eq!(vertices, vec![entity("b1", 1).element_id(), entity("c1", 1).element_id()]);
}

#[tokio::test]
async fn test_failure_without_skip_names_the_graph() {
    let registry = public_registry(vec![
        memory_graph("a", vec![entity("x", 1)]).await,
        FailingGraph::handle("b"),
    ])
    .await;
    let engine = FederationEngine::new(registry, &FederationConfig::default());

    let err = engine
        .execute(FederatedOperation::new(GetAllElements::new()), &alice())
        .await
        .unwrap_err();
    match err {
        GraphError::Backend { graph_id, .. } => assert_eq!(graph_id, "b"),
        other => panic!("unexpected error {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_graph_is_skipped_after_deadline() {
    let slow: Arc<dyn GraphHandle> = Arc::new(SlowGraph {
        graph_id: "slow".to_string(),
        properties: StoreProperties::new("Slow"),
    });
    let registry = public_registry(vec![memory_graph("fast", vec![entity("x", 1)]).await, slow]).await;
    let config = FederationConfig {
        execution_timeout_ms: 50,
        skip_failed_federated_execution: true,
        ..FederationConfig::default()
    };
    let engine = FederationEngine::new(registry, &config);

    let op = FederatedOperation::new(GetAllElements::new()).merge(MergeFunction::Concatenate);
    let result = engine.execute(op, &alice()).await.unwrap();
    assert_eq!(result.executed, vec!["fast".to_string()]);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].graph_id, "slow");
}

#[tokio::test]
async fn test_cancelled_request_does_not_start_graphs() {
    let registry = public_registry(vec![memory_graph("a", vec![entity("x", 1)]).await]).await;
    let engine = FederationEngine::new(registry, &FederationConfig::default());
    let ctx = alice();
    ctx.cancel();

    let err = engine
        .execute(FederatedOperation::new(GetAllElements::new()), &ctx)
        .await
        .unwrap_err();
    assert!(matches!(err, GraphError::Cancelled(_)));

    let op = FederatedOperation::new(GetAllElements::new())
        .merge(MergeFunction::Concatenate)
        .skip_failed(true);
    let result = engine.execute(op, &ctx).await.unwrap();
    assert!(result.executed.is_empty());
    assert!(result.failures.is_empty());
    assert_eq!(result.skipped, vec!["a".to_string()]);
    assert_eq!(result.output, None);
}

#[tokio::test]
async fn test_empty_graph_id_list_federates_over_default_set() {
    let registry = public_registry(vec![
        memory_graph("a", vec![entity("x", 1)]).await,
        memory_graph("b", vec![entity("y", 1)]).await,
    ])
    .await;
    let engine = FederationEngine::new(registry, &FederationConfig::default());

    let op = FederatedOperation::new(GetAllElements::new()).graph_ids(Vec::<String>::new());
    let result = engine.execute(op, &alice()).await.unwrap();
    assert_eq!(result.executed, vec!["a".to_string(), "b".to_string()]);
    assert_eq!(result.output.unwrap().into_elements().unwrap().len(), 2);
}

#[tokio::test]
async fn test_hidden_and_missing_graphs_fail_alike() {
    let registry = GraphRegistry::new();
    registry
        .register(memory_graph("secret", Vec::new()).await, FederatedAccess::new("alice"))
        .await
        .unwrap();
    let bob = User::new("bob");

    assert!(registry.visible_graphs(&bob, None).await.unwrap().is_empty());

    let hidden = registry
        .visible_graphs(&bob, Some(&["secret".to_string()]))
        .await
        .unwrap_err();
    let missing = registry
        .visible_graphs(&bob, Some(&["nothing".to_string()]))
        .await
        .unwrap_err();
    assert!(matches!(hidden, GraphError::IllegalArgument(_)));
    assert!(matches!(missing, GraphError::IllegalArgument(_)));
    assert_eq!(hidden.to_string().replace("secret", "nothing"), missing.to_string());
    assert!(!hidden.to_string().contains("Entity"));
}

#[tokio::test]
async fn test_register_is_idempotent_for_identical_content() {
    let registry = GraphRegistry::new();
    let access = FederatedAccess::new("alice");
    registry
        .register(memory_graph("a", Vec::new()).await, access.clone())
        .await
        .unwrap();
    let generation = registry.generation();
    registry
        .register(memory_graph("a", Vec::new()).await, access.clone())
        .await
        .unwrap();
    assert_eq!(registry.len().await, 1);
    assert_eq!(registry.generation(), generation);

    let different = InMemoryStore::graph("a", other_schema()).unwrap();
    let err = registry.register(Arc::new(different), access).await.unwrap_err();
    assert!(matches!(err, GraphError::AlreadyExists(ref msg) if msg.contains("schema")));
}

#[tokio::test]
async fn test_added_elements_are_scoped_to_each_graph_schema() {
    let graph_a = InMemoryStore::graph("a", schema()).unwrap();
    let graph_b = InMemoryStore::graph("b", other_schema()).unwrap();
    let store_a = graph_a.store().clone();
    let store_b = graph_b.store().clone();
    let registry = public_registry(vec![Arc::new(graph_a), Arc::new(graph_b)]).await;
    let graph = federated(registry);

    let elements = vec![entity("x", 1), Entity::new("Other", "o").into()];
    graph.execute_op(AddElements::new(elements), &alice()).await.unwrap();

    assert_eq!(store_a.len().await, 1);
    assert_eq!(store_b.len().await, 1);
}

#[tokio::test]
async fn test_federated_schema_is_the_union() {
    let registry = public_registry(vec![
        memory_graph("a", Vec::new()).await,
        Arc::new(InMemoryStore::graph("b", other_schema()).unwrap()),
    ])
    .await;
    let graph = federated(registry);

    let output = graph.execute_op(GetSchema::default(), &alice()).await.unwrap();
    let Some(Output::Schema(merged)) = output else {
        panic!("expected a schema");
    };
    assert!(merged.has_group("Entity"));
    assert!(merged.has_group("Other"));
}

#[tokio::test]
async fn test_graphs_survive_restart_with_rocksdb_cache() {
    let dir = tempfile::tempdir().unwrap();
    let config = AppConfig {
        federation: FederationConfig::default(),
        cache: CacheConfig {
            backend: CacheBackend::Rocksdb,
            path: dir.path().join("cache").to_string_lossy().into_owned(),
        },
    };

    {
        let graph = FederatedStore::open("federated", &config, GraphFactory::default())
            .await
            .unwrap();
        graph
            .execute_op(AddGraph::new("a", schema(), StoreProperties::in_memory()), &alice())
            .await
            .unwrap();
    }

    let graph = FederatedStore::open("federated", &config, GraphFactory::default())
        .await
        .unwrap();
    let ids = graph.execute_op(GetAllGraphIds::default(), &alice()).await.unwrap();
    assert_eq!(ids, Some(Output::Strings(vec!["a".to_string()])));
    assert_eq!(graph.store().registry().len().await, 1);
}
