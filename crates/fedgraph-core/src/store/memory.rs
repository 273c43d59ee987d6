//! Map-backed element storage, used as the default and test backend.
//!
//! Elements are kept as written; aggregation and filtering happen at read
//! time through the view engine, so the stored form never loses detail.

use async_trait::async_trait;
use fedgraph_common::{Element, ElementId, SeedMatching, User};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::handlers::{register_output_handlers, wrong_operation};
use super::{Context, Graph, OperationDispatcher, OperationHandler, Store, StoreProperties};
use crate::error::{GraphError, Result};
use crate::operation::{Operation, Output};
use crate::schema::{Schema, ValidationResult};
use crate::view::{View, ViewEngine};

pub const IN_MEMORY_STORE_CLASS: &str = "InMemory";

pub struct InMemoryStore {
    graph_id: String,
    schema: Schema,
    properties: StoreProperties,
    elements: RwLock<Vec<Element>>,
}

impl InMemoryStore {
    pub fn new(graph_id: impl Into<String>, schema: Schema, properties: StoreProperties) -> Self {
        Self {
            graph_id: graph_id.into(),
            schema,
            properties,
            elements: RwLock::new(Vec::new()),
        }
    }

    /// A ready-to-use graph with element and output handlers registered.
    pub fn graph(graph_id: impl Into<String>, schema: Schema) -> Result<Graph<InMemoryStore>> {
        Self::graph_with_properties(graph_id, schema, StoreProperties::in_memory())
    }

    pub fn graph_with_properties(
        graph_id: impl Into<String>,
        schema: Schema,
        properties: StoreProperties,
    ) -> Result<Graph<InMemoryStore>> {
        let store = Arc::new(Self::new(graph_id, schema, properties));
        let mut dispatcher = OperationDispatcher::new();
        dispatcher.register("AddElements", Arc::new(AddElementsHandler))?;
        dispatcher.register("GetElements", Arc::new(GetElementsHandler))?;
        dispatcher.register("GetAllElements", Arc::new(GetAllElementsHandler))?;
        register_output_handlers(&mut dispatcher)?;
        Ok(Graph::new(store, dispatcher))
    }

    pub async fn len(&self) -> usize {
        self.elements.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.elements.read().await.is_empty()
    }

    /// Stored elements the user may see, run through `view`.
    async fn read<F>(&self, user: &User, view: Option<&View>, keep: F) -> Result<Vec<Element>>
    where
        F: Fn(&Element) -> bool,
    {
        let visible: Vec<Element> = {
            let elements = self.elements.read().await;
            elements
                .iter()
                .filter(|e| self.is_visible(e, user) && keep(e))
                .cloned()
                .collect()
        };
        let empty = View::new();
        let view = view.unwrap_or(&empty);
        ViewEngine::new(&self.schema, view).apply(visible)
    }

    /// Every `&`-separated label in the element's visibility property must
    /// be among the user's data auths.
    fn is_visible(&self, element: &Element, user: &User) -> bool {
        let Some(property) = self.schema.visibility_property() else {
            return true;
        };
        match element.property(property).and_then(|v| v.as_str()) {
            None => true,
            Some(label) => label
                .split('&')
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .all(|l| user.data_auths.contains(l)),
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn graph_id(&self) -> &str {
        &self.graph_id
    }

    fn properties(&self) -> &StoreProperties {
        &self.properties
    }

    async fn schema(&self, _ctx: &Context) -> Result<Schema> {
        Ok(self.schema.clone())
    }
}

fn validate_view(view: Option<&View>, schema: &Schema) -> ValidationResult {
    match view {
        Some(view) => view.validate(schema),
        None => ValidationResult::ok(),
    }
}

pub struct AddElementsHandler;

#[async_trait]
impl OperationHandler<InMemoryStore> for AddElementsHandler {
    async fn execute(&self, operation: Operation, store: &InMemoryStore, _ctx: &Context) -> Result<Option<Output>> {
        let Operation::AddElements(op) = operation else {
            return Err(wrong_operation("AddElements", &operation));
        };
        let elements = op.input.unwrap_or_default();
        let mut accepted = Vec::with_capacity(elements.len());
        let mut failures = ValidationResult::ok();
        for (index, element) in elements.into_iter().enumerate() {
            if op.validate {
                let result = store.schema.validate_element(&element);
                if !result.is_valid() {
                    if op.skip_invalid {
                        tracing::debug!("Skipping invalid element in {}: {}", store.graph_id, result);
                    } else {
                        failures.merge(result.prefixed(&format!("elements[{}]", index)));
                    }
                    continue;
                }
            }
            accepted.push(element);
        }
        failures.into_result()?;

        let added = accepted.len();
        store.elements.write().await.extend(accepted);
        tracing::debug!("Added {} elements to {}", added, store.graph_id);
        Ok(None)
    }
}

pub struct GetElementsHandler;

#[async_trait]
impl OperationHandler<InMemoryStore> for GetElementsHandler {
    async fn prepare(&self, operation: &Operation, store: &InMemoryStore, _ctx: &Context) -> Result<ValidationResult> {
        Ok(validate_view(operation.view(), &store.schema))
    }

    async fn execute(&self, operation: Operation, store: &InMemoryStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::GetElements(op) = operation else {
            return Err(wrong_operation("GetElements", &operation));
        };
        let seeds: Vec<ElementId> = op.input.unwrap_or_default();
        let matching: SeedMatching = op.seed_matching;
        let elements = store
            .read(ctx.user(), op.view.as_ref(), |e| seeds.iter().any(|s| s.matches(e, matching)))
            .await?;
        Ok(Some(Output::Elements(elements)))
    }
}

pub struct GetAllElementsHandler;

#[async_trait]
impl OperationHandler<InMemoryStore> for GetAllElementsHandler {
    async fn prepare(&self, operation: &Operation, store: &InMemoryStore, _ctx: &Context) -> Result<ValidationResult> {
        Ok(validate_view(operation.view(), &store.schema))
    }

    async fn execute(&self, operation: Operation, store: &InMemoryStore, ctx: &Context) -> Result<Option<Output>> {
        let Operation::GetAllElements(op) = operation else {
            return Err(wrong_operation("GetAllElements", &operation));
        };
        let elements = store.read(ctx.user(), op.view.as_ref(), |_| true).await?;
        Ok(Some(Output::Elements(elements)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{FilterDef, Predicate};
    use crate::operation::{
        AddElements, Count, CountGroups, GetAllElements, GetElements, GetSchema, Limit, OperationChain, ToSet,
    };
    use crate::schema::tests::count_schema;
    use crate::schema::{ElementDefinition, TypeDefinition};
    use crate::store::GraphHandle;
    use crate::view::ViewElementDefinition;
    use fedgraph_common::{Edge, Entity, PropertyValue, ValueClass};

    fn entity(vertex: &str, count: i64) -> Element {
        Entity::new("Entity", vertex).with_property("count", count).into()
    }

    fn ctx() -> Context {
        Context::new(User::new("alice"))
    }

    async fn loaded_graph() -> Graph<InMemoryStore> {
        let graph = InMemoryStore::graph("g", count_schema()).unwrap();
        graph
            .execute_op(
                AddElements::new(vec![
                    entity("1", 1),
                    entity("1", 2),
                    entity("2", 5),
                    Edge::new("Edge", "1", "2", true)
                        .with_property("count", 1i64)
                        .with_property("label", "x")
                        .into(),
                ]),
                &ctx(),
            )
            .await
            .unwrap();
        graph
    }

    fn elements(output: Option<Output>) -> Vec<Element> {
        output.unwrap().into_elements().unwrap()
    }

    #[tokio::test]
    async fn test_get_all_elements_aggregates_on_read() {
        let graph = loaded_graph().await;
        assert_eq!(graph.store().len().await, 4);
        let result = elements(graph.execute_op(GetAllElements::new(), &ctx()).await.unwrap());
        assert_eq!(result.len(), 3);
        assert_eq!(result[0].property("count"), Some(&PropertyValue::Long(3)));
    }

    #[tokio::test]
    async fn test_get_elements_related_and_equal_matching() {
        let graph = loaded_graph().await;
        let related = elements(
            graph
                .execute_op(GetElements::new(vec![ElementId::vertex("1")]), &ctx())
                .await
                .unwrap(),
        );
        assert_eq!(related.len(), 2);

        let equal = elements(
            graph
                .execute_op(
                    GetElements::new(vec![ElementId::vertex("1")]).seed_matching(SeedMatching::Equal),
                    &ctx(),
                )
                .await
                .unwrap(),
        );
        assert_eq!(equal.len(), 1);
        assert!(equal[0].is_entity());
    }

    #[tokio::test]
    async fn test_add_elements_rejects_or_skips_invalid() {
        let graph = InMemoryStore::graph("g", count_schema()).unwrap();
        let batch = vec![entity("1", 1), entity("2", 0)];

        let err = graph.execute_op(AddElements::new(batch.clone()), &ctx()).await.unwrap_err();
        match err {
            GraphError::Validation(result) => assert_eq!(result.errors[0].field, "elements[1].Entity.count"),
            other => panic!("unexpected error {:?}", other),
        }
        assert!(graph.store().is_empty().await);

        graph
            .execute_op(AddElements::new(batch).skip_invalid(true), &ctx())
            .await
            .unwrap();
        assert_eq!(graph.store().len().await, 1);
    }

    #[tokio::test]
    async fn test_invalid_view_fails_before_execution() {
        let graph = loaded_graph().await;
        let view = View::new().entity("Missing", ViewElementDefinition::new());
        let err = graph.execute_op(GetAllElements::new().view(view), &ctx()).await.unwrap_err();
        assert!(err.to_string().contains("view.entities.Missing"));
    }

    #[tokio::test]
    async fn test_chain_with_output_operations() {
        let graph = loaded_graph().await;
        let chain = OperationChain::from(GetAllElements::new()).then(Limit::new(2)).then(Count::default());
        assert_eq!(graph.execute(chain, &ctx()).await.unwrap(), Some(Output::Long(2)));

        let chain = OperationChain::from(GetAllElements::new()).then(CountGroups::default());
        match graph.execute(chain, &ctx()).await.unwrap() {
            Some(Output::GroupCounts(counts)) => {
                assert_eq!(counts.entities["Entity"], 2);
                assert_eq!(counts.edges["Edge"], 1);
            }
            other => panic!("unexpected output {:?}", other),
        }

        let err = graph
            .execute(OperationChain::from(GetAllElements::new()).then(Limit::new(1).truncate(false)), &ctx())
            .await
            .unwrap_err();
        assert!(matches!(err, GraphError::IllegalArgument(_)));
    }

    #[tokio::test]
    async fn test_to_set_removes_duplicates() {
        let graph = loaded_graph().await;
        let view = View::new().entity(
            "Entity",
            ViewElementDefinition::new().aggregate(false).properties(Vec::<String>::new()),
        );
        let get = GetElements::new(vec![ElementId::vertex("1")])
            .seed_matching(SeedMatching::Equal)
            .view(view);
        let chain = OperationChain::from(get).then(ToSet::default());
        let result = elements(graph.execute(chain, &ctx()).await.unwrap());
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_get_schema_compact() {
        let graph = loaded_graph().await;
        match graph.execute_op(GetSchema { compact: true }, &ctx()).await.unwrap() {
            Some(Output::Schema(schema)) => assert!(schema.has_group("Entity")),
            other => panic!("unexpected output {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_visibility_hides_unauthorised_elements() {
        let schema = Schema::builder()
            .type_def("vertex.string", TypeDefinition::new(ValueClass::String))
            .type_def("visibility", TypeDefinition::new(ValueClass::String))
            .entity(
                "Doc",
                ElementDefinition::entity("vertex.string")
                    .property("vis", "visibility")
                    .aggregate(false),
            )
            .visibility_property("vis")
            .build()
            .unwrap();
        let graph = InMemoryStore::graph("g", schema).unwrap();
        let docs: Vec<Element> = vec![
            Entity::new("Doc", "public").into(),
            Entity::new("Doc", "secret").with_property("vis", "secret").into(),
        ];
        graph.execute_op(AddElements::new(docs), &ctx()).await.unwrap();

        let plain = elements(graph.execute_op(GetAllElements::new(), &ctx()).await.unwrap());
        assert_eq!(plain.len(), 1);

        let cleared = Context::new(User::new("bob").with_data_auths(["secret"]));
        let all = elements(graph.execute_op(GetAllElements::new(), &cleared).await.unwrap());
        assert_eq!(all.len(), 2);

        let filtered = View::new().entity(
            "Doc",
            ViewElementDefinition::new().pre_aggregation_filter(FilterDef::new(["vis"], Predicate::Exists)),
        );
        let only_secret = elements(graph.execute_op(GetAllElements::new().view(filtered), &cleared).await.unwrap());
        assert_eq!(only_secret.len(), 1);
    }
}
