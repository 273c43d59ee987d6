//! Functions combining per-graph results into one.

use fedgraph_common::Element;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{GraphError, Result};
use crate::operation::{Operation, OperationChain, Output};
use crate::schema::Schema;
use crate::view::{View, ViewEngine};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "function")]
pub enum MergeFunction {
    /// Results in graph order; lists are joined, mixed outputs become a
    /// JSON array.
    #[default]
    Concatenate,
    /// Concatenates elements, then re-runs the request's view over them
    /// with the federated schema so buckets split across graphs combine.
    ApplyView,
    /// Adds up `Long` results.
    Sum,
    /// Union-merges `Schema` results.
    SchemaMerge,
    /// Drops all results.
    Discard,
}

/// Inputs a merge function may need besides the results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeContextKey {
    Schema,
    View,
}

impl fmt::Display for MergeContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MergeContextKey::Schema => f.write_str("schema"),
            MergeContextKey::View => f.write_str("view"),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MergeContext {
    pub schema: Option<Schema>,
    pub view: Option<View>,
}

impl MergeContext {
    fn has(&self, key: MergeContextKey) -> bool {
        match key {
            MergeContextKey::Schema => self.schema.is_some(),
            MergeContextKey::View => self.view.is_some(),
        }
    }
}

impl MergeFunction {
    pub fn required_context(&self) -> &'static [MergeContextKey] {
        match self {
            MergeFunction::ApplyView => &[MergeContextKey::Schema, MergeContextKey::View],
            _ => &[],
        }
    }

    pub fn check_context(&self, ctx: &MergeContext) -> Result<()> {
        match self.required_context().iter().find(|key| !ctx.has(**key)) {
            Some(missing) => Err(GraphError::IllegalArgument(format!(
                "merge function {:?} requires a {} in its context",
                self, missing
            ))),
            None => Ok(()),
        }
    }

    /// The merge used when a request names none, chosen from the payload's
    /// last operation.
    pub fn default_for(payload: &OperationChain) -> MergeFunction {
        match payload.last() {
            Some(op @ (Operation::GetElements(_) | Operation::GetAllElements(_))) => {
                if op.view().is_some_and(|v| v.has_transform()) {
                    MergeFunction::Concatenate
                } else {
                    MergeFunction::ApplyView
                }
            }
            Some(Operation::AddElements(_) | Operation::DiscardOutput(_)) => MergeFunction::Discard,
            Some(Operation::Count(_)) => MergeFunction::Sum,
            Some(Operation::GetSchema(_)) => MergeFunction::SchemaMerge,
            _ => MergeFunction::Concatenate,
        }
    }

    /// Merges `(graph id, result)` pairs given in graph order.
    pub fn merge(&self, results: Vec<(String, Option<Output>)>, ctx: &MergeContext) -> Result<Option<Output>> {
        self.check_context(ctx)?;
        match self {
            MergeFunction::Discard => Ok(None),
            MergeFunction::Concatenate => concatenate(results),
            MergeFunction::ApplyView => {
                let mut elements: Vec<Element> = Vec::new();
                for (graph_id, output) in results {
                    match output {
                        Some(output) => {
                            let batch = output.into_elements().map_err(|e| GraphError::backend(graph_id, e))?;
                            elements.extend(batch);
                        }
                        None => continue,
                    }
                }
                let (Some(schema), Some(view)) = (&ctx.schema, &ctx.view) else {
                    return Err(GraphError::IllegalArgument("ApplyView requires a schema and a view".into()));
                };
                let merged = ViewEngine::new(schema, view).reapply(elements)?;
                Ok(Some(Output::Elements(merged)))
            }
            MergeFunction::Sum => {
                let mut total: i64 = 0;
                for (graph_id, output) in results {
                    match output {
                        Some(Output::Long(v)) => total = total.saturating_add(v),
                        Some(other) => {
                            return Err(GraphError::IllegalArgument(format!(
                                "Sum cannot merge a {} result from graph {}",
                                other.type_name(),
                                graph_id
                            )))
                        }
                        None => {}
                    }
                }
                Ok(Some(Output::Long(total)))
            }
            MergeFunction::SchemaMerge => {
                let mut schemas = Vec::with_capacity(results.len());
                for (graph_id, output) in results {
                    match output {
                        Some(Output::Schema(schema)) => schemas.push((graph_id, schema)),
                        Some(other) => {
                            return Err(GraphError::IllegalArgument(format!(
                                "SchemaMerge cannot merge a {} result from graph {}",
                                other.type_name(),
                                graph_id
                            )))
                        }
                        None => {}
                    }
                }
                Ok(Some(Output::Schema(merge_schemas(schemas)?)))
            }
        }
    }
}

/// Folds schemas in order; a conflict names the graph that introduced it
/// and the graphs merged before it.
pub fn merge_schemas(schemas: Vec<(String, Schema)>) -> Result<Schema> {
    let mut merged = Schema::empty();
    let mut merged_ids: Vec<String> = Vec::new();
    for (graph_id, schema) in schemas {
        merged = merged.merge(&schema).map_err(|e| match e {
            GraphError::SchemaConflict(msg) => GraphError::SchemaConflict(format!(
                "schema of graph {} conflicts with graphs {:?}: {}",
                graph_id, merged_ids, msg
            )),
            other => other,
        })?;
        merged_ids.push(graph_id);
    }
    Ok(merged)
}

fn concatenate(results: Vec<(String, Option<Output>)>) -> Result<Option<Output>> {
    let outputs: Vec<Output> = results.into_iter().filter_map(|(_, output)| output).collect();
    let Some(first) = outputs.first() else {
        return Ok(None);
    };
    let kind = first.type_name();
    let same_kind = outputs.iter().all(|o| o.type_name() == kind);
    if !same_kind {
        return Ok(Some(Output::Json(serde_json::to_value(&outputs)?)));
    }
    let merged = match kind {
        "Elements" => Output::Elements(flatten(outputs, |o| match o {
            Output::Elements(v) => v,
            _ => Vec::new(),
        })),
        "ElementIds" => Output::ElementIds(flatten(outputs, |o| match o {
            Output::ElementIds(v) => v,
            _ => Vec::new(),
        })),
        "Strings" => Output::Strings(flatten(outputs, |o| match o {
            Output::Strings(v) => v,
            _ => Vec::new(),
        })),
        "NamedViews" => Output::NamedViews(flatten(outputs, |o| match o {
            Output::NamedViews(v) => v,
            _ => Vec::new(),
        })),
        "GraphInfo" => {
            let mut all = BTreeMap::new();
            for output in outputs {
                if let Output::GraphInfo(info) = output {
                    all.extend(info);
                }
            }
            Output::GraphInfo(all)
        }
        _ if outputs.len() == 1 => outputs.into_iter().next().unwrap_or(Output::Json(serde_json::Value::Null)),
        _ => Output::Json(serde_json::to_value(&outputs)?),
    };
    Ok(Some(merged))
}

fn flatten<T>(outputs: Vec<Output>, take: impl Fn(Output) -> Vec<T>) -> Vec<T> {
    outputs.into_iter().flat_map(take).collect()
}
