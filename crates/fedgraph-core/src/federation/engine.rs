//! Fans one federated operation out over the visible graphs and merges the
//! results in resolution order.

use fedgraph_common::config::FederationConfig;
use fedgraph_common::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::{JoinError, JoinSet};
use tokio::time::Duration;

use super::merge::{merge_schemas, MergeContext, MergeContextKey, MergeFunction};
use super::registry::{GraphEntry, GraphRegistry};
use crate::error::{GraphError, Result};
use crate::operation::{FederatedOperation, Operation, OperationChain, Output};
use crate::schema::Schema;
use crate::store::Context;

/// A graph whose result was left out of the merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphFailure {
    pub graph_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FederatedResult {
    pub output: Option<Output>,
    /// Graphs whose results were merged, in merge order.
    pub executed: Vec<String>,
    pub failures: Vec<GraphFailure>,
    /// Graphs never started because the request was cancelled or its
    /// deadline passed first.
    pub skipped: Vec<String>,
}

type GraphOutcome = (usize, Result<Option<Output>>);

pub struct FederationEngine {
    registry: Arc<GraphRegistry>,
    max_parallelism: usize,
    execution_timeout: Option<Duration>,
    skip_failed_default: bool,
}

impl FederationEngine {
    pub fn new(registry: Arc<GraphRegistry>, config: &FederationConfig) -> Self {
        let execution_timeout = match config.execution_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Self {
            registry,
            max_parallelism: config.max_parallelism.max(1),
            execution_timeout,
            skip_failed_default: config.skip_failed_federated_execution,
        }
    }

    pub fn registry(&self) -> &Arc<GraphRegistry> {
        &self.registry
    }

    /// Union of the target graphs' schemas.
    pub async fn merged_schema(&self, user: &User, graph_ids: Option<&[String]>) -> Result<Schema> {
        let targets = self.registry.visible_graphs(user, graph_ids).await?;
        merge_schemas(
            targets
                .iter()
                .map(|e| (e.graph_id().to_string(), e.schema().clone()))
                .collect(),
        )
    }

    fn merge_context(&self, merge: MergeFunction, payload: &OperationChain, targets: &[GraphEntry]) -> Result<MergeContext> {
        let mut merge_ctx = MergeContext::default();
        for key in merge.required_context() {
            match key {
                MergeContextKey::Schema => {
                    merge_ctx.schema = Some(merge_schemas(
                        targets
                            .iter()
                            .map(|e| (e.graph_id().to_string(), e.schema().clone()))
                            .collect(),
                    )?);
                }
                MergeContextKey::View => {
                    merge_ctx.view = Some(payload.last().and_then(|op| op.view()).cloned().unwrap_or_default());
                }
            }
        }
        Ok(merge_ctx)
    }

    pub async fn execute(&self, operation: FederatedOperation, ctx: &Context) -> Result<FederatedResult> {
        let FederatedOperation {
            graph_ids,
            payload,
            merge,
            skip_failed,
        } = operation;
        let skip = skip_failed.unwrap_or(self.skip_failed_default);
        let merge = merge.unwrap_or_else(|| MergeFunction::default_for(&payload));
        let targets = self.registry.visible_graphs(ctx.user(), graph_ids.as_deref()).await?;
        let merge_ctx = self.merge_context(merge, &payload, &targets)?;
        merge.check_context(&merge_ctx)?;

        tracing::info!(
            "[{}] Federating {} operations across {} graphs (merge {:?}, skip failed {})",
            ctx.job_id(),
            payload.len(),
            targets.len(),
            merge,
            skip
        );

        let mut outcomes: Vec<Option<Result<Option<Output>>>> = (0..targets.len()).map(|_| None).collect();
        let mut not_started = vec![false; targets.len()];
        let mut join_set: JoinSet<GraphOutcome> = JoinSet::new();

        for (index, entry) in targets.iter().enumerate() {
            if join_set.len() >= self.max_parallelism {
                if let Some(joined) = join_set.join_next().await {
                    record(joined, &targets, &mut outcomes, skip)?;
                }
            }
            if let Err(e) = ctx.check_active() {
                if !skip {
                    return Err(e);
                }
                tracing::debug!("[{}] Not starting graph {}: {}", ctx.job_id(), entry.graph_id(), e);
                not_started[index] = true;
                continue;
            }

            let handle = entry.handle().clone();
            let scoped = scope_payload(&payload, entry.schema());
            let child = ctx.child(self.execution_timeout);
            join_set.spawn(async move {
                let outcome = match child.deadline() {
                    Some(deadline) => match tokio::time::timeout_at(deadline, handle.execute(scoped, &child)).await {
                        Ok(result) => result,
                        Err(_) => Err(GraphError::Cancelled("execution deadline passed".to_string())),
                    },
                    None => handle.execute(scoped, &child).await,
                };
                (index, outcome)
            });
        }
        while let Some(joined) = join_set.join_next().await {
            record(joined, &targets, &mut outcomes, skip)?;
        }

        let mut results = Vec::with_capacity(targets.len());
        let mut executed = Vec::with_capacity(targets.len());
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        for ((entry, outcome), not_started) in targets.iter().zip(outcomes).zip(not_started) {
            let graph_id = entry.graph_id().to_string();
            if not_started {
                skipped.push(graph_id);
                continue;
            }
            match outcome {
                Some(Ok(output)) => {
                    executed.push(graph_id.clone());
                    results.push((graph_id, output));
                }
                Some(Err(e)) => {
                    tracing::warn!("[{}] Skipping failed graph {}: {}", ctx.job_id(), graph_id, e);
                    failures.push(GraphFailure {
                        graph_id,
                        reason: e.to_string(),
                    });
                }
                None => {
                    tracing::warn!("[{}] Skipping graph {}: execution did not complete", ctx.job_id(), graph_id);
                    failures.push(GraphFailure {
                        graph_id,
                        reason: "execution did not complete".to_string(),
                    });
                }
            }
        }

        let output = merge.merge(results, &merge_ctx)?;
        Ok(FederatedResult {
            output,
            executed,
            failures,
            skipped,
        })
    }
}

/// Stores one finished execution. Without skip, the first failure aborts
/// the whole request; dropping the join set cancels the rest.
fn record(
    joined: std::result::Result<GraphOutcome, JoinError>,
    targets: &[GraphEntry],
    outcomes: &mut [Option<Result<Option<Output>>>],
    skip: bool,
) -> Result<()> {
    match joined {
        Ok((index, Ok(output))) => outcomes[index] = Some(Ok(output)),
        Ok((index, Err(e))) => {
            if !skip {
                return Err(GraphError::backend(targets[index].graph_id(), e));
            }
            outcomes[index] = Some(Err(e));
        }
        Err(e) => {
            if !skip {
                return Err(GraphError::Execution(format!("federated task failed: {}", e)));
            }
            tracing::warn!("Federated task failed: {}", e);
        }
    }
    Ok(())
}

/// Per-graph copy of the payload: elements being added and view groups are
/// narrowed to the groups the graph's schema declares.
fn scope_payload(payload: &OperationChain, schema: &Schema) -> OperationChain {
    let mut scoped = payload.clone();
    for operation in &mut scoped.operations {
        scope_operation(operation, schema);
    }
    scoped
}

fn scope_operation(operation: &mut Operation, schema: &Schema) {
    match operation {
        Operation::Chain(chain) => {
            for inner in &mut chain.operations {
                scope_operation(inner, schema);
            }
        }
        Operation::AddElements(op) => {
            if let Some(elements) = &mut op.input {
                elements.retain(|e| schema.has_group(e.group()));
            }
        }
        other => {
            if let Some(view) = other.view_mut() {
                view.entities.retain(|group, _| schema.entities().contains_key(group));
                view.edges.retain(|group, _| schema.edges().contains_key(group));
            }
        }
    }
}
