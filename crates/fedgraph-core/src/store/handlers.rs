//! Handlers any store can register: they work on the carried output or on
//! the store's schema and never touch backend data.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

use super::{Context, OperationDispatcher, OperationHandler, Store};
use crate::error::{GraphError, Result};
use crate::operation::{GroupCounts, Operation, Output};

pub(crate) fn wrong_operation(expected: &str, actual: &Operation) -> GraphError {
    GraphError::Execution(format!("{} handler received {}", expected, actual.kind()))
}

/// Registers Limit, Count, CountGroups, ToSet, DiscardOutput and GetSchema.
pub fn register_output_handlers<S: Store>(dispatcher: &mut OperationDispatcher<S>) -> Result<()> {
    dispatcher.register("Limit", Arc::new(LimitHandler))?;
    dispatcher.register("Count", Arc::new(CountHandler))?;
    dispatcher.register("CountGroups", Arc::new(CountGroupsHandler))?;
    dispatcher.register("ToSet", Arc::new(ToSetHandler))?;
    dispatcher.register("DiscardOutput", Arc::new(DiscardOutputHandler))?;
    dispatcher.register("GetSchema", Arc::new(GetSchemaHandler))?;
    Ok(())
}

pub struct LimitHandler;

fn truncate<T>(items: &mut Vec<T>, limit: usize, truncate: bool) -> Result<()> {
    if items.len() > limit {
        if !truncate {
            return Err(GraphError::IllegalArgument(format!("result limit of {} exceeded", limit)));
        }
        items.truncate(limit);
    }
    Ok(())
}

#[async_trait]
impl<S: Store> OperationHandler<S> for LimitHandler {
    async fn execute(&self, operation: Operation, _store: &S, _ctx: &Context) -> Result<Option<Output>> {
        let Operation::Limit(op) = operation else {
            return Err(wrong_operation("Limit", &operation));
        };
        let Some(mut input) = op.input else {
            return Ok(None);
        };
        match &mut input {
            Output::Elements(items) => truncate(items, op.result_limit, op.truncate)?,
            Output::ElementIds(items) => truncate(items, op.result_limit, op.truncate)?,
            Output::Strings(items) => truncate(items, op.result_limit, op.truncate)?,
            Output::NamedViews(items) => truncate(items, op.result_limit, op.truncate)?,
            Output::Json(serde_json::Value::Array(items)) => truncate(items, op.result_limit, op.truncate)?,
            _ => {}
        }
        Ok(Some(input))
    }
}

pub struct CountHandler;

#[async_trait]
impl<S: Store> OperationHandler<S> for CountHandler {
    async fn execute(&self, operation: Operation, _store: &S, _ctx: &Context) -> Result<Option<Output>> {
        let Operation::Count(op) = operation else {
            return Err(wrong_operation("Count", &operation));
        };
        let count = op.input.map(|input| input.len()).unwrap_or(0);
        Ok(Some(Output::Long(count as i64)))
    }
}

pub struct CountGroupsHandler;

#[async_trait]
impl<S: Store> OperationHandler<S> for CountGroupsHandler {
    async fn execute(&self, operation: Operation, _store: &S, _ctx: &Context) -> Result<Option<Output>> {
        let Operation::CountGroups(op) = operation else {
            return Err(wrong_operation("CountGroups", &operation));
        };
        let elements = match op.input {
            Some(input) => input.into_elements()?,
            None => Vec::new(),
        };
        let mut counts = GroupCounts::default();
        for (seen, element) in elements.iter().enumerate() {
            if op.limit.is_some_and(|limit| seen >= limit) {
                counts.limit_hit = true;
                break;
            }
            counts.add(element);
        }
        Ok(Some(Output::GroupCounts(counts)))
    }
}

pub struct ToSetHandler;

fn dedupe<T: serde::Serialize>(items: Vec<T>) -> Result<Vec<T>> {
    let mut seen = HashSet::new();
    let mut unique = Vec::with_capacity(items.len());
    for item in items {
        if seen.insert(serde_json::to_string(&item)?) {
            unique.push(item);
        }
    }
    Ok(unique)
}

#[async_trait]
impl<S: Store> OperationHandler<S> for ToSetHandler {
    async fn execute(&self, operation: Operation, _store: &S, _ctx: &Context) -> Result<Option<Output>> {
        let Operation::ToSet(op) = operation else {
            return Err(wrong_operation("ToSet", &operation));
        };
        let output = match op.input {
            Some(Output::Elements(items)) => Output::Elements(dedupe(items)?),
            Some(Output::ElementIds(items)) => Output::ElementIds(dedupe(items)?),
            Some(Output::Strings(items)) => Output::Strings(dedupe(items)?),
            Some(other) => other,
            None => return Ok(None),
        };
        Ok(Some(output))
    }
}

pub struct DiscardOutputHandler;

#[async_trait]
impl<S: Store> OperationHandler<S> for DiscardOutputHandler {
    async fn execute(&self, _operation: Operation, _store: &S, _ctx: &Context) -> Result<Option<Output>> {
        Ok(None)
    }
}

pub struct GetSchemaHandler;

#[async_trait]
impl<S: Store> OperationHandler<S> for GetSchemaHandler {
    async fn execute(&self, operation: Operation, store: &S, ctx: &Context) -> Result<Option<Output>> {
        let Operation::GetSchema(op) = operation else {
            return Err(wrong_operation("GetSchema", &operation));
        };
        let schema = store.schema(ctx).await?;
        let schema = if op.compact { schema.compact() } else { schema };
        Ok(Some(Output::Schema(schema)))
    }
}
