//! Named views: stored, parameterised view templates.
//!
//! Templates are JSON with `${name}` placeholders. A string that is exactly
//! one placeholder is replaced by the typed parameter value; placeholders
//! inside longer strings are replaced textually.

use async_trait::async_trait;
use fedgraph_common::ValueClass;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::{get_json, keys_with_prefix, put_json, put_json_if_absent, CacheService};
use crate::error::{GraphError, Result};
use crate::operation::{FederatedOperation, Operation, OperationChain, Output};
use crate::store::handlers::wrong_operation;
use crate::store::{ChainOptimiser, Context, OperationDispatcher, OperationHandler, Store};
use crate::view::View;

pub const NAMED_VIEW_KEY_PREFIX: &str = "namedViews:";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewParameterDetail {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub value_class: ValueClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    #[serde(default)]
    pub required: bool,
}

impl ViewParameterDetail {
    pub fn new(value_class: ValueClass) -> Self {
        Self {
            description: None,
            value_class,
            default_value: None,
            required: false,
        }
    }

    pub fn default_value(mut self, value: serde_json::Value) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn required(mut self, required: bool) -> Self {
        self.required = required;
        self
    }

    fn accepts(&self, value: &serde_json::Value) -> bool {
        match self.value_class {
            ValueClass::Any => true,
            ValueClass::Boolean => value.is_boolean(),
            ValueClass::Long => value.is_i64(),
            ValueClass::Double => value.is_number(),
            ValueClass::String => value.is_string(),
            ValueClass::StringSet => value
                .as_array()
                .is_some_and(|items| items.iter().all(|v| v.is_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedViewDetail {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub creator: String,
    pub view: serde_json::Value,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ViewParameterDetail>,
}

impl NamedViewDetail {
    /// Every placeholder must name a declared parameter.
    pub fn check_template(&self) -> Result<()> {
        if !self.view.is_object() {
            return Err(GraphError::IllegalArgument(format!(
                "named view {} must be a JSON object",
                self.name
            )));
        }
        let mut referenced = Vec::new();
        collect_placeholders(&self.view, &mut referenced);
        for name in referenced {
            if !self.parameters.contains_key(&name) {
                return Err(GraphError::IllegalArgument(format!(
                    "named view {} references undeclared parameter {}",
                    self.name, name
                )));
            }
        }
        Ok(())
    }

    /// Substitutes parameters and parses the result into a [`View`].
    pub fn resolve(&self, supplied: &BTreeMap<String, serde_json::Value>) -> Result<View> {
        for name in supplied.keys() {
            if !self.parameters.contains_key(name) {
                return Err(GraphError::IllegalArgument(format!(
                    "named view {} has no parameter {}",
                    self.name, name
                )));
            }
        }

        let mut values = BTreeMap::new();
        for (name, detail) in &self.parameters {
            let value = match (supplied.get(name), &detail.default_value) {
                (Some(value), _) => value.clone(),
                (None, _) if detail.required => {
                    return Err(GraphError::IllegalArgument(format!(
                        "named view {} requires parameter {}",
                        self.name, name
                    )));
                }
                (None, Some(default)) => default.clone(),
                (None, None) => continue,
            };
            if !detail.accepts(&value) {
                return Err(GraphError::IllegalArgument(format!(
                    "parameter {} of named view {} expects a {} value",
                    name, self.name, detail.value_class
                )));
            }
            values.insert(name.clone(), value);
        }

        let substituted = substitute(&self.view, &values)?;
        Ok(serde_json::from_value(substituted)?)
    }
}

fn placeholder_names(text: &str) -> Vec<&str> {
    let mut names = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                names.push(&after[..end]);
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    names
}

fn collect_placeholders(value: &serde_json::Value, out: &mut Vec<String>) {
    match value {
        serde_json::Value::String(s) => out.extend(placeholder_names(s).into_iter().map(str::to_string)),
        serde_json::Value::Array(items) => items.iter().for_each(|v| collect_placeholders(v, out)),
        serde_json::Value::Object(map) => map.values().for_each(|v| collect_placeholders(v, out)),
        _ => {}
    }
}

fn substitute(
    value: &serde_json::Value,
    values: &BTreeMap<String, serde_json::Value>,
) -> Result<serde_json::Value> {
    let lookup = |name: &str| {
        values.get(name).ok_or_else(|| {
            GraphError::IllegalArgument(format!("parameter {} has no value and no default", name))
        })
    };
    Ok(match value {
        serde_json::Value::String(s) => {
            let names = placeholder_names(s);
            if names.len() == 1 && s == &format!("${{{}}}", names[0]) {
                lookup(names[0])?.clone()
            } else {
                let mut text = s.clone();
                for name in names {
                    let replacement = match lookup(name)? {
                        serde_json::Value::String(inner) => inner.clone(),
                        other => other.to_string(),
                    };
                    text = text.replace(&format!("${{{}}}", name), &replacement);
                }
                serde_json::Value::String(text)
            }
        }
        serde_json::Value::Array(items) => serde_json::Value::Array(
            items.iter().map(|v| substitute(v, values)).collect::<Result<_>>()?,
        ),
        serde_json::Value::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| Ok((k.clone(), substitute(v, values)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

/// Named view storage on top of the cache substrate.
pub struct NamedViewCache {
    cache: Arc<dyn CacheService>,
}

impl NamedViewCache {
    pub fn new(cache: Arc<dyn CacheService>) -> Self {
        Self { cache }
    }

    fn key(name: &str) -> String {
        format!("{}{}", NAMED_VIEW_KEY_PREFIX, name)
    }

    pub fn add(&self, detail: &NamedViewDetail, overwrite: bool) -> Result<()> {
        detail.check_template()?;
        let key = Self::key(&detail.name);
        if overwrite {
            put_json(self.cache.as_ref(), &key, detail)
        } else {
            put_json_if_absent(self.cache.as_ref(), &key, detail).map_err(|e| match e {
                GraphError::AlreadyExists(_) => {
                    GraphError::AlreadyExists(format!("named view {}", detail.name))
                }
                other => other,
            })
        }
    }

    pub fn get(&self, name: &str) -> Result<Option<NamedViewDetail>> {
        get_json(self.cache.as_ref(), &Self::key(name))
    }

    pub fn get_all(&self) -> Result<Vec<NamedViewDetail>> {
        let mut all = Vec::new();
        for name in keys_with_prefix(self.cache.as_ref(), NAMED_VIEW_KEY_PREFIX)? {
            if let Some(detail) = self.get(&name)? {
                all.push(detail);
            }
        }
        Ok(all)
    }

    pub fn remove(&self, name: &str) -> Result<bool> {
        self.cache.remove(&Self::key(name))
    }
}

/// Chain optimiser replacing named-view references with the stored views.
/// References inside resolved views are followed; a cycle is an error.
pub struct NamedViewResolver {
    cache: Arc<NamedViewCache>,
}

impl NamedViewResolver {
    pub fn new(cache: Arc<NamedViewCache>) -> Self {
        Self { cache }
    }

    pub fn resolve(&self, view: View) -> Result<View> {
        self.resolve_with_stack(view, &mut Vec::new())
    }

    fn resolve_with_stack(&self, mut view: View, stack: &mut Vec<String>) -> Result<View> {
        let Some(reference) = view.named_view.take() else {
            return Ok(view);
        };
        if stack.contains(&reference.name) {
            stack.push(reference.name);
            return Err(GraphError::IllegalArgument(format!(
                "named view cycle: {}",
                stack.join(" -> ")
            )));
        }
        let detail = self
            .cache
            .get(&reference.name)?
            .ok_or_else(|| GraphError::NotFound(format!("named view {}", reference.name)))?;
        let resolved = detail.resolve(&reference.parameters)?;

        stack.push(reference.name.clone());
        let mut base = self.resolve_with_stack(resolved, stack)?;
        stack.pop();

        if !base.merged_named_views.contains(&reference.name) {
            base.merged_named_views.push(reference.name);
        }
        Ok(base.merge(&view))
    }

    fn resolve_operation(&self, operation: &mut Operation) -> Result<()> {
        match operation {
            Operation::FederatedOperation(FederatedOperation { payload, .. }) | Operation::Chain(payload) => {
                for inner in &mut payload.operations {
                    self.resolve_operation(inner)?;
                }
            }
            other => {
                if let Some(view) = other.view_mut() {
                    if view.named_view.is_some() {
                        *view = self.resolve(std::mem::take(view))?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ChainOptimiser for NamedViewResolver {
    fn name(&self) -> &str {
        "NamedViewResolver"
    }

    async fn optimise(&self, mut chain: OperationChain, _ctx: &Context) -> Result<OperationChain> {
        for operation in &mut chain.operations {
            self.resolve_operation(operation)?;
        }
        Ok(chain)
    }
}

/// Registers the named-view operations and the resolver.
pub fn register_named_view_support<S: Store>(
    dispatcher: &mut OperationDispatcher<S>,
    cache: Arc<NamedViewCache>,
    admin_auth: Option<String>,
) -> Result<()> {
    let handler = Arc::new(NamedViewHandler {
        cache: cache.clone(),
        admin_auth,
    });
    dispatcher.register("AddNamedView", handler.clone())?;
    dispatcher.register("GetAllNamedViews", handler.clone())?;
    dispatcher.register("DeleteNamedView", handler)?;
    dispatcher.add_optimiser(Arc::new(NamedViewResolver::new(cache)));
    Ok(())
}

pub struct NamedViewHandler {
    cache: Arc<NamedViewCache>,
    admin_auth: Option<String>,
}

impl NamedViewHandler {
    fn may_modify(&self, detail: &NamedViewDetail, ctx: &Context) -> bool {
        let user = ctx.user();
        detail.creator == user.user_id || self.admin_auth.as_deref().is_some_and(|auth| user.has_op_auth(auth))
    }
}

#[async_trait]
impl<S: Store> OperationHandler<S> for NamedViewHandler {
    async fn execute(&self, operation: Operation, _store: &S, ctx: &Context) -> Result<Option<Output>> {
        match operation {
            Operation::AddNamedView(op) => {
                if let Some(existing) = self.cache.get(&op.name)? {
                    if op.overwrite && !self.may_modify(&existing, ctx) {
                        return Err(GraphError::AccessDenied(format!(
                            "user {} cannot overwrite named view {}",
                            ctx.user().user_id,
                            op.name
                        )));
                    }
                }
                let detail = NamedViewDetail {
                    name: op.name,
                    description: op.description,
                    creator: ctx.user().user_id.clone(),
                    view: op.view,
                    parameters: op.parameters,
                };
                self.cache.add(&detail, op.overwrite)?;
                tracing::info!("Named view {} stored by {}", detail.name, detail.creator);
                Ok(None)
            }
            Operation::GetAllNamedViews(_) => Ok(Some(Output::NamedViews(self.cache.get_all()?))),
            Operation::DeleteNamedView(op) => {
                if let Some(existing) = self.cache.get(&op.name)? {
                    if !self.may_modify(&existing, ctx) {
                        return Err(GraphError::AccessDenied(format!(
                            "user {} cannot delete named view {}",
                            ctx.user().user_id,
                            op.name
                        )));
                    }
                    self.cache.remove(&op.name)?;
                    tracing::info!("Named view {} deleted", op.name);
                }
                Ok(None)
            }
            other => Err(wrong_operation("named view", &other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::function::{FilterDef, Predicate};
    use crate::view::ViewElementDefinition;
    use fedgraph_common::PropertyValue;
    use serde_json::json;

    fn min_count_view() -> NamedViewDetail {
        NamedViewDetail {
            name: "minCount".into(),
            description: None,
            creator: "alice".into(),
            view: json!({
                "entities": {
                    "Entity": {
                        "pre_aggregation_filter": [{
                            "selection": ["count"],
                            "predicate": {
                                "predicate": "IsMoreThan",
                                "value": {"type": "Long", "value": "${min}"},
                                "or_equal_to": false
                            }
                        }]
                    }
                }
            }),
            parameters: BTreeMap::from([(
                "min".to_string(),
                ViewParameterDetail::new(ValueClass::Long).default_value(json!(1)),
            )]),
        }
    }

    fn expected_filter(min: i64) -> FilterDef {
        FilterDef::new(["count"], Predicate::IsMoreThan { value: PropertyValue::Long(min), or_equal_to: false })
    }

    #[test]
    fn test_resolve_uses_supplied_value_then_default() {
        let detail = min_count_view();
        let view = detail.resolve(&BTreeMap::from([("min".to_string(), json!(5))])).unwrap();
        assert_eq!(view.entities["Entity"].pre_aggregation_filter, vec![expected_filter(5)]);

        let view = detail.resolve(&BTreeMap::new()).unwrap();
        assert_eq!(view.entities["Entity"].pre_aggregation_filter, vec![expected_filter(1)]);
    }

    #[test]
    fn test_resolve_rejects_bad_parameters() {
        let mut detail = min_count_view();
        let wrong_type = detail.resolve(&BTreeMap::from([("min".to_string(), json!("five"))]));
        assert!(matches!(wrong_type, Err(GraphError::IllegalArgument(_))));

        let unknown = detail.resolve(&BTreeMap::from([("max".to_string(), json!(1))]));
        assert!(matches!(unknown, Err(GraphError::IllegalArgument(_))));

        detail.parameters.get_mut("min").unwrap().default_value = None;
        let err = detail.resolve(&BTreeMap::new()).unwrap_err();
        assert!(err.to_string().contains("parameter min has no value and no default"));
    }

    #[test]
    fn test_token_substitution_inside_strings() {
        let values = BTreeMap::from([("who".to_string(), json!("bob")), ("n".to_string(), json!(3))]);
        let out = substitute(&json!({"a": "hello ${who} x${n}", "b": "${n}"}), &values).unwrap();
        assert_eq!(out, json!({"a": "hello bob x3", "b": 3}));
    }

    #[test]
    fn test_cache_add_rejects_duplicates_without_overwrite() {
        let cache = NamedViewCache::new(Arc::new(MemoryCache::new()));
        cache.add(&min_count_view(), false).unwrap();
        assert!(matches!(cache.add(&min_count_view(), false), Err(GraphError::AlreadyExists(_))));
        cache.add(&min_count_view(), true).unwrap();
        assert_eq!(cache.get_all().unwrap().len(), 1);
    }

    #[test]
    fn test_check_template_rejects_undeclared_placeholders() {
        let mut detail = min_count_view();
        detail.parameters.clear();
        assert!(matches!(detail.check_template(), Err(GraphError::IllegalArgument(_))));
    }

    #[test]
    fn test_resolver_merges_user_view_on_top_and_records_provenance() {
        let cache = Arc::new(NamedViewCache::new(Arc::new(MemoryCache::new())));
        cache.add(&min_count_view(), false).unwrap();
        let resolver = NamedViewResolver::new(cache);

        let mut view = View::named("minCount", BTreeMap::from([("min".to_string(), json!(2))]));
        view.edges.insert("Edge".into(), ViewElementDefinition::new());
        let resolved = resolver.resolve(view).unwrap();

        assert!(resolved.named_view.is_none());
        assert_eq!(resolved.merged_named_views, vec!["minCount".to_string()]);
        assert_eq!(resolved.entities["Entity"].pre_aggregation_filter, vec![expected_filter(2)]);
        assert!(resolved.edges.contains_key("Edge"));
    }

    #[test]
    fn test_resolver_detects_cycles() {
        let cache = Arc::new(NamedViewCache::new(Arc::new(MemoryCache::new())));
        for (name, next) in [("a", "b"), ("b", "a")] {
            let detail = NamedViewDetail {
                name: name.into(),
                description: None,
                creator: "alice".into(),
                view: json!({"named_view": {"name": next}}),
                parameters: BTreeMap::new(),
            };
            cache.add(&detail, false).unwrap();
        }
        let resolver = NamedViewResolver::new(cache);
        let err = resolver.resolve(View::named("a", BTreeMap::new())).unwrap_err();
        assert!(err.to_string().contains("a -> b -> a"));
    }
}
