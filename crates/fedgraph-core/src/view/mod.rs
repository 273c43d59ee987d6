//! Views: request-scoped, per-group filter/aggregate/transform rules.

pub mod engine;

pub use engine::{AggregationStrategy, ViewEngine};

use fedgraph_common::{IdentifierType, ValueClass};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::function::{FilterDef, TransformDef};
use crate::schema::{ElementDefinitionRef, Schema, ValidationResult};

/// Rules applied to the elements of one group.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewElementDefinition {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pre_aggregation_filter: Vec<FilterDef>,
    /// Replaces the schema's group-by set; must be a subset of it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_by: Option<Vec<String>>,
    /// `Some(false)` disables aggregation for the group.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_aggregation_filter: Vec<FilterDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transformer: Vec<TransformDef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub post_transform_filter: Vec<FilterDef>,
    /// Properties to keep in the output; `None` keeps everything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exclude_properties: Option<Vec<String>>,
}

impl ViewElementDefinition {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pre_aggregation_filter(mut self, filter: FilterDef) -> Self {
        self.pre_aggregation_filter.push(filter);
        self
    }

    pub fn group_by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.group_by = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = Some(aggregate);
        self
    }

    pub fn post_aggregation_filter(mut self, filter: FilterDef) -> Self {
        self.post_aggregation_filter.push(filter);
        self
    }

    pub fn transformer(mut self, transform: TransformDef) -> Self {
        self.transformer.push(transform);
        self
    }

    pub fn post_transform_filter(mut self, filter: FilterDef) -> Self {
        self.post_transform_filter.push(filter);
        self
    }

    pub fn properties<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.properties = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn exclude_properties<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.exclude_properties = Some(names.into_iter().map(Into::into).collect());
        self
    }

    pub fn has_transform(&self) -> bool {
        !self.transformer.is_empty()
    }

    /// Field-wise merge: every field `other` sets replaces ours.
    pub fn merge(&self, other: &ViewElementDefinition) -> ViewElementDefinition {
        fn pick<T: Clone>(ours: &Vec<T>, theirs: &Vec<T>) -> Vec<T> {
            if theirs.is_empty() { ours.clone() } else { theirs.clone() }
        }
        ViewElementDefinition {
            pre_aggregation_filter: pick(&self.pre_aggregation_filter, &other.pre_aggregation_filter),
            group_by: other.group_by.clone().or_else(|| self.group_by.clone()),
            aggregate: other.aggregate.or(self.aggregate),
            post_aggregation_filter: pick(&self.post_aggregation_filter, &other.post_aggregation_filter),
            transformer: pick(&self.transformer, &other.transformer),
            post_transform_filter: pick(&self.post_transform_filter, &other.post_transform_filter),
            properties: other.properties.clone().or_else(|| self.properties.clone()),
            exclude_properties: other.exclude_properties.clone().or_else(|| self.exclude_properties.clone()),
        }
    }
}

/// Reference to a stored, parameterised view, resolved before execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedViewRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct View {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: BTreeMap<String, ViewElementDefinition>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub edges: BTreeMap<String, ViewElementDefinition>,
    /// Applied to any group not listed above.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_elements: Option<ViewElementDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub named_view: Option<NamedViewRef>,
    /// Names of the named views already merged into this one.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub merged_named_views: Vec<String>,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(mut self, group: impl Into<String>, definition: ViewElementDefinition) -> Self {
        self.entities.insert(group.into(), definition);
        self
    }

    pub fn edge(mut self, group: impl Into<String>, definition: ViewElementDefinition) -> Self {
        self.edges.insert(group.into(), definition);
        self
    }

    pub fn global_elements(mut self, definition: ViewElementDefinition) -> Self {
        self.global_elements = Some(definition);
        self
    }

    pub fn named(name: impl Into<String>, parameters: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            named_view: Some(NamedViewRef {
                name: name.into(),
                parameters,
            }),
            ..Self::default()
        }
    }

    /// The definition governing `group`: its own entry, else the global one.
    pub fn definition_for(&self, group: &str, is_entity: bool) -> Option<&ViewElementDefinition> {
        let own = if is_entity {
            self.entities.get(group)
        } else {
            self.edges.get(group)
        };
        own.or(self.global_elements.as_ref())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ViewElementDefinition> {
        self.entities
            .values()
            .chain(self.edges.values())
            .chain(self.global_elements.iter())
    }

    pub fn has_transform(&self) -> bool {
        self.definitions().any(|d| d.has_transform())
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
            && self.edges.is_empty()
            && self.global_elements.is_none()
            && self.named_view.is_none()
    }

    pub fn groups(&self) -> BTreeSet<&str> {
        self.entities.keys().chain(self.edges.keys()).map(|s| s.as_str()).collect()
    }

    /// Returns a new view with `other` layered on top: groups are unioned,
    /// shared groups merge field-wise with `other` winning, and provenance
    /// names are concatenated without duplicates.
    pub fn merge(&self, other: &View) -> View {
        fn merge_groups(
            ours: &BTreeMap<String, ViewElementDefinition>,
            theirs: &BTreeMap<String, ViewElementDefinition>,
        ) -> BTreeMap<String, ViewElementDefinition> {
            let mut merged = ours.clone();
            for (group, def) in theirs {
                let combined = match merged.get(group) {
                    Some(existing) => existing.merge(def),
                    None => def.clone(),
                };
                merged.insert(group.clone(), combined);
            }
            merged
        }

        let global_elements = match (&self.global_elements, &other.global_elements) {
            (Some(a), Some(b)) => Some(a.merge(b)),
            (a, b) => b.clone().or_else(|| a.clone()),
        };
        let mut merged_named_views = self.merged_named_views.clone();
        for name in &other.merged_named_views {
            if !merged_named_views.contains(name) {
                merged_named_views.push(name.clone());
            }
        }
        View {
            entities: merge_groups(&self.entities, &other.entities),
            edges: merge_groups(&self.edges, &other.edges),
            global_elements,
            named_view: other.named_view.clone().or_else(|| self.named_view.clone()),
            merged_named_views,
        }
    }

    /// Checks the view against a schema: listed groups exist, group-by
    /// overrides narrow the schema's set, selections name known identifiers
    /// or properties, and transforms do not change a declared property's
    /// class.
    pub fn validate(&self, schema: &Schema) -> ValidationResult {
        let mut result = ValidationResult::ok();
        for (kind, groups, is_entity) in [("entities", &self.entities, true), ("edges", &self.edges, false)] {
            for (group, def) in groups {
                let field = format!("view.{}.{}", kind, group);
                match schema.element_definition(group) {
                    Ok(schema_def) if schema_def.is_entity() == is_entity => {
                        validate_definition(&field, def, schema_def, &mut result);
                    }
                    Ok(_) => result.add_error(field, "group is declared with the other element kind"),
                    Err(_) => result.add_error(field, "group is not defined in the schema"),
                }
            }
        }
        if let Some(global) = &self.global_elements {
            if let Some(group_by) = &global.group_by {
                if !group_by.is_empty() {
                    result.add_error("view.globalElements", "groupBy overrides must name a group");
                }
            }
        }
        result
    }
}

fn validate_definition(
    field: &str,
    def: &ViewElementDefinition,
    schema_def: ElementDefinitionRef<'_>,
    result: &mut ValidationResult,
) {
    let identifier_ok = |id: IdentifierType| -> bool {
        match id {
            IdentifierType::Group => true,
            IdentifierType::Vertex => schema_def.is_entity(),
            _ => !schema_def.is_entity(),
        }
    };
    let check_selection = |filters: &[FilterDef], extra: &BTreeSet<String>, stage: &str, result: &mut ValidationResult| {
        for filter in filters {
            for key in &filter.selection {
                let known = match IdentifierType::from_name(key) {
                    Some(id) => identifier_ok(id),
                    None => schema_def.has_property(key) || extra.contains(key),
                };
                if !known {
                    result.add_error(field, format!("{} selects unknown field {}", stage, key));
                }
            }
        }
    };

    let none = BTreeSet::new();
    check_selection(&def.pre_aggregation_filter, &none, "preAggregationFilter", result);
    check_selection(&def.post_aggregation_filter, &none, "postAggregationFilter", result);

    if let Some(group_by) = &def.group_by {
        for name in group_by {
            if !schema_def.group_by().contains(name) {
                result.add_error(field, format!("groupBy {} is not in the schema's groupBy", name));
            }
        }
        for dropped in schema_def.group_by().iter().filter(|g| !group_by.contains(g)) {
            let has_function = schema_def
                .definition()
                .properties
                .get(dropped)
                .and_then(|t| schema_def.schema().type_definition(t))
                .map(|t| t.aggregate_function.is_some())
                .unwrap_or(false);
            if !has_function {
                result.add_error(
                    field,
                    format!("groupBy {} cannot be dropped without an aggregate function", dropped),
                );
            }
        }
    }

    let mut produced = BTreeSet::new();
    for transform in &def.transformer {
        for key in &transform.selection {
            let known = match IdentifierType::from_name(key) {
                Some(id) => identifier_ok(id),
                None => schema_def.has_property(key) || produced.contains(key),
            };
            if !known {
                result.add_error(field, format!("transformer selects unknown field {}", key));
            }
        }
        for projected in &transform.projection {
            if IdentifierType::from_name(projected).is_some() {
                result.add_error(field, format!("transformer cannot project onto {}", projected));
                continue;
            }
            if let (Some(declared), Some(output)) =
                (schema_def.property_class(projected), transform.function.output_class())
            {
                if declared != output && declared != ValueClass::Any {
                    result.add_error(
                        field,
                        format!(
                            "transformer would redefine {} from {} to {}",
                            projected, declared, output
                        ),
                    );
                }
            }
            produced.insert(projected.clone());
        }
    }
    check_selection(&def.post_transform_filter, &produced, "postTransformFilter", result);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::function::{Predicate, Transform};
    use crate::schema::tests::count_schema;

    fn count_filter(min: i64) -> FilterDef {
        FilterDef::new(["count"], Predicate::IsMoreThan { value: min.into(), or_equal_to: false })
    }

    #[test]
    fn test_merge_last_writer_wins_per_field() {
        let a = View::new()
            .entity("Entity", ViewElementDefinition::new().pre_aggregation_filter(count_filter(1)))
            .edge("Edge", ViewElementDefinition::new());
        let mut b = View::new().entity(
            "Entity",
            ViewElementDefinition::new().post_aggregation_filter(count_filter(5)),
        );
        b.merged_named_views.push("recent".to_string());

        let merged = a.merge(&b);
        let entity = &merged.entities["Entity"];
        assert_eq!(entity.pre_aggregation_filter, vec![count_filter(1)]);
        assert_eq!(entity.post_aggregation_filter, vec![count_filter(5)]);
        assert!(merged.edges.contains_key("Edge"));
        assert_eq!(merged.merged_named_views, vec!["recent".to_string()]);
        assert_eq!(merged.merge(&b).merged_named_views.len(), 1);
    }

    #[test]
    fn test_definition_for_falls_back_to_global() {
        let view = View::new()
            .entity("Entity", ViewElementDefinition::new().aggregate(false))
            .global_elements(ViewElementDefinition::new().pre_aggregation_filter(count_filter(0)));
        assert_eq!(view.definition_for("Entity", true).unwrap().aggregate, Some(false));
        assert!(view.definition_for("Edge", false).unwrap().aggregate.is_none());
        assert!(View::new().definition_for("Entity", true).is_none());
    }

    #[test]
    fn test_has_transform() {
        let view = View::new().entity(
            "Entity",
            ViewElementDefinition::new().transformer(TransformDef::new(["count"], Transform::ToString, ["countText"])),
        );
        assert!(view.has_transform());
        assert!(!View::new().has_transform());
    }

    #[test]
    fn test_validate_against_schema() {
        let schema = count_schema();
        let good = View::new()
            .entity("Entity", ViewElementDefinition::new().pre_aggregation_filter(count_filter(1)))
            .edge("Edge", ViewElementDefinition::new().group_by(Vec::<String>::new()));
        assert!(good.validate(&schema).is_valid());

        let bad = View::new()
            .entity(
                "Entity",
                ViewElementDefinition::new()
                    .pre_aggregation_filter(FilterDef::new(["SOURCE"], Predicate::Exists))
                    .group_by(["count"])
                    .transformer(TransformDef::new(["VERTEX"], Transform::ToString, ["count"])),
            )
            .entity("Missing", ViewElementDefinition::new());
        let result = bad.validate(&schema);
        let text = result.to_string();
        assert!(text.contains("preAggregationFilter selects unknown field SOURCE"));
        assert!(text.contains("groupBy count is not in the schema's groupBy"));
        assert!(text.contains("transformer would redefine count from Long to String"));
        assert!(text.contains("view.entities.Missing: group is not defined in the schema"));
    }

    #[test]
    fn test_dropping_group_by_needs_aggregate_function() {
        let schema = count_schema();
        // label.string aggregates with First, so dropping it is allowed
        let view = View::new().edge("Edge", ViewElementDefinition::new().group_by(Vec::<String>::new()));
        assert!(view.validate(&schema).is_valid());
    }

    #[test]
    fn test_post_transform_filter_may_select_projection() {
        let schema = count_schema();
        let view = View::new().entity(
            "Entity",
            ViewElementDefinition::new()
                .transformer(TransformDef::new(["VERTEX", "count"], Transform::Concat { separator: ":".into() }, ["summary"]))
                .post_transform_filter(FilterDef::new(["summary"], Predicate::Exists)),
        );
        assert!(view.validate(&schema).is_valid());
    }
}
