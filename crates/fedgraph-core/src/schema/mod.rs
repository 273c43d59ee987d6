//! Schema: per-group element definitions and the type definitions they
//! reference.
//!
//! A [`Schema`] is assembled from a plain [`SchemaConfig`] and validated once
//! by [`Schema::build`]; a built schema is immutable. Merging two schemas
//! produces a new, re-validated schema or a [`GraphError::SchemaConflict`].

pub mod aggregator;
pub mod definition;
pub mod validation;

pub use aggregator::ElementAggregator;
pub use definition::{ElementDefinition, SerialiserDef, TypeDefinition};
pub use validation::{ElementValidator, ValidationError, ValidationResult};

use fedgraph_common::{IdentifierType, ValueClass};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{GraphError, Result};

/// Unvalidated schema fields, as written in configuration or JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaConfig {
    #[serde(default)]
    pub entities: BTreeMap<String, ElementDefinition>,
    #[serde(default)]
    pub edges: BTreeMap<String, ElementDefinition>,
    #[serde(default)]
    pub types: BTreeMap<String, TypeDefinition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility_property: Option<String>,
}

impl SchemaConfig {
    pub fn entity(mut self, group: impl Into<String>, definition: ElementDefinition) -> Self {
        self.entities.insert(group.into(), definition);
        self
    }

    pub fn edge(mut self, group: impl Into<String>, definition: ElementDefinition) -> Self {
        self.edges.insert(group.into(), definition);
        self
    }

    pub fn type_def(mut self, name: impl Into<String>, definition: TypeDefinition) -> Self {
        self.types.insert(name.into(), definition);
        self
    }

    pub fn visibility_property(mut self, name: impl Into<String>) -> Self {
        self.visibility_property = Some(name.into());
        self
    }

    pub fn build(self) -> Result<Schema> {
        Schema::build(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SchemaConfig", into = "SchemaConfig")]
pub struct Schema {
    entities: BTreeMap<String, ElementDefinition>,
    edges: BTreeMap<String, ElementDefinition>,
    types: BTreeMap<String, TypeDefinition>,
    visibility_property: Option<String>,
}

impl TryFrom<SchemaConfig> for Schema {
    type Error = GraphError;

    fn try_from(config: SchemaConfig) -> Result<Self> {
        Schema::build(config)
    }
}

impl From<Schema> for SchemaConfig {
    fn from(schema: Schema) -> Self {
        SchemaConfig {
            entities: schema.entities,
            edges: schema.edges,
            types: schema.types,
            visibility_property: schema.visibility_property,
        }
    }
}

/// A group's definition bound to the schema that owns it, so type names can
/// be resolved.
#[derive(Debug, Clone, Copy)]
pub struct ElementDefinitionRef<'a> {
    group: &'a str,
    definition: &'a ElementDefinition,
    schema: &'a Schema,
    is_entity: bool,
}

impl<'a> ElementDefinitionRef<'a> {
    pub fn group(&self) -> &'a str {
        self.group
    }

    pub fn definition(&self) -> &'a ElementDefinition {
        self.definition
    }

    pub fn schema(&self) -> &'a Schema {
        self.schema
    }

    pub fn is_entity(&self) -> bool {
        self.is_entity
    }

    pub fn aggregates(&self) -> bool {
        self.definition.aggregate
    }

    pub fn group_by(&self) -> &'a [String] {
        &self.definition.group_by
    }

    pub fn property_class(&self, name: &str) -> Option<ValueClass> {
        let type_name = self.definition.properties.get(name)?;
        self.schema.type_definition(type_name).map(|t| t.class)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.definition.properties.contains_key(name)
    }

    /// Reducer over the schema's own group-by set.
    pub fn aggregator(&self) -> ElementAggregator {
        self.aggregator_with_group_by(&self.definition.group_by)
    }

    /// Reducer for a narrower group-by set (a view override). Properties
    /// dropped from the group-by set are aggregated with their type's
    /// function.
    pub fn aggregator_with_group_by(&self, group_by: &[String]) -> ElementAggregator {
        let functions = self
            .definition
            .properties
            .iter()
            .filter_map(|(name, type_name)| {
                let function = self.schema.type_definition(type_name)?.aggregate_function.clone()?;
                Some((name.clone(), function))
            })
            .collect();
        ElementAggregator::new(self.group, functions, group_by.to_vec())
    }

    pub fn validator(&self) -> ElementValidator<'a> {
        ElementValidator::new(*self)
    }
}

impl Schema {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn builder() -> SchemaConfig {
        SchemaConfig::default()
    }

    /// Validates a configuration and freezes it into a schema. All problems
    /// are reported together.
    pub fn build(config: SchemaConfig) -> Result<Self> {
        let mut result = ValidationResult::ok();

        for group in config.entities.keys() {
            if config.edges.contains_key(group) {
                result.add_error(group.as_str(), "group is declared as both an entity and an edge");
            }
        }

        for (group, def) in &config.entities {
            let field = format!("entities.{}", group);
            if !def.identifiers.contains_key(&IdentifierType::Vertex) {
                result.add_error(&field, "entity definitions must declare a VERTEX type");
            }
            for id in def.identifiers.keys() {
                if *id != IdentifierType::Vertex {
                    result.add_error(&field, format!("entity definitions cannot declare {}", id));
                }
            }
            check_element_definition(&field, def, &config, &mut result);
        }

        for (group, def) in &config.edges {
            let field = format!("edges.{}", group);
            for required in [IdentifierType::Source, IdentifierType::Destination] {
                if !def.identifiers.contains_key(&required) {
                    result.add_error(&field, format!("edge definitions must declare a {} type", required));
                }
            }
            for id in def.identifiers.keys() {
                if matches!(id, IdentifierType::Vertex | IdentifierType::Group) {
                    result.add_error(&field, format!("edge definitions cannot declare {}", id));
                }
            }
            check_element_definition(&field, def, &config, &mut result);
        }

        result.into_result()?;
        Ok(Self {
            entities: config.entities,
            edges: config.edges,
            types: config.types,
            visibility_property: config.visibility_property,
        })
    }

    pub fn element_definition(&self, group: &str) -> Result<ElementDefinitionRef<'_>> {
        let (name, definition, is_entity) = if let Some((name, def)) = self.entities.get_key_value(group) {
            (name, def, true)
        } else if let Some((name, def)) = self.edges.get_key_value(group) {
            (name, def, false)
        } else {
            return Err(GraphError::NotFound(format!("group {} is not defined in the schema", group)));
        };
        Ok(ElementDefinitionRef {
            group: name,
            definition,
            schema: self,
            is_entity,
        })
    }

    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition> {
        self.types.get(name)
    }

    pub fn entities(&self) -> &BTreeMap<String, ElementDefinition> {
        &self.entities
    }

    pub fn edges(&self) -> &BTreeMap<String, ElementDefinition> {
        &self.edges
    }

    pub fn types(&self) -> &BTreeMap<String, TypeDefinition> {
        &self.types
    }

    pub fn visibility_property(&self) -> Option<&str> {
        self.visibility_property.as_deref()
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> {
        self.entities.keys().chain(self.edges.keys()).map(|s| s.as_str())
    }

    pub fn has_group(&self, group: &str) -> bool {
        self.entities.contains_key(group) || self.edges.contains_key(group)
    }

    /// Drops type definitions no group references.
    pub fn compact(&self) -> Schema {
        let used: BTreeSet<&str> = self
            .entities
            .values()
            .chain(self.edges.values())
            .flat_map(|d| d.type_names())
            .collect();
        Schema {
            entities: self.entities.clone(),
            edges: self.edges.clone(),
            types: self
                .types
                .iter()
                .filter(|(name, _)| used.contains(name.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            visibility_property: self.visibility_property.clone(),
        }
    }

    /// Union of two schemas. Shared type names must be identical; shared
    /// groups must agree on identifiers, property types, group-by and
    /// aggregation.
    pub fn merge(&self, other: &Schema) -> Result<Schema> {
        let mut merged: SchemaConfig = self.clone().into();

        for (name, def) in &other.types {
            match merged.types.get(name) {
                Some(existing) if existing != def => {
                    return Err(GraphError::SchemaConflict(format!(
                        "type {} has conflicting definitions",
                        name
                    )));
                }
                Some(_) => {}
                None => {
                    merged.types.insert(name.clone(), def.clone());
                }
            }
        }

        for (group, def) in &other.entities {
            if merged.edges.contains_key(group) {
                return Err(kind_conflict(group));
            }
            merge_group(&mut merged.entities, group, def)?;
        }
        for (group, def) in &other.edges {
            if merged.entities.contains_key(group) {
                return Err(kind_conflict(group));
            }
            merge_group(&mut merged.edges, group, def)?;
        }

        match (&merged.visibility_property, &other.visibility_property) {
            (Some(a), Some(b)) if a != b => {
                return Err(GraphError::SchemaConflict(format!(
                    "visibility property {} conflicts with {}",
                    a, b
                )));
            }
            (None, Some(b)) => merged.visibility_property = Some(b.clone()),
            _ => {}
        }

        Schema::build(merged).map_err(|e| match e {
            GraphError::Validation(result) => GraphError::SchemaConflict(result.to_string()),
            other => other,
        })
    }
}

fn kind_conflict(group: &str) -> GraphError {
    GraphError::SchemaConflict(format!(
        "group {} is an entity in one schema and an edge in another",
        group
    ))
}

fn merge_group(
    groups: &mut BTreeMap<String, ElementDefinition>,
    group: &str,
    incoming: &ElementDefinition,
) -> Result<()> {
    let Some(existing) = groups.get_mut(group) else {
        groups.insert(group.to_string(), incoming.clone());
        return Ok(());
    };
    let conflict = |what: String| GraphError::SchemaConflict(format!("group {}: {}", group, what));

    if existing.identifiers != incoming.identifiers {
        return Err(conflict("identifier types differ".to_string()));
    }
    if existing.aggregate != incoming.aggregate {
        return Err(conflict("aggregate flags differ".to_string()));
    }
    if !existing.group_by.is_empty() && !incoming.group_by.is_empty() && existing.group_by != incoming.group_by {
        return Err(conflict(format!(
            "groupBy {:?} conflicts with {:?}",
            existing.group_by, incoming.group_by
        )));
    }
    for (name, type_name) in &incoming.properties {
        match existing.properties.get(name) {
            Some(current) if current != type_name => {
                return Err(conflict(format!(
                    "property {} is declared as {} and as {}",
                    name, current, type_name
                )));
            }
            Some(_) => {}
            None => {
                existing.properties.insert(name.clone(), type_name.clone());
            }
        }
    }
    if existing.group_by.is_empty() {
        existing.group_by = incoming.group_by.clone();
    }
    for filter in &incoming.validate_functions {
        if !existing.validate_functions.contains(filter) {
            existing.validate_functions.push(filter.clone());
        }
    }
    if existing.description.is_none() {
        existing.description = incoming.description.clone();
    }
    Ok(())
}

fn check_element_definition(
    field: &str,
    def: &ElementDefinition,
    config: &SchemaConfig,
    result: &mut ValidationResult,
) {
    for type_name in def.type_names() {
        if !config.types.contains_key(type_name) {
            result.add_error(field, format!("type {} is not defined", type_name));
        }
    }

    for name in &def.group_by {
        if !def.properties.contains_key(name) {
            result.add_error(field, format!("groupBy property {} is not declared", name));
        }
    }

    if def.aggregate {
        for (name, type_name) in &def.properties {
            if def.group_by.contains(name) {
                continue;
            }
            let has_function = config
                .types
                .get(type_name)
                .map(|t| t.aggregate_function.is_some())
                .unwrap_or(true);
            if !has_function {
                result.add_error(
                    field,
                    format!("property {} of an aggregating group needs an aggregate function", name),
                );
            }
        }
    }

    for name in crate::function::selected_properties(&def.validate_functions) {
        if !def.properties.contains_key(name) {
            result.add_error(field, format!("validate function selects undeclared property {}", name));
        }
    }
}
