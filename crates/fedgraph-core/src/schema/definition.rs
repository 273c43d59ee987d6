use fedgraph_common::{IdentifierType, ValueClass};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::function::{BinaryOperator, FilterDef, Predicate};

fn default_true() -> bool {
    true
}

/// Names the byte serialiser a backend should use for a type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerialiserDef {
    pub name: String,
    #[serde(default)]
    pub preserves_ordering: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeDefinition {
    pub class: ValueClass,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregate_function: Option<BinaryOperator>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate_functions: Vec<Predicate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serialiser: Option<SerialiserDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl TypeDefinition {
    pub fn new(class: ValueClass) -> Self {
        Self {
            class,
            aggregate_function: None,
            validate_functions: Vec::new(),
            serialiser: None,
            description: None,
        }
    }

    pub fn with_aggregate_function(mut self, function: BinaryOperator) -> Self {
        self.aggregate_function = Some(function);
        self
    }

    pub fn with_validate_function(mut self, predicate: Predicate) -> Self {
        self.validate_functions.push(predicate);
        self
    }

    pub fn with_serialiser(mut self, name: impl Into<String>, preserves_ordering: bool) -> Self {
        self.serialiser = Some(SerialiserDef {
            name: name.into(),
            preserves_ordering,
        });
        self
    }
}

/// Definition of one group: its identifier types, properties and
/// aggregation rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementDefinition {
    #[serde(default)]
    pub identifiers: BTreeMap<IdentifierType, String>,
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub group_by: Vec<String>,
    #[serde(default = "default_true")]
    pub aggregate: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub validate_functions: Vec<FilterDef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ElementDefinition {
    pub fn entity(vertex_type: impl Into<String>) -> Self {
        let mut identifiers = BTreeMap::new();
        identifiers.insert(IdentifierType::Vertex, vertex_type.into());
        Self::with_identifiers(identifiers)
    }

    pub fn edge(
        vertex_type: impl Into<String>,
        directed_type: Option<String>,
    ) -> Self {
        let vertex_type = vertex_type.into();
        let mut identifiers = BTreeMap::new();
        identifiers.insert(IdentifierType::Source, vertex_type.clone());
        identifiers.insert(IdentifierType::Destination, vertex_type);
        if let Some(directed) = directed_type {
            identifiers.insert(IdentifierType::Directed, directed);
        }
        Self::with_identifiers(identifiers)
    }

    fn with_identifiers(identifiers: BTreeMap<IdentifierType, String>) -> Self {
        Self {
            identifiers,
            properties: BTreeMap::new(),
            group_by: Vec::new(),
            aggregate: true,
            validate_functions: Vec::new(),
            description: None,
        }
    }

    pub fn property(mut self, name: impl Into<String>, type_name: impl Into<String>) -> Self {
        self.properties.insert(name.into(), type_name.into());
        self
    }

    pub fn group_by<S: Into<String>>(mut self, names: impl IntoIterator<Item = S>) -> Self {
        self.group_by = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn aggregate(mut self, aggregate: bool) -> Self {
        self.aggregate = aggregate;
        self
    }

    pub fn validate_function(mut self, filter: FilterDef) -> Self {
        self.validate_functions.push(filter);
        self
    }

    /// Every type name this definition references.
    pub fn type_names(&self) -> impl Iterator<Item = &str> {
        self.identifiers
            .values()
            .chain(self.properties.values())
            .map(|s| s.as_str())
    }
}
