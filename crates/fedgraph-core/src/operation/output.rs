use fedgraph_common::{Element, ElementId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::named_view::NamedViewDetail;
use crate::operation::GraphInfo;
use crate::schema::Schema;

/// Per-group element counts. `limit_hit` is set when counting stopped early.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupCounts {
    #[serde(default)]
    pub entities: BTreeMap<String, u64>,
    #[serde(default)]
    pub edges: BTreeMap<String, u64>,
    #[serde(default)]
    pub limit_hit: bool,
}

impl GroupCounts {
    pub fn add(&mut self, element: &Element) {
        let counts = if element.is_entity() { &mut self.entities } else { &mut self.edges };
        *counts.entry(element.group().to_string()).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.entities.values().chain(self.edges.values()).sum()
    }
}

/// The value carried between steps of a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Output {
    Elements(Vec<Element>),
    ElementIds(Vec<ElementId>),
    Long(i64),
    Boolean(bool),
    Strings(Vec<String>),
    GroupCounts(GroupCounts),
    Schema(Schema),
    GraphInfo(BTreeMap<String, GraphInfo>),
    NamedViews(Vec<NamedViewDetail>),
    Json(serde_json::Value),
}

impl Output {
    pub fn type_name(&self) -> &'static str {
        match self {
            Output::Elements(_) => "Elements",
            Output::ElementIds(_) => "ElementIds",
            Output::Long(_) => "Long",
            Output::Boolean(_) => "Boolean",
            Output::Strings(_) => "Strings",
            Output::GroupCounts(_) => "GroupCounts",
            Output::Schema(_) => "Schema",
            Output::GraphInfo(_) => "GraphInfo",
            Output::NamedViews(_) => "NamedViews",
            Output::Json(_) => "Json",
        }
    }

    pub fn into_elements(self) -> Result<Vec<Element>> {
        match self {
            Output::Elements(elements) => Ok(elements),
            other => Err(mismatch("Elements", &other)),
        }
    }

    /// Element seeds, derived from elements when needed.
    pub fn into_element_ids(self) -> Result<Vec<ElementId>> {
        match self {
            Output::ElementIds(ids) => Ok(ids),
            Output::Elements(elements) => Ok(elements.iter().map(Element::element_id).collect()),
            other => Err(mismatch("ElementIds", &other)),
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            Output::Long(v) => Some(*v),
            _ => None,
        }
    }

    /// Number of items for iterable outputs; scalars count as one.
    pub fn len(&self) -> usize {
        match self {
            Output::Elements(v) => v.len(),
            Output::ElementIds(v) => v.len(),
            Output::Strings(v) => v.len(),
            Output::GraphInfo(v) => v.len(),
            Output::NamedViews(v) => v.len(),
            Output::Json(serde_json::Value::Array(v)) => v.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub(crate) fn mismatch(expected: &str, actual: &Output) -> GraphError {
    GraphError::IllegalArgument(format!("expected {} input but received {}", expected, actual.type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedgraph_common::{Edge, Entity};

    #[test]
    fn test_group_counts() {
        let mut counts = GroupCounts::default();
        counts.add(&Entity::new("Person", "a").into());
        counts.add(&Entity::new("Person", "b").into());
        counts.add(&Edge::new("Knows", "a", "b", true).into());
        assert_eq!(counts.entities["Person"], 2);
        assert_eq!(counts.edges["Knows"], 1);
        assert_eq!(counts.total(), 3);
    }

    #[test]
    fn test_elements_convert_to_seeds() {
        let output = Output::Elements(vec![Entity::new("Person", "a").into()]);
        assert_eq!(output.into_element_ids().unwrap(), vec![ElementId::vertex("a")]);
        assert!(Output::Long(1).into_elements().is_err());
    }
}
