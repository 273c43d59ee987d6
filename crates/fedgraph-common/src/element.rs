use serde::{Deserialize, Serialize};
use std::fmt;

use crate::property::{Properties, PropertyValue};

/// Names an identifier slot of an element, usable wherever a property name
/// can be selected (filters, transforms, schema identifier types).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdentifierType {
    Vertex,
    Source,
    Destination,
    Directed,
    Group,
}

impl IdentifierType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierType::Vertex => "VERTEX",
            IdentifierType::Source => "SOURCE",
            IdentifierType::Destination => "DESTINATION",
            IdentifierType::Directed => "DIRECTED",
            IdentifierType::Group => "GROUP",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "VERTEX" => Some(IdentifierType::Vertex),
            "SOURCE" => Some(IdentifierType::Source),
            "DESTINATION" => Some(IdentifierType::Destination),
            "DIRECTED" => Some(IdentifierType::Directed),
            "GROUP" => Some(IdentifierType::Group),
            _ => None,
        }
    }
}

impl fmt::Display for IdentifierType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub group: String,
    pub vertex: PropertyValue,
    #[serde(default)]
    pub properties: Properties,
}

impl Entity {
    pub fn new(group: impl Into<String>, vertex: impl Into<PropertyValue>) -> Self {
        Self {
            group: group.into(),
            vertex: vertex.into(),
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub group: String,
    pub source: PropertyValue,
    pub destination: PropertyValue,
    pub directed: bool,
    #[serde(default)]
    pub properties: Properties,
}

impl Edge {
    pub fn new(
        group: impl Into<String>,
        source: impl Into<PropertyValue>,
        destination: impl Into<PropertyValue>,
        directed: bool,
    ) -> Self {
        Self {
            group: group.into(),
            source: source.into(),
            destination: destination.into(),
            directed,
            properties: Properties::new(),
        }
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }
}

/// The graph data unit: a single vertex (entity) or a vertex pair (edge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Element {
    Entity(Entity),
    Edge(Edge),
}

impl Element {
    pub fn group(&self) -> &str {
        match self {
            Element::Entity(e) => &e.group,
            Element::Edge(e) => &e.group,
        }
    }

    pub fn is_entity(&self) -> bool {
        matches!(self, Element::Entity(_))
    }

    pub fn properties(&self) -> &Properties {
        match self {
            Element::Entity(e) => &e.properties,
            Element::Edge(e) => &e.properties,
        }
    }

    pub fn properties_mut(&mut self) -> &mut Properties {
        match self {
            Element::Entity(e) => &mut e.properties,
            Element::Edge(e) => &mut e.properties,
        }
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties().get(name)
    }

    pub fn put_property(&mut self, name: impl Into<String>, value: PropertyValue) {
        self.properties_mut().insert(name.into(), value);
    }

    /// Returns the value stored in an identifier slot. `Group` yields the
    /// group name as a string value.
    pub fn identifier(&self, id_type: IdentifierType) -> Option<PropertyValue> {
        match (self, id_type) {
            (_, IdentifierType::Group) => Some(PropertyValue::String(self.group().to_string())),
            (Element::Entity(e), IdentifierType::Vertex) => Some(e.vertex.clone()),
            (Element::Edge(e), IdentifierType::Source) => Some(e.source.clone()),
            (Element::Edge(e), IdentifierType::Destination) => Some(e.destination.clone()),
            (Element::Edge(e), IdentifierType::Directed) => Some(PropertyValue::Boolean(e.directed)),
            _ => None,
        }
    }

    /// Looks up a selection key: identifier names first, then properties.
    pub fn select(&self, key: &str) -> Option<PropertyValue> {
        match IdentifierType::from_name(key) {
            Some(id_type) => self.identifier(id_type),
            None => self.property(key).cloned(),
        }
    }

    pub fn element_id(&self) -> ElementId {
        match self {
            Element::Entity(e) => ElementId::Entity { vertex: e.vertex.clone() },
            Element::Edge(e) => ElementId::Edge {
                source: e.source.clone(),
                destination: e.destination.clone(),
                directed: e.directed,
            },
        }
    }
}

impl From<Entity> for Element {
    fn from(e: Entity) -> Self {
        Element::Entity(e)
    }
}

impl From<Edge> for Element {
    fn from(e: Edge) -> Self {
        Element::Edge(e)
    }
}

/// Seed used to look elements up by identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum ElementId {
    Entity {
        vertex: PropertyValue,
    },
    Edge {
        source: PropertyValue,
        destination: PropertyValue,
        directed: bool,
    },
}

/// How a seed matches stored elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SeedMatching {
    /// Entity seeds match entities on the vertex and edges touching it;
    /// edge seeds match the edge and the entities at either end.
    #[default]
    Related,
    /// Only elements with exactly the seed's identifiers.
    Equal,
}

impl ElementId {
    pub fn vertex(vertex: impl Into<PropertyValue>) -> Self {
        ElementId::Entity { vertex: vertex.into() }
    }

    pub fn matches(&self, element: &Element, matching: SeedMatching) -> bool {
        match (self, element) {
            (ElementId::Entity { vertex }, Element::Entity(e)) => &e.vertex == vertex,
            (ElementId::Entity { vertex }, Element::Edge(e)) => {
                matching == SeedMatching::Related && (&e.source == vertex || &e.destination == vertex)
            }
            (ElementId::Edge { source, destination, directed }, Element::Edge(e)) => {
                if e.directed != *directed {
                    return false;
                }
                let forward = &e.source == source && &e.destination == destination;
                let reverse = !directed && &e.source == destination && &e.destination == source;
                forward || reverse
            }
            (ElementId::Edge { source, destination, .. }, Element::Entity(e)) => {
                matching == SeedMatching::Related && (&e.vertex == source || &e.vertex == destination)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_element_serialization() {
        let element: Element = Entity::new("Entity", "1").with_property("count", 3i64).into();
        let json = serde_json::to_string(&element).expect("Failed to serialize");
        let back: Element = serde_json::from_str(&json).expect("Failed to deserialize");
        assert_eq!(back, element);
        assert!(json.contains(r#""class":"Entity""#));
    }

    #[test]
    fn test_select_identifiers_and_properties() {
        let edge: Element = Edge::new("knows", "a", "b", true).with_property("weight", 2i64).into();
        assert_eq!(edge.select("SOURCE"), Some(PropertyValue::from("a")));
        assert_eq!(edge.select("DIRECTED"), Some(PropertyValue::Boolean(true)));
        assert_eq!(edge.select("GROUP"), Some(PropertyValue::from("knows")));
        assert_eq!(edge.select("weight"), Some(PropertyValue::Long(2)));
        assert_eq!(edge.select("VERTEX"), None);
        assert_eq!(edge.select("missing"), None);
    }

    #[test]
    fn test_seed_matching() {
        let entity: Element = Entity::new("person", "a").into();
        let edge: Element = Edge::new("knows", "a", "b", false).into();

        let seed = ElementId::vertex("a");
        assert!(seed.matches(&entity, SeedMatching::Related));
        assert!(seed.matches(&edge, SeedMatching::Related));
        assert!(!seed.matches(&edge, SeedMatching::Equal));

        let edge_seed = ElementId::Edge {
            source: "b".into(),
            destination: "a".into(),
            directed: false,
        };
        assert!(edge_seed.matches(&edge, SeedMatching::Equal));
        assert!(edge_seed.matches(&entity, SeedMatching::Related));
        assert!(!edge_seed.matches(&entity, SeedMatching::Equal));
    }
}
