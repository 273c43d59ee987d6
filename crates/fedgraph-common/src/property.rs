use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::ModelError;

/// Ordered property bag carried by every element.
pub type Properties = BTreeMap<String, PropertyValue>;

/// A typed property or identifier value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum PropertyValue {
    Boolean(bool),
    Long(i64),
    Double(f64),
    String(String),
    StringSet(BTreeSet<String>),
}

impl PropertyValue {
    pub fn class(&self) -> ValueClass {
        match self {
            PropertyValue::Boolean(_) => ValueClass::Boolean,
            PropertyValue::Long(_) => ValueClass::Long,
            PropertyValue::Double(_) => ValueClass::Double,
            PropertyValue::String(_) => ValueClass::String,
            PropertyValue::StringSet(_) => ValueClass::StringSet,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            PropertyValue::Long(v) => Some(*v as f64),
            PropertyValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// Compares two values of compatible classes. Longs and doubles compare
    /// numerically; everything else only compares within its own class.
    pub fn compare(&self, other: &PropertyValue) -> Option<Ordering> {
        match (self, other) {
            (PropertyValue::Boolean(a), PropertyValue::Boolean(b)) => Some(a.cmp(b)),
            (PropertyValue::Long(a), PropertyValue::Long(b)) => Some(a.cmp(b)),
            (PropertyValue::String(a), PropertyValue::String(b)) => Some(a.cmp(b)),
            (PropertyValue::StringSet(a), PropertyValue::StringSet(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_double(), b.as_double()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropertyValue::Boolean(b) => write!(f, "{}", b),
            PropertyValue::Long(v) => write!(f, "{}", v),
            PropertyValue::Double(v) => write!(f, "{}", v),
            PropertyValue::String(s) => write!(f, "{}", s),
            PropertyValue::StringSet(set) => {
                let items: Vec<&str> = set.iter().map(|s| s.as_str()).collect();
                write!(f, "{{{}}}", items.join(","))
            }
        }
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        PropertyValue::Long(v)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        PropertyValue::Double(v)
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        PropertyValue::Boolean(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        PropertyValue::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        PropertyValue::String(v)
    }
}

impl TryFrom<PropertyValue> for i64 {
    type Error = ModelError;

    fn try_from(value: PropertyValue) -> Result<Self, Self::Error> {
        match value {
            PropertyValue::Long(v) => Ok(v),
            other => Err(ModelError::ClassMismatch {
                expected: ValueClass::Long,
                actual: other.class(),
            }),
        }
    }
}

impl TryFrom<PropertyValue> for String {
    type Error = ModelError;

    fn try_from(value: PropertyValue) -> Result<Self, Self::Error> {
        match value {
            PropertyValue::String(v) => Ok(v),
            other => Err(ModelError::ClassMismatch {
                expected: ValueClass::String,
                actual: other.class(),
            }),
        }
    }
}

/// The value class a schema type declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueClass {
    Boolean,
    Long,
    Double,
    String,
    StringSet,
    /// Accepts any value; used for loosely typed identifiers.
    Any,
}

impl ValueClass {
    pub fn accepts(&self, value: &PropertyValue) -> bool {
        match self {
            ValueClass::Any => true,
            class => value.class() == *class,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ValueClass::Boolean => "Boolean",
            ValueClass::Long => "Long",
            ValueClass::Double => "Double",
            ValueClass::String => "String",
            ValueClass::StringSet => "StringSet",
            ValueClass::Any => "Any",
        }
    }
}

impl fmt::Display for ValueClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ValueClass {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Boolean" => Ok(ValueClass::Boolean),
            "Long" => Ok(ValueClass::Long),
            "Double" => Ok(ValueClass::Double),
            "String" => Ok(ValueClass::String),
            "StringSet" => Ok(ValueClass::StringSet),
            "Any" => Ok(ValueClass::Any),
            other => Err(ModelError::UnknownClass(other.to_string())),
        }
    }
}
