//! Pluggable filter, aggregation and transform functions.
//!
//! Functions are plain serde enums so that schemas and views holding them
//! can be persisted and exchanged as JSON. Each function operates on values
//! selected from an element by name: identifier names (`VERTEX`, `SOURCE`,
//! `DESTINATION`, `DIRECTED`, `GROUP`) or property names.

use fedgraph_common::{Element, IdentifierType, PropertyValue, ValueClass};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeSet;

use crate::error::{GraphError, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "predicate")]
pub enum Predicate {
    Exists,
    IsEqual {
        value: PropertyValue,
    },
    IsMoreThan {
        value: PropertyValue,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsLessThan {
        value: PropertyValue,
        #[serde(default)]
        or_equal_to: bool,
    },
    IsIn {
        values: Vec<PropertyValue>,
    },
    IsA {
        class: ValueClass,
    },
    StringContains {
        value: String,
        #[serde(default)]
        ignore_case: bool,
    },
    Not {
        negated: Box<Predicate>,
    },
    And {
        predicates: Vec<Predicate>,
    },
    Or {
        predicates: Vec<Predicate>,
    },
}

impl Predicate {
    /// Tests a single, possibly missing, value. Every predicate except
    /// `Not` fails on a missing value.
    pub fn test(&self, value: Option<&PropertyValue>) -> bool {
        match self {
            Predicate::Not { negated } => !negated.test(value),
            Predicate::And { predicates } => predicates.iter().all(|p| p.test(value)),
            Predicate::Or { predicates } => predicates.iter().any(|p| p.test(value)),
            _ => match value {
                Some(v) => self.test_present(v),
                None => false,
            },
        }
    }

    fn test_present(&self, v: &PropertyValue) -> bool {
        match self {
            Predicate::Exists => true,
            Predicate::IsEqual { value } => v == value,
            Predicate::IsMoreThan { value, or_equal_to } => match v.compare(value) {
                Some(Ordering::Greater) => true,
                Some(Ordering::Equal) => *or_equal_to,
                _ => false,
            },
            Predicate::IsLessThan { value, or_equal_to } => match v.compare(value) {
                Some(Ordering::Less) => true,
                Some(Ordering::Equal) => *or_equal_to,
                _ => false,
            },
            Predicate::IsIn { values } => values.contains(v),
            Predicate::IsA { class } => class.accepts(v),
            Predicate::StringContains { value, ignore_case } => match v.as_str() {
                Some(s) if *ignore_case => s.to_lowercase().contains(&value.to_lowercase()),
                Some(s) => s.contains(value.as_str()),
                None => false,
            },
            Predicate::Not { .. } | Predicate::And { .. } | Predicate::Or { .. } => self.test(Some(v)),
        }
    }
}

/// Associative combine function used by schema aggregation. Whether it is
/// order-insensitive is up to the function: `First` and `Last` are not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function")]
pub enum BinaryOperator {
    Sum,
    Min,
    Max,
    StringConcat {
        #[serde(default = "default_separator")]
        separator: String,
    },
    SetUnion,
    And,
    Or,
    First,
    Last,
}

fn default_separator() -> String {
    ",".to_string()
}

impl BinaryOperator {
    pub fn name(&self) -> &'static str {
        match self {
            BinaryOperator::Sum => "Sum",
            BinaryOperator::Min => "Min",
            BinaryOperator::Max => "Max",
            BinaryOperator::StringConcat { .. } => "StringConcat",
            BinaryOperator::SetUnion => "SetUnion",
            BinaryOperator::And => "And",
            BinaryOperator::Or => "Or",
            BinaryOperator::First => "First",
            BinaryOperator::Last => "Last",
        }
    }

    pub fn apply(&self, a: PropertyValue, b: PropertyValue) -> Result<PropertyValue> {
        use PropertyValue::*;
        let mismatch = |a: &PropertyValue, b: &PropertyValue| {
            GraphError::Function(format!(
                "{} cannot combine {} with {}",
                self.name(),
                a.class(),
                b.class()
            ))
        };
        match self {
            BinaryOperator::Sum => match (&a, &b) {
                (Long(x), Long(y)) => Ok(Long(x.saturating_add(*y))),
                (Double(x), Double(y)) => Ok(Double(x + y)),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOperator::Min | BinaryOperator::Max => {
                let ord = a.compare(&b).ok_or_else(|| mismatch(&a, &b))?;
                let keep_a = match self {
                    BinaryOperator::Min => ord != Ordering::Greater,
                    _ => ord != Ordering::Less,
                };
                Ok(if keep_a { a } else { b })
            }
            BinaryOperator::StringConcat { separator } => match (&a, &b) {
                (String(x), String(y)) => Ok(String(format!("{}{}{}", x, separator, y))),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOperator::SetUnion => match (a, b) {
                (StringSet(mut x), StringSet(y)) => {
                    x.extend(y);
                    Ok(StringSet(x))
                }
                (a, b) => Err(mismatch(&a, &b)),
            },
            BinaryOperator::And | BinaryOperator::Or => match (&a, &b) {
                (Boolean(x), Boolean(y)) => Ok(Boolean(match self {
                    BinaryOperator::And => *x && *y,
                    _ => *x || *y,
                })),
                _ => Err(mismatch(&a, &b)),
            },
            BinaryOperator::First => Ok(a),
            BinaryOperator::Last => Ok(b),
        }
    }
}

/// A function deriving new values from selected element values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "function")]
pub enum Transform {
    Identity,
    Concat {
        #[serde(default = "default_separator")]
        separator: String,
    },
    ToString,
    ToLong,
    Multiply {
        by: i64,
    },
    Length,
}

impl Transform {
    /// The class of the produced value when it does not depend on input.
    pub fn output_class(&self) -> Option<ValueClass> {
        match self {
            Transform::Concat { .. } | Transform::ToString => Some(ValueClass::String),
            Transform::ToLong | Transform::Length => Some(ValueClass::Long),
            Transform::Identity | Transform::Multiply { .. } => None,
        }
    }

    pub fn apply(&self, inputs: Vec<Option<PropertyValue>>) -> Result<Vec<PropertyValue>> {
        match self {
            Transform::Identity => inputs
                .into_iter()
                .map(|v| v.ok_or_else(|| GraphError::Function("Identity received a missing value".into())))
                .collect(),
            Transform::Concat { separator } => {
                let parts: Vec<String> = inputs.iter().flatten().map(|v| v.to_string()).collect();
                Ok(vec![PropertyValue::String(parts.join(separator))])
            }
            Transform::ToString => Ok(vec![PropertyValue::String(
                single(inputs, "ToString")?.to_string(),
            )]),
            Transform::ToLong => {
                let value = single(inputs, "ToLong")?;
                let long = match &value {
                    PropertyValue::Long(v) => *v,
                    PropertyValue::Double(v) => *v as i64,
                    PropertyValue::Boolean(b) => i64::from(*b),
                    PropertyValue::String(s) => s.trim().parse::<i64>().map_err(|e| {
                        GraphError::Function(format!("ToLong could not parse '{}': {}", s, e))
                    })?,
                    PropertyValue::StringSet(_) => {
                        return Err(GraphError::Function("ToLong cannot convert a StringSet".into()))
                    }
                };
                Ok(vec![PropertyValue::Long(long)])
            }
            Transform::Multiply { by } => match single(inputs, "Multiply")? {
                PropertyValue::Long(v) => Ok(vec![PropertyValue::Long(v.saturating_mul(*by))]),
                PropertyValue::Double(v) => Ok(vec![PropertyValue::Double(v * *by as f64)]),
                other => Err(GraphError::Function(format!("Multiply cannot apply to {}", other.class()))),
            },
            Transform::Length => {
                let len = match single(inputs, "Length")? {
                    PropertyValue::String(s) => s.chars().count(),
                    PropertyValue::StringSet(set) => set.len(),
                    other => {
                        return Err(GraphError::Function(format!("Length cannot apply to {}", other.class())))
                    }
                };
                Ok(vec![PropertyValue::Long(len as i64)])
            }
        }
    }
}

fn single(inputs: Vec<Option<PropertyValue>>, name: &str) -> Result<PropertyValue> {
    let mut iter = inputs.into_iter();
    match (iter.next(), iter.next()) {
        (Some(Some(v)), None) => Ok(v),
        (Some(None), None) => Err(GraphError::Function(format!("{} received a missing value", name))),
        _ => Err(GraphError::Function(format!("{} expects exactly one input", name))),
    }
}

/// A predicate applied to each value of a selection; every selected value
/// must pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterDef {
    pub selection: Vec<String>,
    pub predicate: Predicate,
}

impl FilterDef {
    pub fn new<S: Into<String>>(selection: impl IntoIterator<Item = S>, predicate: Predicate) -> Self {
        Self {
            selection: selection.into_iter().map(Into::into).collect(),
            predicate,
        }
    }

    pub fn test(&self, element: &Element) -> bool {
        self.selection
            .iter()
            .all(|key| self.predicate.test(element.select(key).as_ref()))
    }
}

/// Runs all filters with AND semantics.
pub fn test_all(filters: &[FilterDef], element: &Element) -> bool {
    filters.iter().all(|f| f.test(element))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformDef {
    pub selection: Vec<String>,
    pub function: Transform,
    pub projection: Vec<String>,
}

impl TransformDef {
    pub fn new<S: Into<String>, P: Into<String>>(
        selection: impl IntoIterator<Item = S>,
        function: Transform,
        projection: impl IntoIterator<Item = P>,
    ) -> Self {
        Self {
            selection: selection.into_iter().map(Into::into).collect(),
            function,
            projection: projection.into_iter().map(Into::into).collect(),
        }
    }

    /// Applies the function and writes its outputs onto the projected
    /// properties, returning the names written.
    pub fn apply(&self, element: &mut Element) -> Result<Vec<(String, ValueClass)>> {
        if let Some(id) = self.projection.iter().find(|p| IdentifierType::from_name(p).is_some()) {
            return Err(GraphError::IllegalArgument(format!(
                "transform cannot project onto identifier {}",
                id
            )));
        }
        let inputs = self.selection.iter().map(|key| element.select(key)).collect();
        let outputs = self.function.apply(inputs)?;
        if outputs.len() != self.projection.len() {
            return Err(GraphError::Function(format!(
                "transform produced {} values for {} projected properties",
                outputs.len(),
                self.projection.len()
            )));
        }
        let mut written = Vec::with_capacity(outputs.len());
        for (name, value) in self.projection.iter().zip(outputs) {
            written.push((name.clone(), value.class()));
            element.put_property(name.clone(), value);
        }
        Ok(written)
    }
}

/// Collects the property names a set of filters reads.
pub fn selected_properties<'a>(filters: impl IntoIterator<Item = &'a FilterDef>) -> BTreeSet<&'a str> {
    filters
        .into_iter()
        .flat_map(|f| f.selection.iter())
        .filter(|key| IdentifierType::from_name(key).is_none())
        .map(|key| key.as_str())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedgraph_common::Entity;

    #[test]
    fn test_long_sum_saturates() {
        let sum = BinaryOperator::Sum
            .apply(PropertyValue::Long(i64::MAX - 1), PropertyValue::Long(5))
            .unwrap();
        assert_eq!(sum, PropertyValue::Long(i64::MAX));
    }

    #[test]
    fn test_predicates() {
        let five = PropertyValue::Long(5);
        assert!(Predicate::IsMoreThan { value: 4i64.into(), or_equal_to: false }.test(Some(&five)));
        assert!(!Predicate::IsMoreThan { value: 5i64.into(), or_equal_to: false }.test(Some(&five)));
        assert!(Predicate::IsMoreThan { value: 5i64.into(), or_equal_to: true }.test(Some(&five)));
        assert!(Predicate::IsLessThan { value: 5.5f64.into(), or_equal_to: false }.test(Some(&five)));
        assert!(!Predicate::Exists.test(None));
        assert!(Predicate::Not { negated: Box::new(Predicate::Exists) }.test(None));
        assert!(Predicate::StringContains { value: "ELL".into(), ignore_case: true }
            .test(Some(&"hello".into())));
        let in_range = Predicate::And {
            predicates: vec![
                Predicate::IsMoreThan { value: 1i64.into(), or_equal_to: false },
                Predicate::IsLessThan { value: 10i64.into(), or_equal_to: false },
            ],
        };
        assert!(in_range.test(Some(&five)));
    }

    #[test]
    fn test_binary_operators() {
        assert_eq!(
            BinaryOperator::Sum.apply(1i64.into(), 2i64.into()).unwrap(),
            PropertyValue::Long(3)
        );
        assert_eq!(
            BinaryOperator::Max.apply(1i64.into(), 7i64.into()).unwrap(),
            PropertyValue::Long(7)
        );
        assert_eq!(
            BinaryOperator::StringConcat { separator: "|".into() }
                .apply("a".into(), "b".into())
                .unwrap(),
            PropertyValue::from("a|b")
        );
        let err = BinaryOperator::Sum.apply(1i64.into(), "x".into()).unwrap_err();
        assert!(err.to_string().contains("Sum cannot combine Long with String"));
    }

    #[test]
    fn test_transform_projection() {
        let mut element: Element = Entity::new("person", "alice").with_property("age", 30i64).into();
        let transform = TransformDef::new(["VERTEX", "age"], Transform::Concat { separator: "-".into() }, ["label"]);
        let written = transform.apply(&mut element).unwrap();
        assert_eq!(written, vec![("label".to_string(), ValueClass::String)]);
        assert_eq!(element.property("label"), Some(&PropertyValue::from("alice-30")));

        let bad = TransformDef::new(["age"], Transform::Identity, ["VERTEX"]);
        assert!(bad.apply(&mut element).is_err());
    }

    #[test]
    fn test_filter_def_serialization() {
        let filter = FilterDef::new(["count"], Predicate::IsMoreThan { value: 1i64.into(), or_equal_to: false });
        let json = serde_json::to_string(&filter).unwrap();
        let back: FilterDef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, filter);
    }
}
