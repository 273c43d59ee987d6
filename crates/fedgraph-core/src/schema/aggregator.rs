use fedgraph_common::Element;
use std::collections::BTreeMap;

use crate::error::{GraphError, Result};
use crate::function::BinaryOperator;

/// Per-property reducer for one group. Properties in the group-by set are
/// part of the bucket key and are left untouched.
#[derive(Debug, Clone)]
pub struct ElementAggregator {
    group: String,
    functions: BTreeMap<String, BinaryOperator>,
    group_by: Vec<String>,
}

impl ElementAggregator {
    pub(crate) fn new(
        group: impl Into<String>,
        functions: BTreeMap<String, BinaryOperator>,
        group_by: Vec<String>,
    ) -> Self {
        Self {
            group: group.into(),
            functions,
            group_by,
        }
    }

    pub fn group_by(&self) -> &[String] {
        &self.group_by
    }

    /// Folds `next` into `acc`. Both elements must already share a bucket.
    pub fn aggregate(&self, acc: &mut Element, next: Element) -> Result<()> {
        let next_props = match next {
            Element::Entity(e) => e.properties,
            Element::Edge(e) => e.properties,
        };
        for (name, value) in next_props {
            if self.group_by.iter().any(|g| g == &name) {
                continue;
            }
            let props = acc.properties_mut();
            match props.remove(&name) {
                Some(existing) => {
                    let function = self.functions.get(&name).ok_or_else(|| {
                        GraphError::Function(format!(
                            "no aggregate function for property {} in group {}",
                            name, self.group
                        ))
                    })?;
                    let combined = function.apply(existing, value)?;
                    props.insert(name, combined);
                }
                None => {
                    props.insert(name, value);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedgraph_common::{Entity, PropertyValue};

    #[test]
    fn test_aggregate_skips_group_by_properties() {
        let mut functions = BTreeMap::new();
        functions.insert("count".to_string(), BinaryOperator::Sum);
        let aggregator = ElementAggregator::new("Entity", functions, vec!["day".to_string()]);

        let mut acc: Element = Entity::new("Entity", "1")
            .with_property("count", 1i64)
            .with_property("day", "mon")
            .into();
        let next: Element = Entity::new("Entity", "1")
            .with_property("count", 2i64)
            .with_property("day", "mon")
            .into();
        aggregator.aggregate(&mut acc, next).unwrap();

        assert_eq!(acc.property("count"), Some(&PropertyValue::Long(3)));
        assert_eq!(acc.property("day"), Some(&PropertyValue::from("mon")));
    }

    #[test]
    fn test_aggregate_fills_missing_properties() {
        let aggregator = ElementAggregator::new("Entity", BTreeMap::new(), Vec::new());
        let mut acc: Element = Entity::new("Entity", "1").into();
        let next: Element = Entity::new("Entity", "1").with_property("name", "x").into();
        aggregator.aggregate(&mut acc, next).unwrap();
        assert_eq!(acc.property("name"), Some(&PropertyValue::from("x")));
    }
}
