//! Applies a [`View`] to an element stream using a [`Schema`].
//!
//! Pipeline per element group: pre-aggregation filter, aggregation,
//! post-aggregation filter, transform, post-transform filter, then property
//! selection. Output keeps encounter order; an aggregated bucket sits where
//! its first element was seen.

use fedgraph_common::{Element, PropertyValue, ValueClass};
use std::collections::HashMap;

use crate::error::{GraphError, Result};
use crate::function::test_all;
use crate::schema::{ElementAggregator, Schema};
use crate::view::{View, ViewElementDefinition};

/// How buckets are reduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AggregationStrategy {
    /// Hash reduce; memory bounded by the number of distinct keys.
    #[default]
    HashReduce,
    /// Combines runs of adjacent equal keys. Only correct when the input is
    /// already ordered by bucket key, as ordered backends produce it.
    SortedMerge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
    Full,
    Merge,
}

pub struct ViewEngine<'a> {
    schema: &'a Schema,
    view: &'a View,
    strategy: AggregationStrategy,
}

impl<'a> ViewEngine<'a> {
    pub fn new(schema: &'a Schema, view: &'a View) -> Self {
        Self {
            schema,
            view,
            strategy: AggregationStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: AggregationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Runs the full pipeline.
    pub fn apply<I>(&self, elements: I) -> Result<Vec<Element>>
    where
        I: IntoIterator<Item = Element>,
    {
        self.run(elements, Pass::Full)
    }

    /// Re-applies the view to already-processed results from several
    /// sources: re-aggregates, then runs the post-aggregation and
    /// post-transform filters. Pre-aggregation filters and property
    /// selection already ran per source and are not repeated. Refused for
    /// views with transforms, because transformed properties may not exist
    /// in the schema the view is re-run against.
    pub fn reapply<I>(&self, elements: I) -> Result<Vec<Element>>
    where
        I: IntoIterator<Item = Element>,
    {
        if self.view.has_transform() {
            return Err(GraphError::UnsupportedOperation(
                "cannot re-apply a view containing transform functions to merged results".to_string(),
            ));
        }
        self.run(elements, Pass::Merge)
    }

    fn run<I>(&self, elements: I, pass: Pass) -> Result<Vec<Element>>
    where
        I: IntoIterator<Item = Element>,
    {
        let filtered = elements.into_iter().filter(|e| match (pass, self.definition(e)) {
            (Pass::Full, Some(def)) => test_all(&def.pre_aggregation_filter, e),
            _ => true,
        });
        let aggregated = self.aggregate(filtered)?;
        tracing::debug!("View aggregation produced {} elements", aggregated.len());

        let mut output = Vec::with_capacity(aggregated.len());
        for mut element in aggregated {
            let Some(def) = self.definition(&element) else {
                output.push(element);
                continue;
            };
            if !test_all(&def.post_aggregation_filter, &element) {
                continue;
            }
            if pass == Pass::Full {
                self.transform(def, &mut element)?;
            }
            if !test_all(&def.post_transform_filter, &element) {
                continue;
            }
            if pass == Pass::Full {
                select_properties(def, &mut element);
            }
            output.push(element);
        }
        Ok(output)
    }

    fn definition(&self, element: &Element) -> Option<&'a ViewElementDefinition> {
        self.view.definition_for(element.group(), element.is_entity())
    }

    /// Aggregator and group-by set for an element, or `None` when its group
    /// does not aggregate (unknown to the schema, schema flag off, or the
    /// view disabled it).
    fn aggregator_for(&self, element: &Element) -> Option<ElementAggregator> {
        let schema_def = self.schema.element_definition(element.group()).ok()?;
        let view_def = self.definition(element);
        let enabled = view_def.and_then(|d| d.aggregate).unwrap_or(true);
        if !schema_def.aggregates() || !enabled {
            return None;
        }
        match view_def.and_then(|d| d.group_by.as_ref()) {
            Some(group_by) => Some(schema_def.aggregator_with_group_by(group_by)),
            None => Some(schema_def.aggregator()),
        }
    }

    fn aggregate<I>(&self, elements: I) -> Result<Vec<Element>>
    where
        I: Iterator<Item = Element>,
    {
        let mut aggregators: HashMap<String, Option<ElementAggregator>> = HashMap::new();
        let mut output: Vec<Element> = Vec::new();
        // bucket key -> index into output
        let mut buckets: HashMap<String, usize> = HashMap::new();
        let mut last_key: Option<String> = None;

        for element in elements {
            let aggregator = aggregators
                .entry(element.group().to_string())
                .or_insert_with(|| self.aggregator_for(&element))
                .clone();
            let Some(aggregator) = aggregator else {
                last_key = None;
                output.push(element);
                continue;
            };
            let key = bucket_key(&element, aggregator.group_by())?;
            match self.strategy {
                AggregationStrategy::HashReduce => match buckets.get(&key) {
                    Some(&index) => aggregator.aggregate(&mut output[index], element)?,
                    None => {
                        buckets.insert(key, output.len());
                        output.push(element);
                    }
                },
                AggregationStrategy::SortedMerge => {
                    let same_run = last_key.as_deref() == Some(key.as_str());
                    match output.last_mut() {
                        Some(acc) if same_run => aggregator.aggregate(acc, element)?,
                        _ => {
                            output.push(element);
                            last_key = Some(key);
                        }
                    }
                }
            }
        }
        Ok(output)
    }

    fn transform(&self, def: &ViewElementDefinition, element: &mut Element) -> Result<()> {
        let schema_def = self.schema.element_definition(element.group()).ok();
        for transform in &def.transformer {
            for (name, class) in transform.apply(element)? {
                let declared = schema_def.and_then(|d| d.property_class(&name));
                if let Some(declared) = declared {
                    if declared != class && declared != ValueClass::Any {
                        return Err(GraphError::Function(format!(
                            "transform would redefine property {} of group {} from {} to {}",
                            name,
                            element.group(),
                            declared,
                            class
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

/// Deterministic key of (group, identifiers, group-by values). Undirected
/// edges key on their unordered endpoint pair.
fn bucket_key(element: &Element, group_by: &[String]) -> Result<String> {
    let ids: Vec<serde_json::Value> = match element {
        Element::Entity(e) => vec![serde_json::to_value(&e.vertex)?],
        Element::Edge(e) => {
            let mut ends = [serde_json::to_string(&e.source)?, serde_json::to_string(&e.destination)?];
            if !e.directed {
                ends.sort();
            }
            vec![
                serde_json::Value::String(ends[0].clone()),
                serde_json::Value::String(ends[1].clone()),
                serde_json::Value::Bool(e.directed),
            ]
        }
    };
    let group_values: Vec<Option<&PropertyValue>> = group_by.iter().map(|g| element.property(g)).collect();
    Ok(serde_json::to_string(&(element.group(), element.is_entity(), ids, group_values))?)
}

fn select_properties(def: &ViewElementDefinition, element: &mut Element) {
    if let Some(keep) = &def.properties {
        element.properties_mut().retain(|name, _| keep.contains(name));
    }
    if let Some(drop) = &def.exclude_properties {
        element.properties_mut().retain(|name, _| !drop.contains(name));
    }
}
