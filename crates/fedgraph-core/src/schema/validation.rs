use fedgraph_common::{Element, IdentifierType};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::function::test_all;
use crate::schema::{ElementDefinitionRef, Schema};

/// A single field/reason pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

/// Accumulated validation failures. Validation never aborts on the first
/// problem; callers decide whether a non-empty result is fatal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub errors: Vec<ValidationError>,
}

impl ValidationResult {
    pub fn ok() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, field: impl Into<String>, reason: impl Into<String>) {
        self.errors.push(ValidationError {
            field: field.into(),
            reason: reason.into(),
        });
    }

    pub fn merge(&mut self, other: ValidationResult) {
        self.errors.extend(other.errors);
    }

    /// Prefixes every field, e.g. to locate errors inside an operation chain.
    pub fn prefixed(mut self, prefix: &str) -> Self {
        for error in &mut self.errors {
            error.field = format!("{}.{}", prefix, error.field);
        }
        self
    }

    pub fn into_result(self) -> crate::error::Result<()> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(crate::error::GraphError::Validation(self))
        }
    }
}

impl fmt::Display for ValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.field, e.reason))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

/// Checks elements of one group against its schema definition: identifier
/// and property classes, type-level validate predicates and element-level
/// validate functions.
pub struct ElementValidator<'a> {
    definition: ElementDefinitionRef<'a>,
}

impl<'a> ElementValidator<'a> {
    pub(crate) fn new(definition: ElementDefinitionRef<'a>) -> Self {
        Self { definition }
    }

    pub fn validate(&self, element: &Element) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let group = self.definition.group();
        if element.is_entity() != self.definition.is_entity() {
            let expected = if self.definition.is_entity() { "an entity" } else { "an edge" };
            result.add_error(group, format!("group {} is declared as {}", group, expected));
            return result;
        }

        for (id_type, type_name) in &self.definition.definition().identifiers {
            let field = format!("{}.{}", group, id_type);
            match element.identifier(*id_type) {
                Some(value) => self.check_value(&field, type_name, &value, &mut result),
                None if *id_type == IdentifierType::Directed => {}
                None => result.add_error(field, "identifier is missing"),
            }
        }

        for (name, value) in element.properties() {
            let field = format!("{}.{}", group, name);
            if self.definition.schema().visibility_property() == Some(name.as_str()) {
                continue;
            }
            match self.definition.definition().properties.get(name) {
                Some(type_name) => self.check_value(&field, type_name, value, &mut result),
                None => result.add_error(field, "property is not declared in the schema"),
            }
        }

        let validate_functions = &self.definition.definition().validate_functions;
        if !test_all(validate_functions, element) {
            result.add_error(group, "element failed the group's validate functions");
        }
        result
    }

    fn check_value(
        &self,
        field: &str,
        type_name: &str,
        value: &fedgraph_common::PropertyValue,
        result: &mut ValidationResult,
    ) {
        let Some(type_def) = self.definition.schema().type_definition(type_name) else {
            result.add_error(field, format!("type {} is not defined", type_name));
            return;
        };
        if !type_def.class.accepts(value) {
            result.add_error(
                field,
                format!("expected {} ({}) but found {}", type_name, type_def.class, value.class()),
            );
            return;
        }
        for predicate in &type_def.validate_functions {
            if !predicate.test(Some(value)) {
                result.add_error(field, format!("value {} failed validation for type {}", value, type_name));
            }
        }
    }
}

impl Schema {
    /// Validates an element against the definition of its group.
    pub fn validate_element(&self, element: &Element) -> ValidationResult {
        match self.element_definition(element.group()) {
            Ok(def) => def.validator().validate(element),
            Err(_) => {
                let mut result = ValidationResult::ok();
                result.add_error(element.group(), "group is not defined in the schema");
                result
            }
        }
    }
}
