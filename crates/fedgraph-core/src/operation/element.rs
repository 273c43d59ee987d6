use fedgraph_common::{Element, ElementId, SeedMatching};
use serde::{Deserialize, Serialize};

use crate::view::View;

fn default_true() -> bool {
    true
}

/// Writes elements, validating them against the schema first unless
/// `validate` is off. With `skip_invalid`, invalid elements are dropped
/// instead of failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<Element>>,
    #[serde(default = "default_true")]
    pub validate: bool,
    #[serde(default)]
    pub skip_invalid: bool,
}

impl AddElements {
    pub fn new(elements: Vec<Element>) -> Self {
        Self {
            input: Some(elements),
            validate: true,
            skip_invalid: false,
        }
    }

    /// Takes its elements from the previous step.
    pub fn from_input() -> Self {
        Self {
            input: None,
            validate: true,
            skip_invalid: false,
        }
    }

    pub fn skip_invalid(mut self, skip: bool) -> Self {
        self.skip_invalid = skip;
        self
    }

    pub fn validate(mut self, validate: bool) -> Self {
        self.validate = validate;
        self
    }
}

/// Elements related to the seeds, post-processed by the view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Vec<ElementId>>,
    #[serde(default)]
    pub seed_matching: SeedMatching,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}

impl GetElements {
    pub fn new(seeds: Vec<ElementId>) -> Self {
        Self {
            input: Some(seeds),
            ..Self::default()
        }
    }

    pub fn seed_matching(mut self, matching: SeedMatching) -> Self {
        self.seed_matching = matching;
        self
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllElements {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub view: Option<View>,
}

impl GetAllElements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(mut self, view: View) -> Self {
        self.view = Some(view);
        self
    }
}
