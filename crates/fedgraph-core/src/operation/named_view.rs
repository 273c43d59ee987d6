use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::named_view::ViewParameterDetail;

/// Stores a parameterised view template under `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddNamedView {
    pub name: String,
    /// View JSON; may contain `${param}` placeholders.
    pub view: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub parameters: BTreeMap<String, ViewParameterDetail>,
    #[serde(default)]
    pub overwrite: bool,
}

impl AddNamedView {
    pub fn new(name: impl Into<String>, view: serde_json::Value) -> Self {
        Self {
            name: name.into(),
            view,
            description: None,
            parameters: BTreeMap::new(),
            overwrite: false,
        }
    }

    pub fn parameter(mut self, name: impl Into<String>, detail: ViewParameterDetail) -> Self {
        self.parameters.insert(name.into(), detail);
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllNamedViews {}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteNamedView {
    pub name: String,
}
