//! Operations that act on the previous step's output and need no backend.

use serde::{Deserialize, Serialize};

use super::Output;

/// Keeps the first `result_limit` items. With `truncate` off, exceeding the
/// limit is an error instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Output>,
    pub result_limit: usize,
    #[serde(default = "default_truncate")]
    pub truncate: bool,
}

fn default_truncate() -> bool {
    true
}

impl Limit {
    pub fn new(result_limit: usize) -> Self {
        Self {
            input: None,
            result_limit,
            truncate: true,
        }
    }

    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Count {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Output>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CountGroups {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Output>,
    /// Stop counting after this many elements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
}

/// Removes duplicates, keeping first occurrences in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Output>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscardOutput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Output>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetSchema {
    /// Drop type definitions no group uses.
    #[serde(default)]
    pub compact: bool,
}
