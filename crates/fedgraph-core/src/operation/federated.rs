use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{Operation, OperationChain};
use crate::federation::{FederatedAccess, MergeFunction};
use crate::schema::Schema;
use crate::store::StoreProperties;

/// Runs `payload` on each selected graph and merges the results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FederatedOperation {
    /// Target graphs in merge order; `None` means the default set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_ids: Option<Vec<String>>,
    pub payload: OperationChain,
    /// `None` picks the default merge for the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub merge: Option<MergeFunction>,
    /// Overrides the store-wide failure policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_failed: Option<bool>,
}

impl FederatedOperation {
    pub fn new(payload: impl Into<OperationChain>) -> Self {
        Self {
            graph_ids: None,
            payload: payload.into(),
            merge: None,
            skip_failed: None,
        }
    }

    pub fn graph_ids<S: Into<String>>(mut self, ids: impl IntoIterator<Item = S>) -> Self {
        self.graph_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn merge(mut self, merge: MergeFunction) -> Self {
        self.merge = Some(merge);
        self
    }

    pub fn skip_failed(mut self, skip: bool) -> Self {
        self.skip_failed = Some(skip);
        self
    }

    pub(crate) fn first_payload_op_mut(&mut self) -> Option<&mut Operation> {
        self.payload.operations.first_mut()
    }
}

/// Registers a new backend graph built from `store_properties`. The caller
/// becomes its owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddGraph {
    pub graph_id: String,
    pub schema: Schema,
    pub store_properties: StoreProperties,
    #[serde(default)]
    pub graph_auths: BTreeSet<String>,
    #[serde(default)]
    pub is_public: bool,
    #[serde(default)]
    pub disabled_by_default: bool,
}

impl AddGraph {
    pub fn new(graph_id: impl Into<String>, schema: Schema, store_properties: StoreProperties) -> Self {
        Self {
            graph_id: graph_id.into(),
            schema,
            store_properties,
            graph_auths: BTreeSet::new(),
            is_public: false,
            disabled_by_default: false,
        }
    }

    pub fn graph_auths<S: Into<String>>(mut self, auths: impl IntoIterator<Item = S>) -> Self {
        self.graph_auths = auths.into_iter().map(Into::into).collect();
        self
    }

    pub fn public(mut self, is_public: bool) -> Self {
        self.is_public = is_public;
        self
    }

    pub fn disabled_by_default(mut self, disabled: bool) -> Self {
        self.disabled_by_default = disabled;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoveGraph {
    pub graph_id: String,
}

/// Replaces a graph's access record. Fields left `None` keep their value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGraphAccess {
    pub graph_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_auths: Option<BTreeSet<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_public: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disabled_by_default: Option<bool>,
}

impl ChangeGraphAccess {
    pub fn new(graph_id: impl Into<String>) -> Self {
        Self {
            graph_id: graph_id.into(),
            owner_user_id: None,
            graph_auths: None,
            is_public: None,
            disabled_by_default: None,
        }
    }

    pub fn apply_to(&self, access: &FederatedAccess) -> FederatedAccess {
        FederatedAccess {
            owner_user_id: self.owner_user_id.clone().unwrap_or_else(|| access.owner_user_id.clone()),
            graph_auths: self.graph_auths.clone().unwrap_or_else(|| access.graph_auths.clone()),
            is_public: self.is_public.unwrap_or(access.is_public),
            disabled_by_default: self.disabled_by_default.unwrap_or(access.disabled_by_default),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeGraphId {
    pub graph_id: String,
    pub new_graph_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllGraphIds {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GetAllGraphInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph_ids: Option<Vec<String>>,
}

/// What a user may learn about a graph they can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphInfo {
    pub store_class: String,
    pub access: FederatedAccess,
    pub groups: Vec<String>,
}
