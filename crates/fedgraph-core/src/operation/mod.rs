//! The operation catalogue. Every operation carries an explicit kind tag
//! used to dispatch it to exactly one handler.

pub mod chain;
pub mod element;
pub mod federated;
pub mod generic;
pub mod named_view;
pub mod output;

pub use chain::OperationChain;
pub use element::{AddElements, GetAllElements, GetElements};
pub use federated::{
    AddGraph, ChangeGraphAccess, ChangeGraphId, FederatedOperation, GetAllGraphIds, GetAllGraphInfo,
    GraphInfo, RemoveGraph,
};
pub use generic::{Count, CountGroups, DiscardOutput, GetSchema, Limit, ToSet};
pub use named_view::{AddNamedView, DeleteNamedView, GetAllNamedViews};
pub use output::{GroupCounts, Output};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{GraphError, Result};
use crate::schema::ValidationResult;
use crate::view::View;

/// An operation kind registered from outside the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomOperation {
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Output>,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl CustomOperation {
    pub fn new(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.into(),
            input: None,
            payload,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "class")]
pub enum Operation {
    AddElements(AddElements),
    GetElements(GetElements),
    GetAllElements(GetAllElements),
    Limit(Limit),
    Count(Count),
    CountGroups(CountGroups),
    ToSet(ToSet),
    DiscardOutput(DiscardOutput),
    GetSchema(GetSchema),
    AddNamedView(AddNamedView),
    GetAllNamedViews(GetAllNamedViews),
    DeleteNamedView(DeleteNamedView),
    FederatedOperation(FederatedOperation),
    AddGraph(AddGraph),
    RemoveGraph(RemoveGraph),
    ChangeGraphAccess(ChangeGraphAccess),
    ChangeGraphId(ChangeGraphId),
    GetAllGraphIds(GetAllGraphIds),
    GetAllGraphInfo(GetAllGraphInfo),
    #[serde(rename = "OperationChain")]
    Chain(OperationChain),
    Custom(CustomOperation),
}

macro_rules! impl_operation_from {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for Operation {
                fn from(op: $variant) -> Self {
                    Operation::$variant(op)
                }
            }

            impl From<$variant> for OperationChain {
                fn from(op: $variant) -> Self {
                    OperationChain::new(vec![Operation::$variant(op)])
                }
            }
        )*
    };
}

impl_operation_from!(
    AddElements,
    GetElements,
    GetAllElements,
    Limit,
    Count,
    CountGroups,
    ToSet,
    DiscardOutput,
    GetSchema,
    AddNamedView,
    GetAllNamedViews,
    DeleteNamedView,
    FederatedOperation,
    AddGraph,
    RemoveGraph,
    ChangeGraphAccess,
    ChangeGraphId,
    GetAllGraphIds,
    GetAllGraphInfo,
);

impl From<CustomOperation> for Operation {
    fn from(op: CustomOperation) -> Self {
        Operation::Custom(op)
    }
}

impl From<OperationChain> for Operation {
    fn from(chain: OperationChain) -> Self {
        Operation::Chain(chain)
    }
}

impl Operation {
    /// The dispatch key.
    pub fn kind(&self) -> &str {
        match self {
            Operation::AddElements(_) => "AddElements",
            Operation::GetElements(_) => "GetElements",
            Operation::GetAllElements(_) => "GetAllElements",
            Operation::Limit(_) => "Limit",
            Operation::Count(_) => "Count",
            Operation::CountGroups(_) => "CountGroups",
            Operation::ToSet(_) => "ToSet",
            Operation::DiscardOutput(_) => "DiscardOutput",
            Operation::GetSchema(_) => "GetSchema",
            Operation::AddNamedView(_) => "AddNamedView",
            Operation::GetAllNamedViews(_) => "GetAllNamedViews",
            Operation::DeleteNamedView(_) => "DeleteNamedView",
            Operation::FederatedOperation(_) => "FederatedOperation",
            Operation::AddGraph(_) => "AddGraph",
            Operation::RemoveGraph(_) => "RemoveGraph",
            Operation::ChangeGraphAccess(_) => "ChangeGraphAccess",
            Operation::ChangeGraphId(_) => "ChangeGraphId",
            Operation::GetAllGraphIds(_) => "GetAllGraphIds",
            Operation::GetAllGraphInfo(_) => "GetAllGraphInfo",
            Operation::Chain(_) => "OperationChain",
            Operation::Custom(op) => &op.kind,
        }
    }

    pub fn accepts_input(&self) -> bool {
        match self {
            Operation::AddElements(_)
            | Operation::GetElements(_)
            | Operation::Limit(_)
            | Operation::Count(_)
            | Operation::CountGroups(_)
            | Operation::ToSet(_)
            | Operation::DiscardOutput(_)
            | Operation::Custom(_) => true,
            Operation::FederatedOperation(op) => op.payload.operations.first().is_some_and(|o| o.accepts_input()),
            _ => false,
        }
    }

    pub fn has_input(&self) -> bool {
        match self {
            Operation::AddElements(op) => op.input.is_some(),
            Operation::GetElements(op) => op.input.is_some(),
            Operation::Limit(op) => op.input.is_some(),
            Operation::Count(op) => op.input.is_some(),
            Operation::CountGroups(op) => op.input.is_some(),
            Operation::ToSet(op) => op.input.is_some(),
            Operation::DiscardOutput(op) => op.input.is_some(),
            Operation::Custom(op) => op.input.is_some(),
            Operation::FederatedOperation(op) => op.payload.operations.first().is_some_and(|o| o.has_input()),
            _ => false,
        }
    }

    /// Wires a previous step's output into this operation.
    pub fn set_input(&mut self, input: Output) -> Result<()> {
        match self {
            Operation::AddElements(op) => op.input = Some(input.into_elements()?),
            Operation::GetElements(op) => op.input = Some(input.into_element_ids()?),
            Operation::Limit(op) => op.input = Some(input),
            Operation::Count(op) => op.input = Some(input),
            Operation::CountGroups(op) => op.input = Some(input),
            Operation::ToSet(op) => op.input = Some(input),
            Operation::DiscardOutput(op) => op.input = Some(input),
            Operation::Custom(op) => op.input = Some(input),
            Operation::FederatedOperation(op) => match op.first_payload_op_mut() {
                Some(first) => first.set_input(input)?,
                None => return Err(GraphError::IllegalArgument("federated payload is empty".into())),
            },
            other => {
                return Err(GraphError::IllegalArgument(format!("{} does not accept input", other.kind())));
            }
        }
        Ok(())
    }

    pub fn view(&self) -> Option<&View> {
        match self {
            Operation::GetElements(op) => op.view.as_ref(),
            Operation::GetAllElements(op) => op.view.as_ref(),
            _ => None,
        }
    }

    pub fn view_mut(&mut self) -> Option<&mut View> {
        match self {
            Operation::GetElements(op) => op.view.as_mut(),
            Operation::GetAllElements(op) => op.view.as_mut(),
            _ => None,
        }
    }

    /// Checks the operation's own fields. Schema-dependent checks are left
    /// to the handler.
    pub fn validate(&self) -> ValidationResult {
        let mut result = ValidationResult::ok();
        let field = self.kind().to_string();
        match self {
            Operation::AddNamedView(op) if op.name.trim().is_empty() => {
                result.add_error(&field, "name must not be empty");
            }
            Operation::DeleteNamedView(op) if op.name.trim().is_empty() => {
                result.add_error(&field, "name must not be empty");
            }
            Operation::AddGraph(op) if op.graph_id.trim().is_empty() => {
                result.add_error(&field, "graphId must not be empty");
            }
            Operation::ChangeGraphId(op) => {
                if op.new_graph_id.trim().is_empty() {
                    result.add_error(&field, "newGraphId must not be empty");
                } else if op.new_graph_id == op.graph_id {
                    result.add_error(&field, "newGraphId must differ from graphId");
                }
            }
            Operation::FederatedOperation(op) => {
                if op.payload.is_empty() {
                    result.add_error(&field, "payload must not be empty");
                }
                if let Some(ids) = &op.graph_ids {
                    let mut seen = BTreeSet::new();
                    for id in ids {
                        if !seen.insert(id) {
                            result.add_error(&field, format!("graph {} is listed more than once", id));
                        }
                    }
                }
                for inner in &op.payload.operations {
                    result.merge(inner.validate().prefixed(&field));
                }
            }
            Operation::Custom(op) if op.kind.trim().is_empty() => {
                result.add_error("Custom", "kind must not be empty");
            }
            _ => {}
        }
        result
    }
}
