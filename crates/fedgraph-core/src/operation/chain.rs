use serde::{Deserialize, Serialize};

use super::Operation;

/// A linear sequence of operations; each step's output feeds the next.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationChain {
    pub operations: Vec<Operation>,
}

impl OperationChain {
    pub fn new(operations: Vec<Operation>) -> Self {
        Self { operations }
    }

    pub fn then(mut self, operation: impl Into<Operation>) -> Self {
        self.operations.push(operation.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn last(&self) -> Option<&Operation> {
        self.operations.last()
    }

    /// Inlines nested chains, depth first.
    pub fn flatten(self) -> OperationChain {
        fn walk(ops: Vec<Operation>, out: &mut Vec<Operation>) {
            for op in ops {
                match op {
                    Operation::Chain(inner) => walk(inner.operations, out),
                    other => out.push(other),
                }
            }
        }
        let mut operations = Vec::with_capacity(self.operations.len());
        walk(self.operations, &mut operations);
        OperationChain { operations }
    }
}

impl From<Operation> for OperationChain {
    fn from(operation: Operation) -> Self {
        OperationChain::new(vec![operation])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::{Count, GetAllElements, Limit};

    #[test]
    fn test_flatten_inlines_nested_chains() {
        let inner = OperationChain::from(GetAllElements::new()).then(Limit::new(2));
        let chain = OperationChain::new(vec![Operation::Chain(inner)]).then(Count::default());
        let flat = chain.flatten();
        let kinds: Vec<&str> = flat.operations.iter().map(|op| op.kind()).collect();
        assert_eq!(kinds, vec!["GetAllElements", "Limit", "Count"]);
    }
}
