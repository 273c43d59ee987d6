use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub const UNKNOWN_USER_ID: &str = "UNKNOWN";

/// The caller an operation chain runs on behalf of.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    /// Roles checked against a graph's access record.
    #[serde(default)]
    pub op_auths: BTreeSet<String>,
    /// Labels checked against element visibility.
    #[serde(default)]
    pub data_auths: BTreeSet<String>,
}

impl User {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            op_auths: BTreeSet::new(),
            data_auths: BTreeSet::new(),
        }
    }

    pub fn with_op_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.op_auths.extend(auths.into_iter().map(Into::into));
        self
    }

    pub fn with_data_auths<I, S>(mut self, auths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_auths.extend(auths.into_iter().map(Into::into));
        self
    }

    pub fn has_op_auth(&self, auth: &str) -> bool {
        self.op_auths.contains(auth)
    }
}

impl Default for User {
    fn default() -> Self {
        Self::new(UNKNOWN_USER_ID)
    }
}
