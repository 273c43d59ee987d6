use fedgraph_common::User;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Who may see and change a registered graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederatedAccess {
    pub owner_user_id: String,
    /// Op auths that grant read access.
    #[serde(default)]
    pub graph_auths: BTreeSet<String>,
    #[serde(default)]
    pub is_public: bool,
    /// Excluded from the default target set; still usable by explicit id.
    #[serde(default)]
    pub disabled_by_default: bool,
}

impl FederatedAccess {
    pub fn new(owner_user_id: impl Into<String>) -> Self {
        Self {
            owner_user_id: owner_user_id.into(),
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

    fn is_owner(&self, user: &User) -> bool {
        self.owner_user_id == user.user_id
    }

    fn is_admin(user: &User, admin_auth: Option<&str>) -> bool {
        admin_auth.is_some_and(|auth| user.has_op_auth(auth))
    }

    /// Public, owned, shared through an op auth, or admin.
    pub fn has_read_access(&self, user: &User, admin_auth: Option<&str>) -> bool {
        self.is_public
            || self.is_owner(user)
            || self.graph_auths.iter().any(|auth| user.has_op_auth(auth))
            || Self::is_admin(user, admin_auth)
    }

    /// Owner or admin only.
    pub fn has_write_access(&self, user: &User, admin_auth: Option<&str>) -> bool {
        self.is_owner(user) || Self::is_admin(user, admin_auth)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_access_rules() {
        let access = FederatedAccess::new("alice").graph_auths(["analyst"]);
        assert!(access.has_read_access(&User::new("alice"), None));
        assert!(access.has_read_access(&User::new("bob").with_op_auths(["analyst"]), None));
        assert!(!access.has_read_access(&User::new("bob"), None));
        assert!(access.has_read_access(&User::new("root").with_op_auths(["admin"]), Some("admin")));
        assert!(FederatedAccess::new("alice").public(true).has_read_access(&User::new("eve"), None));
    }

    #[test]
    fn test_write_access_needs_owner_or_admin() {
        let access = FederatedAccess::new("alice").graph_auths(["analyst"]).public(true);
        let analyst = User::new("bob").with_op_auths(["analyst"]);
        assert!(!access.has_write_access(&analyst, None));
        assert!(access.has_write_access(&User::new("alice"), None));
        assert!(access.has_write_access(&User::new("root").with_op_auths(["admin"]), Some("admin")));
        assert!(!access.has_write_access(&User::new("root").with_op_auths(["admin"]), None));
    }
}
