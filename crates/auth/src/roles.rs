use std::borrow::Cow;
use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

/// Role identifier used for RBAC.
///
/// Roles are opaque strings; which capabilities a role unlocks is decided by
/// the capability table, never by the role name itself.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub const ADMIN: Role = Role(Cow::Borrowed("admin"));
    pub const USER: Role = Role(Cow::Borrowed("user"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed translation from identity-provider group names to roles.
///
/// Group names are matched by exact string equality. Groups without a row
/// are ignored. The default table is empty: every row comes from
/// configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupRoleMap(BTreeMap<String, Role>);

impl GroupRoleMap {
    pub fn new(rows: impl IntoIterator<Item = (String, Role)>) -> Self {
        Self(rows.into_iter().collect())
    }

    /// Map every recognized group to its role.
    pub fn roles_for<'a>(&self, groups: impl IntoIterator<Item = &'a str>) -> BTreeSet<Role> {
        groups
            .into_iter()
            .filter_map(|g| self.0.get(g).cloned())
            .collect()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.0.values()
    }
}
