use std::borrow::Cow;
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::Role;

/// Capability identifier (e.g. `"manage_own_task"`).
///
/// Capabilities are looked up by name in a [`CapabilityTable`]; a name with
/// no row is denied, so a typo can never grant access.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub const HEALTH: Capability = Capability(Cow::Borrowed("health"));
    pub const METRICS: Capability = Capability(Cow::Borrowed("metrics"));
    pub const LANDING: Capability = Capability(Cow::Borrowed("landing"));
    pub const ADMIN_PANEL_ACCESS: Capability = Capability(Cow::Borrowed("admin_panel_access"));
    pub const VIEW_ALL_TASKS: Capability = Capability(Cow::Borrowed("view_all_tasks"));
    pub const MANAGE_ANY_TASK: Capability = Capability(Cow::Borrowed("manage_any_task"));
    pub const MANAGE_OWN_TASK: Capability = Capability(Cow::Borrowed("manage_own_task"));

    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What a caller must satisfy to be granted a capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Requirement {
    /// Granted to everyone, including anonymous callers.
    Public,
    /// Caller must hold the role.
    Role(Role),
    /// Caller must own the resource, or hold the override role.
    OwnerOrRole(Role),
}

/// Enumerated capability → requirement rows.
#[derive(Debug, Clone)]
pub struct CapabilityTable {
    rows: HashMap<Capability, Requirement>,
}

impl CapabilityTable {
    pub fn new(rows: impl IntoIterator<Item = (Capability, Requirement)>) -> Self {
        Self {
            rows: rows.into_iter().collect(),
        }
    }

    pub fn requirement(&self, capability: &Capability) -> Option<&Requirement> {
        self.rows.get(capability)
    }

    pub fn is_public(&self, capability: &Capability) -> bool {
        matches!(self.requirement(capability), Some(Requirement::Public))
    }

    pub fn capabilities(&self) -> impl Iterator<Item = &Capability> {
        self.rows.keys()
    }
}

impl Default for CapabilityTable {
    fn default() -> Self {
        Self::new([
            (Capability::HEALTH, Requirement::Public),
            (Capability::METRICS, Requirement::Public),
            (Capability::LANDING, Requirement::Public),
            (Capability::ADMIN_PANEL_ACCESS, Requirement::Role(Role::ADMIN)),
            (Capability::VIEW_ALL_TASKS, Requirement::Role(Role::ADMIN)),
            (Capability::MANAGE_ANY_TASK, Requirement::Role(Role::ADMIN)),
            (Capability::MANAGE_OWN_TASK, Requirement::OwnerOrRole(Role::ADMIN)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_enumerates_every_capability() {
        let table = CapabilityTable::default();
        assert_eq!(table.capabilities().count(), 7);

        for public in [Capability::HEALTH, Capability::METRICS, Capability::LANDING] {
            assert!(table.is_public(&public));
        }
        assert!(!table.is_public(&Capability::MANAGE_OWN_TASK));
        assert_eq!(
            table.requirement(&Capability::MANAGE_ANY_TASK),
            Some(&Requirement::Role(Role::ADMIN))
        );
    }

    #[test]
    fn lookup_is_by_name() {
        let table = CapabilityTable::default();
        assert!(table.requirement(&Capability::new("manage_own_task")).is_some());
        assert!(table.requirement(&Capability::new("Manage_Own_Task")).is_none());
        assert!(!table.is_public(&Capability::new("does_not_exist")));
    }

    #[test]
    fn new_capability_is_a_new_row() {
        let table = CapabilityTable::new([(
            Capability::new("export_report"),
            Requirement::Role(Role::USER),
        )]);
        assert_eq!(
            table.requirement(&Capability::new(String::from("export_report"))),
            Some(&Requirement::Role(Role::USER))
        );
    }
}
