use serde::{Deserialize, Serialize};

use crate::{Capability, CapabilityTable, ClaimSource, Identity, Requirement, Role};

/// Deployment mode the gate enforces.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// An external identity provider is configured; local-dev identities are
    /// refused outright.
    IdentityProvider,
    /// No identity provider; local-dev sessions are honored.
    Development,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum DenialReason {
    Unauthenticated,
    LocalSessionForbidden,
    UnknownCapability,
    MissingRole(Role),
    OwnerRequired,
    NotOwner,
}

impl core::fmt::Display for DenialReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Unauthenticated => f.write_str("unauthenticated"),
            Self::LocalSessionForbidden => f.write_str("local session forbidden"),
            Self::UnknownCapability => f.write_str("unknown capability"),
            Self::MissingRole(role) => write!(f, "missing role '{role}'"),
            Self::OwnerRequired => f.write_str("resource owner required"),
            Self::NotOwner => f.write_str("not owner"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "reason", rename_all = "snake_case")]
pub enum Decision {
    Allowed,
    Denied(DenialReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn denial_reason(&self) -> Option<&DenialReason> {
        match self {
            Self::Allowed => None,
            Self::Denied(reason) => Some(reason),
        }
    }
}

/// Stateless role/ownership gate.
///
/// - No IO
/// - No panics
/// - Same `(identity, capability, owner)` always yields the same decision
#[derive(Debug, Clone)]
pub struct AuthorizationGate {
    mode: AuthMode,
    table: CapabilityTable,
}

impl AuthorizationGate {
    pub fn new(mode: AuthMode, table: CapabilityTable) -> Self {
        Self { mode, table }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn table(&self) -> &CapabilityTable {
        &self.table
    }

    /// Decide whether `identity` may exercise `capability` on a resource
    /// owned by `resource_owner`. First matching rule wins.
    pub fn authorize(
        &self,
        identity: &Identity,
        capability: &Capability,
        resource_owner: Option<&str>,
    ) -> Decision {
        let claims = match identity {
            Identity::Anonymous => {
                return if self.table.is_public(capability) {
                    Decision::Allowed
                } else {
                    Decision::Denied(DenialReason::Unauthenticated)
                };
            }
            Identity::Authenticated(claims) => claims,
        };

        if self.mode == AuthMode::IdentityProvider
            && claims.source() == ClaimSource::LocalDevSession
        {
            return Decision::Denied(DenialReason::LocalSessionForbidden);
        }

        let Some(requirement) = self.table.requirement(capability) else {
            return Decision::Denied(DenialReason::UnknownCapability);
        };

        match requirement {
            Requirement::Public => Decision::Allowed,
            Requirement::Role(role) => {
                if claims.has_role(role) {
                    Decision::Allowed
                } else {
                    Decision::Denied(DenialReason::MissingRole(role.clone()))
                }
            }
            Requirement::OwnerOrRole(override_role) => {
                let Some(owner) = resource_owner else {
                    return Decision::Denied(DenialReason::OwnerRequired);
                };
                // The override is checked explicitly, not inherited from a
                // broader grant.
                if claims.subject() == owner || claims.has_role(override_role) {
                    Decision::Allowed
                } else {
                    Decision::Denied(DenialReason::NotOwner)
                }
            }
        }
    }
}
