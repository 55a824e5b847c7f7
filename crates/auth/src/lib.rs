//! `taskmgr-auth`: authentication and authorization core.
//!
//! Verifies caller credentials, derives roles, gates capabilities. Decoupled
//! from HTTP and storage: the key source is a trait and the audit trail lives
//! in `taskmgr-infra`.

pub mod authorize;
pub mod capabilities;
pub mod claims;
pub mod config;
pub mod context;
pub mod roles;
pub mod verifier;

pub use authorize::{AuthMode, AuthorizationGate, Decision, DenialReason};
pub use capabilities::{Capability, CapabilityTable, Requirement};
pub use claims::{ClaimSet, ClaimSource, validate_time_window};
pub use config::{AuthConfig, ConfigError, IdentityProviderConfig, LocalDevConfig, LocalIdentity};
pub use context::{ContextError, ContextState, Identity, RequestContext};
pub use roles::{GroupRoleMap, Role};
pub use verifier::{
    Credential, KeySource, KeySourceError, LocalSessionError, TokenVerifier, VerificationError,
};
