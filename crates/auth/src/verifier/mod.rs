//! Credential verification: identity-provider tokens and local-dev sessions.

pub mod external;
pub mod jwks;
pub mod local;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, warn};

use taskmgr_core::SessionId;

use crate::config::{AuthConfig, ConfigError};
use crate::{AuthMode, ClaimSet, Identity};

pub use external::ExternalTokenVerifier;
pub use jwks::{KeyCache, KeyCachePolicy, KeySource, KeySourceError};
pub use local::{LocalSessionError, LocalSessionIssuer};

/// Why a credential was not accepted.
///
/// Callers never see these distinctly: at the request boundary every kind
/// collapses to [`Identity::Anonymous`].
#[derive(Debug, Error, Copy, Clone, PartialEq, Eq)]
pub enum VerificationError {
    #[error("malformed credential")]
    Malformed,

    #[error("signature invalid")]
    SignatureInvalid,

    #[error("credential expired")]
    Expired,

    #[error("credential not yet valid")]
    NotYetValid,

    #[error("wrong issuer")]
    WrongIssuer,

    #[error("wrong audience")]
    WrongAudience,

    #[error("signing keys unavailable")]
    KeysUnavailable,

    #[error("unknown session")]
    UnknownSession,

    #[error("local sessions disabled")]
    LocalSessionsDisabled,

    #[error("no identity provider configured")]
    IdentityProviderNotConfigured,
}

/// A presented credential, as extracted by the transport layer.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Signed identity token from the `Authorization: Bearer` header.
    Bearer(String),
    /// Local-dev session reference from the session cookie.
    LocalSession(String),
}

impl core::fmt::Debug for Credential {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Bearer(_) => f.write_str("Bearer(..)"),
            Self::LocalSession(_) => f.write_str("LocalSession(..)"),
        }
    }
}

/// Entry point for credential verification.
pub struct TokenVerifier {
    mode: AuthMode,
    external: Option<ExternalTokenVerifier>,
    local: Option<LocalSessionIssuer>,
}

impl TokenVerifier {
    /// Build from configuration. `key_source` is required when an identity
    /// provider is configured and ignored otherwise.
    pub fn from_config(
        config: &AuthConfig,
        key_source: Option<Arc<dyn KeySource>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        match &config.identity_provider {
            Some(provider) => {
                if config.local_dev.is_some() {
                    warn!("identity provider configured; ignoring local_dev identities");
                }
                let source = key_source.ok_or(ConfigError::MissingKeySource)?;
                Ok(Self {
                    mode: AuthMode::IdentityProvider,
                    external: Some(ExternalTokenVerifier::new(provider, config, source)),
                    local: None,
                })
            }
            None => Ok(Self {
                mode: AuthMode::Development,
                external: None,
                local: config.local_dev.as_ref().map(LocalSessionIssuer::new),
            }),
        }
    }

    pub fn mode(&self) -> AuthMode {
        self.mode
    }

    pub fn external(&self) -> Option<&ExternalTokenVerifier> {
        self.external.as_ref()
    }

    pub fn local_sessions_enabled(&self) -> bool {
        self.local.is_some()
    }

    pub async fn verify(
        &self,
        credential: &Credential,
        now: DateTime<Utc>,
    ) -> Result<ClaimSet, VerificationError> {
        match credential {
            Credential::Bearer(token) => match &self.external {
                Some(external) => external.verify(token, now).await,
                None => Err(VerificationError::IdentityProviderNotConfigured),
            },
            Credential::LocalSession(reference) => match &self.local {
                Some(local) => local.resolve(reference, now),
                None => Err(VerificationError::LocalSessionsDisabled),
            },
        }
    }

    /// Verify and collapse every failure to `Anonymous`.
    pub async fn resolve_identity(
        &self,
        credential: Option<&Credential>,
        now: DateTime<Utc>,
    ) -> Identity {
        let Some(credential) = credential else {
            return Identity::Anonymous;
        };

        match self.verify(credential, now).await {
            Ok(claims) => Identity::from(claims),
            Err(kind) => {
                debug!(%kind, "credential rejected; treating caller as anonymous");
                Identity::Anonymous
            }
        }
    }

    pub fn create_local_session(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionId, LocalSessionError> {
        match &self.local {
            Some(local) => local.create_session(email, now),
            None => Err(LocalSessionError::Disabled),
        }
    }

    pub fn revoke_local_session(&self, reference: &str) -> bool {
        self.local.as_ref().is_some_and(|local| local.revoke(reference))
    }
}
