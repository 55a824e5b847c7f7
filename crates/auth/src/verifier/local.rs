//! Local development sessions.
//!
//! Trusted, non-cryptographic: a session reference is an opaque random id
//! mapped to an identity from the configured `{email → role}` table. Only
//! constructed when no identity provider is configured.

use std::collections::{BTreeSet, HashMap};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::info;

use taskmgr_core::SessionId;

use crate::config::{LocalDevConfig, MAX_SESSION_TTL_SECS, normalize_email};
use crate::{ClaimSet, ClaimSource, Role, VerificationError};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LocalSessionError {
    #[error("local sessions are disabled")]
    Disabled,

    #[error("no local identity configured for this email")]
    UnknownIdentity,
}

#[derive(Debug, Clone)]
struct LocalSession {
    email: String,
    role: Role,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct LocalSessionIssuer {
    identities: HashMap<String, Role>,
    ttl: Duration,
    sessions: RwLock<HashMap<SessionId, LocalSession>>,
}

impl LocalSessionIssuer {
    pub fn new(config: &LocalDevConfig) -> Self {
        let identities = config
            .identities
            .iter()
            .map(|i| (normalize_email(&i.email), i.role.clone()))
            .collect();

        Self {
            identities,
            ttl: Duration::try_seconds(
                i64::try_from(config.session_ttl_secs.min(MAX_SESSION_TTL_SECS)).unwrap_or(0),
            )
            .unwrap_or_default(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Issue a session reference for an enumerated email.
    pub fn create_session(
        &self,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<SessionId, LocalSessionError> {
        let email = normalize_email(email);
        let role = self
            .identities
            .get(&email)
            .cloned()
            .ok_or(LocalSessionError::UnknownIdentity)?;

        let id = SessionId::new();
        let session = LocalSession {
            email,
            role,
            issued_at: now,
            expires_at: now.checked_add_signed(self.ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        };

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.retain(|_, s| s.expires_at > now);
        info!(email = %session.email, role = %session.role, "local session issued");
        sessions.insert(id, session);

        Ok(id)
    }

    pub fn resolve(&self, reference: &str, now: DateTime<Utc>) -> Result<ClaimSet, VerificationError> {
        let id: SessionId = reference
            .trim()
            .parse()
            .map_err(|_| VerificationError::Malformed)?;

        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let session = sessions.get(&id).ok_or(VerificationError::UnknownSession)?;
        if session.expires_at <= now {
            return Err(VerificationError::UnknownSession);
        }

        Ok(ClaimSet::new(
            format!("local-{}", session.email),
            Some(session.email.clone()),
            BTreeSet::from([session.role.clone()]),
            session.issued_at,
            session.expires_at,
            ClaimSource::LocalDevSession,
        ))
    }

    /// Forget a session. Returns whether it existed.
    pub fn revoke(&self, reference: &str) -> bool {
        let Ok(id) = reference.trim().parse::<SessionId>() else {
            return false;
        };
        self.sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocalIdentity;

    fn issuer(ttl_secs: u64) -> LocalSessionIssuer {
        LocalSessionIssuer::new(&LocalDevConfig {
            identities: vec![
                LocalIdentity { email: "dev@local.test".into(), role: Role::USER },
                LocalIdentity { email: "Admin@Local.Test".into(), role: Role::ADMIN },
            ],
            session_ttl_secs: ttl_secs,
        })
    }

    #[test]
    fn issues_and_resolves_enumerated_identity() {
        let issuer = issuer(60);
        let now = Utc::now();

        let id = issuer.create_session(" admin@local.test ", now).unwrap();
        let claims = issuer.resolve(&id.to_string(), now).unwrap();

        assert_eq!(claims.subject(), "local-admin@local.test");
        assert_eq!(claims.email(), Some("admin@local.test"));
        assert_eq!(claims.source(), ClaimSource::LocalDevSession);
        assert_eq!(claims.roles(), &BTreeSet::from([Role::ADMIN]));
    }

    #[test]
    fn unknown_email_is_refused() {
        assert_eq!(
            issuer(60).create_session("mallory@evil.test", Utc::now()),
            Err(LocalSessionError::UnknownIdentity)
        );
    }

    #[test]
    fn sessions_expire() {
        let issuer = issuer(60);
        let now = Utc::now();
        let id = issuer.create_session("dev@local.test", now).unwrap();

        assert!(issuer.resolve(&id.to_string(), now + Duration::seconds(59)).is_ok());
        assert_eq!(
            issuer.resolve(&id.to_string(), now + Duration::seconds(60)),
            Err(VerificationError::UnknownSession)
        );
    }

    #[test]
    fn oversized_ttl_is_capped() {
        let issuer = issuer(u64::MAX);
        let now = Utc::now();
        let id = issuer.create_session("dev@local.test", now).unwrap();

        let claims = issuer.resolve(&id.to_string(), now).unwrap();
        assert_eq!(
            claims.expires_at(),
            now + Duration::seconds(MAX_SESSION_TTL_SECS as i64)
        );
    }

    #[test]
    fn revoked_and_forged_references_do_not_resolve() {
        let issuer = issuer(60);
        let now = Utc::now();
        let id = issuer.create_session("dev@local.test", now).unwrap();

        assert!(issuer.revoke(&id.to_string()));
        assert!(!issuer.revoke(&id.to_string()));
        assert_eq!(issuer.resolve(&id.to_string(), now), Err(VerificationError::UnknownSession));
        assert_eq!(
            issuer.resolve(&SessionId::new().to_string(), now),
            Err(VerificationError::UnknownSession)
        );
        assert_eq!(issuer.resolve("dev@local.test", now), Err(VerificationError::Malformed));
    }
}
