//! Verification of identity-provider tokens (signed JWTs).

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, Validation};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::claims::validate_time_window;
use crate::config::{AuthConfig, IdentityProviderConfig};
use crate::verifier::jwks::{KeyCache, KeyCachePolicy, KeySource};
use crate::{ClaimSet, ClaimSource, GroupRoleMap, Role, VerificationError};

/// `aud` may be a single string or an array (RFC 7519 §4.1.3).
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Audience {
    One(String),
    Many(Vec<String>),
}

impl Audience {
    fn contains(&self, client_id: &str) -> bool {
        match self {
            Self::One(aud) => aud == client_id,
            Self::Many(auds) => auds.iter().any(|a| a == client_id),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenClaims {
    sub: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    iss: Option<String>,
    #[serde(default)]
    aud: Option<Audience>,
    exp: i64,
    #[serde(default)]
    nbf: Option<i64>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

pub struct ExternalTokenVerifier {
    issuer: String,
    client_id: String,
    groups_claim: String,
    algorithms: Vec<Algorithm>,
    group_roles: GroupRoleMap,
    default_role: Option<Role>,
    skew: Duration,
    keys: KeyCache,
}

impl ExternalTokenVerifier {
    pub fn new(provider: &IdentityProviderConfig, config: &AuthConfig, source: Arc<dyn KeySource>) -> Self {
        let policy = KeyCachePolicy {
            ttl: config.key_ttl(),
            fetch_timeout: config.key_fetch_timeout(),
            attempts: config.key_fetch_attempts,
            backoff: config.key_fetch_backoff(),
            min_refresh_interval: config.key_min_refresh_interval(),
            refresh_wait: config.key_refresh_wait(),
        };

        Self {
            issuer: provider.issuer.clone(),
            client_id: provider.client_id.clone(),
            groups_claim: provider.groups_claim.clone(),
            algorithms: provider.algorithms.clone(),
            group_roles: config.group_roles.clone(),
            default_role: config.authenticated_default_role.clone(),
            skew: config.clock_skew(),
            keys: KeyCache::new(source, policy),
        }
    }

    pub fn keys(&self) -> &KeyCache {
        &self.keys
    }

    pub async fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<ClaimSet, VerificationError> {
        // 1) structure
        let header = jsonwebtoken::decode_header(token).map_err(|_| VerificationError::Malformed)?;
        let kid = header.kid.as_deref().ok_or(VerificationError::Malformed)?;
        if !self.algorithms.contains(&header.alg) {
            return Err(VerificationError::SignatureInvalid);
        }

        // 2) signature against the published key
        let key = self.keys.decoding_key(kid).await?;
        let data = jsonwebtoken::decode::<TokenClaims>(token, &key, &self.signature_only())
            .map_err(|e| match e.kind() {
                ErrorKind::InvalidSignature
                | ErrorKind::InvalidAlgorithm
                | ErrorKind::InvalidKeyFormat
                | ErrorKind::InvalidRsaKey(_)
                | ErrorKind::InvalidEcdsaKey => VerificationError::SignatureInvalid,
                _ => VerificationError::Malformed,
            })?;
        let claims = data.claims;

        // 3) temporal window
        let expires_at = timestamp(claims.exp)?;
        let not_before = claims.nbf.or(claims.iat).map(timestamp).transpose()?;
        validate_time_window(not_before, expires_at, now, self.skew)?;

        // 4) issuer / audience, exact equality
        if claims.iss.as_deref() != Some(self.issuer.as_str()) {
            return Err(VerificationError::WrongIssuer);
        }
        if !claims.aud.as_ref().is_some_and(|aud| aud.contains(&self.client_id)) {
            return Err(VerificationError::WrongAudience);
        }

        // 5) groups → roles
        let mut roles = self.group_roles.roles_for(groups(&claims.extra, &self.groups_claim));
        if roles.is_empty() {
            if let Some(role) = &self.default_role {
                roles.insert(role.clone());
            }
        }

        let issued_at = claims.iat.map(timestamp).transpose()?.unwrap_or(now);

        Ok(ClaimSet::new(
            claims.sub,
            claims.email,
            roles,
            issued_at,
            expires_at,
            ClaimSource::ExternalToken,
        ))
    }

    /// Validation that checks only signature and algorithm; temporal,
    /// issuer and audience rules are applied afterwards so each failure
    /// maps to its own error kind.
    fn signature_only(&self) -> Validation {
        let mut validation = Validation::new(Algorithm::RS256);
        validation.algorithms = self.algorithms.clone();
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();
        validation
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, VerificationError> {
    DateTime::from_timestamp(secs, 0).ok_or(VerificationError::Malformed)
}

fn groups<'a>(extra: &'a Map<String, Value>, claim: &str) -> BTreeSet<&'a str> {
    match extra.get(claim) {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(single)) => BTreeSet::from([single.as_str()]),
        _ => BTreeSet::new(),
    }
}
