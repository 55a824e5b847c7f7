//! Authentication configuration.
//!
//! Durations are plain seconds so the same values can come from YAML or
//! environment variables.

use std::collections::HashSet;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{AuthMode, GroupRoleMap, Role};

pub const DEFAULT_CLOCK_SKEW_SECS: u64 = 60;
pub const DEFAULT_KEY_TTL_SECS: u64 = 3600;
pub const DEFAULT_GROUPS_CLAIM: &str = "cognito:groups";
pub const DEFAULT_KEY_MIN_REFRESH_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_KEY_REFRESH_WAIT_MS: u64 = 20_000;

pub const MAX_CLOCK_SKEW_SECS: u64 = 60 * 60;
pub const MAX_SESSION_TTL_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid auth configuration: {0}")]
    Invalid(String),

    #[error("identity provider configured without a signing key source")]
    MissingKeySource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuthConfig {
    /// External OIDC provider. When present, local-dev sessions are disabled.
    pub identity_provider: Option<IdentityProviderConfig>,

    /// Group claim value → role.
    pub group_roles: GroupRoleMap,

    /// Role granted to authenticated callers whose groups map to nothing.
    /// `None` leaves the role set empty.
    pub authenticated_default_role: Option<Role>,

    pub clock_skew_secs: u64,
    pub key_ttl_secs: u64,
    pub key_fetch_timeout_secs: u64,
    pub key_fetch_attempts: u32,
    pub key_fetch_backoff_ms: u64,
    /// Unknown key ids trigger at most one fetch per interval.
    pub key_min_refresh_interval_secs: u64,
    pub key_refresh_wait_ms: u64,

    pub local_dev: Option<LocalDevConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            identity_provider: None,
            group_roles: GroupRoleMap::default(),
            authenticated_default_role: None,
            clock_skew_secs: DEFAULT_CLOCK_SKEW_SECS,
            key_ttl_secs: DEFAULT_KEY_TTL_SECS,
            key_fetch_timeout_secs: 5,
            key_fetch_attempts: 3,
            key_fetch_backoff_ms: 100,
            key_min_refresh_interval_secs: DEFAULT_KEY_MIN_REFRESH_INTERVAL_SECS,
            key_refresh_wait_ms: DEFAULT_KEY_REFRESH_WAIT_MS,
            local_dev: None,
        }
    }
}

impl AuthConfig {
    pub fn mode(&self) -> AuthMode {
        if self.identity_provider.is_some() {
            AuthMode::IdentityProvider
        } else {
            AuthMode::Development
        }
    }

    pub fn clock_skew(&self) -> chrono::Duration {
        let secs = self.clock_skew_secs.min(MAX_CLOCK_SKEW_SECS);
        chrono::TimeDelta::try_seconds(i64::try_from(secs).unwrap_or(0)).unwrap_or_default()
    }

    pub fn key_ttl(&self) -> Duration {
        Duration::from_secs(self.key_ttl_secs)
    }

    pub fn key_fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.key_fetch_timeout_secs)
    }

    pub fn key_fetch_backoff(&self) -> Duration {
        Duration::from_millis(self.key_fetch_backoff_ms)
    }

    pub fn key_min_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.key_min_refresh_interval_secs)
    }

    pub fn key_refresh_wait(&self) -> Duration {
        Duration::from_millis(self.key_refresh_wait_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(idp) = &self.identity_provider {
            if idp.issuer.trim().is_empty() {
                return Err(ConfigError::Invalid("identity_provider.issuer is empty".into()));
            }
            if idp.client_id.trim().is_empty() {
                return Err(ConfigError::Invalid("identity_provider.client_id is empty".into()));
            }
            if idp.algorithms.is_empty() {
                return Err(ConfigError::Invalid("identity_provider.algorithms is empty".into()));
            }
        }

        if self.clock_skew_secs > MAX_CLOCK_SKEW_SECS {
            return Err(ConfigError::Invalid(format!(
                "clock_skew_secs must be at most {MAX_CLOCK_SKEW_SECS}"
            )));
        }
        if self.key_refresh_wait_ms == 0 {
            return Err(ConfigError::Invalid("key_refresh_wait_ms must be positive".into()));
        }

        if self.group_roles.roles().any(|r| r.as_str().is_empty()) {
            return Err(ConfigError::Invalid("group_roles contains an empty role".into()));
        }

        if let Some(local) = &self.local_dev {
            if local.session_ttl_secs == 0 || local.session_ttl_secs > MAX_SESSION_TTL_SECS {
                return Err(ConfigError::Invalid(format!(
                    "local_dev.session_ttl_secs must be between 1 and {MAX_SESSION_TTL_SECS}"
                )));
            }
            let mut seen = HashSet::new();
            for identity in &local.identities {
                let email = normalize_email(&identity.email);
                if email.is_empty() || identity.role.as_str().is_empty() {
                    return Err(ConfigError::Invalid(
                        "local_dev identity needs an email and a role".into(),
                    ));
                }
                if !seen.insert(email) {
                    return Err(ConfigError::Invalid(format!(
                        "local_dev identity '{}' listed twice",
                        identity.email
                    )));
                }
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityProviderConfig {
    /// Expected `iss`, compared by exact string equality.
    pub issuer: String,

    /// This application's client id; must appear in `aud`.
    pub client_id: String,

    /// Key discovery endpoint. Defaults to `<issuer>/.well-known/jwks.json`.
    #[serde(default)]
    pub jwks_url: Option<String>,

    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,

    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<Algorithm>,
}

impl IdentityProviderConfig {
    pub fn jwks_url(&self) -> String {
        match &self.jwks_url {
            Some(url) => url.clone(),
            None => format!("{}/.well-known/jwks.json", self.issuer.trim_end_matches('/')),
        }
    }
}

fn default_groups_claim() -> String {
    DEFAULT_GROUPS_CLAIM.to_string()
}

fn default_algorithms() -> Vec<Algorithm> {
    vec![Algorithm::RS256]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalDevConfig {
    pub identities: Vec<LocalIdentity>,

    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

fn default_session_ttl_secs() -> u64 {
    8 * 60 * 60
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalIdentity {
    pub email: String,
    pub role: Role,
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}
