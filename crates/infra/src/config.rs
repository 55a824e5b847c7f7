//! Configuration loading and representation.
//!
//! Layers, later wins: built-in defaults → YAML file named by
//! `TASKMGR_CONFIG` (optional) → `TASKMGR_*` environment variables, with
//! `__` separating nested keys (e.g. `TASKMGR_AUTH__CLOCK_SKEW_SECS=0`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Yaml};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use taskmgr_auth::{AuthConfig, ConfigError};
use taskmgr_observability::LoggingConfig;

pub const CONFIG_PATH_ENV: &str = "TASKMGR_CONFIG";
pub const ENV_PREFIX: &str = "TASKMGR_";

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    #[error(transparent)]
    Auth(#[from] ConfigError),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub auth: AuthConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AuditConfig {
    pub append_timeout_ms: u64,
    pub query_timeout_ms: u64,
    /// Postgres URL. When absent the audit trail is kept in memory.
    pub database_url: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            append_timeout_ms: 2_000,
            query_timeout_ms: 5_000,
            database_url: None,
        }
    }
}

impl AuditConfig {
    pub fn append_timeout(&self) -> Duration {
        Duration::from_millis(self.append_timeout_ms)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }
}

impl AppConfig {
    /// Load using `TASKMGR_CONFIG` and the process environment.
    pub fn load() -> Result<Self, ConfigLoadError> {
        let path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);
        Self::from_figment(Self::figment(path.as_deref()))
    }

    /// The layered provider stack, exposed so callers can add layers.
    pub fn figment(path: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__").ignore(&["config"]))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigLoadError> {
        let config: AppConfig = figment.extract().map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        self.auth.validate()?;

        if self.server.bind.trim().is_empty() {
            return Err(ConfigLoadError::Invalid("server.bind is empty".into()));
        }
        if self.audit.append_timeout_ms == 0 || self.audit.query_timeout_ms == 0 {
            return Err(ConfigLoadError::Invalid("audit timeouts must be positive".into()));
        }
        Ok(())
    }
}
