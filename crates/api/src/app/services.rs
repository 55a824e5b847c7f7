use std::sync::Arc;

use tracing::{info, warn};

use taskmgr_auth::{AuthorizationGate, CapabilityTable, ConfigError, KeySource, TokenVerifier};
use taskmgr_infra::{AppConfig, AuditLog, AuditSink, HttpJwksSource, InMemoryAuditSink, PostgresAuditSink};

use crate::app::tasks::TaskStore;
use crate::authz::Guard;

/// Everything the handlers share.
pub struct AppServices {
    pub verifier: Arc<TokenVerifier>,
    pub guard: Guard,
    pub audit: AuditLog,
    pub tasks: TaskStore,
}

impl AppServices {
    /// Wire services from already-constructed adapters. `key_source` is
    /// required when an identity provider is configured.
    pub fn new(
        config: &AppConfig,
        key_source: Option<Arc<dyn KeySource>>,
        audit_sink: Arc<dyn AuditSink>,
    ) -> Result<Self, ConfigError> {
        let verifier = TokenVerifier::from_config(&config.auth, key_source)?;
        let gate = AuthorizationGate::new(verifier.mode(), CapabilityTable::default());
        let audit = AuditLog::new(audit_sink)
            .with_timeouts(config.audit.append_timeout(), config.audit.query_timeout());

        Ok(Self {
            verifier: Arc::new(verifier),
            guard: Guard::new(gate, audit.clone()),
            audit,
            tasks: TaskStore::new(),
        })
    }
}

/// Build production adapters from configuration: the HTTP key source when an
/// identity provider is configured, Postgres audit storage when a database
/// URL is set (in-memory otherwise).
pub async fn build_services(config: &AppConfig) -> anyhow::Result<AppServices> {
    let key_source: Option<Arc<dyn KeySource>> = match &config.auth.identity_provider {
        Some(provider) => {
            let source = HttpJwksSource::new(provider.jwks_url(), config.auth.key_fetch_timeout())?;
            info!(url = source.url(), "identity provider key source configured");
            Some(Arc::new(source))
        }
        None => {
            warn!("no identity provider configured; running in local development mode");
            None
        }
    };

    let audit_sink: Arc<dyn AuditSink> = match &config.audit.database_url {
        Some(url) => Arc::new(PostgresAuditSink::connect(url).await?),
        None => {
            warn!("no audit database configured; audit trail is kept in memory");
            Arc::new(InMemoryAuditSink::new())
        }
    };

    let services = AppServices::new(config, key_source, audit_sink)?;

    if let Some(external) = services.verifier.external() {
        match external.keys().prime().await {
            Ok(count) => info!(keys = count, "signing keys loaded"),
            Err(e) => warn!(error = %e, "signing keys not loaded at startup; will retry on demand"),
        }
    }

    Ok(services)
}
