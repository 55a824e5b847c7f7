//! Infrastructure layer: audit storage, config, external services.

pub mod audit_log;
pub mod config;
pub mod external;

mod integration_tests;

pub use audit_log::{
    AuditEntry, AuditError, AuditFilter, AuditLog, AuditOutcome, AuditSink, InMemoryAuditSink,
    PostgresAuditSink, StoredAuditEntry,
};
pub use config::{AppConfig, AuditConfig, ConfigLoadError, ServerConfig};
pub use external::HttpJwksSource;
