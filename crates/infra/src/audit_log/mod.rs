//! Append-only audit trail of authorization decisions.
//!
//! `AuditLog` wraps an [`AuditSink`] with the timing rules the request path
//! depends on: a mutating action records synchronously and fails if the
//! entry cannot be persisted in time; read-only actions record best-effort.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, warn};

pub use in_memory::InMemoryAuditSink;
pub use postgres::PostgresAuditSink;
pub use query::AuditFilter;
pub use r#trait::{AuditEntry, AuditError, AuditOutcome, AuditSink, StoredAuditEntry};

pub const DEFAULT_APPEND_TIMEOUT: Duration = Duration::from_secs(2);
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
    append_timeout: Duration,
    query_timeout: Duration,
}

impl AuditLog {
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self {
            sink,
            append_timeout: DEFAULT_APPEND_TIMEOUT,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    pub fn with_timeouts(mut self, append: Duration, query: Duration) -> Self {
        self.append_timeout = append;
        self.query_timeout = query;
        self
    }

    /// Persist `entry` before returning. Any sink failure or a timeout is
    /// reported as [`AuditError::Unavailable`]; the caller must not perform
    /// the audited effect in that case.
    pub async fn record(&self, entry: AuditEntry) -> Result<StoredAuditEntry, AuditError> {
        let correlation_id = entry.correlation_id();
        let action = entry.action().to_string();

        match tokio::time::timeout(self.append_timeout, self.sink.append(entry)).await {
            Ok(Ok(stored)) => Ok(stored),
            Ok(Err(e)) => {
                error!(%correlation_id, %action, error = %e, "audit append failed");
                Err(match e {
                    AuditError::Unavailable(msg) | AuditError::Storage(msg) => {
                        AuditError::Unavailable(msg)
                    }
                })
            }
            Err(_) => {
                error!(%correlation_id, %action, timeout_ms = self.append_timeout.as_millis() as u64, "audit append timed out");
                Err(AuditError::Unavailable("append timed out".to_string()))
            }
        }
    }

    /// Record without waiting. Failures are logged and otherwise ignored.
    pub fn record_best_effort(&self, entry: AuditEntry) {
        let log = self.clone();
        tokio::spawn(async move {
            let action = entry.action().to_string();
            if let Err(e) = log.record(entry).await {
                warn!(%action, error = %e, "best-effort audit entry dropped");
            }
        });
    }

    /// Entries matching `filter`, ascending by `(timestamp, sequence)`.
    pub async fn list(&self, filter: &AuditFilter) -> Result<Vec<StoredAuditEntry>, AuditError> {
        tokio::time::timeout(self.query_timeout, self.sink.list(filter))
            .await
            .map_err(|_| AuditError::Unavailable("query timed out".to_string()))?
    }
}

impl core::fmt::Debug for AuditLog {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuditLog")
            .field("append_timeout", &self.append_timeout)
            .field("query_timeout", &self.query_timeout)
            .finish_non_exhaustive()
    }
}
