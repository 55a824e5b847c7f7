//! Postgres-backed audit sink.
//!
//! Entries live in the `audit_log` table (see `migrations/0001_audit_log.sql`).
//! The table is append-only at the database level: a trigger rejects UPDATE
//! and DELETE. `sequence` is a `BIGSERIAL` assigned on insert.
//!
//! ## Error Mapping
//!
//! | SQLx Error | AuditError |
//! |------------|------------|
//! | PoolClosed, PoolTimedOut, Io | `Unavailable` |
//! | Database, decode, anything else | `Storage` |

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Row};
use tracing::{Span, instrument};

use taskmgr_core::{AuditEntryId, CorrelationId};

use super::query::AuditFilter;
use super::r#trait::{AuditEntry, AuditError, AuditOutcome, AuditSink, StoredAuditEntry};

const SCHEMA: &str = include_str!("../../migrations/0001_audit_log.sql");

#[derive(Debug, Clone)]
pub struct PostgresAuditSink {
    pool: Arc<PgPool>,
}

impl PostgresAuditSink {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    /// Connect and apply the audit schema.
    pub async fn connect(database_url: &str) -> Result<Self, AuditError> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;

        let sink = Self::new(pool);
        sink.ensure_schema().await?;
        Ok(sink)
    }

    /// Idempotently create the `audit_log` table, indexes and append-only trigger.
    #[instrument(skip(self), err)]
    pub async fn ensure_schema(&self) -> Result<(), AuditError> {
        sqlx::raw_sql(SCHEMA)
            .execute(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("ensure_schema", e))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuditSink for PostgresAuditSink {
    #[instrument(
        skip(self, entry),
        fields(
            correlation_id = %entry.correlation_id(),
            actor = %entry.actor_subject(),
            action = %entry.action(),
            outcome = entry.outcome().as_str(),
            sequence
        ),
        err
    )]
    async fn append(&self, entry: AuditEntry) -> Result<StoredAuditEntry, AuditError> {
        let id = AuditEntryId::new();

        let row = sqlx::query(
            r#"
            INSERT INTO audit_log (
                id,
                correlation_id,
                occurred_at,
                actor_subject,
                action,
                resource_id,
                outcome,
                reason
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING sequence
            "#,
        )
        .bind(id.as_uuid())
        .bind(entry.correlation_id().as_uuid())
        .bind(entry.timestamp())
        .bind(entry.actor_subject())
        .bind(entry.action())
        .bind(entry.resource_id())
        .bind(entry.outcome().as_str())
        .bind(entry.reason())
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("append", e))?;

        let sequence: i64 = row
            .try_get("sequence")
            .map_err(|e| AuditError::Storage(format!("failed to read sequence: {e}")))?;
        Span::current().record("sequence", sequence);

        Ok(StoredAuditEntry {
            id,
            sequence: sequence as u64,
            entry,
        })
    }

    #[instrument(skip(self), fields(returned), err)]
    async fn list(&self, filter: &AuditFilter) -> Result<Vec<StoredAuditEntry>, AuditError> {
        let mut query = list_query(filter);

        let rows = query
            .build()
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("list", e))?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let row = AuditRow::from_row(&row)
                .map_err(|e| AuditError::Storage(format!("failed to deserialize audit row: {e}")))?;
            entries.push(row.try_into()?);
        }

        Span::current().record("returned", entries.len());
        Ok(entries)
    }
}

fn list_query(filter: &AuditFilter) -> QueryBuilder<'static, Postgres> {
    let mut query: QueryBuilder<Postgres> = QueryBuilder::new(
        r#"
        SELECT
            sequence,
            id,
            correlation_id,
            occurred_at,
            actor_subject,
            action,
            resource_id,
            outcome,
            reason
        FROM audit_log
        WHERE TRUE
        "#,
    );

    if let Some(actor) = &filter.actor {
        query.push(" AND actor_subject = ").push_bind(actor.clone());
    }
    if let Some(action) = &filter.action {
        query.push(" AND action = ").push_bind(action.clone());
    }
    if let Some(from) = filter.from {
        query.push(" AND occurred_at >= ").push_bind(from);
    }
    if let Some(to) = filter.to {
        query.push(" AND occurred_at < ").push_bind(to);
    }
    if filter.newest_first {
        query.push(" ORDER BY occurred_at DESC, sequence DESC");
    } else {
        query.push(" ORDER BY occurred_at ASC, sequence ASC");
    }
    if let Some(limit) = filter.limit {
        query.push(" LIMIT ").push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
    query
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> AuditError {
    match err {
        sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
            AuditError::Unavailable(format!("connection pool unavailable in {operation}"))
        }
        sqlx::Error::Io(e) => AuditError::Unavailable(format!("io error in {operation}: {e}")),
        sqlx::Error::Database(db_err) => {
            AuditError::Storage(format!("database error in {operation}: {}", db_err.message()))
        }
        other => AuditError::Storage(format!("sqlx error in {operation}: {other}")),
    }
}

// SQLx row types

#[derive(Debug)]
struct AuditRow {
    sequence: i64,
    id: uuid::Uuid,
    correlation_id: uuid::Uuid,
    occurred_at: DateTime<Utc>,
    actor_subject: String,
    action: String,
    resource_id: Option<String>,
    outcome: String,
    reason: Option<String>,
}

impl<'r> FromRow<'r, PgRow> for AuditRow {
    fn from_row(row: &'r PgRow) -> Result<Self, sqlx::Error> {
        Ok(AuditRow {
            sequence: row.try_get("sequence")?,
            id: row.try_get("id")?,
            correlation_id: row.try_get("correlation_id")?,
            occurred_at: row.try_get("occurred_at")?,
            actor_subject: row.try_get("actor_subject")?,
            action: row.try_get("action")?,
            resource_id: row.try_get("resource_id")?,
            outcome: row.try_get("outcome")?,
            reason: row.try_get("reason")?,
        })
    }
}

impl TryFrom<AuditRow> for StoredAuditEntry {
    type Error = AuditError;

    fn try_from(row: AuditRow) -> Result<Self, Self::Error> {
        let entry = AuditEntry::restore(
            row.occurred_at,
            CorrelationId::from_uuid(row.correlation_id),
            row.actor_subject,
            row.action,
            row.resource_id,
            row.outcome.parse::<AuditOutcome>()?,
            row.reason,
        )?;

        Ok(StoredAuditEntry {
            id: AuditEntryId::from_uuid(row.id),
            sequence: row.sequence as u64,
            entry,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recent_entries_are_ordered_and_capped_in_sql() {
        let query = list_query(&AuditFilter::recent(50));
        let sql = query.sql();
        assert!(sql.contains("ORDER BY occurred_at DESC, sequence DESC"));
        assert!(sql.trim_end().ends_with("LIMIT $1"));
    }

    #[test]
    fn unbounded_listing_is_chronological() {
        let query = list_query(&AuditFilter::by_actor("u1"));
        let sql = query.sql();
        assert!(sql.contains("AND actor_subject = $1"));
        assert!(sql.contains("ORDER BY occurred_at ASC, sequence ASC"));
        assert!(!sql.contains("LIMIT"));
    }

    #[test]
    fn rows_map_back_to_entries() {
        let row = AuditRow {
            sequence: 42,
            id: uuid::Uuid::now_v7(),
            correlation_id: uuid::Uuid::now_v7(),
            occurred_at: Utc::now(),
            actor_subject: "u1".into(),
            action: "delete_task".into(),
            resource_id: Some("t1".into()),
            outcome: "denied".into(),
            reason: Some("not owner".into()),
        };

        let stored = StoredAuditEntry::try_from(row).unwrap();
        assert_eq!(stored.sequence, 42);
        assert_eq!(stored.entry.outcome(), AuditOutcome::Denied);
        assert_eq!(stored.entry.reason(), Some("not owner"));
    }

    #[test]
    fn unknown_outcome_is_a_storage_error() {
        let row = AuditRow {
            sequence: 1,
            id: uuid::Uuid::now_v7(),
            correlation_id: uuid::Uuid::now_v7(),
            occurred_at: Utc::now(),
            actor_subject: "u1".into(),
            action: "delete_task".into(),
            resource_id: None,
            outcome: "maybe".into(),
            reason: None,
        };

        assert!(matches!(StoredAuditEntry::try_from(row), Err(AuditError::Storage(_))));
    }

    #[test]
    fn schema_is_append_only() {
        assert!(SCHEMA.contains("BEFORE UPDATE OR DELETE ON audit_log"));
    }
}
