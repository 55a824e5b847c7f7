use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use taskmgr_auth::{Decision, DenialReason};
use taskmgr_core::{AuditEntryId, CorrelationId};

use super::query::AuditFilter;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Allowed,
    Denied,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allowed => "allowed",
            Self::Denied => "denied",
        }
    }
}

impl core::str::FromStr for AuditOutcome {
    type Err = AuditError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "allowed" => Ok(Self::Allowed),
            "denied" => Ok(Self::Denied),
            other => Err(AuditError::Storage(format!("unknown audit outcome '{other}'"))),
        }
    }
}

/// One authorization decision about a privileged or state-changing action.
///
/// Fields are private: the constructors guarantee that `reason` is present
/// exactly when the outcome is `Denied`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    timestamp: DateTime<Utc>,
    correlation_id: CorrelationId,
    actor_subject: String,
    action: String,
    resource_id: Option<String>,
    outcome: AuditOutcome,
    reason: Option<String>,
}

impl AuditEntry {
    pub fn allowed(
        timestamp: DateTime<Utc>,
        correlation_id: CorrelationId,
        actor_subject: impl Into<String>,
        action: impl Into<String>,
        resource_id: Option<String>,
    ) -> Self {
        Self {
            timestamp,
            correlation_id,
            actor_subject: actor_subject.into(),
            action: action.into(),
            resource_id,
            outcome: AuditOutcome::Allowed,
            reason: None,
        }
    }

    pub fn denied(
        timestamp: DateTime<Utc>,
        correlation_id: CorrelationId,
        actor_subject: impl Into<String>,
        action: impl Into<String>,
        resource_id: Option<String>,
        reason: &DenialReason,
    ) -> Self {
        Self {
            timestamp,
            correlation_id,
            actor_subject: actor_subject.into(),
            action: action.into(),
            resource_id,
            outcome: AuditOutcome::Denied,
            reason: Some(reason.to_string()),
        }
    }

    /// Build the entry matching a gate decision.
    pub fn for_decision(
        decision: &Decision,
        timestamp: DateTime<Utc>,
        correlation_id: CorrelationId,
        actor_subject: impl Into<String>,
        action: impl Into<String>,
        resource_id: Option<String>,
    ) -> Self {
        match decision.denial_reason() {
            None => Self::allowed(timestamp, correlation_id, actor_subject, action, resource_id),
            Some(reason) => Self::denied(
                timestamp,
                correlation_id,
                actor_subject,
                action,
                resource_id,
                reason,
            ),
        }
    }

    /// Rebuild an entry read back from storage. Rejects rows whose reason
    /// does not agree with their outcome.
    pub(crate) fn restore(
        timestamp: DateTime<Utc>,
        correlation_id: CorrelationId,
        actor_subject: String,
        action: String,
        resource_id: Option<String>,
        outcome: AuditOutcome,
        reason: Option<String>,
    ) -> Result<Self, AuditError> {
        if (outcome == AuditOutcome::Denied) != reason.is_some() {
            return Err(AuditError::Storage(format!(
                "audit row with outcome '{}' has inconsistent reason",
                outcome.as_str()
            )));
        }
        Ok(Self {
            timestamp,
            correlation_id,
            actor_subject,
            action,
            resource_id,
            outcome,
            reason,
        })
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn correlation_id(&self) -> CorrelationId {
        self.correlation_id
    }

    pub fn actor_subject(&self) -> &str {
        &self.actor_subject
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn resource_id(&self) -> Option<&str> {
        self.resource_id.as_deref()
    }

    pub fn outcome(&self) -> AuditOutcome {
        self.outcome
    }

    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// An entry after the sink accepted it.
///
/// `sequence` is assigned by the sink and strictly increases in append order;
/// it breaks ties between entries with equal timestamps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredAuditEntry {
    pub id: AuditEntryId,
    pub sequence: u64,
    #[serde(flatten)]
    pub entry: AuditEntry,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuditError {
    /// The log could not accept or serve the request in time. Mutating
    /// actions must not proceed.
    #[error("audit log unavailable: {0}")]
    Unavailable(String),

    #[error("audit storage error: {0}")]
    Storage(String),
}

/// Append-only store of audit entries.
///
/// Implementations never update or delete entries. `list` returns entries
/// ascending by `(timestamp, sequence)`.
#[async_trait::async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: AuditEntry) -> Result<StoredAuditEntry, AuditError>;

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<StoredAuditEntry>, AuditError>;
}

#[async_trait::async_trait]
impl<S> AuditSink for Arc<S>
where
    S: AuditSink + ?Sized,
{
    async fn append(&self, entry: AuditEntry) -> Result<StoredAuditEntry, AuditError> {
        (**self).append(entry).await
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<StoredAuditEntry>, AuditError> {
        (**self).list(filter).await
    }
}
