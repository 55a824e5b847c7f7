use std::sync::RwLock;

use taskmgr_core::AuditEntryId;

use super::query::AuditFilter;
use super::r#trait::{AuditEntry, AuditError, AuditSink, StoredAuditEntry};

/// In-memory append-only audit sink.
///
/// Intended for tests/dev. Entries are lost on restart.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    entries: RwLock<Vec<StoredAuditEntry>>,
}

impl InMemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait::async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append(&self, entry: AuditEntry) -> Result<StoredAuditEntry, AuditError> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| AuditError::Storage("lock poisoned".to_string()))?;

        let sequence = entries.last().map(|e| e.sequence).unwrap_or(0) + 1;
        let stored = StoredAuditEntry {
            id: AuditEntryId::new(),
            sequence,
            entry,
        };
        entries.push(stored.clone());

        Ok(stored)
    }

    async fn list(&self, filter: &AuditFilter) -> Result<Vec<StoredAuditEntry>, AuditError> {
        let entries = self
            .entries
            .read()
            .map_err(|_| AuditError::Storage("lock poisoned".to_string()))?;

        let mut matching: Vec<StoredAuditEntry> = entries
            .iter()
            .filter(|e| filter.matches(&e.entry))
            .cloned()
            .collect();
        filter.arrange(&mut matching);

        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use taskmgr_auth::DenialReason;
    use taskmgr_core::CorrelationId;

    #[tokio::test]
    async fn sequences_increase_and_listing_is_chronological() {
        let sink = InMemoryAuditSink::new();
        let t0 = Utc::now();

        // Appended out of timestamp order.
        let late = sink
            .append(AuditEntry::allowed(t0 + Duration::seconds(5), CorrelationId::new(), "u1", "create_task", None))
            .await
            .unwrap();
        let early = sink
            .append(AuditEntry::allowed(t0, CorrelationId::new(), "u1", "update_task", None))
            .await
            .unwrap();
        let tie = sink
            .append(AuditEntry::allowed(t0, CorrelationId::new(), "u1", "delete_task", None))
            .await
            .unwrap();

        assert_eq!((late.sequence, early.sequence, tie.sequence), (1, 2, 3));

        let listed = sink.list(&AuditFilter::default()).await.unwrap();
        let actions: Vec<&str> = listed.iter().map(|e| e.entry.action()).collect();
        assert_eq!(actions, ["update_task", "delete_task", "create_task"]);
    }

    #[tokio::test]
    async fn denied_entries_are_kept_and_filterable() {
        let sink = InMemoryAuditSink::new();
        let now = Utc::now();

        sink.append(AuditEntry::allowed(now, CorrelationId::new(), "admin", "admin_delete_task", Some("t1".into())))
            .await
            .unwrap();
        sink.append(AuditEntry::denied(
            now,
            CorrelationId::new(),
            "u2",
            "admin_delete_task",
            Some("t1".into()),
            &DenialReason::NotOwner,
        ))
        .await
        .unwrap();

        assert_eq!(sink.len(), 2);
        let by_u2 = sink.list(&AuditFilter::by_actor("u2")).await.unwrap();
        assert_eq!(by_u2.len(), 1);
        assert_eq!(by_u2[0].entry.reason(), Some("not owner"));
    }

    #[tokio::test]
    async fn recent_listing_returns_only_the_latest() {
        let sink = InMemoryAuditSink::new();
        let t0 = Utc::now();
        for i in 0..10 {
            sink.append(AuditEntry::allowed(
                t0 + Duration::seconds(i),
                CorrelationId::new(),
                "u1",
                format!("action_{i}"),
                None,
            ))
            .await
            .unwrap();
        }

        let recent = sink.list(&AuditFilter::recent(3)).await.unwrap();
        let actions: Vec<&str> = recent.iter().map(|e| e.entry.action()).collect();
        assert_eq!(actions, ["action_9", "action_8", "action_7"]);

        let oldest = sink.list(&AuditFilter::by_actor("u1").limit(2)).await.unwrap();
        assert_eq!(oldest[0].entry.action(), "action_0");
        assert_eq!(oldest.len(), 2);
    }
}
