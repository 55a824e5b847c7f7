//! Filter criteria for reading the audit trail back.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::r#trait::{AuditEntry, StoredAuditEntry};

/// All criteria are optional and combine with AND. The time range is
/// half-open: `from` inclusive, `to` exclusive.
///
/// Results are ordered by `(timestamp, sequence)`, oldest first unless
/// `newest_first` is set. `limit` applies after ordering, so
/// `AuditFilter::recent(n)` yields the latest `n` entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditFilter {
    /// Exact actor subject (e.g. `local-dev@local.test`).
    pub actor: Option<String>,
    /// Exact action name (e.g. `delete_task`).
    pub action: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub newest_first: bool,
}

impl AuditFilter {
    pub fn by_actor(actor: impl Into<String>) -> Self {
        Self {
            actor: Some(actor.into()),
            ..Default::default()
        }
    }

    pub fn by_action(action: impl Into<String>) -> Self {
        Self {
            action: Some(action.into()),
            ..Default::default()
        }
    }

    /// The latest `limit` entries, newest first.
    pub fn recent(limit: usize) -> Self {
        Self::default().newest_first().limit(limit)
    }

    pub fn newest_first(mut self) -> Self {
        self.newest_first = true;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Order and cap an already-matched result set.
    pub fn arrange(&self, entries: &mut Vec<StoredAuditEntry>) {
        entries.sort_by_key(|e| (e.entry.timestamp(), e.sequence));
        if self.newest_first {
            entries.reverse();
        }
        if let Some(limit) = self.limit {
            entries.truncate(limit);
        }
    }

    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(actor) = &self.actor {
            if entry.actor_subject() != actor {
                return false;
            }
        }
        if let Some(action) = &self.action {
            if entry.action() != action {
                return false;
            }
        }
        if let Some(from) = self.from {
            if entry.timestamp() < from {
                return false;
            }
        }
        if let Some(to) = self.to {
            if entry.timestamp() >= to {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taskmgr_core::{AuditEntryId, CorrelationId};

    fn entry(actor: &str, action: &str, at: DateTime<Utc>) -> AuditEntry {
        AuditEntry::allowed(at, CorrelationId::new(), actor, action, None)
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(AuditFilter::default().matches(&entry("u1", "create_task", Utc::now())));
    }

    #[test]
    fn criteria_combine() {
        let now = Utc::now();
        let filter = AuditFilter {
            actor: Some("u1".into()),
            action: Some("delete_task".into()),
            ..Default::default()
        };

        assert!(filter.matches(&entry("u1", "delete_task", now)));
        assert!(!filter.matches(&entry("u2", "delete_task", now)));
        assert!(!filter.matches(&entry("u1", "create_task", now)));
    }

    #[test]
    fn range_is_half_open() {
        let t0 = Utc::now();
        let filter = AuditFilter {
            from: Some(t0),
            to: Some(t0 + Duration::seconds(10)),
            ..Default::default()
        };

        assert!(!filter.matches(&entry("u", "a", t0 - Duration::milliseconds(1))));
        assert!(filter.matches(&entry("u", "a", t0)));
        assert!(filter.matches(&entry("u", "a", t0 + Duration::seconds(9))));
        assert!(!filter.matches(&entry("u", "a", t0 + Duration::seconds(10))));
    }

    #[test]
    fn recent_keeps_the_latest_entries_newest_first() {
        let t0 = Utc::now();
        let mut entries: Vec<StoredAuditEntry> = (0..5u64)
            .map(|i| StoredAuditEntry {
                id: AuditEntryId::new(),
                sequence: i + 1,
                entry: entry("u", "a", t0 + Duration::seconds(i as i64)),
            })
            .rev()
            .collect();

        AuditFilter::recent(2).arrange(&mut entries);

        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![5, 4]);
    }

    #[test]
    fn default_arrangement_is_oldest_first_and_uncapped() {
        let t0 = Utc::now();
        let mut entries: Vec<StoredAuditEntry> = (0..3u64)
            .map(|i| StoredAuditEntry {
                id: AuditEntryId::new(),
                sequence: 3 - i,
                entry: entry("u", "a", t0 - Duration::seconds(i as i64)),
            })
            .collect();

        AuditFilter::default().arrange(&mut entries);

        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence).collect();
        assert_eq!(sequences, vec![1, 2, 3]);
    }
}
