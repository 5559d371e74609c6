//! Append-only audit trail for permission decisions.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;
use warden_common::{GuildId, Timestamp, UserId};

/// How a decision was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecisionSource {
    /// Served from the decision cache.
    Cache,
    /// Evaluated through the full permission layering.
    Evaluated,
}

/// One permission decision.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique id for this entry.
    pub id: Uuid,
    /// When the decision was made.
    pub at: Timestamp,
    /// Who asked.
    pub user: UserId,
    /// For which command.
    pub command: String,
    /// In which scope.
    pub scope: GuildId,
    /// The outcome.
    pub allowed: bool,
    /// Cache hit or full evaluation.
    pub source: DecisionSource,
    /// Decision latency in microseconds.
    pub latency_us: u64,
    /// Why, when the layering alone does not explain it (owner bypass,
    /// capability source failure, agent gate).
    pub note: Option<String>,
}

/// Query filter for audit slices.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    /// Only entries for this user.
    pub user: Option<UserId>,
    /// Only entries for this command.
    pub command: Option<String>,
    /// Only entries in this scope.
    pub scope: Option<GuildId>,
    /// Only allowed (true) or denied (false) decisions.
    pub allowed: Option<bool>,
    /// At most this many entries.
    pub limit: Option<usize>,
}

impl AuditFilter {
    fn matches(&self, entry: &AuditEntry) -> bool {
        self.user.map_or(true, |u| entry.user == u)
            && self.command.as_deref().map_or(true, |c| entry.command == c)
            && self.scope.map_or(true, |s| entry.scope == s)
            && self.allowed.map_or(true, |a| entry.allowed == a)
    }
}

/// Audit counters for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditStats {
    /// Decisions recorded since startup, evictions included.
    pub total_recorded: u64,
    /// Denials since startup.
    pub denials: u64,
    /// Entries currently held.
    pub in_memory: usize,
    /// Configured cap.
    pub cap: usize,
}

/// Bounded FIFO audit log.
pub struct AuditLog {
    entries: RwLock<VecDeque<AuditEntry>>,
    cap: usize,
    total_recorded: AtomicU64,
    denials: AtomicU64,
}

impl AuditLog {
    /// Creates an empty log holding at most `cap` entries.
    pub fn new(cap: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(cap)),
            cap,
            total_recorded: AtomicU64::new(0),
            denials: AtomicU64::new(0),
        }
    }

    /// Appends a decision, evicting the oldest entry past the cap.
    pub async fn record(&self, entry: AuditEntry) {
        self.total_recorded.fetch_add(1, Ordering::Relaxed);
        if !entry.allowed {
            self.denials.fetch_add(1, Ordering::Relaxed);
        }

        debug!(
            user = %entry.user,
            command = %entry.command,
            scope = %entry.scope,
            allowed = entry.allowed,
            source = ?entry.source,
            "permission decision"
        );

        let mut entries = self.entries.write().await;
        while entries.len() >= self.cap {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Filtered slice, most recent first.
    pub async fn recent(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        let entries = self.entries.read().await;
        let limit = filter.limit.unwrap_or(entries.len());
        entries
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Number of entries currently held.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Whether the log is empty.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Counters for the dashboard.
    pub async fn stats(&self) -> AuditStats {
        AuditStats {
            total_recorded: self.total_recorded.load(Ordering::Relaxed),
            denials: self.denials.load(Ordering::Relaxed),
            in_memory: self.entries.read().await.len(),
            cap: self.cap,
        }
    }
}

/// Builds an entry with a fresh id and timestamp.
pub(crate) fn entry(
    user: UserId,
    command: &str,
    scope: GuildId,
    allowed: bool,
    source: DecisionSource,
    latency_us: u64,
    note: Option<String>,
) -> AuditEntry {
    AuditEntry {
        id: Uuid::new_v4(),
        at: Utc::now(),
        user,
        command: command.to_string(),
        scope,
        allowed,
        source,
        latency_us,
        note,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(user: u64, command: &str, allowed: bool) -> AuditEntry {
        entry(
            UserId::new(user),
            command,
            GuildId::new(1),
            allowed,
            DecisionSource::Evaluated,
            42,
            None,
        )
    }

    #[tokio::test]
    async fn test_cap_evicts_oldest() {
        let log = AuditLog::new(2);
        log.record(make_entry(1, "a", true)).await;
        log.record(make_entry(1, "b", true)).await;
        log.record(make_entry(1, "c", true)).await;

        let entries = log.recent(&AuditFilter::default()).await;
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].command, "c");
        assert_eq!(entries[1].command, "b");
    }

    #[tokio::test]
    async fn test_filters() {
        let log = AuditLog::new(10);
        log.record(make_entry(1, "ban", false)).await;
        log.record(make_entry(2, "ban", true)).await;
        log.record(make_entry(1, "kick", true)).await;

        let by_user = log
            .recent(&AuditFilter {
                user: Some(UserId::new(1)),
                ..AuditFilter::default()
            })
            .await;
        assert_eq!(by_user.len(), 2);

        let denials = log
            .recent(&AuditFilter {
                allowed: Some(false),
                ..AuditFilter::default()
            })
            .await;
        assert_eq!(denials.len(), 1);
        assert_eq!(denials[0].command, "ban");

        let limited = log
            .recent(&AuditFilter {
                limit: Some(1),
                ..AuditFilter::default()
            })
            .await;
        assert_eq!(limited.len(), 1);
    }

    #[tokio::test]
    async fn test_stats_count_evicted_entries() {
        let log = AuditLog::new(1);
        log.record(make_entry(1, "a", false)).await;
        log.record(make_entry(1, "b", true)).await;

        let stats = log.stats().await;
        assert_eq!(stats.total_recorded, 2);
        assert_eq!(stats.denials, 1);
        assert_eq!(stats.in_memory, 1);
    }
}
