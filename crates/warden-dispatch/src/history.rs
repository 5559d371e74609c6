//! Bounded execution history.

use std::collections::VecDeque;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;
use warden_common::{ExecutionId, GuildId, Timestamp, UserId};

/// Coarse classification of an execution failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    /// The handler did not settle within the timeout.
    Timeout,
    /// The handler returned an error.
    Handler,
    /// The handler panicked.
    Panic,
    /// The invocation or the handler's result was malformed.
    Validation,
}

/// Error descriptor attached to a failed execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDescriptor {
    /// Failure classification.
    pub kind: FailureKind,
    /// Internal message, for the dashboard and logs only.
    pub message: String,
}

/// One finished execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique execution id.
    pub id: ExecutionId,
    /// Canonical command name.
    pub command: String,
    /// Who invoked it.
    pub user: UserId,
    /// Where it ran.
    pub scope: GuildId,
    /// When the first attempt started.
    pub started_at: Timestamp,
    /// Wall time across all attempts, in milliseconds.
    pub duration_ms: u64,
    /// Whether it ultimately succeeded.
    pub success: bool,
    /// Attempts made (1 = no retry).
    pub attempts: u32,
    /// Set when `success` is false.
    pub error: Option<ErrorDescriptor>,
}

/// Query filter for history slices.
#[derive(Debug, Clone, Default)]
pub struct HistoryFilter {
    /// Only records for this command.
    pub command: Option<String>,
    /// Only records for this invoker.
    pub user: Option<UserId>,
    /// Only records in this scope.
    pub scope: Option<GuildId>,
    /// Only successes (true) or failures (false).
    pub success: Option<bool>,
    /// At most this many records.
    pub limit: Option<usize>,
}

impl HistoryFilter {
    fn matches(&self, record: &ExecutionRecord) -> bool {
        self.command.as_deref().map_or(true, |c| record.command == c)
            && self.user.map_or(true, |u| record.user == u)
            && self.scope.map_or(true, |s| record.scope == s)
            && self.success.map_or(true, |s| record.success == s)
    }
}

/// Bounded FIFO store of execution records.
pub struct ExecutionHistory {
    records: RwLock<VecDeque<ExecutionRecord>>,
    cap: usize,
}

impl ExecutionHistory {
    /// Creates an empty history holding at most `cap` records.
    pub fn new(cap: usize) -> Self {
        Self {
            records: RwLock::new(VecDeque::with_capacity(cap)),
            cap,
        }
    }

    /// Appends a record, evicting the oldest past the cap.
    pub fn push(&self, record: ExecutionRecord) {
        let mut records = self.records.write();
        while records.len() >= self.cap {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Filtered slice, most recent first.
    pub fn recent(&self, filter: &HistoryFilter) -> Vec<ExecutionRecord> {
        let records = self.records.read();
        let limit = filter.limit.unwrap_or(records.len());
        records
            .iter()
            .rev()
            .filter(|record| filter.matches(record))
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drops records that started before `cutoff`. Returns how many went.
    pub fn purge_older_than(&self, cutoff: Timestamp) -> usize {
        let mut records = self.records.write();
        let before = records.len();
        records.retain(|record| record.started_at >= cutoff);
        let purged = before - records.len();
        if purged > 0 {
            debug!(purged, "execution records past retention purged");
        }
        purged
    }

    /// Number of records currently held.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Whether the history is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
