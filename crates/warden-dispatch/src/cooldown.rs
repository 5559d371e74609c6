//! Per-identity and per-command-global rate limiting.
//!
//! A check consults the global window first, then the identity window.
//! Verdicts are cached per (identity, command) with a short TTL; mutations
//! invalidate exactly the affected entries. Internal failures allow the
//! invocation (fail-open) — availability is preferred over strict throttling
//! here, which makes this the wrong place to gate abuse-sensitive commands
//! on its own.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_common::{Result, Timestamp, UserId, WardenError};
use warden_config::CooldownConfig;

/// Which window produced a denial.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CooldownKind {
    /// The invoker's own window for the command.
    Identity,
    /// The command-wide window; denies every identity.
    Global,
}

/// An active per-identity cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownRecord {
    /// The throttled identity.
    pub user: UserId,
    /// The command.
    pub command: String,
    /// When the window was set.
    pub set_at: Timestamp,
    /// When it ends. Always >= `set_at`.
    pub expires_at: Timestamp,
    /// Window length in milliseconds.
    pub duration_ms: u64,
}

/// An active command-wide cooldown window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalCooldownRecord {
    /// The command.
    pub command: String,
    /// When the window was set.
    pub set_at: Timestamp,
    /// When it ends.
    pub expires_at: Timestamp,
    /// Window length in milliseconds.
    pub duration_ms: u64,
}

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownVerdict {
    /// Whether the invocation may proceed.
    pub allowed: bool,
    /// Milliseconds until the blocking window ends; 0 when allowed.
    pub remaining_ms: u64,
    /// Which window denied, when one did.
    pub kind: Option<CooldownKind>,
}

impl CooldownVerdict {
    fn allowed() -> Self {
        Self {
            allowed: true,
            remaining_ms: 0,
            kind: None,
        }
    }

    fn denied(remaining_ms: u64, kind: CooldownKind) -> Self {
        Self {
            allowed: false,
            remaining_ms,
            kind: Some(kind),
        }
    }
}

#[derive(Debug, Clone)]
struct CachedVerdict {
    kind: Option<CooldownKind>,
    expires_at: Option<Timestamp>,
    cached_at: Instant,
}

/// Cooldown counters for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CooldownStats {
    /// Active per-identity windows.
    pub identity_records: usize,
    /// Active global windows.
    pub global_records: usize,
    /// Commands with a configured global duration.
    pub configured_globals: usize,
    /// Distinct identities currently tracked.
    pub tracked_identities: usize,
    /// Decision cache hits since startup.
    pub cache_hits: u64,
    /// Decision cache misses since startup.
    pub cache_misses: u64,
    /// Cache hit rate as a percentage.
    pub cache_hit_rate: f64,
}

/// Enforces per-identity and global command rate limits.
pub struct CooldownManager {
    records: DashMap<(UserId, String), CooldownRecord>,
    global_durations: DashMap<String, u64>,
    global_records: DashMap<String, GlobalCooldownRecord>,
    cache: DashMap<(UserId, String), CachedVerdict>,
    cache_ttl: Duration,
    last_set: DashMap<UserId, Timestamp>,
    identity_ceiling: usize,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl CooldownManager {
    /// Creates an empty manager.
    pub fn new(config: &CooldownConfig) -> Self {
        Self {
            records: DashMap::new(),
            global_durations: DashMap::new(),
            global_records: DashMap::new(),
            cache: DashMap::new(),
            cache_ttl: Duration::from_millis(config.cache_ttl_ms),
            last_set: DashMap::new(),
            identity_ceiling: config.tracked_identity_ceiling,
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Checks whether `user` may run `command` now.
    ///
    /// `duration_ms` is the command's configured per-identity window; 0 skips
    /// the identity check entirely (the global window still applies).
    pub fn check(&self, user: UserId, command: &str, duration_ms: u64) -> CooldownVerdict {
        match self.evaluate(user, command, duration_ms) {
            Ok(verdict) => verdict,
            Err(e) => {
                // Fail-open: a broken throttle should not take commands down.
                warn!(%user, command, error = %e, "cooldown check failed, allowing");
                CooldownVerdict::allowed()
            }
        }
    }

    fn evaluate(&self, user: UserId, command: &str, duration_ms: u64) -> Result<CooldownVerdict> {
        let now = Utc::now();
        let key = (user, command.to_string());

        if let Some(cached) = self.cache.get(&key) {
            if cached.cached_at.elapsed() < self.cache_ttl {
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                return Ok(match (cached.kind, cached.expires_at) {
                    // Remaining time is re-derived so a cached denial never
                    // reports a stale wait or outlives its window.
                    (Some(kind), Some(expires_at)) if expires_at > now => {
                        CooldownVerdict::denied(remaining_ms(expires_at, now)?, kind)
                    }
                    _ => CooldownVerdict::allowed(),
                });
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        // Global window wins over any identity record.
        if let Some(global) = self.global_records.get(command) {
            if global.expires_at > now {
                let verdict =
                    CooldownVerdict::denied(remaining_ms(global.expires_at, now)?, CooldownKind::Global);
                self.cache_verdict(key, Some(CooldownKind::Global), Some(global.expires_at));
                return Ok(verdict);
            }
        }

        if duration_ms > 0 {
            if let Some(record) = self.records.get(&key) {
                if record.expires_at > now {
                    let verdict = CooldownVerdict::denied(
                        remaining_ms(record.expires_at, now)?,
                        CooldownKind::Identity,
                    );
                    let expires_at = record.expires_at;
                    drop(record);
                    self.cache_verdict(key, Some(CooldownKind::Identity), Some(expires_at));
                    return Ok(verdict);
                }
            }
        }

        self.cache_verdict(key, None, None);
        Ok(CooldownVerdict::allowed())
    }

    /// Starts (or restarts) a per-identity window.
    pub fn set_cooldown(&self, user: UserId, command: &str, duration_ms: u64) {
        let now = Utc::now();
        let record = CooldownRecord {
            user,
            command: command.to_string(),
            set_at: now,
            expires_at: now + chrono::Duration::milliseconds(duration_ms as i64),
            duration_ms,
        };
        self.records.insert((user, command.to_string()), record);
        self.last_set.insert(user, now);
        self.cache.remove(&(user, command.to_string()));
        debug!(%user, command, duration_ms, "cooldown set");
    }

    /// Configures a command-wide window length. The window itself starts on
    /// the next committed execution.
    pub fn set_global_cooldown(&self, command: &str, duration_ms: u64) {
        if duration_ms == 0 {
            self.global_durations.remove(command);
            self.global_records.remove(command);
        } else {
            self.global_durations.insert(command.to_string(), duration_ms);
        }
        self.invalidate_command(command);
        debug!(command, duration_ms, "global cooldown configured");
    }

    /// Applies the windows for a successful execution: the identity window
    /// when the command has one, and the global window when configured.
    pub fn commit(&self, user: UserId, command: &str, duration_ms: u64) {
        if duration_ms > 0 {
            self.set_cooldown(user, command, duration_ms);
        }
        if let Some(global_ms) = self.global_durations.get(command).map(|d| *d) {
            let now = Utc::now();
            self.global_records.insert(
                command.to_string(),
                GlobalCooldownRecord {
                    command: command.to_string(),
                    set_at: now,
                    expires_at: now + chrono::Duration::milliseconds(global_ms as i64),
                    duration_ms: global_ms,
                },
            );
            self.invalidate_command(command);
        }
    }

    /// Removes an identity window.
    pub fn remove_cooldown(&self, user: UserId, command: &str) -> Result<()> {
        let key = (user, command.to_string());
        if self.records.remove(&key).is_none() {
            return Err(WardenError::not_found(format!(
                "no cooldown for '{command}' on that user"
            )));
        }
        self.cache.remove(&key);
        Ok(())
    }

    /// Active windows for an identity.
    pub fn identity_cooldowns(&self, user: UserId) -> Vec<CooldownRecord> {
        let now = Utc::now();
        self.records
            .iter()
            .filter(|entry| entry.key().0 == user && entry.expires_at > now)
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Drops expired windows and stale cache entries. Periodic sweep entry
    /// point; safe to run at any time.
    pub fn purge_expired(&self) {
        let now = Utc::now();
        let before = self.records.len() + self.global_records.len();
        self.records.retain(|_, record| record.expires_at > now);
        self.global_records.retain(|_, record| record.expires_at > now);
        self.cache
            .retain(|_, cached| cached.cached_at.elapsed() < self.cache_ttl);
        let after = self.records.len() + self.global_records.len();
        if before != after {
            debug!(purged = before - after, "expired cooldowns purged");
        }
    }

    /// Evicts the least-recently-set identities once the tracked count
    /// exceeds the ceiling. Bounds growth under high distinct-user traffic.
    pub fn evict_over_ceiling(&self) {
        let tracked = self.last_set.len();
        if tracked <= self.identity_ceiling {
            return;
        }

        let mut by_age: Vec<(UserId, Timestamp)> = self
            .last_set
            .iter()
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        by_age.sort_by_key(|(_, set_at)| *set_at);

        let excess = tracked - self.identity_ceiling;
        for (user, _) in by_age.into_iter().take(excess) {
            self.last_set.remove(&user);
            self.records.retain(|(owner, _), _| *owner != user);
            self.cache.retain(|(owner, _), _| *owner != user);
        }
        warn!(evicted = excess, "identity ceiling exceeded, oldest cooldown state evicted");
    }

    /// Counters for the dashboard.
    pub fn stats(&self) -> CooldownStats {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        CooldownStats {
            identity_records: self.records.len(),
            global_records: self.global_records.len(),
            configured_globals: self.global_durations.len(),
            tracked_identities: self.last_set.len(),
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
        }
    }

    fn cache_verdict(
        &self,
        key: (UserId, String),
        kind: Option<CooldownKind>,
        expires_at: Option<Timestamp>,
    ) {
        self.cache.insert(
            key,
            CachedVerdict {
                kind,
                expires_at,
                cached_at: Instant::now(),
            },
        );
    }

    fn invalidate_command(&self, command: &str) {
        self.cache.retain(|(_, cached_command), _| cached_command != command);
    }
}

fn remaining_ms(expires_at: Timestamp, now: Timestamp) -> Result<u64> {
    let millis = (expires_at - now).num_milliseconds();
    u64::try_from(millis)
        .map_err(|_| WardenError::execution("cooldown window ends in the past"))
}
