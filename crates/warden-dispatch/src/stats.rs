//! Aggregate statistics snapshot exposed to the dashboard.

use serde::{Deserialize, Serialize};
use warden_common::{Result, Timestamp};

use crate::audit::AuditStats;
use crate::cooldown::CooldownStats;
use crate::executor::ExecutorStats;
use crate::permissions::PermissionStats;
use crate::registry::RegistryStats;

/// Orchestrator counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerStats {
    /// Invocations that entered the pipeline and produced a response or a
    /// dispatch.
    pub handled: u64,
    /// Invocations ignored (bot sender, missing prefix, unresolved name).
    pub ignored: u64,
    /// Pipeline stops at the permission stage.
    pub denied_permission: u64,
    /// Pipeline stops at the cooldown stage.
    pub denied_cooldown: u64,
    /// Commands refused because their category is disabled.
    pub unavailable: u64,
    /// Dispatches that succeeded.
    pub succeeded: u64,
    /// Dispatches that failed.
    pub failed: u64,
    /// Mean dispatch duration in milliseconds.
    pub avg_duration_ms: f64,
    /// Scopes with a cached prefix resolution.
    pub cached_prefixes: usize,
}

/// One snapshot across all pipeline components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchStats {
    /// When the snapshot was taken.
    pub generated_at: Timestamp,
    /// Orchestrator counters.
    pub manager: ManagerStats,
    /// Registry counters.
    pub registry: RegistryStats,
    /// Permission counters.
    pub permissions: PermissionStats,
    /// Cooldown counters.
    pub cooldowns: CooldownStats,
    /// Executor counters.
    pub executor: ExecutorStats,
    /// Audit log counters.
    pub audit: AuditStats,
}

impl DispatchStats {
    /// Pretty JSON export for the dashboard.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
