//! Configuration schema definitions for the command core.

use serde::{Deserialize, Serialize};

/// Main configuration structure for the Warden command core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Dispatch pipeline configuration.
    pub dispatch: DispatchConfig,
}

/// Configuration for the dispatch pipeline components.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Command registry configuration.
    pub registry: RegistryConfig,
    /// Permission manager configuration.
    pub permissions: PermissionConfig,
    /// Cooldown manager configuration.
    pub cooldowns: CooldownConfig,
    /// Executor configuration.
    pub executor: ExecutorConfig,
    /// Orchestrator configuration.
    pub manager: ManagerConfig,
}

/// Command registry configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of aliases a single command may declare.
    pub max_aliases_per_command: usize,
    /// Bounded registration-history log size.
    pub history_cap: usize,
}

/// Permission manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    /// Owner identity; always allowed. Zero means no owner is configured.
    pub owner_id: u64,
    /// Decision cache entry lifetime in seconds.
    pub cache_ttl_secs: u64,
    /// Interval between full decision-cache clears, in seconds.
    pub cache_sweep_secs: u64,
    /// Maximum audit log entries kept in memory.
    pub audit_cap: usize,
}

/// Cooldown manager configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CooldownConfig {
    /// Decision cache entry lifetime in milliseconds.
    pub cache_ttl_ms: u64,
    /// Interval between expired-record purges, in seconds.
    pub sweep_secs: u64,
    /// Ceiling on distinct tracked identities before least-recently-set
    /// eviction kicks in.
    pub tracked_identity_ceiling: usize,
}

/// Executor configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Handler timeout in milliseconds.
    pub timeout_ms: u64,
    /// Maximum retry attempts after a retryable failure.
    pub max_retries: u32,
    /// Bounded execution-history size.
    pub history_cap: usize,
    /// Execution records older than this are purged, in hours.
    pub retention_hours: u64,
    /// Active-execution entries older than this are presumed stale, in seconds.
    pub stale_active_secs: u64,
    /// Interval between history-retention and stale-active sweeps, in seconds.
    pub sweep_secs: u64,
}

/// Orchestrator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Prefix used when a scope has not set a custom one.
    pub default_prefix: String,
    /// Maximum accepted length for a custom prefix.
    pub max_prefix_len: usize,
    /// Interval between full prefix-cache clears, in seconds.
    pub prefix_cache_sweep_secs: u64,
}
