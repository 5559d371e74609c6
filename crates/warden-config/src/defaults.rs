//! Default values matching the constants the bot shipped with.

use crate::schema::*;

impl Default for Config {
    fn default() -> Self {
        Self {
            dispatch: DispatchConfig::default(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            registry: RegistryConfig::default(),
            permissions: PermissionConfig::default(),
            cooldowns: CooldownConfig::default(),
            executor: ExecutorConfig::default(),
            manager: ManagerConfig::default(),
        }
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_aliases_per_command: 5,
            history_cap: 200,
        }
    }
}

impl Default for PermissionConfig {
    fn default() -> Self {
        Self {
            owner_id: 0,
            cache_ttl_secs: 300,
            cache_sweep_secs: 300,
            audit_cap: 1000,
        }
    }
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            cache_ttl_ms: 2000,
            sweep_secs: 60,
            tracked_identity_ceiling: 10_000,
        }
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_retries: 1,
            history_cap: 1000,
            retention_hours: 24,
            stale_active_secs: 300,
            sweep_secs: 3600,
        }
    }
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            default_prefix: "!".to_string(),
            max_prefix_len: 5,
            prefix_cache_sweep_secs: 600,
        }
    }
}
