//! Consolidated periodic maintenance for the pipeline.
//!
//! All recurring cleanup lives here so cadence and ordering are visible in
//! one place: permission decision-cache clears, cooldown purges and identity
//! eviction, executor history retention and stale-active cleanup, prefix
//! cache clears. Every job is idempotent and safe to run at any point
//! between pipeline steps.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::manager::CommandManager;

/// Owns the background maintenance tasks.
pub struct Sweeper {
    cancel: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

impl Sweeper {
    /// Spawns the maintenance jobs for a manager's components.
    pub fn start(manager: Arc<CommandManager>) -> Self {
        let cancel = CancellationToken::new();
        let config = manager.config().clone();
        let mut tasks = Vec::new();

        tasks.push(spawn_job(
            "permission-cache-clear",
            Duration::from_secs(config.permissions.cache_sweep_secs),
            cancel.clone(),
            {
                let manager = Arc::clone(&manager);
                move || manager.permissions().clear_decision_cache()
            },
        ));

        tasks.push(spawn_job(
            "cooldown-purge",
            Duration::from_secs(config.cooldowns.sweep_secs),
            cancel.clone(),
            {
                let manager = Arc::clone(&manager);
                move || {
                    manager.cooldowns().purge_expired();
                    manager.cooldowns().evict_over_ceiling();
                }
            },
        ));

        tasks.push(spawn_job(
            "executor-maintenance",
            Duration::from_secs(config.executor.sweep_secs),
            cancel.clone(),
            {
                let manager = Arc::clone(&manager);
                move || {
                    manager.executor().purge_history();
                    manager.executor().cleanup_stale_active();
                }
            },
        ));

        tasks.push(spawn_job(
            "prefix-cache-clear",
            Duration::from_secs(config.manager.prefix_cache_sweep_secs),
            cancel.clone(),
            {
                let manager = Arc::clone(&manager);
                move || manager.clear_prefix_cache()
            },
        ));

        info!(jobs = tasks.len(), "maintenance sweeper started");
        Self { cancel, tasks }
    }

    /// Number of running jobs.
    pub fn job_count(&self) -> usize {
        self.tasks.len()
    }

    /// Stops all jobs. Idempotent.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Whether shutdown has been requested.
    pub fn is_shutdown(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.cancel.cancel();
        for task in &self.tasks {
            task.abort();
        }
    }
}

fn spawn_job<F>(
    name: &'static str,
    every: Duration,
    cancel: CancellationToken,
    mut job: F,
) -> JoinHandle<()>
where
    F: FnMut() + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; consume it so the job only runs
        // after a full period.
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(job = name, "maintenance job stopped");
                    break;
                }
                _ = ticker.tick() => {
                    debug!(job = name, "maintenance job tick");
                    job();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::CapabilitySource;
    use async_trait::async_trait;
    use warden_common::{Capabilities, GuildId, RoleId, UserId};
    use warden_config::DispatchConfig;

    struct OpenCapabilitySource;

    #[async_trait]
    impl CapabilitySource for OpenCapabilitySource {
        async fn member_capabilities(
            &self,
            _scope: GuildId,
            _member: UserId,
        ) -> warden_common::Result<Capabilities> {
            Ok(Capabilities::empty())
        }

        async fn member_roles(
            &self,
            _scope: GuildId,
            _member: UserId,
        ) -> warden_common::Result<Vec<RoleId>> {
            Ok(Vec::new())
        }

        async fn agent_capabilities(
            &self,
            _scope: GuildId,
        ) -> warden_common::Result<Capabilities> {
            Ok(Capabilities::all())
        }
    }

    fn fast_config() -> DispatchConfig {
        let mut config = DispatchConfig::default();
        config.permissions.cache_sweep_secs = 1;
        config.cooldowns.sweep_secs = 1;
        config.executor.sweep_secs = 1;
        config.manager.prefix_cache_sweep_secs = 1;
        config
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeps_run_and_clear_caches() {
        let manager = Arc::new(CommandManager::new(
            fast_config(),
            Arc::new(OpenCapabilitySource),
        ));
        // Prime the prefix cache and an expired cooldown record.
        manager.server_prefix(GuildId::new(10));
        manager
            .cooldowns()
            .set_cooldown(UserId::new(1), "ping", 0);

        let sweeper = Sweeper::start(Arc::clone(&manager));
        assert_eq!(sweeper.job_count(), 4);

        tokio::time::sleep(Duration::from_millis(2500)).await;

        let stats = manager.stats().await;
        assert_eq!(stats.manager.cached_prefixes, 0);
        assert_eq!(stats.cooldowns.identity_records, 0);

        sweeper.shutdown();
        sweeper.shutdown();
        assert!(sweeper.is_shutdown());
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_jobs() {
        let manager = Arc::new(CommandManager::new(
            fast_config(),
            Arc::new(OpenCapabilitySource),
        ));
        let sweeper = Sweeper::start(Arc::clone(&manager));
        sweeper.shutdown();

        // After shutdown, sweeps no longer run: a primed prefix cache stays.
        tokio::time::sleep(Duration::from_millis(50)).await;
        manager.server_prefix(GuildId::new(10));
        tokio::time::sleep(Duration::from_millis(2500)).await;

        let stats = manager.stats().await;
        assert_eq!(stats.manager.cached_prefixes, 1);
    }
}
