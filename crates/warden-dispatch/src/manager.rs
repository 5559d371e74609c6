//! The orchestrator: prefix resolution, parsing, and pipeline sequencing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_common::{GuildId, Result, RoleId, Timestamp, UserId, WardenError};
use warden_config::DispatchConfig;

use crate::audit::{AuditEntry, AuditFilter};
use crate::context::{CapabilitySource, InvocationContext};
use crate::cooldown::CooldownManager;
use crate::executor::CommandExecutor;
use crate::history::{ExecutionRecord, HistoryFilter};
use crate::permissions::PermissionManager;
use crate::registry::{CommandDescriptor, CommandRegistry};
use crate::stats::{DispatchStats, ManagerStats};

/// Flattened descriptor view for the command-management screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandSummary {
    /// Canonical name.
    pub name: String,
    /// Description.
    pub description: String,
    /// Category name.
    pub category: String,
    /// Whether the category is enabled.
    pub enabled: bool,
    /// Aliases.
    pub aliases: Vec<String>,
    /// Per-identity cooldown in milliseconds.
    pub cooldown_ms: u64,
    /// Successful dispatches.
    pub usage_count: u64,
    /// Last successful dispatch.
    pub last_used: Option<Timestamp>,
    /// Scope-specific grants on this command.
    pub scope_grants: usize,
}

#[derive(Debug, Default)]
struct ManagerCounters {
    handled: AtomicU64,
    ignored: AtomicU64,
    denied_permission: AtomicU64,
    denied_cooldown: AtomicU64,
    unavailable: AtomicU64,
    succeeded: AtomicU64,
    failed: AtomicU64,
    dispatch_count: AtomicU64,
    dispatch_sum_ms: AtomicU64,
}

/// Sequences an invocation through resolve, authorize, throttle, and
/// dispatch, and carries the administrative surface for the dashboard.
pub struct CommandManager {
    config: DispatchConfig,
    registry: Arc<CommandRegistry>,
    permissions: Arc<PermissionManager>,
    cooldowns: Arc<CooldownManager>,
    executor: Arc<CommandExecutor>,
    /// Custom prefixes set at runtime. In-memory only: they do not survive a
    /// restart until a durable settings store exists.
    prefixes: DashMap<GuildId, String>,
    /// Per-scope resolution cache in front of the (future) settings store.
    prefix_cache: DashMap<GuildId, String>,
    counters: ManagerCounters,
}

impl CommandManager {
    /// Wires the pipeline components together.
    pub fn new(config: DispatchConfig, capabilities: Arc<dyn CapabilitySource>) -> Self {
        let registry = Arc::new(CommandRegistry::new(&config.registry));
        let permissions = Arc::new(PermissionManager::new(&config.permissions, capabilities));
        let cooldowns = Arc::new(CooldownManager::new(&config.cooldowns));
        let executor = Arc::new(CommandExecutor::new(&config.executor));
        Self {
            config,
            registry,
            permissions,
            cooldowns,
            executor,
            prefixes: DashMap::new(),
            prefix_cache: DashMap::new(),
            counters: ManagerCounters::default(),
        }
    }

    /// Runs one inbound action through the pipeline.
    ///
    /// Returns `false` when the action was ignored (bot sender, missing
    /// prefix, unresolved name) and `true` when it produced a response or a
    /// dispatch.
    pub async fn execute_command(&self, ctx: Arc<dyn InvocationContext>) -> bool {
        if ctx.sender_is_bot() {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let scope = ctx.scope();
        let prefix = self.server_prefix(scope);
        let Some(line) = ctx.content().strip_prefix(prefix.as_str()) else {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let mut tokens = line.split_whitespace();
        let Some(first) = tokens.next() else {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            return false;
        };
        let requested = first.to_lowercase();

        let Some(descriptor) = self.registry.get(&requested) else {
            self.counters.ignored.fetch_add(1, Ordering::Relaxed);
            debug!(requested = %requested, %scope, "unresolved command ignored");
            return false;
        };
        let args: Vec<String> = tokens.map(str::to_string).collect();

        self.counters.handled.fetch_add(1, Ordering::Relaxed);

        if let Some(category) = self.registry.category(descriptor.category()) {
            if !category.enabled {
                self.counters.unavailable.fetch_add(1, Ordering::Relaxed);
                self.respond(&ctx, "This command is currently unavailable.").await;
                return true;
            }
        }

        if !self
            .permissions
            .check(ctx.sender(), &descriptor, scope)
            .await
        {
            self.counters.denied_permission.fetch_add(1, Ordering::Relaxed);
            let denial = WardenError::permission_denied(descriptor.name().to_string());
            self.respond(&ctx, &denial.user_message()).await;
            return true;
        }

        let verdict = self
            .cooldowns
            .check(ctx.sender(), descriptor.name(), descriptor.cooldown_ms());
        if !verdict.allowed {
            self.counters.denied_cooldown.fetch_add(1, Ordering::Relaxed);
            let denial = WardenError::CooldownActive {
                command: descriptor.name().to_string(),
                remaining_ms: verdict.remaining_ms,
                global: verdict.kind == Some(crate::cooldown::CooldownKind::Global),
            };
            self.respond(&ctx, &denial.user_message()).await;
            return true;
        }

        let started = Instant::now();
        let success = self
            .executor
            .execute(Arc::clone(&ctx), &descriptor, args)
            .await;
        let elapsed_ms = started.elapsed().as_millis().min(u128::from(u64::MAX)) as u64;

        if success {
            self.cooldowns
                .commit(ctx.sender(), descriptor.name(), descriptor.cooldown_ms());
            descriptor.touch();
            self.counters.succeeded.fetch_add(1, Ordering::Relaxed);
        } else {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.dispatch_count.fetch_add(1, Ordering::Relaxed);
        self.counters
            .dispatch_sum_ms
            .fetch_add(elapsed_ms, Ordering::Relaxed);

        true
    }

    /// The active prefix for a scope.
    pub fn server_prefix(&self, scope: GuildId) -> String {
        if let Some(cached) = self.prefix_cache.get(&scope) {
            return cached.clone();
        }
        let prefix = self
            .prefixes
            .get(&scope)
            .map(|p| p.clone())
            .unwrap_or_else(|| self.config.manager.default_prefix.clone());
        self.prefix_cache.insert(scope, prefix.clone());
        prefix
    }

    /// Sets a custom prefix for a scope.
    pub fn set_server_prefix(&self, scope: GuildId, prefix: &str) -> Result<()> {
        if prefix.is_empty() {
            return Err(WardenError::validation_field(
                "prefix must not be empty",
                "prefix",
            ));
        }
        if prefix.len() > self.config.manager.max_prefix_len {
            return Err(WardenError::validation_field(
                format!(
                    "prefix must be at most {} characters",
                    self.config.manager.max_prefix_len
                ),
                "prefix",
            ));
        }
        if prefix
            .chars()
            .any(|c| c.is_whitespace() || c.is_control() || c.is_alphanumeric())
        {
            return Err(WardenError::validation_field(
                "prefix must be punctuation only",
                "prefix",
            ));
        }

        // TODO: write the prefix through to the settings store once one
        // exists; until then a restart reverts every scope to the default.
        self.prefixes.insert(scope, prefix.to_string());
        self.prefix_cache.remove(&scope);
        debug!(%scope, prefix, "custom prefix set");
        Ok(())
    }

    /// Registers a command.
    pub fn register_command(&self, descriptor: CommandDescriptor) -> Result<()> {
        self.registry.register(descriptor)
    }

    /// Unregisters a command by canonical name.
    pub fn unregister_command(&self, name: &str) -> Result<()> {
        self.registry.unregister(name)
    }

    /// Sets a scope grant for a role on a command (name or alias accepted).
    pub fn set_role_permission(
        &self,
        scope: GuildId,
        command: &str,
        role: RoleId,
        allowed: bool,
        set_by: UserId,
    ) -> Result<()> {
        let descriptor = self.resolve(command)?;
        self.permissions
            .set_scope_grant(scope, descriptor.name(), role, allowed, set_by, None);
        Ok(())
    }

    /// Removes a scope grant.
    pub fn remove_role_permission(
        &self,
        scope: GuildId,
        command: &str,
        role: RoleId,
    ) -> Result<()> {
        let descriptor = self.resolve(command)?;
        self.permissions
            .remove_scope_grant(scope, descriptor.name(), role)
    }

    /// Starts a per-identity cooldown window by hand.
    pub fn set_cooldown(&self, user: UserId, command: &str, duration_ms: u64) -> Result<()> {
        let descriptor = self.resolve(command)?;
        self.cooldowns
            .set_cooldown(user, descriptor.name(), duration_ms);
        Ok(())
    }

    /// Configures a command-wide cooldown window.
    pub fn set_global_cooldown(&self, command: &str, duration_ms: u64) -> Result<()> {
        let descriptor = self.resolve(command)?;
        self.cooldowns
            .set_global_cooldown(descriptor.name(), duration_ms);
        Ok(())
    }

    /// Filtered execution history, most recent first.
    pub fn execution_history(&self, filter: &HistoryFilter) -> Vec<ExecutionRecord> {
        self.executor.history().recent(filter)
    }

    /// Filtered permission audit log, most recent first.
    pub async fn audit_log(&self, filter: &AuditFilter) -> Vec<AuditEntry> {
        self.permissions.audit().recent(filter).await
    }

    /// Descriptor list with per-scope metadata for the dashboard.
    pub fn commands_for_dashboard(&self, scope: GuildId) -> Vec<CommandSummary> {
        let mut summaries: Vec<CommandSummary> = self
            .registry
            .all()
            .into_iter()
            .map(|descriptor| {
                let enabled = self
                    .registry
                    .category(descriptor.category())
                    .map_or(true, |c| c.enabled);
                CommandSummary {
                    name: descriptor.name().to_string(),
                    description: descriptor.description().to_string(),
                    category: descriptor.category().to_string(),
                    enabled,
                    aliases: descriptor.aliases().to_vec(),
                    cooldown_ms: descriptor.cooldown_ms(),
                    usage_count: descriptor.usage_count(),
                    last_used: descriptor.last_used(),
                    scope_grants: self.permissions.grant_count(scope, descriptor.name()),
                }
            })
            .collect();
        summaries.sort_by(|a, b| a.name.cmp(&b.name));
        summaries
    }

    /// Aggregate counters across all components.
    pub async fn stats(&self) -> DispatchStats {
        let dispatches = self.counters.dispatch_count.load(Ordering::Relaxed);
        let sum_ms = self.counters.dispatch_sum_ms.load(Ordering::Relaxed);
        DispatchStats {
            generated_at: Utc::now(),
            manager: ManagerStats {
                handled: self.counters.handled.load(Ordering::Relaxed),
                ignored: self.counters.ignored.load(Ordering::Relaxed),
                denied_permission: self.counters.denied_permission.load(Ordering::Relaxed),
                denied_cooldown: self.counters.denied_cooldown.load(Ordering::Relaxed),
                unavailable: self.counters.unavailable.load(Ordering::Relaxed),
                succeeded: self.counters.succeeded.load(Ordering::Relaxed),
                failed: self.counters.failed.load(Ordering::Relaxed),
                avg_duration_ms: if dispatches > 0 {
                    sum_ms as f64 / dispatches as f64
                } else {
                    0.0
                },
                cached_prefixes: self.prefix_cache.len(),
            },
            registry: self.registry.stats(),
            permissions: self.permissions.stats(),
            cooldowns: self.cooldowns.stats(),
            executor: self.executor.stats(),
            audit: self.permissions.audit().stats().await,
        }
    }

    /// Drops every cached prefix resolution. Periodic sweep entry point.
    pub fn clear_prefix_cache(&self) {
        self.prefix_cache.clear();
    }

    /// The registry.
    pub fn registry(&self) -> &Arc<CommandRegistry> {
        &self.registry
    }

    /// The permission manager.
    pub fn permissions(&self) -> &Arc<PermissionManager> {
        &self.permissions
    }

    /// The cooldown manager.
    pub fn cooldowns(&self) -> &Arc<CooldownManager> {
        &self.cooldowns
    }

    /// The executor.
    pub fn executor(&self) -> &Arc<CommandExecutor> {
        &self.executor
    }

    /// The pipeline configuration.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    fn resolve(&self, name_or_alias: &str) -> Result<Arc<CommandDescriptor>> {
        self.registry.get(name_or_alias).ok_or_else(|| {
            WardenError::not_found(format!("command '{name_or_alias}' is not registered"))
        })
    }

    async fn respond(&self, ctx: &Arc<dyn InvocationContext>, message: &str) {
        if let Err(e) = ctx.reply(message).await {
            warn!(error = %e, "denial reply delivery failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use warden_common::{Capabilities, ChannelId};

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

    struct TestContext {
        sender: UserId,
        bot: bool,
        content: String,
        replies: Mutex<Vec<String>>,
    }

    impl TestContext {
        fn new(sender: u64, content: &str) -> Arc<Self> {
            Arc::new(Self {
                sender: UserId::new(sender),
                bot: false,
                content: content.to_string(),
                replies: Mutex::new(Vec::new()),
            })
        }

        fn bot(sender: u64, content: &str) -> Arc<Self> {
            Arc::new(Self {
                sender: UserId::new(sender),
                bot: true,
                content: content.to_string(),
                replies: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl InvocationContext for TestContext {
        fn sender(&self) -> UserId {
            self.sender
        }

        fn sender_is_bot(&self) -> bool {
            self.bot
        }

        fn scope(&self) -> GuildId {
            GuildId::new(10)
        }

        fn channel(&self) -> ChannelId {
            ChannelId::new(20)
        }

        fn channel_name(&self) -> &str {
            "general"
        }

        fn content(&self) -> &str {
            &self.content
        }

        async fn reply(&self, message: &str) -> warden_common::Result<()> {
            self.replies.lock().push(message.to_string());
            Ok(())
        }
    }

    struct PongHandler;

    #[async_trait]
    impl crate::handler::CommandHandler for PongHandler {
        async fn run(
            &self,
            _invocation: crate::handler::Invocation,
        ) -> crate::handler::HandlerResult {
            Ok(crate::handler::Reply::Message("pong".to_string()))
        }
    }

    fn manager() -> CommandManager {
        CommandManager::new(DispatchConfig::default(), Arc::new(OpenCapabilitySource))
    }

    fn ping_descriptor() -> CommandDescriptor {
        CommandDescriptor::new("ping", "replies with pong", "utility", Arc::new(PongHandler))
    }

    #[tokio::test]
    async fn test_ignores_bots_and_unprefixed_content() {
        let manager = manager();
        manager.register_command(ping_descriptor()).unwrap();

        assert!(!manager.execute_command(TestContext::bot(1, "!ping")).await);
        assert!(!manager.execute_command(TestContext::new(1, "ping")).await);
        assert!(!manager.execute_command(TestContext::new(1, "!")).await);
        assert!(!manager.execute_command(TestContext::new(1, "!nope")).await);

        let stats = manager.stats().await;
        assert_eq!(stats.manager.ignored, 4);
        assert_eq!(stats.manager.handled, 0);
    }

    #[tokio::test]
    async fn test_dispatches_and_records() {
        let manager = manager();
        manager.register_command(ping_descriptor()).unwrap();

        let ctx = TestContext::new(1, "!ping");
        assert!(manager.execute_command(ctx.clone()).await);
        assert_eq!(ctx.replies.lock().clone(), vec!["pong"]);

        let stats = manager.stats().await;
        assert_eq!(stats.manager.handled, 1);
        assert_eq!(stats.manager.succeeded, 1);
        assert_eq!(manager.registry().get("ping").unwrap().usage_count(), 1);
    }

    #[tokio::test]
    async fn test_command_name_is_case_insensitive() {
        let manager = manager();
        manager.register_command(ping_descriptor()).unwrap();

        assert!(manager.execute_command(TestContext::new(1, "!PING")).await);
    }

    #[tokio::test]
    async fn test_custom_prefix_round_trip() {
        let manager = manager();
        manager.register_command(ping_descriptor()).unwrap();
        let scope = GuildId::new(10);

        assert_eq!(manager.server_prefix(scope), "!");
        manager.set_server_prefix(scope, "?!").unwrap();
        assert_eq!(manager.server_prefix(scope), "?!");

        assert!(manager.execute_command(TestContext::new(1, "?!ping")).await);
        assert!(!manager.execute_command(TestContext::new(1, "!ping")).await);

        // A cache clear must not lose the custom prefix.
        manager.clear_prefix_cache();
        assert_eq!(manager.server_prefix(scope), "?!");
    }

    #[tokio::test]
    async fn test_prefix_validation() {
        let manager = manager();
        let scope = GuildId::new(10);

        assert!(manager.set_server_prefix(scope, "").is_err());
        assert!(manager.set_server_prefix(scope, "toolong").is_err());
        assert!(manager.set_server_prefix(scope, "a").is_err());
        assert!(manager.set_server_prefix(scope, "! ").is_err());
        assert!(manager.set_server_prefix(scope, "~").is_ok());
    }

    #[tokio::test]
    async fn test_disabled_category_refuses_dispatch() {
        let manager = manager();
        manager.register_command(ping_descriptor()).unwrap();
        manager
            .registry()
            .set_category_enabled("utility", false)
            .unwrap();

        let ctx = TestContext::new(1, "!ping");
        assert!(manager.execute_command(ctx.clone()).await);
        assert!(ctx.replies.lock()[0].contains("unavailable"));

        let stats = manager.stats().await;
        assert_eq!(stats.manager.unavailable, 1);
        assert_eq!(stats.manager.succeeded, 0);
        // No cooldown was committed.
        assert_eq!(stats.cooldowns.identity_records, 0);
    }

    #[tokio::test]
    async fn test_admin_ops_resolve_aliases() {
        let manager = manager();
        manager
            .register_command(ping_descriptor().with_aliases(["p"]))
            .unwrap();

        manager.set_global_cooldown("p", 1000).unwrap();
        assert!(manager.set_global_cooldown("zzz", 1000).is_err());

        manager
            .set_cooldown(UserId::new(5), "p", 1000)
            .unwrap();
        assert_eq!(
            manager.cooldowns().identity_cooldowns(UserId::new(5)).len(),
            1
        );
    }

    #[tokio::test]
    async fn test_dashboard_summary() {
        let manager = manager();
        manager
            .register_command(
                ping_descriptor()
                    .with_aliases(["p"])
                    .with_cooldown_ms(3000),
            )
            .unwrap();
        manager
            .set_role_permission(
                GuildId::new(10),
                "ping",
                RoleId::new(7),
                true,
                UserId::new(9),
            )
            .unwrap();

        let summaries = manager.commands_for_dashboard(GuildId::new(10));
        assert_eq!(summaries.len(), 1);
        let summary = &summaries[0];
        assert_eq!(summary.name, "ping");
        assert!(summary.enabled);
        assert_eq!(summary.aliases, vec!["p"]);
        assert_eq!(summary.cooldown_ms, 3000);
        assert_eq!(summary.scope_grants, 1);
    }
}
