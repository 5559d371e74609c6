//! Command registry: the canonical name, alias, and category index.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use warden_common::{Capabilities, Result, Timestamp, WardenError};
use warden_config::RegistryConfig;

use crate::handler::CommandHandler;

const MAX_NAME_LEN: usize = 32;

/// The registered definition of a command.
pub struct CommandDescriptor {
    name: String,
    description: String,
    category: String,
    required_capabilities: Capabilities,
    agent_capabilities: Capabilities,
    cooldown_ms: u64,
    aliases: Vec<String>,
    handler: Arc<dyn CommandHandler>,
    usage_count: AtomicU64,
    last_used: RwLock<Option<Timestamp>>,
}

impl CommandDescriptor {
    /// Creates a descriptor with the mandatory fields; the rest default off.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        category: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            category: category.into(),
            required_capabilities: Capabilities::empty(),
            agent_capabilities: Capabilities::empty(),
            cooldown_ms: 0,
            aliases: Vec::new(),
            handler,
            usage_count: AtomicU64::new(0),
            last_used: RwLock::new(None),
        }
    }

    /// Declares aliases for this command.
    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the per-identity cooldown in milliseconds (0 = none).
    pub fn with_cooldown_ms(mut self, cooldown_ms: u64) -> Self {
        self.cooldown_ms = cooldown_ms;
        self
    }

    /// Capability bits the invoker must hold when no grant or category
    /// default decides first.
    pub fn with_required_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.required_capabilities = capabilities;
        self
    }

    /// Capability bits the bot itself must hold in the scope.
    pub fn with_agent_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.agent_capabilities = capabilities;
        self
    }

    /// Canonical command name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Category this command belongs to.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Aliases declared at registration time.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    /// Per-identity cooldown in milliseconds.
    pub fn cooldown_ms(&self) -> u64 {
        self.cooldown_ms
    }

    /// Invoker capability requirement.
    pub fn required_capabilities(&self) -> Capabilities {
        self.required_capabilities
    }

    /// Bot-side capability requirement.
    pub fn agent_capabilities(&self) -> Capabilities {
        self.agent_capabilities
    }

    /// The handler to run.
    pub fn handler(&self) -> Arc<dyn CommandHandler> {
        Arc::clone(&self.handler)
    }

    /// Times this command has been dispatched successfully.
    pub fn usage_count(&self) -> u64 {
        self.usage_count.load(Ordering::Relaxed)
    }

    /// When this command last ran successfully.
    pub fn last_used(&self) -> Option<Timestamp> {
        *self.last_used.read()
    }

    /// Records a successful dispatch.
    pub fn touch(&self) {
        self.usage_count.fetch_add(1, Ordering::Relaxed);
        *self.last_used.write() = Some(Utc::now());
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("category", &self.category)
            .field("aliases", &self.aliases)
            .field("cooldown_ms", &self.cooldown_ms)
            .finish()
    }
}

/// A lazily-created command category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    /// Category name.
    pub name: String,
    /// Description, taken from the first registering descriptor's category.
    pub description: String,
    /// Disabled categories resolve but refuse to dispatch.
    pub enabled: bool,
    /// Member command names in registration order.
    pub members: Vec<String>,
}

impl Category {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            description: String::new(),
            enabled: true,
            members: Vec::new(),
        }
    }
}

/// What happened to the registry, for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryAction {
    /// A descriptor was registered.
    Registered,
    /// A descriptor was unregistered.
    Unregistered,
    /// A registration or alias was refused.
    Conflict,
    /// An alias was added after registration.
    AliasAdded,
    /// An alias was removed.
    AliasRemoved,
}

/// One entry in the bounded registration-history log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    /// When it happened.
    pub at: Timestamp,
    /// What happened.
    pub action: RegistryAction,
    /// The command involved.
    pub command: String,
    /// Refusal reason or alias name, where applicable.
    pub detail: Option<String>,
}

/// Counters exposed to the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryStats {
    /// Registered commands.
    pub commands: usize,
    /// Alias table size.
    pub aliases: usize,
    /// Known categories.
    pub categories: usize,
    /// Refused registrations and alias additions since startup.
    pub conflicts: u64,
}

/// Owns the command, alias, and category indexes.
///
/// Registration is validate-then-index: a refused call leaves every index
/// untouched.
pub struct CommandRegistry {
    commands: DashMap<String, Arc<CommandDescriptor>>,
    aliases: DashMap<String, String>,
    categories: DashMap<String, Category>,
    history: RwLock<VecDeque<RegistryEvent>>,
    max_aliases: usize,
    history_cap: usize,
    conflicts: AtomicU64,
}

impl CommandRegistry {
    /// Creates an empty registry.
    pub fn new(config: &RegistryConfig) -> Self {
        Self {
            commands: DashMap::new(),
            aliases: DashMap::new(),
            categories: DashMap::new(),
            history: RwLock::new(VecDeque::new()),
            max_aliases: config.max_aliases_per_command,
            history_cap: config.history_cap,
            conflicts: AtomicU64::new(0),
        }
    }

    /// Registers a descriptor, indexing its name, aliases, and category.
    pub fn register(&self, descriptor: CommandDescriptor) -> Result<()> {
        validate_name(descriptor.name())?;
        if descriptor.description().is_empty() {
            return Err(WardenError::validation_field(
                "description must not be empty",
                "description",
            ));
        }
        if descriptor.category().is_empty() {
            return Err(WardenError::validation_field(
                "category must not be empty",
                "category",
            ));
        }
        if descriptor.aliases().len() > self.max_aliases {
            return Err(WardenError::validation_field(
                format!("at most {} aliases are allowed", self.max_aliases),
                "aliases",
            ));
        }
        for alias in descriptor.aliases() {
            validate_name(alias)?;
        }

        let name = descriptor.name().to_string();
        if let Some(reason) = self.find_conflict(&name, descriptor.aliases()) {
            self.record_conflict(&name, &reason);
            return Err(WardenError::conflict(reason));
        }

        for alias in descriptor.aliases() {
            self.aliases.insert(alias.clone(), name.clone());
        }
        let mut category = self
            .categories
            .entry(descriptor.category().to_string())
            .or_insert_with(|| Category::new(descriptor.category()));
        if !category.members.contains(&name) {
            category.members.push(name.clone());
        }
        drop(category);
        self.commands.insert(name.clone(), Arc::new(descriptor));

        self.record(RegistryAction::Registered, &name, None);
        info!(command = %name, "command registered");
        Ok(())
    }

    /// Removes a descriptor by its canonical name, along with its aliases and
    /// category membership.
    pub fn unregister(&self, name: &str) -> Result<()> {
        let Some((_, descriptor)) = self.commands.remove(name) else {
            return Err(WardenError::not_found(format!(
                "command '{name}' is not registered"
            )));
        };

        self.aliases.retain(|_, target| target != name);
        if let Some(mut category) = self.categories.get_mut(descriptor.category()) {
            category.members.retain(|member| member != name);
        }

        self.record(RegistryAction::Unregistered, name, None);
        info!(command = %name, "command unregistered");
        Ok(())
    }

    /// Looks a descriptor up by canonical name or alias.
    pub fn get(&self, name_or_alias: &str) -> Option<Arc<CommandDescriptor>> {
        if let Some(descriptor) = self.commands.get(name_or_alias) {
            return Some(Arc::clone(&descriptor));
        }
        let target = self.aliases.get(name_or_alias)?;
        self.commands.get(target.value()).map(|d| Arc::clone(&d))
    }

    /// Descriptors in a category, in registration order.
    pub fn get_by_category(&self, category: &str) -> Vec<Arc<CommandDescriptor>> {
        let Some(category) = self.categories.get(category) else {
            return Vec::new();
        };
        category
            .members
            .iter()
            .filter_map(|name| self.commands.get(name).map(|d| Arc::clone(&d)))
            .collect()
    }

    /// Adds an alias to an already-registered command.
    pub fn add_alias(&self, name: &str, alias: &str) -> Result<()> {
        validate_name(alias)?;
        if !self.commands.contains_key(name) {
            return Err(WardenError::not_found(format!(
                "command '{name}' is not registered"
            )));
        }
        let current = self
            .aliases
            .iter()
            .filter(|entry| entry.value() == name)
            .count();
        if current >= self.max_aliases {
            return Err(WardenError::validation_field(
                format!("at most {} aliases are allowed", self.max_aliases),
                "aliases",
            ));
        }
        if let Some(reason) = self.find_conflict(alias, &[]) {
            self.record_conflict(name, &reason);
            return Err(WardenError::conflict(reason));
        }

        self.aliases.insert(alias.to_string(), name.to_string());
        self.record(RegistryAction::AliasAdded, name, Some(alias.to_string()));
        debug!(command = %name, alias = %alias, "alias added");
        Ok(())
    }

    /// Removes an alias.
    pub fn remove_alias(&self, alias: &str) -> Result<()> {
        let Some((_, target)) = self.aliases.remove(alias) else {
            return Err(WardenError::not_found(format!(
                "alias '{alias}' is not registered"
            )));
        };
        self.record(RegistryAction::AliasRemoved, &target, Some(alias.to_string()));
        Ok(())
    }

    /// A snapshot of a category, if it exists.
    pub fn category(&self, name: &str) -> Option<Category> {
        self.categories.get(name).map(|c| c.clone())
    }

    /// All categories, unordered.
    pub fn categories(&self) -> Vec<Category> {
        self.categories.iter().map(|entry| entry.clone()).collect()
    }

    /// Enables or disables a category.
    pub fn set_category_enabled(&self, name: &str, enabled: bool) -> Result<()> {
        let Some(mut category) = self.categories.get_mut(name) else {
            return Err(WardenError::not_found(format!(
                "category '{name}' does not exist"
            )));
        };
        category.enabled = enabled;
        info!(category = %name, enabled, "category toggled");
        Ok(())
    }

    /// All registered descriptors, unordered.
    pub fn all(&self) -> Vec<Arc<CommandDescriptor>> {
        self.commands.iter().map(|e| Arc::clone(&e)).collect()
    }

    /// Number of registered commands.
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// The bounded diagnostics log, most recent first.
    pub fn history(&self) -> Vec<RegistryEvent> {
        self.history.read().iter().rev().cloned().collect()
    }

    /// Counters for the dashboard.
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            commands: self.commands.len(),
            aliases: self.aliases.len(),
            categories: self.categories.len(),
            conflicts: self.conflicts.load(Ordering::Relaxed),
        }
    }

    fn find_conflict(&self, name: &str, aliases: &[String]) -> Option<String> {
        if self.commands.contains_key(name) {
            return Some(format!("command '{name}' is already registered"));
        }
        if self.aliases.contains_key(name) {
            return Some(format!("'{name}' is already in use as an alias"));
        }
        for alias in aliases {
            if self.commands.contains_key(alias) {
                return Some(format!("alias '{alias}' collides with a command name"));
            }
            if self.aliases.contains_key(alias) {
                return Some(format!("alias '{alias}' is already taken"));
            }
        }
        None
    }

    fn record_conflict(&self, command: &str, reason: &str) {
        self.conflicts.fetch_add(1, Ordering::Relaxed);
        warn!(command = %command, reason = %reason, "registration refused");
        self.record(RegistryAction::Conflict, command, Some(reason.to_string()));
    }

    fn record(&self, action: RegistryAction, command: &str, detail: Option<String>) {
        let mut history = self.history.write();
        while history.len() >= self.history_cap {
            history.pop_front();
        }
        history.push_back(RegistryEvent {
            at: Utc::now(),
            action,
            command: command.to_string(),
            detail,
        });
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(WardenError::validation_field(
            "name must not be empty",
            "name",
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(WardenError::validation_field(
            format!("name must be at most {MAX_NAME_LEN} characters"),
            "name",
        ));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_')
    {
        return Err(WardenError::validation_field(
            "name may only contain lowercase letters, digits, '-' and '_'",
            "name",
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{HandlerResult, Invocation, Reply};
    use async_trait::async_trait;

    struct NoopHandler;

    #[async_trait]
    impl crate::handler::CommandHandler for NoopHandler {
        async fn run(&self, _invocation: Invocation) -> HandlerResult {
            Ok(Reply::Silent)
        }
    }

    fn registry() -> CommandRegistry {
        CommandRegistry::new(&RegistryConfig::default())
    }

    fn descriptor(name: &str) -> CommandDescriptor {
        CommandDescriptor::new(name, "a test command", "utility", Arc::new(NoopHandler))
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = registry();
        registry
            .register(descriptor("ping").with_aliases(["p"]))
            .unwrap();

        assert!(registry.get("ping").is_some());
        assert_eq!(registry.get("p").unwrap().name(), "ping");
        assert!(registry.get("pong").is_none());
    }

    #[test]
    fn test_duplicate_name_is_conflict_and_state_unchanged() {
        let registry = registry();
        registry
            .register(descriptor("ping").with_aliases(["p"]))
            .unwrap();

        let err = registry
            .register(
                CommandDescriptor::new("ping", "another", "misc", Arc::new(NoopHandler))
                    .with_aliases(["pp"]),
            )
            .unwrap_err();
        assert!(matches!(err, WardenError::Conflict { .. }));

        // First registration is intact, the refused one left nothing behind.
        assert_eq!(registry.get("ping").unwrap().description(), "a test command");
        assert!(registry.get("pp").is_none());
        assert_eq!(registry.stats().conflicts, 1);
    }

    #[test]
    fn test_alias_can_never_collide() {
        let registry = registry();
        registry
            .register(descriptor("ping").with_aliases(["p"]))
            .unwrap();

        // Alias of A as a name of B
        let err = registry.register(descriptor("p")).unwrap_err();
        assert!(matches!(err, WardenError::Conflict { .. }));

        // Alias of A as an alias of B
        let err = registry
            .register(descriptor("pong").with_aliases(["p"]))
            .unwrap_err();
        assert!(matches!(err, WardenError::Conflict { .. }));

        // Name of A as an alias of B
        registry.register(descriptor("status")).unwrap();
        let err = registry.add_alias("status", "ping").unwrap_err();
        assert!(matches!(err, WardenError::Conflict { .. }));
    }

    #[test]
    fn test_alias_limit_enforced() {
        let config = RegistryConfig {
            max_aliases_per_command: 2,
            ..RegistryConfig::default()
        };
        let registry = CommandRegistry::new(&config);
        let err = registry
            .register(descriptor("ping").with_aliases(["a", "b", "c"]))
            .unwrap_err();
        assert!(matches!(err, WardenError::Validation { .. }));

        registry
            .register(descriptor("pong").with_aliases(["a", "b"]))
            .unwrap();
        assert!(registry.add_alias("pong", "c").is_err());
    }

    #[test]
    fn test_unregister_cleans_every_index() {
        let registry = registry();
        registry
            .register(descriptor("ping").with_aliases(["p"]))
            .unwrap();
        registry.unregister("ping").unwrap();

        assert!(registry.get("ping").is_none());
        assert!(registry.get("p").is_none());
        assert!(registry.category("utility").unwrap().members.is_empty());

        let err = registry.unregister("ping").unwrap_err();
        assert!(matches!(err, WardenError::NotFound { .. }));
    }

    #[test]
    fn test_category_created_lazily_and_ordered() {
        let registry = registry();
        registry.register(descriptor("ban")).unwrap();
        registry.register(descriptor("kick")).unwrap();

        let members: Vec<String> = registry
            .get_by_category("utility")
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        assert_eq!(members, vec!["ban", "kick"]);
        assert!(registry.category("nope").is_none());
    }

    #[test]
    fn test_invalid_names_rejected() {
        let registry = registry();
        assert!(registry.register(descriptor("")).is_err());
        assert!(registry.register(descriptor("Ping")).is_err());
        assert!(registry.register(descriptor("pi ng")).is_err());
    }

    #[test]
    fn test_history_is_bounded() {
        let config = RegistryConfig {
            history_cap: 3,
            ..RegistryConfig::default()
        };
        let registry = CommandRegistry::new(&config);
        for i in 0..5 {
            registry.register(descriptor(&format!("cmd{i}"))).unwrap();
        }

        let history = registry.history();
        assert_eq!(history.len(), 3);
        // Most recent first
        assert_eq!(history[0].command, "cmd4");
    }

    #[test]
    fn test_usage_tracking() {
        let registry = registry();
        registry.register(descriptor("ping")).unwrap();
        let descriptor = registry.get("ping").unwrap();

        assert_eq!(descriptor.usage_count(), 0);
        assert!(descriptor.last_used().is_none());

        descriptor.touch();
        assert_eq!(descriptor.usage_count(), 1);
        assert!(descriptor.last_used().is_some());
    }
}
