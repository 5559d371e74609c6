//! Layered permission decisions for command invocations.
//!
//! Precedence: owner bypass, agent-capability gate, scope-specific grants,
//! category default roles, raw capability bits. Decisions are cached with a
//! fixed TTL and audited, cache hits included.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use warden_common::{GuildId, Result, RoleId, Timestamp, UserId, WardenError};
use warden_config::PermissionConfig;

use crate::audit::{self, AuditLog, DecisionSource};
use crate::context::CapabilitySource;
use crate::registry::CommandDescriptor;

/// A role reference in a category default list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoleSelector {
    /// Matches every member.
    Everyone,
    /// Matches holders of a specific role.
    Id(RoleId),
}

/// A scope-specific permission override.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionGrant {
    /// The scope the grant applies in.
    pub scope: GuildId,
    /// The command it covers.
    pub command: String,
    /// The role it binds to.
    pub role: RoleId,
    /// Whether holders are allowed or denied.
    pub allowed: bool,
    /// Who set it.
    pub set_by: UserId,
    /// When it was set.
    pub set_at: Timestamp,
    /// Optional expiry; expired grants are skipped during evaluation.
    pub expires_at: Option<Timestamp>,
}

#[derive(Debug, Clone)]
struct CachedDecision {
    allowed: bool,
    cached_at: Instant,
}

/// Permission counters for the dashboard.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PermissionStats {
    /// Decision cache hits since startup.
    pub cache_hits: u64,
    /// Decision cache misses since startup.
    pub cache_misses: u64,
    /// Cache hit rate as a percentage.
    pub cache_hit_rate: f64,
    /// Entries currently cached.
    pub cached_decisions: usize,
    /// Scope grants currently held.
    pub grants: usize,
}

/// Decides whether an identity may invoke a command in a scope.
pub struct PermissionManager {
    owner: Option<UserId>,
    capabilities: Arc<dyn CapabilitySource>,
    grants: DashMap<(GuildId, String), Vec<PermissionGrant>>,
    category_defaults: DashMap<String, Vec<RoleSelector>>,
    cache: DashMap<(UserId, String, GuildId), CachedDecision>,
    cache_ttl: Duration,
    audit: Arc<AuditLog>,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
}

impl PermissionManager {
    /// Creates a manager backed by the given capability source.
    pub fn new(config: &PermissionConfig, capabilities: Arc<dyn CapabilitySource>) -> Self {
        let owner = (config.owner_id != 0).then(|| UserId::new(config.owner_id));
        Self {
            owner,
            capabilities,
            grants: DashMap::new(),
            category_defaults: DashMap::new(),
            cache: DashMap::new(),
            cache_ttl: Duration::from_secs(config.cache_ttl_secs),
            audit: Arc::new(AuditLog::new(config.audit_cap)),
            cache_hits: AtomicU64::new(0),
            cache_misses: AtomicU64::new(0),
        }
    }

    /// Decides whether `user` may invoke `descriptor` in `scope`.
    ///
    /// Internal failures (capability source errors) deny and log; they are
    /// never a silent allow. Every call appends an audit entry.
    pub async fn check(
        &self,
        user: UserId,
        descriptor: &CommandDescriptor,
        scope: GuildId,
    ) -> bool {
        let started = Instant::now();
        let command = descriptor.name();

        if self.owner == Some(user) {
            self.audit_decision(
                user,
                command,
                scope,
                true,
                DecisionSource::Evaluated,
                started,
                Some("owner bypass".to_string()),
            )
            .await;
            return true;
        }

        // The agent gate is about what the bot can do in the scope, not who
        // is asking; it short-circuits before any invoker lookup and is never
        // cached under the invoker's key.
        if !descriptor.agent_capabilities().is_empty() {
            match self.capabilities.agent_capabilities(scope).await {
                Ok(agent) if agent.contains(descriptor.agent_capabilities()) => {}
                Ok(_) => {
                    self.audit_decision(
                        user,
                        command,
                        scope,
                        false,
                        DecisionSource::Evaluated,
                        started,
                        Some("agent lacks a required capability".to_string()),
                    )
                    .await;
                    return false;
                }
                Err(e) => {
                    warn!(command, %scope, error = %e, "agent capability lookup failed, denying");
                    self.audit_decision(
                        user,
                        command,
                        scope,
                        false,
                        DecisionSource::Evaluated,
                        started,
                        Some("agent capability lookup failed".to_string()),
                    )
                    .await;
                    return false;
                }
            }
        }

        let key = (user, command.to_string(), scope);
        if let Some(hit) = self.cache.get(&key) {
            if hit.cached_at.elapsed() < self.cache_ttl {
                let allowed = hit.allowed;
                drop(hit);
                self.cache_hits.fetch_add(1, Ordering::Relaxed);
                self.audit_decision(
                    user,
                    command,
                    scope,
                    allowed,
                    DecisionSource::Cache,
                    started,
                    None,
                )
                .await;
                return allowed;
            }
        }
        self.cache_misses.fetch_add(1, Ordering::Relaxed);

        let (allowed, note) = match self.evaluate(user, descriptor, scope).await {
            Ok(allowed) => (allowed, None),
            Err(e) => {
                warn!(command, %user, %scope, error = %e, "permission evaluation failed, denying");
                (false, Some("evaluation failed".to_string()))
            }
        };

        if note.is_none() {
            self.cache.insert(
                key,
                CachedDecision {
                    allowed,
                    cached_at: Instant::now(),
                },
            );
        }

        self.audit_decision(
            user,
            command,
            scope,
            allowed,
            DecisionSource::Evaluated,
            started,
            note,
        )
        .await;
        allowed
    }

    async fn evaluate(
        &self,
        user: UserId,
        descriptor: &CommandDescriptor,
        scope: GuildId,
    ) -> Result<bool> {
        let roles = self.capabilities.member_roles(scope, user).await?;

        // Scope-specific grants, insertion order; the first grant whose role
        // the invoker holds wins. Not hierarchy-aware.
        if let Some(grants) = self.grants.get(&(scope, descriptor.name().to_string())) {
            let now = Utc::now();
            for grant in grants.iter() {
                if grant.expires_at.is_some_and(|expiry| expiry <= now) {
                    continue;
                }
                if roles.contains(&grant.role) {
                    debug!(
                        command = descriptor.name(),
                        %user,
                        role = %grant.role,
                        allowed = grant.allowed,
                        "scope grant matched"
                    );
                    return Ok(grant.allowed);
                }
            }
        }

        // Category defaults are an allow-list; no match falls through.
        if let Some(defaults) = self.category_defaults.get(descriptor.category()) {
            for selector in defaults.iter() {
                match selector {
                    RoleSelector::Everyone => return Ok(true),
                    RoleSelector::Id(role) => {
                        if roles.contains(role) {
                            return Ok(true);
                        }
                    }
                }
            }
        }

        if descriptor.required_capabilities().is_empty() {
            return Ok(true);
        }
        let capabilities = self.capabilities.member_capabilities(scope, user).await?;
        Ok(capabilities.contains(descriptor.required_capabilities()))
    }

    /// Sets (or replaces) a scope grant. Clears the decision cache.
    pub fn set_scope_grant(
        &self,
        scope: GuildId,
        command: &str,
        role: RoleId,
        allowed: bool,
        set_by: UserId,
        expires_at: Option<Timestamp>,
    ) {
        let grant = PermissionGrant {
            scope,
            command: command.to_string(),
            role,
            allowed,
            set_by,
            set_at: Utc::now(),
            expires_at,
        };

        let mut grants = self
            .grants
            .entry((scope, command.to_string()))
            .or_default();
        match grants.iter_mut().find(|g| g.role == role) {
            // Replacing keeps the grant's position in the evaluation order.
            Some(existing) => *existing = grant,
            None => grants.push(grant),
        }
        drop(grants);

        // Coarse invalidation, same strategy as the periodic sweep.
        self.clear_decision_cache();
        debug!(%scope, command, %role, allowed, "scope grant set");
    }

    /// Removes a scope grant.
    pub fn remove_scope_grant(&self, scope: GuildId, command: &str, role: RoleId) -> Result<()> {
        let key = (scope, command.to_string());
        let Some(mut grants) = self.grants.get_mut(&key) else {
            return Err(WardenError::not_found(format!(
                "no grants for '{command}' in this scope"
            )));
        };
        let before = grants.len();
        grants.retain(|g| g.role != role);
        if grants.len() == before {
            return Err(WardenError::not_found(format!(
                "no grant for that role on '{command}'"
            )));
        }
        drop(grants);

        self.clear_decision_cache();
        Ok(())
    }

    /// All grants in a scope, across commands.
    pub fn grants_for_scope(&self, scope: GuildId) -> Vec<PermissionGrant> {
        self.grants
            .iter()
            .filter(|entry| entry.key().0 == scope)
            .flat_map(|entry| entry.value().clone())
            .collect()
    }

    /// Number of grants held for a (scope, command) pair.
    pub fn grant_count(&self, scope: GuildId, command: &str) -> usize {
        self.grants
            .get(&(scope, command.to_string()))
            .map_or(0, |g| g.len())
    }

    /// Replaces the default role list for a category.
    pub fn set_category_default(&self, category: &str, roles: Vec<RoleSelector>) {
        self.category_defaults.insert(category.to_string(), roles);
        self.clear_decision_cache();
    }

    /// Drops every cached decision. Also the periodic sweep entry point.
    pub fn clear_decision_cache(&self) {
        self.cache.clear();
    }

    /// The audit trail.
    pub fn audit(&self) -> &Arc<AuditLog> {
        &self.audit
    }

    /// Counters for the dashboard.
    pub fn stats(&self) -> PermissionStats {
        let hits = self.cache_hits.load(Ordering::Relaxed);
        let misses = self.cache_misses.load(Ordering::Relaxed);
        let total = hits + misses;
        PermissionStats {
            cache_hits: hits,
            cache_misses: misses,
            cache_hit_rate: if total > 0 {
                (hits as f64 / total as f64) * 100.0
            } else {
                0.0
            },
            cached_decisions: self.cache.len(),
            grants: self.grants.iter().map(|e| e.value().len()).sum(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn audit_decision(
        &self,
        user: UserId,
        command: &str,
        scope: GuildId,
        allowed: bool,
        source: DecisionSource,
        started: Instant,
        note: Option<String>,
    ) {
        let latency_us = started.elapsed().as_micros().min(u128::from(u64::MAX)) as u64;
        self.audit
            .record(audit::entry(
                user, command, scope, allowed, source, latency_us, note,
            ))
            .await;
    }
}
