//! Collaborator contracts consumed by the dispatch pipeline.
//!
//! The gateway connection, its object cache, and the member/role model stay
//! outside this crate. The pipeline only sees these two traits.

use async_trait::async_trait;
use warden_common::{Capabilities, ChannelId, GuildId, Result, RoleId, UserId};

/// The envelope carrying one inbound user action.
///
/// Implemented by the gateway layer over its message type; implemented by
/// test doubles in this crate's tests.
#[async_trait]
pub trait InvocationContext: Send + Sync {
    /// Identity of the sender.
    fn sender(&self) -> UserId;

    /// Whether the sender is an automated account (including this bot).
    fn sender_is_bot(&self) -> bool;

    /// The server the action happened in.
    fn scope(&self) -> GuildId;

    /// The channel the action happened in.
    fn channel(&self) -> ChannelId;

    /// Human-readable channel name, for logs and audit notes.
    fn channel_name(&self) -> &str;

    /// Raw message content, prefix included.
    fn content(&self) -> &str;

    /// Send a message back to the invoker.
    async fn reply(&self, message: &str) -> Result<()>;
}

/// Capability lookups delegated to the gateway's member/role model.
///
/// All calls are fallible and may suspend; the permission layer treats a
/// failure as a denial, never as a silent allow.
#[async_trait]
pub trait CapabilitySource: Send + Sync {
    /// Capability bits the member holds in the scope, roles resolved.
    async fn member_capabilities(&self, scope: GuildId, member: UserId) -> Result<Capabilities>;

    /// Role identities the member holds in the scope, in role-list order.
    async fn member_roles(&self, scope: GuildId, member: UserId) -> Result<Vec<RoleId>>;

    /// Capability bits the acting agent (the bot itself) holds in the scope.
    async fn agent_capabilities(&self, scope: GuildId) -> Result<Capabilities>;
}
