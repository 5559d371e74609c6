//! Common types used across the Warden command core.

use chrono::{DateTime, Utc};
use uuid::Uuid;

// The gateway client itself is out of scope for this core, but its model
// vocabulary is the shared language for identities and permission bits.
pub use serenity::model::id::{ChannelId, GuildId, RoleId, UserId};

/// Coarse-grained permission flags derived from an identity's roles.
pub type Capabilities = serenity::model::Permissions;

/// Timestamp type used throughout the core.
pub type Timestamp = DateTime<Utc>;

/// Unique identifier for a single command execution.
pub type ExecutionId = Uuid;
