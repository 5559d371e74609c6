//! Test utilities and shared fixtures for the Warden command core.
//!
//! Available behind the `testing` feature so that downstream crates can pull
//! these helpers into their unit and integration tests.

use std::sync::Once;

use tracing_subscriber::{fmt, EnvFilter};

use crate::types::{ChannelId, GuildId, RoleId, UserId};

/// Initialize test logging once per test run.
static INIT: Once = Once::new();

/// Initialize logging for tests with a sensible default configuration.
/// Safe to call multiple times; only the first call installs a subscriber.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));

        fmt().with_test_writer().with_env_filter(filter).init();
    });
}

/// Fixture identities used across dispatch tests.
pub mod fixtures {
    use super::*;

    /// A guild id for scope-bound tests.
    pub fn test_guild_id() -> GuildId {
        GuildId::new(900_000_000_000_000_001)
    }

    /// The invoking member in most scenarios.
    pub fn test_user_id() -> UserId {
        UserId::new(100_000_000_000_000_001)
    }

    /// A second, unrelated member.
    pub fn other_user_id() -> UserId {
        UserId::new(100_000_000_000_000_002)
    }

    /// The configured owner identity.
    pub fn owner_user_id() -> UserId {
        UserId::new(100_000_000_000_000_099)
    }

    /// A channel inside the test guild.
    pub fn test_channel_id() -> ChannelId {
        ChannelId::new(800_000_000_000_000_001)
    }

    /// A moderator role in the test guild.
    pub fn moderator_role_id() -> RoleId {
        RoleId::new(700_000_000_000_000_001)
    }

    /// A second role with no special meaning.
    pub fn member_role_id() -> RoleId {
        RoleId::new(700_000_000_000_000_002)
    }
}
