//! Typed configuration for the Warden command core.
//!
//! The dispatch components take their tunables (timeouts, cache TTLs, history
//! caps, sweep cadences) from the structures defined here. Runtime mutations
//! made through the manager (custom prefixes, scope grants) are *not* part of
//! this configuration and are not persisted anywhere yet.

pub mod cache;
pub mod defaults;
pub mod loader;
pub mod schema;
pub mod validation;

pub use cache::ConfigCache;
pub use loader::ConfigLoader;
pub use schema::{
    Config, CooldownConfig, DispatchConfig, ExecutorConfig, ManagerConfig, PermissionConfig,
    RegistryConfig,
};
pub use validation::ConfigValidator;
