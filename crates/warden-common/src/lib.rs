//! Common utilities and types shared across the Warden command core.

pub mod error;
pub mod logging;
pub mod types;

#[cfg(feature = "testing")]
pub mod test_utils;

// Re-export commonly used types
pub use error::{Result, WardenError};
pub use logging::{init_default_logging, init_logging, LoggingConfig};
pub use types::*;
