//! Error types and utilities for the Warden command core.

use thiserror::Error;

/// Result type alias for Warden operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Main error type for the command core
#[derive(Error, Debug)]
pub enum WardenError {
    /// Malformed descriptor, arguments, or configuration value
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Duplicate command name or alias
    #[error("Conflict: {message}")]
    Conflict { message: String },

    /// Command, alias, grant, or record does not exist
    #[error("Not found: {message}")]
    NotFound { message: String },

    /// Scope, category, or capability check failed
    #[error("Permission denied: {message}")]
    PermissionDenied { message: String },

    /// A per-identity or global cooldown is still running
    #[error("Cooldown active for '{command}' ({remaining_ms}ms remaining)")]
    CooldownActive {
        command: String,
        remaining_ms: u64,
        global: bool,
    },

    /// Handler did not settle within the configured window
    #[error("Execution of '{command}' timed out after {elapsed_ms}ms")]
    Timeout { command: String, elapsed_ms: u64 },

    /// Handler returned an error or panicked
    #[error("Execution error: {message}")]
    Execution {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// All retry attempts were consumed without a success
    #[error("Execution of '{command}' failed after {attempts} attempts: {last_error}")]
    RetryExhausted {
        command: String,
        attempts: u32,
        last_error: String,
    },

    /// Capability source (gateway member/role model) failed
    #[error("Capability lookup error: {message}")]
    Capability {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration related errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O related errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WardenError {
    /// Create a new validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: None,
        }
    }

    /// Create a new validation error with field name
    pub fn validation_field(msg: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new conflict error
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict {
            message: msg.into(),
        }
    }

    /// Create a new not-found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound {
            message: msg.into(),
        }
    }

    /// Create a new permission-denied error
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self::PermissionDenied {
            message: msg.into(),
        }
    }

    /// Create a new execution error
    pub fn execution(msg: impl Into<String>) -> Self {
        Self::Execution {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new execution error with source
    pub fn execution_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Execution {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a new capability lookup error
    pub fn capability(msg: impl Into<String>) -> Self {
        Self::Capability {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
            source: None,
        }
    }

    /// Create a new configuration error with source
    pub fn config_with_source(
        msg: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::Config {
            message: msg.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Derive the message shown to the invoker. Internal detail stays in the
    /// logs; denials carry a concrete reason, execution failures a generic
    /// apology.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation { message, .. } => format!("Invalid input: {message}"),
            Self::PermissionDenied { .. } => {
                "You do not have permission to use this command.".to_string()
            }
            Self::CooldownActive {
                remaining_ms,
                global,
                ..
            } => {
                let secs = remaining_ms.div_ceil(1000);
                if *global {
                    format!("This command was used recently. Try again in {secs}s.")
                } else {
                    format!("You are on cooldown for this command. Try again in {secs}s.")
                }
            }
            Self::Timeout { .. } => "The command took too long and was aborted.".to_string(),
            Self::NotFound { message } => format!("Not found: {message}"),
            _ => "Something went wrong while running that command. Please try again later."
                .to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;
    use std::io;

    #[test]
    fn test_error_creation() {
        let validation = WardenError::validation_field("name must not be empty", "name");
        assert!(validation.to_string().contains("Validation error"));
        assert!(validation.to_string().contains("name must not be empty"));

        let conflict = WardenError::conflict("command 'ping' already registered");
        assert!(conflict.to_string().contains("Conflict"));

        let denied = WardenError::permission_denied("missing BAN_MEMBERS");
        assert!(denied.to_string().contains("Permission denied"));
    }

    #[test]
    fn test_error_with_source() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "store unavailable");
        let wrapped = WardenError::execution_with_source("handler failed", io_error);

        assert!(wrapped.to_string().contains("handler failed"));
        assert!(wrapped.source().is_some());
    }

    #[test]
    fn test_user_message_hides_internals() {
        let err = WardenError::RetryExhausted {
            command: "nuke".to_string(),
            attempts: 2,
            last_error: "store timeout at shard 3".to_string(),
        };
        let msg = err.user_message();
        assert!(!msg.contains("shard"));
        assert!(msg.contains("went wrong"));
    }

    #[test]
    fn test_user_message_cooldown_rounds_up() {
        let err = WardenError::CooldownActive {
            command: "ping".to_string(),
            remaining_ms: 2100,
            global: false,
        };
        assert!(err.user_message().contains("3s"));

        let global = WardenError::CooldownActive {
            command: "nuke".to_string(),
            remaining_ms: 299_000,
            global: true,
        };
        assert!(global.user_message().contains("used recently"));
        assert!(global.user_message().contains("299s"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "missing file");
        let warden_error: WardenError = io_error.into();
        assert!(warden_error.to_string().contains("I/O error"));
    }
}
