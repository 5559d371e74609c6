//! The command handler contract.
//!
//! Handlers are typed implementations of [`CommandHandler`] supplied at
//! registration time, so a malformed handler is a compile error rather than a
//! call-time surprise.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::context::InvocationContext;

/// Everything a handler receives for one invocation.
pub struct Invocation {
    /// The inbound action envelope.
    pub context: Arc<dyn InvocationContext>,
    /// Canonical command name (aliases already resolved).
    pub command: String,
    /// Ordered argument tokens, prefix and command name stripped.
    pub args: Vec<String>,
}

impl fmt::Debug for Invocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Invocation")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("sender", &self.context.sender())
            .finish()
    }
}

/// What a handler produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The handler replied through the context itself.
    Handled,
    /// Text for the executor to send back to the invoker.
    Message(String),
    /// Nothing to send.
    Silent,
}

/// Classification a handler gives its own failure; drives retry eligibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerErrorKind {
    /// Bad arguments; never retried.
    Validation,
    /// A referenced entity does not exist; never retried.
    NotFound,
    /// The handler refused on authorization grounds; never retried.
    PermissionDenied,
    /// A downstream call failed; eligible for retry.
    External,
    /// Anything else; eligible for retry.
    Other,
}

/// Error returned by a handler.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct HandlerError {
    /// Failure classification.
    pub kind: HandlerErrorKind,
    /// Internal message; never shown to the invoker verbatim.
    pub message: String,
}

impl HandlerError {
    /// Bad-argument failure.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::Validation,
            message: msg.into(),
        }
    }

    /// Missing-entity failure.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::NotFound,
            message: msg.into(),
        }
    }

    /// Authorization failure raised by the handler itself.
    pub fn permission_denied(msg: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::PermissionDenied,
            message: msg.into(),
        }
    }

    /// Downstream failure, retry-eligible.
    pub fn external(msg: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::External,
            message: msg.into(),
        }
    }

    /// Unclassified failure, retry-eligible.
    pub fn other(msg: impl Into<String>) -> Self {
        Self {
            kind: HandlerErrorKind::Other,
            message: msg.into(),
        }
    }
}

/// Result type for handler runs.
pub type HandlerResult = std::result::Result<Reply, HandlerError>;

/// A command implementation.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    /// Run the command. The executor owns timeout and retry; handlers just do
    /// the work and classify their failures.
    async fn run(&self, invocation: Invocation) -> HandlerResult;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_constructors_classify() {
        assert_eq!(
            HandlerError::validation("bad arg").kind,
            HandlerErrorKind::Validation
        );
        assert_eq!(
            HandlerError::external("store down").kind,
            HandlerErrorKind::External
        );
    }

    #[test]
    fn test_error_display_is_message_only() {
        let err = HandlerError::not_found("no such user");
        assert_eq!(err.to_string(), "no such user");
    }
}
