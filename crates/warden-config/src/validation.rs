//! Runtime validation of loaded configuration.

use crate::schema::Config;
use warden_common::{Result, WardenError};

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates a configuration, naming the offending field on failure.
    pub fn validate(config: &Config) -> Result<()> {
        let d = &config.dispatch;

        if d.registry.max_aliases_per_command == 0 {
            return Err(WardenError::validation_field(
                "must allow at least one alias",
                "dispatch.registry.max_aliases_per_command",
            ));
        }
        if d.registry.history_cap == 0 {
            return Err(WardenError::validation_field(
                "registration history cap must be positive",
                "dispatch.registry.history_cap",
            ));
        }

        if d.permissions.cache_ttl_secs == 0 {
            return Err(WardenError::validation_field(
                "decision cache TTL must be positive",
                "dispatch.permissions.cache_ttl_secs",
            ));
        }
        // Zero-length sweep intervals would stall the maintenance tickers.
        if d.permissions.cache_sweep_secs == 0
            || d.cooldowns.sweep_secs == 0
            || d.executor.sweep_secs == 0
            || d.manager.prefix_cache_sweep_secs == 0
        {
            return Err(WardenError::validation(
                "sweep intervals must be positive",
            ));
        }
        if d.permissions.audit_cap == 0 {
            return Err(WardenError::validation_field(
                "audit log cap must be positive",
                "dispatch.permissions.audit_cap",
            ));
        }

        if d.cooldowns.cache_ttl_ms == 0 {
            return Err(WardenError::validation_field(
                "decision cache TTL must be positive",
                "dispatch.cooldowns.cache_ttl_ms",
            ));
        }
        if d.cooldowns.tracked_identity_ceiling == 0 {
            return Err(WardenError::validation_field(
                "identity ceiling must be positive",
                "dispatch.cooldowns.tracked_identity_ceiling",
            ));
        }

        if d.executor.timeout_ms == 0 {
            return Err(WardenError::validation_field(
                "handler timeout must be positive",
                "dispatch.executor.timeout_ms",
            ));
        }
        if d.executor.max_retries > 5 {
            return Err(WardenError::validation_field(
                "more than 5 retries is not supported",
                "dispatch.executor.max_retries",
            ));
        }
        if d.executor.history_cap == 0 {
            return Err(WardenError::validation_field(
                "execution history cap must be positive",
                "dispatch.executor.history_cap",
            ));
        }

        if d.manager.default_prefix.is_empty() {
            return Err(WardenError::validation_field(
                "default prefix must not be empty",
                "dispatch.manager.default_prefix",
            ));
        }
        if d.manager.default_prefix.len() > d.manager.max_prefix_len {
            return Err(WardenError::validation_field(
                "default prefix exceeds the maximum prefix length",
                "dispatch.manager.default_prefix",
            ));
        }
        if d.manager.default_prefix.chars().any(char::is_whitespace) {
            return Err(WardenError::validation_field(
                "prefix must not contain whitespace",
                "dispatch.manager.default_prefix",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = Config::default();
        config.dispatch.executor.timeout_ms = 0;

        let err = ConfigValidator::validate(&config).unwrap_err();
        assert!(err.to_string().contains("timeout"));
    }

    #[test]
    fn test_empty_prefix_rejected() {
        let mut config = Config::default();
        config.dispatch.manager.default_prefix.clear();

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_whitespace_prefix_rejected() {
        let mut config = Config::default();
        config.dispatch.manager.default_prefix = "! ".to_string();

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_sweep_interval_rejected() {
        let mut config = Config::default();
        config.dispatch.cooldowns.sweep_secs = 0;

        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_excessive_retries_rejected() {
        let mut config = Config::default();
        config.dispatch.executor.max_retries = 10;

        assert!(ConfigValidator::validate(&config).is_err());
    }
}
