//! Configuration loading from TOML files.

use std::path::PathBuf;

use tracing::{debug, info};
use warden_common::{Result, WardenError};

use crate::schema::Config;
use crate::validation::ConfigValidator;

/// Loads and validates configuration from a TOML file.
pub struct ConfigLoader {
    path: PathBuf,
}

impl ConfigLoader {
    /// Creates a new configuration loader for the given path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Loads configuration from the file.
    ///
    /// A missing file yields the defaults; a malformed or invalid file is an
    /// error.
    pub async fn load(&self) -> Result<Config> {
        if !self.path.exists() {
            info!(path = %self.path.display(), "no config file found, using defaults");
            return Ok(Config::default());
        }

        let raw = tokio::fs::read_to_string(&self.path).await?;
        let config: Config = toml::from_str(&raw)
            .map_err(|e| WardenError::config_with_source("failed to parse config file", e))?;

        ConfigValidator::validate(&config)?;
        debug!(path = %self.path.display(), "configuration loaded");
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_missing_file_yields_defaults() {
        let loader = ConfigLoader::new("/nonexistent/warden.toml");
        let config = loader.load().await.unwrap();
        assert_eq!(config.dispatch.manager.default_prefix, "!");
    }

    #[tokio::test]
    async fn test_partial_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[dispatch.executor]\ntimeout_ms = 5000\n\n[dispatch.manager]\ndefault_prefix = \"?\""
        )
        .unwrap();

        let loader = ConfigLoader::new(file.path());
        let config = loader.load().await.unwrap();

        assert_eq!(config.dispatch.executor.timeout_ms, 5000);
        assert_eq!(config.dispatch.executor.max_retries, 1);
        assert_eq!(config.dispatch.manager.default_prefix, "?");
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "dispatch = not valid toml").unwrap();

        let loader = ConfigLoader::new(file.path());
        assert!(loader.load().await.is_err());
    }

    #[tokio::test]
    async fn test_invalid_values_are_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[dispatch.executor]\ntimeout_ms = 0").unwrap();

        let loader = ConfigLoader::new(file.path());
        assert!(loader.load().await.is_err());
    }
}
