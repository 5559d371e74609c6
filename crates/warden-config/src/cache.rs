//! Thread-safe configuration caching with arc-swap for lock-free reads.

use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::schema::Config;

/// Thread-safe configuration cache using arc-swap for lock-free reads.
pub struct ConfigCache {
    config: ArcSwap<Config>,
}

impl ConfigCache {
    /// Creates a new configuration cache with the given initial configuration.
    pub fn new(config: Config) -> Self {
        Self {
            config: ArcSwap::from_pointee(config),
        }
    }

    /// Gets the current configuration.
    pub fn get(&self) -> Arc<Config> {
        self.config.load_full()
    }

    /// Updates the configuration atomically.
    pub fn update(&self, config: Config) {
        self.config.store(Arc::new(config));
    }
}

impl Default for ConfigCache {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_is_visible() {
        let cache = ConfigCache::default();
        assert_eq!(cache.get().dispatch.executor.max_retries, 1);

        let mut config = Config::default();
        config.dispatch.executor.max_retries = 2;
        cache.update(config);

        assert_eq!(cache.get().dispatch.executor.max_retries, 2);
    }
}
