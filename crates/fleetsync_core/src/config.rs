//! Engine configuration.

use crate::retry::RetryConfig;

/// Configuration shared by the control plane engines.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Retry policy for read-modify-write cycles.
    pub retry: RetryConfig,
    /// Number of shards in each index map.
    pub index_shards: usize,
    /// Number of lock stripes used to serialize writes per key.
    pub lock_stripes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            index_shards: 16,
            lock_stripes: 64,
        }
    }
}

impl EngineConfig {
    /// Creates a new configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the retry policy.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Sets the number of index shards. Zero is treated as one.
    pub fn with_index_shards(mut self, shards: usize) -> Self {
        self.index_shards = shards.max(1);
        self
    }

    /// Sets the number of lock stripes. Zero is treated as one.
    pub fn with_lock_stripes(mut self, stripes: usize) -> Self {
        self.lock_stripes = stripes.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.index_shards, 16);
        assert_eq!(config.lock_stripes, 64);
        assert_eq!(config.retry.max_attempts, 2);
    }

    #[test]
    fn builder_clamps_zero() {
        let config = EngineConfig::new()
            .with_index_shards(0)
            .with_lock_stripes(0)
            .with_retry(RetryConfig::no_retry());
        assert_eq!(config.index_shards, 1);
        assert_eq!(config.lock_stripes, 1);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
