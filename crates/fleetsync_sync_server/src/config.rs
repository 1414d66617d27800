//! Server configuration.

use fleetsync_core::RetryConfig;

/// Configuration for the sync server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum number of references a single desire request may carry.
    pub max_desire_references: usize,
    /// Whether reports are written back to the node record.
    pub store_reports: bool,
    /// Retry policy for writing reports.
    pub retry: RetryConfig,
}

impl ServerConfig {
    /// Creates a new server configuration.
    pub fn new() -> Self {
        Self {
            max_desire_references: 256,
            store_reports: true,
            retry: RetryConfig::default(),
        }
    }

    /// Sets the maximum number of references per desire request.
    pub fn with_max_desire_references(mut self, max: usize) -> Self {
        self.max_desire_references = max;
        self
    }

    /// Enables or disables storing reports.
    pub fn with_store_reports(mut self, store: bool) -> Self {
        self.store_reports = store;
        self
    }

    /// Sets the retry policy for report writes.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.max_desire_references, 256);
        assert!(config.store_reports);
    }

    #[test]
    fn config_builder() {
        let config = ServerConfig::new()
            .with_max_desire_references(8)
            .with_store_reports(false)
            .with_retry(RetryConfig::no_retry());

        assert_eq!(config.max_desire_references, 8);
        assert!(!config.store_reports);
        assert_eq!(config.retry.max_attempts, 1);
    }
}
