//! Factory configuration and per-scope options.

use entiscope_store::{Consistency, ReadOptions};
use std::time::Duration;

/// Configuration for a [`crate::Factory`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Whether loads consult the second-level cache.
    pub cache_enabled: bool,

    /// Attempts per cache call before giving up.
    pub cache_max_attempts: u32,

    /// Keys loaded per batch when a query runs in hybrid or normal mode.
    pub default_chunk_size: usize,

    /// Whether value queries run as keys-only scans plus batched loads.
    pub hybrid_queries: bool,

    /// Whether saves and deletes outside a transaction are rejected.
    pub mandatory_transactions: bool,

    /// Read consistency requested from the store.
    pub consistency: Consistency,

    /// Deadline passed through to the store on reads.
    pub deadline: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_max_attempts: 4,
            default_chunk_size: 30,
            hybrid_queries: true,
            mandatory_transactions: false,
            consistency: Consistency::Strong,
            deadline: None,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets whether loads consult the second-level cache.
    #[must_use]
    pub const fn cache_enabled(mut self, value: bool) -> Self {
        self.cache_enabled = value;
        self
    }

    /// Sets the number of attempts per cache call.
    #[must_use]
    pub const fn cache_max_attempts(mut self, attempts: u32) -> Self {
        self.cache_max_attempts = attempts;
        self
    }

    /// Sets the query chunk size.
    #[must_use]
    pub const fn default_chunk_size(mut self, size: usize) -> Self {
        self.default_chunk_size = size;
        self
    }

    /// Sets whether value queries run in hybrid mode.
    #[must_use]
    pub const fn hybrid_queries(mut self, value: bool) -> Self {
        self.hybrid_queries = value;
        self
    }

    /// Sets whether writes require a transaction.
    #[must_use]
    pub const fn mandatory_transactions(mut self, value: bool) -> Self {
        self.mandatory_transactions = value;
        self
    }

    /// Sets the read consistency.
    #[must_use]
    pub const fn consistency(mut self, consistency: Consistency) -> Self {
        self.consistency = consistency;
        self
    }

    /// Sets the store deadline.
    #[must_use]
    pub const fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

/// Options carried by a [`crate::Scope`] handle.
///
/// Initialised from [`Config`]; each scope handle may override them without
/// affecting other handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Options {
    pub(crate) cache: bool,
    pub(crate) mandatory_transactions: bool,
    pub(crate) consistency: Consistency,
    pub(crate) deadline: Option<Duration>,
}

impl Options {
    pub(crate) fn from_config(config: &Config) -> Self {
        Self {
            cache: config.cache_enabled,
            mandatory_transactions: config.mandatory_transactions,
            consistency: config.consistency,
            deadline: config.deadline,
        }
    }

    /// Returns whether the second-level cache is consulted.
    #[must_use]
    pub const fn cache(&self) -> bool {
        self.cache
    }

    /// Returns whether writes require a transaction.
    #[must_use]
    pub const fn mandatory_transactions(&self) -> bool {
        self.mandatory_transactions
    }

    /// Returns the store read settings.
    #[must_use]
    pub const fn read_options(&self) -> ReadOptions {
        ReadOptions {
            consistency: self.consistency,
            deadline: self.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert!(config.cache_enabled);
        assert_eq!(config.cache_max_attempts, 4);
        assert_eq!(config.default_chunk_size, 30);
        assert!(config.hybrid_queries);
        assert!(!config.mandatory_transactions);
    }

    #[test]
    fn builder_pattern() {
        let config = Config::new()
            .cache_enabled(false)
            .default_chunk_size(5)
            .consistency(Consistency::Eventual)
            .deadline(Duration::from_secs(2));

        assert!(!config.cache_enabled);
        assert_eq!(config.default_chunk_size, 5);
        assert_eq!(config.consistency, Consistency::Eventual);
        assert_eq!(config.deadline, Some(Duration::from_secs(2)));
    }

    #[test]
    fn options_follow_config() {
        let options = Options::from_config(&Config::new().mandatory_transactions(true));
        assert!(options.mandatory_transactions());
        assert!(options.cache());
        assert_eq!(options.read_options().consistency, Consistency::Strong);
    }
}
