//! Cache configuration.
//!
//! Capacities for the four in-process containers, read from the `[cache]`
//! table of `parlor.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

// Default values for cache configuration
const DEFAULT_COUNTS_LIMIT: usize = 1024;
const DEFAULT_TOPIC_LISTS_LIMIT: usize = 128;
const DEFAULT_POST_LISTS_LIMIT: usize = 128;
const DEFAULT_USERS_LIMIT: usize = 128;

/// Cache configuration from `parlor.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum aggregate counts kept across all scopes.
    pub counts_limit: usize,
    /// Maximum cached topic lists (per category or per author).
    pub topic_lists_limit: usize,
    /// Maximum cached post lists (per topic, author or category).
    pub post_lists_limit: usize,
    /// Maximum cached user records.
    pub users_limit: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            counts_limit: DEFAULT_COUNTS_LIMIT,
            topic_lists_limit: DEFAULT_TOPIC_LISTS_LIMIT,
            post_lists_limit: DEFAULT_POST_LISTS_LIMIT,
            users_limit: DEFAULT_USERS_LIMIT,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            counts_limit: settings.counts_limit.get(),
            topic_lists_limit: settings.topic_lists_limit.get(),
            post_lists_limit: settings.post_lists_limit.get(),
            users_limit: settings.users_limit.get(),
        }
    }
}

impl CacheConfig {
    /// Returns the counts limit as NonZeroUsize, clamping to 1 if zero.
    pub fn counts_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.counts_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the topic list limit as NonZeroUsize, clamping to 1 if zero.
    pub fn topic_lists_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.topic_lists_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the post list limit as NonZeroUsize, clamping to 1 if zero.
    pub fn post_lists_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.post_lists_limit).unwrap_or(NonZeroUsize::MIN)
    }

    /// Returns the user limit as NonZeroUsize, clamping to 1 if zero.
    pub fn users_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.users_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
