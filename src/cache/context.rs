use std::sync::Arc;

use tracing::info;

use crate::application::repos::ForumStore;

use super::collections::CollectionCache;
use super::config::CacheConfig;
use super::coordinator::InvalidationCoordinator;
use super::counts::CountCache;
use super::identity::IdentityCache;

/// Process-wide cache context.
///
/// Built once at startup over a shared store handle and passed to every
/// service that reads through or invalidates the caches. Tests build a fresh
/// one per case.
#[derive(Clone)]
pub struct ForumCache {
    counts: Arc<CountCache>,
    collections: Arc<CollectionCache>,
    identity: Arc<IdentityCache>,
    coordinator: Arc<InvalidationCoordinator>,
}

impl ForumCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn ForumStore>) -> Self {
        let counts = Arc::new(CountCache::new(config, Arc::clone(&store)));
        let collections = Arc::new(CollectionCache::new(config, Arc::clone(&store)));
        let identity = Arc::new(IdentityCache::new(
            config,
            Arc::clone(&store),
            Arc::clone(&counts),
        ));
        let coordinator = Arc::new(InvalidationCoordinator::new(
            Arc::clone(&counts),
            Arc::clone(&collections),
        ));

        info!(
            counts_limit = config.counts_limit,
            topic_lists_limit = config.topic_lists_limit,
            post_lists_limit = config.post_lists_limit,
            users_limit = config.users_limit,
            "Forum cache initialized"
        );

        Self {
            counts,
            collections,
            identity,
            coordinator,
        }
    }

    pub fn counts(&self) -> &CountCache {
        &self.counts
    }

    pub fn collections(&self) -> &CollectionCache {
        &self.collections
    }

    pub fn identity(&self) -> &IdentityCache {
        &self.identity
    }

    pub fn coordinator(&self) -> &InvalidationCoordinator {
        &self.coordinator
    }

    /// Drop every entry in every container.
    pub fn purge_all(&self) {
        self.counts.invalidate_all_counts();
        self.collections.invalidate_all_topics();
        self.collections.invalidate_all_posts();
        self.identity.purge();
    }
}
