//! Invalidation coordinator.
//!
//! Turns forum events into an [`InvalidationPlan`] and drops the planned keys
//! from the count and collection caches. Runs on the calling task right after
//! the store write; there is no queue in between.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use tracing::{debug, info, instrument};

use super::collections::CollectionCache;
use super::counts::CountCache;
use super::events::ForumEvent;
use super::planner::InvalidationPlan;

const METRIC_INVALIDATE_MS: &str = "parlor_cache_invalidate_ms";

pub struct InvalidationCoordinator {
    counts: Arc<CountCache>,
    collections: Arc<CollectionCache>,
}

impl InvalidationCoordinator {
    pub fn new(counts: Arc<CountCache>, collections: Arc<CollectionCache>) -> Self {
        Self {
            counts,
            collections,
        }
    }

    /// Apply a single event.
    pub fn record(&self, event: ForumEvent) -> usize {
        self.apply(std::slice::from_ref(&event))
    }

    /// Plan and apply a batch of events.
    ///
    /// Returns how many cached entries were dropped.
    #[instrument(skip_all, fields(events = events.len()))]
    pub fn apply(&self, events: &[ForumEvent]) -> usize {
        let started_at = Instant::now();
        let plan = InvalidationPlan::from_events(events);
        if plan.is_empty() {
            debug!(
                kinds = ?events.iter().map(ForumEvent::label).collect::<Vec<_>>(),
                "Nothing to invalidate"
            );
            return 0;
        }

        let counts_removed = self.counts.remove_keys(&plan.counts);
        let collections_removed = self.collections.remove_keys(&plan.collections);

        info!(
            kinds = ?events.iter().map(ForumEvent::label).collect::<Vec<_>>(),
            plan = %plan,
            counts_removed,
            collections_removed,
            "Cache invalidation applied"
        );

        histogram!(METRIC_INVALIDATE_MS)
            .record(started_at.elapsed().as_secs_f64() * 1000.0);

        counts_removed + collections_removed
    }
}
