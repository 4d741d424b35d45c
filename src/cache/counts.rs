//! Read-through cache for aggregate counts.
//!
//! Reply counts are never queried directly: a topic counts as its own first
//! post, so every reply tally is `posts - topics` over the same scope, with
//! the topic side served from this cache as well.

use std::future::Future;
use std::sync::Arc;

use tracing::{debug, instrument, warn};

use crate::application::repos::{ForumStore, PostScope, RepoError, TopicScope};

use super::config::CacheConfig;
use super::keys::{CategoryFootprint, CountKey, TopicFootprint, user_count_keys};
use super::memo::BoundedMemo;

const CACHE_NAME: &str = "counts";

pub struct CountCache {
    memo: BoundedMemo<CountKey, u64>,
    store: Arc<dyn ForumStore>,
}

impl CountCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn ForumStore>) -> Self {
        Self {
            memo: BoundedMemo::new(CACHE_NAME, config.counts_limit_non_zero()),
            store,
        }
    }

    pub async fn count_all_users(&self) -> Result<u64, RepoError> {
        self.read_through(CountKey::AllUsers, || self.store.count_users())
            .await
    }

    pub async fn count_all_topics(&self) -> Result<u64, RepoError> {
        self.read_through(CountKey::AllTopics, || {
            self.store.count_topics(TopicScope::All)
        })
        .await
    }

    pub async fn count_all_replies(&self) -> Result<u64, RepoError> {
        let key = CountKey::AllReplies;
        self.read_through(key, || async move {
            let posts = self.store.count_posts(PostScope::All).await?;
            let topics = self.count_all_topics().await?;
            Ok(replies(key, posts, topics))
        })
        .await
    }

    pub async fn count_topics_in_category(&self, category_id: i64) -> Result<u64, RepoError> {
        self.read_through(CountKey::TopicsInCategory(category_id), || {
            self.store.count_topics(TopicScope::Category(category_id))
        })
        .await
    }

    pub async fn count_topics_by_user(&self, user_id: i64) -> Result<u64, RepoError> {
        self.read_through(CountKey::TopicsByUser(user_id), || {
            self.store.count_topics(TopicScope::Author(user_id))
        })
        .await
    }

    /// An empty category has no replies; the post join is skipped entirely.
    pub async fn count_replies_in_category(&self, category_id: i64) -> Result<u64, RepoError> {
        let key = CountKey::RepliesInCategory(category_id);
        self.read_through(key, || async move {
            let topics = self.count_topics_in_category(category_id).await?;
            if topics == 0 {
                return Ok(0);
            }
            let posts = self
                .store
                .count_posts(PostScope::Category(category_id))
                .await?;
            Ok(replies(key, posts, topics))
        })
        .await
    }

    pub async fn count_replies_in_topic(&self, topic_id: i64) -> Result<u64, RepoError> {
        let key = CountKey::RepliesInTopic(topic_id);
        self.read_through(key, || async move {
            let posts = self.store.count_posts(PostScope::Topic(topic_id)).await?;
            // No rows at all means no such topic rather than a broken invariant.
            if posts == 0 {
                return Ok(0);
            }
            Ok(replies(key, posts, 1))
        })
        .await
    }

    pub async fn count_replies_by_user(&self, user_id: i64) -> Result<u64, RepoError> {
        let key = CountKey::RepliesByUser(user_id);
        self.read_through(key, || async move {
            let posts = self.store.count_posts(PostScope::Author(user_id)).await?;
            let topics = self.count_topics_by_user(user_id).await?;
            Ok(replies(key, posts, topics))
        })
        .await
    }

    /// Drop every count that depends on the topic, looking up its category,
    /// author and posters in the store.
    ///
    /// If the topic is gone or the lookup fails, all counts are dropped.
    #[instrument(skip(self))]
    pub async fn invalidate_counts_for_topic(&self, topic_id: i64) {
        match self.topic_footprint(topic_id).await {
            Ok(Some(footprint)) => {
                self.invalidate_topic_footprint(&footprint);
            }
            Ok(None) => {
                debug!(topic_id, "Topic not found; purging all counts");
                self.invalidate_all_counts();
            }
            Err(error) => {
                warn!(
                    topic_id,
                    error = %error,
                    "Topic footprint lookup failed; purging all counts"
                );
                self.invalidate_all_counts();
            }
        }
    }

    /// Drop every count that depends on the category, enumerating its topics
    /// and posters in the store.
    ///
    /// If the enumeration fails, all counts are dropped.
    #[instrument(skip(self))]
    pub async fn invalidate_counts_for_category(&self, category_id: i64) {
        match self.category_footprint(category_id).await {
            Ok(footprint) => {
                self.invalidate_category_footprint(&footprint);
            }
            Err(error) => {
                warn!(
                    category_id,
                    error = %error,
                    "Category footprint lookup failed; purging all counts"
                );
                self.invalidate_all_counts();
            }
        }
    }

    pub fn invalidate_counts_for_user(&self, user_id: i64) {
        self.remove_keys(&user_count_keys(user_id));
    }

    pub fn invalidate_all_counts(&self) {
        self.memo.purge();
    }

    /// Returns how many cached counts were dropped.
    pub fn invalidate_topic_footprint(&self, footprint: &TopicFootprint) -> usize {
        self.remove_keys(&footprint.count_keys())
    }

    /// Returns how many cached counts were dropped.
    pub fn invalidate_category_footprint(&self, footprint: &CategoryFootprint) -> usize {
        self.remove_keys(&footprint.count_keys())
    }

    pub fn remove_keys<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a CountKey>,
    {
        self.memo.remove_many(keys)
    }

    /// Shift the cached user total by `delta` without a store query.
    ///
    /// Nothing is fabricated when the total is not cached. Returns whether it
    /// was.
    pub fn adjust_user_count(&self, delta: i64) -> bool {
        self.memo.update(&CountKey::AllUsers, |count| {
            *count = count.saturating_add_signed(delta);
        })
    }

    /// Whether a count is currently memoized. Does not affect recency.
    pub fn is_cached(&self, key: &CountKey) -> bool {
        self.memo.contains(key)
    }

    pub async fn topic_footprint(
        &self,
        topic_id: i64,
    ) -> Result<Option<TopicFootprint>, RepoError> {
        let Some(topic) = self.store.find_topic(topic_id).await? else {
            return Ok(None);
        };
        let posters = self.store.list_poster_ids_in_topic(topic_id).await?;
        Ok(Some(
            TopicFootprint::new(topic.id, topic.category_id, topic.author_id).with_posters(posters),
        ))
    }

    pub async fn category_footprint(
        &self,
        category_id: i64,
    ) -> Result<CategoryFootprint, RepoError> {
        let topics = self.store.list_topic_ids_in_category(category_id).await?;
        let posters = self.store.list_poster_ids_in_category(category_id).await?;
        Ok(CategoryFootprint::new(category_id, topics, posters))
    }

    async fn read_through<F, Fut>(&self, key: CountKey, compute: F) -> Result<u64, RepoError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<u64, RepoError>>,
    {
        if let Some(count) = self.memo.get(&key) {
            debug!(cache = CACHE_NAME, outcome = "hit", key = %key);
            return Ok(count);
        }
        debug!(cache = CACHE_NAME, outcome = "miss", key = %key);

        let seen = self.memo.generation();
        let count = compute().await?;
        self.memo.put_if_current(key, count, seen);
        Ok(count)
    }
}

fn replies(key: CountKey, posts: u64, topics: u64) -> u64 {
    posts.checked_sub(topics).unwrap_or_else(|| {
        warn!(
            key = %key,
            posts,
            topics,
            "Reply count would be negative; clamping to zero"
        );
        0
    })
}
