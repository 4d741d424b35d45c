//! Read-through cache for ordered topic and post lists.
//!
//! Lists are shared as `Arc<Vec<_>>` snapshots. They are never patched: any
//! change to a member row drops the whole list and the next read refetches it.

use std::future::Future;
use std::sync::Arc;

use tracing::debug;

use crate::application::repos::{ForumStore, RepoError};
use crate::domain::entities::{PostRecord, TopicRecord};

use super::config::CacheConfig;
use super::keys::CollectionKey;
use super::memo::BoundedMemo;

const TOPIC_LISTS: &str = "topic_lists";
const POST_LISTS: &str = "post_lists";

pub type TopicList = Arc<Vec<TopicRecord>>;
pub type PostList = Arc<Vec<PostRecord>>;

pub struct CollectionCache {
    topics: BoundedMemo<CollectionKey, TopicList>,
    posts: BoundedMemo<CollectionKey, PostList>,
    store: Arc<dyn ForumStore>,
}

impl CollectionCache {
    pub fn new(config: &CacheConfig, store: Arc<dyn ForumStore>) -> Self {
        Self {
            topics: BoundedMemo::new(TOPIC_LISTS, config.topic_lists_limit_non_zero()),
            posts: BoundedMemo::new(POST_LISTS, config.post_lists_limit_non_zero()),
            store,
        }
    }

    // ========================================================================
    // Topic lists
    // ========================================================================

    /// Pinned topics first, then most recently replied.
    pub async fn topics_in_category(&self, category_id: i64) -> Result<TopicList, RepoError> {
        read_through(
            &self.topics,
            CollectionKey::TopicsInCategory(category_id),
            || self.store.list_topics_in_category(category_id),
        )
        .await
    }

    pub async fn topics_by_user(&self, user_id: i64) -> Result<TopicList, RepoError> {
        read_through(&self.topics, CollectionKey::TopicsByUser(user_id), || {
            self.store.list_topics_by_author(user_id)
        })
        .await
    }

    pub fn invalidate_topics_in_category(&self, category_id: i64) {
        self.topics
            .remove(&CollectionKey::TopicsInCategory(category_id));
    }

    pub fn invalidate_topics_by_user(&self, user_id: i64) {
        self.topics.remove(&CollectionKey::TopicsByUser(user_id));
    }

    pub fn invalidate_all_topics(&self) {
        self.topics.purge();
    }

    // ========================================================================
    // Post lists
    // ========================================================================

    /// Oldest first.
    pub async fn posts_in_topic(&self, topic_id: i64) -> Result<PostList, RepoError> {
        read_through(&self.posts, CollectionKey::PostsInTopic(topic_id), || {
            self.store.list_posts_in_topic(topic_id)
        })
        .await
    }

    /// Newest first.
    pub async fn posts_by_user(&self, user_id: i64) -> Result<PostList, RepoError> {
        read_through(&self.posts, CollectionKey::PostsByUser(user_id), || {
            self.store.list_posts_by_author(user_id)
        })
        .await
    }

    /// Newest first.
    pub async fn posts_in_category(&self, category_id: i64) -> Result<PostList, RepoError> {
        read_through(
            &self.posts,
            CollectionKey::PostsInCategory(category_id),
            || self.store.list_posts_in_category(category_id),
        )
        .await
    }

    pub fn invalidate_posts_in_topic(&self, topic_id: i64) {
        self.posts.remove(&CollectionKey::PostsInTopic(topic_id));
    }

    pub fn invalidate_posts_by_user(&self, user_id: i64) {
        self.posts.remove(&CollectionKey::PostsByUser(user_id));
    }

    pub fn invalidate_posts_in_category(&self, category_id: i64) {
        self.posts
            .remove(&CollectionKey::PostsInCategory(category_id));
    }

    pub fn invalidate_all_posts(&self) {
        self.posts.purge();
    }

    // ========================================================================
    // Batch
    // ========================================================================

    /// Drop a mixed batch of keys, routing each to its table.
    ///
    /// Returns how many cached lists were dropped.
    pub fn remove_keys<'a, I>(&self, keys: I) -> usize
    where
        I: IntoIterator<Item = &'a CollectionKey>,
    {
        let (topic_keys, post_keys): (Vec<&CollectionKey>, Vec<&CollectionKey>) =
            keys.into_iter().partition(|key| key.holds_topics());

        let mut removed = 0;
        if !topic_keys.is_empty() {
            removed += self.topics.remove_many(topic_keys);
        }
        if !post_keys.is_empty() {
            removed += self.posts.remove_many(post_keys);
        }
        removed
    }

    /// Whether a list is currently memoized. Does not affect recency.
    pub fn is_cached(&self, key: &CollectionKey) -> bool {
        if key.holds_topics() {
            self.topics.contains(key)
        } else {
            self.posts.contains(key)
        }
    }
}

async fn read_through<T, F, Fut>(
    memo: &BoundedMemo<CollectionKey, Arc<Vec<T>>>,
    key: CollectionKey,
    fetch: F,
) -> Result<Arc<Vec<T>>, RepoError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Vec<T>, RepoError>>,
{
    if let Some(list) = memo.get(&key) {
        debug!(cache = memo.name(), outcome = "hit", key = %key);
        return Ok(list);
    }
    debug!(cache = memo.name(), outcome = "miss", key = %key);

    let seen = memo.generation();
    let list = Arc::new(fetch().await?);
    memo.put_if_current(key, Arc::clone(&list), seen);
    Ok(list)
}
