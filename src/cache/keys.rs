//! Cache key definitions.
//!
//! `CountKey` and `CollectionKey` address entries in the count and collection
//! tables. Footprints describe the rows a mutation touched and expand into the
//! full set of keys that depend on them.

use std::collections::BTreeSet;
use std::fmt;

/// Aggregate counts, one variant per (kind, scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CountKey {
    AllUsers,
    AllTopics,
    AllReplies,
    TopicsInCategory(i64),
    TopicsByUser(i64),
    RepliesInCategory(i64),
    RepliesInTopic(i64),
    RepliesByUser(i64),
}

impl fmt::Display for CountKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CountKey::AllUsers => write!(f, "users:all"),
            CountKey::AllTopics => write!(f, "topics:all"),
            CountKey::AllReplies => write!(f, "replies:all"),
            CountKey::TopicsInCategory(id) => write!(f, "topics:category:{id}"),
            CountKey::TopicsByUser(id) => write!(f, "topics:user:{id}"),
            CountKey::RepliesInCategory(id) => write!(f, "replies:category:{id}"),
            CountKey::RepliesInTopic(id) => write!(f, "replies:topic:{id}"),
            CountKey::RepliesByUser(id) => write!(f, "replies:user:{id}"),
        }
    }
}

/// Ordered lists, one variant per (kind, scope).
///
/// Topic lists and post lists live in separate tables; the variant decides
/// which one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectionKey {
    TopicsInCategory(i64),
    TopicsByUser(i64),
    PostsInTopic(i64),
    PostsByUser(i64),
    PostsInCategory(i64),
}

impl CollectionKey {
    pub fn holds_topics(&self) -> bool {
        matches!(
            self,
            CollectionKey::TopicsInCategory(_) | CollectionKey::TopicsByUser(_)
        )
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CollectionKey::TopicsInCategory(id) => write!(f, "topics:category:{id}"),
            CollectionKey::TopicsByUser(id) => write!(f, "topics:user:{id}"),
            CollectionKey::PostsInTopic(id) => write!(f, "posts:topic:{id}"),
            CollectionKey::PostsByUser(id) => write!(f, "posts:user:{id}"),
            CollectionKey::PostsInCategory(id) => write!(f, "posts:category:{id}"),
        }
    }
}

/// Rows whose aggregates depend on one topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFootprint {
    pub topic_id: i64,
    pub category_id: i64,
    pub author_id: i64,
    /// Distinct authors of posts in the topic. May include the topic author.
    pub poster_ids: BTreeSet<i64>,
}

impl TopicFootprint {
    pub fn new(topic_id: i64, category_id: i64, author_id: i64) -> Self {
        Self {
            topic_id,
            category_id,
            author_id,
            poster_ids: BTreeSet::new(),
        }
    }

    pub fn with_posters(mut self, posters: impl IntoIterator<Item = i64>) -> Self {
        self.poster_ids.extend(posters);
        self
    }

    /// The topic author plus every poster, deduplicated.
    pub fn user_ids(&self) -> BTreeSet<i64> {
        let mut users = self.poster_ids.clone();
        users.insert(self.author_id);
        users
    }

    /// Every count whose inputs include a row of this topic.
    pub fn count_keys(&self) -> BTreeSet<CountKey> {
        let mut keys = BTreeSet::from([
            CountKey::RepliesInTopic(self.topic_id),
            CountKey::TopicsInCategory(self.category_id),
            CountKey::RepliesInCategory(self.category_id),
            CountKey::AllTopics,
            CountKey::AllReplies,
        ]);
        for user_id in self.user_ids() {
            keys.extend(user_count_keys(user_id));
        }
        keys
    }
}

/// Rows whose aggregates depend on one category.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryFootprint {
    pub category_id: i64,
    pub topic_ids: BTreeSet<i64>,
    /// Distinct authors of topics or posts anywhere in the category.
    pub poster_ids: BTreeSet<i64>,
}

impl CategoryFootprint {
    pub fn new(
        category_id: i64,
        topic_ids: impl IntoIterator<Item = i64>,
        poster_ids: impl IntoIterator<Item = i64>,
    ) -> Self {
        Self {
            category_id,
            topic_ids: topic_ids.into_iter().collect(),
            poster_ids: poster_ids.into_iter().collect(),
        }
    }

    /// Every count whose inputs include a row of this category.
    pub fn count_keys(&self) -> BTreeSet<CountKey> {
        let mut keys = BTreeSet::from([
            CountKey::TopicsInCategory(self.category_id),
            CountKey::RepliesInCategory(self.category_id),
            CountKey::AllTopics,
            CountKey::AllReplies,
        ]);
        keys.extend(self.topic_ids.iter().copied().map(CountKey::RepliesInTopic));
        for user_id in &self.poster_ids {
            keys.extend(user_count_keys(*user_id));
        }
        keys
    }

    /// Every list that contains or orders rows of this category.
    pub fn collection_keys(&self) -> BTreeSet<CollectionKey> {
        let mut keys = BTreeSet::from([
            CollectionKey::TopicsInCategory(self.category_id),
            CollectionKey::PostsInCategory(self.category_id),
        ]);
        keys.extend(self.topic_ids.iter().copied().map(CollectionKey::PostsInTopic));
        for user_id in &self.poster_ids {
            keys.insert(CollectionKey::TopicsByUser(*user_id));
            keys.insert(CollectionKey::PostsByUser(*user_id));
        }
        keys
    }
}

/// Per-user aggregates.
pub fn user_count_keys(user_id: i64) -> [CountKey; 2] {
    [
        CountKey::TopicsByUser(user_id),
        CountKey::RepliesByUser(user_id),
    ]
}
