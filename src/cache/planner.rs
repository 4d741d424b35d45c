//! Invalidation plan generation.
//!
//! Folds a batch of forum events into the deduplicated set of count and
//! collection keys that went stale.

use std::collections::BTreeSet;
use std::fmt;

use super::events::ForumEvent;
use super::keys::{CollectionKey, CountKey, TopicFootprint};

/// Keys to drop for cache consistency.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Aggregate counts to drop.
    pub counts: BTreeSet<CountKey>,
    /// Topic and post lists to drop.
    pub collections: BTreeSet<CollectionKey>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ counts: {}, collections: {} }}",
            self.counts.len(),
            self.collections.len(),
        )
    }
}

impl InvalidationPlan {
    /// Merge multiple events into one plan.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a ForumEvent>,
    {
        let mut plan = Self::default();

        for event in events {
            match event {
                ForumEvent::PostCreated {
                    topic,
                    post_author_id,
                }
                | ForumEvent::PostDeleted {
                    topic,
                    post_author_id,
                } => {
                    plan.counts.extend(topic.count_keys());
                    plan.add_post_lists(topic.topic_id, topic.category_id, *post_author_id);
                    // The topic row carries `replied_at`, so both topic
                    // lists that hold it go too.
                    plan.add_topic_lists(topic.category_id, topic.author_id);
                }
                ForumEvent::PostUpdated {
                    topic_id,
                    category_id,
                    post_author_id,
                } => {
                    plan.add_post_lists(*topic_id, *category_id, *post_author_id);
                }
                ForumEvent::TopicCreated { topic } => {
                    plan.add_topic(topic);
                }
                ForumEvent::TopicUpdated {
                    category_id,
                    author_id,
                    ..
                } => {
                    plan.add_topic_lists(*category_id, *author_id);
                }
                ForumEvent::TopicDeleted { topic } => {
                    plan.add_topic(topic);
                    plan.collections.extend(
                        topic
                            .poster_ids
                            .iter()
                            .copied()
                            .map(CollectionKey::PostsByUser),
                    );
                }
                ForumEvent::CategoryUpdated { .. } | ForumEvent::SectionUpdated { .. } => {
                    // Lists and counts do not embed names.
                }
                ForumEvent::CategoryDeleted { category } => {
                    plan.counts.extend(category.count_keys());
                    plan.collections.extend(category.collection_keys());
                }
                ForumEvent::SectionDeleted { categories, .. } => {
                    for category in categories {
                        plan.counts.extend(category.count_keys());
                        plan.collections.extend(category.collection_keys());
                    }
                }
            }
        }

        plan
    }

    /// Check if the plan has any keys to drop.
    pub fn is_empty(&self) -> bool {
        self.counts.is_empty() && self.collections.is_empty()
    }

    fn add_topic(&mut self, topic: &TopicFootprint) {
        self.counts.extend(topic.count_keys());
        self.add_topic_lists(topic.category_id, topic.author_id);
        self.add_post_lists(topic.topic_id, topic.category_id, topic.author_id);
    }

    fn add_topic_lists(&mut self, category_id: i64, author_id: i64) {
        self.collections
            .insert(CollectionKey::TopicsInCategory(category_id));
        self.collections
            .insert(CollectionKey::TopicsByUser(author_id));
    }

    fn add_post_lists(&mut self, topic_id: i64, category_id: i64, author_id: i64) {
        self.collections.insert(CollectionKey::PostsInTopic(topic_id));
        self.collections
            .insert(CollectionKey::PostsInCategory(category_id));
        self.collections.insert(CollectionKey::PostsByUser(author_id));
    }
}
