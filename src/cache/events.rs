//! Forum mutation events.
//!
//! Every write path describes what it changed as a `ForumEvent` once the store
//! write has succeeded. Delete events carry footprints that were enumerated
//! before the rows disappeared.

use super::keys::{CategoryFootprint, TopicFootprint};

/// Types of forum mutations that trigger invalidation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ForumEvent {
    // Posts
    /// A reply was added. `topic` lists the new post's author among its
    /// posters.
    PostCreated {
        topic: TopicFootprint,
        post_author_id: i64,
    },
    /// A post's content or moderation score changed.
    PostUpdated {
        topic_id: i64,
        category_id: i64,
        post_author_id: i64,
    },
    /// A reply was removed.
    PostDeleted {
        topic: TopicFootprint,
        post_author_id: i64,
    },

    // Topics
    /// A topic was created together with its opening post.
    TopicCreated { topic: TopicFootprint },
    /// A topic's title or flags changed.
    TopicUpdated {
        topic_id: i64,
        category_id: i64,
        author_id: i64,
    },
    /// A topic and all of its posts were removed.
    TopicDeleted { topic: TopicFootprint },

    // Structure
    /// A category was renamed or moved.
    CategoryUpdated { category_id: i64 },
    /// A category was removed with its topics and posts.
    CategoryDeleted { category: CategoryFootprint },
    /// A section was renamed.
    SectionUpdated { section_id: i64 },
    /// A section was removed with its categories.
    SectionDeleted {
        section_id: i64,
        categories: Vec<CategoryFootprint>,
    },
}

impl ForumEvent {
    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            ForumEvent::PostCreated { .. } => "post_created",
            ForumEvent::PostUpdated { .. } => "post_updated",
            ForumEvent::PostDeleted { .. } => "post_deleted",
            ForumEvent::TopicCreated { .. } => "topic_created",
            ForumEvent::TopicUpdated { .. } => "topic_updated",
            ForumEvent::TopicDeleted { .. } => "topic_deleted",
            ForumEvent::CategoryUpdated { .. } => "category_updated",
            ForumEvent::CategoryDeleted { .. } => "category_deleted",
            ForumEvent::SectionUpdated { .. } => "section_updated",
            ForumEvent::SectionDeleted { .. } => "section_deleted",
        }
    }
}
