//! Forum write paths.
//!
//! Each mutation checks its inputs, writes through the store, and reports what
//! changed to the invalidation coordinator. Deletions enumerate the affected
//! rows first, while they still exist.

use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument};

use crate::application::error::AppError;
use crate::application::repos::{
    CreatePostParams, CreateTopicParams, ForumStore, UpdateCategoryParams, UpdatePostParams,
    UpdateSectionParams, UpdateTopicParams,
};
use crate::cache::{ForumCache, ForumEvent, TopicFootprint};
use crate::domain::entities::{CategoryRecord, PostRecord, SectionRecord, TopicRecord, UserRecord};
use crate::domain::error::DomainError;
use crate::domain::validation::{check_ai_probability, normalize_content, normalize_title};

/// Headline numbers for the board index and the admin panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BoardTotals {
    pub users: u64,
    pub topics: u64,
    pub replies: u64,
}

#[derive(Clone)]
pub struct ForumService {
    store: Arc<dyn ForumStore>,
    cache: ForumCache,
    max_post_chars: usize,
}

impl ForumService {
    pub fn new(store: Arc<dyn ForumStore>, cache: ForumCache, max_post_chars: usize) -> Self {
        Self {
            store,
            cache,
            max_post_chars,
        }
    }

    pub fn cache(&self) -> &ForumCache {
        &self.cache
    }

    pub async fn board_totals(&self) -> Result<BoardTotals, AppError> {
        let counts = self.cache.counts();
        Ok(BoardTotals {
            users: counts.count_all_users().await?,
            topics: counts.count_all_topics().await?,
            replies: counts.count_all_replies().await?,
        })
    }

    // ========================================================================
    // Topics
    // ========================================================================

    #[instrument(skip(self, params), fields(category_id = params.category_id, author_id = params.author_id))]
    pub async fn create_topic(
        &self,
        params: CreateTopicParams,
    ) -> Result<(TopicRecord, PostRecord), AppError> {
        let title = normalize_title(&params.title)?;
        let content = normalize_content(&params.content, self.max_post_chars)?;
        self.require_poster(params.author_id).await?;
        self.store
            .find_category(params.category_id)
            .await?
            .ok_or(DomainError::not_found("category"))?;

        let (topic, opening) = self
            .store
            .create_topic(CreateTopicParams {
                title,
                content,
                ..params
            })
            .await?;

        self.cache.coordinator().record(ForumEvent::TopicCreated {
            topic: footprint_of(&topic).with_posters([topic.author_id]),
        });

        info!(topic_id = topic.id, "Topic created");
        Ok((topic, opening))
    }

    #[instrument(skip(self, params), fields(topic_id = params.id))]
    pub async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, AppError> {
        let title = normalize_title(&params.title)?;
        let existing = self.require_topic(params.id).await?;

        let topic = self
            .store
            .update_topic(UpdateTopicParams { title, ..params })
            .await?;

        self.cache.coordinator().record(ForumEvent::TopicUpdated {
            topic_id: topic.id,
            category_id: existing.category_id,
            author_id: existing.author_id,
        });
        Ok(topic)
    }

    /// Delete a topic with all of its posts.
    #[instrument(skip(self))]
    pub async fn delete_topic(&self, topic_id: i64) -> Result<(), AppError> {
        let footprint = self
            .cache
            .counts()
            .topic_footprint(topic_id)
            .await?
            .ok_or(DomainError::not_found("topic"))?;

        self.store.delete_topic(topic_id).await?;

        self.cache
            .coordinator()
            .record(ForumEvent::TopicDeleted { topic: footprint });

        info!(topic_id, "Topic deleted");
        Ok(())
    }

    // ========================================================================
    // Posts
    // ========================================================================

    /// Add a reply. Locked topics accept replies from moderators only.
    #[instrument(skip(self, params), fields(topic_id = params.topic_id, author_id = params.author_id))]
    pub async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, AppError> {
        let content = normalize_content(&params.content, self.max_post_chars)?;
        let author = self.require_poster(params.author_id).await?;
        let topic = self.require_topic(params.topic_id).await?;
        if topic.locked && !author.can_moderate() {
            return Err(DomainError::TopicLocked { topic_id: topic.id }.into());
        }

        let post = self
            .store
            .create_post(CreatePostParams { content, ..params })
            .await?;

        self.cache.coordinator().record(ForumEvent::PostCreated {
            topic: footprint_of(&topic).with_posters([post.author_id]),
            post_author_id: post.author_id,
        });
        Ok(post)
    }

    #[instrument(skip(self, params), fields(post_id = params.id))]
    pub async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, AppError> {
        let content = normalize_content(&params.content, self.max_post_chars)?;
        let (existing, topic) = self.require_post(params.id).await?;

        let post = self
            .store
            .update_post(UpdatePostParams { content, ..params })
            .await?;

        self.cache.coordinator().record(ForumEvent::PostUpdated {
            topic_id: topic.id,
            category_id: topic.category_id,
            post_author_id: existing.author_id,
        });
        Ok(post)
    }

    /// Store the score reported by the AI-content detector for a post.
    #[instrument(skip(self))]
    pub async fn record_ai_probability(
        &self,
        post_id: i64,
        probability: f32,
    ) -> Result<PostRecord, AppError> {
        let probability = check_ai_probability(probability)?;
        let (existing, topic) = self.require_post(post_id).await?;

        let post = self.store.set_ai_probability(post_id, probability).await?;

        self.cache.coordinator().record(ForumEvent::PostUpdated {
            topic_id: topic.id,
            category_id: topic.category_id,
            post_author_id: existing.author_id,
        });
        Ok(post)
    }

    /// Delete a reply. The opening post goes only with its topic.
    #[instrument(skip(self))]
    pub async fn delete_post(&self, post_id: i64) -> Result<(), AppError> {
        let (post, topic) = self.require_post(post_id).await?;
        let thread = self.cache.collections().posts_in_topic(topic.id).await?;
        if thread.first().map(|opening| opening.id) == Some(post.id) {
            return Err(DomainError::OpeningPost { post_id }.into());
        }

        self.store.delete_post(post_id).await?;

        self.cache.coordinator().record(ForumEvent::PostDeleted {
            topic: footprint_of(&topic).with_posters([post.author_id]),
            post_author_id: post.author_id,
        });
        Ok(())
    }

    // ========================================================================
    // Categories and sections
    // ========================================================================

    pub async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, AppError> {
        let category = self.store.update_category(params).await?;
        self.cache.coordinator().record(ForumEvent::CategoryUpdated {
            category_id: category.id,
        });
        Ok(category)
    }

    /// Delete a category with every topic and post in it.
    #[instrument(skip(self))]
    pub async fn delete_category(&self, category_id: i64) -> Result<(), AppError> {
        self.store
            .find_category(category_id)
            .await?
            .ok_or(DomainError::not_found("category"))?;
        let footprint = self.cache.counts().category_footprint(category_id).await?;

        self.store.delete_category(category_id).await?;

        info!(
            category_id,
            topics = footprint.topic_ids.len(),
            posters = footprint.poster_ids.len(),
            "Category deleted"
        );
        self.cache.coordinator().record(ForumEvent::CategoryDeleted {
            category: footprint,
        });
        Ok(())
    }

    pub async fn update_section(
        &self,
        params: UpdateSectionParams,
    ) -> Result<SectionRecord, AppError> {
        let section = self.store.update_section(params).await?;
        self.cache.coordinator().record(ForumEvent::SectionUpdated {
            section_id: section.id,
        });
        Ok(section)
    }

    /// Delete a section with all of its categories.
    #[instrument(skip(self))]
    pub async fn delete_section(&self, section_id: i64) -> Result<(), AppError> {
        let category_ids = self.store.list_category_ids_in_section(section_id).await?;
        let mut categories = Vec::with_capacity(category_ids.len());
        for category_id in category_ids {
            categories.push(self.cache.counts().category_footprint(category_id).await?);
        }

        self.store.delete_section(section_id).await?;

        info!(section_id, categories = categories.len(), "Section deleted");
        self.cache.coordinator().record(ForumEvent::SectionDeleted {
            section_id,
            categories,
        });
        Ok(())
    }

    // ========================================================================
    // Lookups
    // ========================================================================

    async fn require_poster(&self, user_id: i64) -> Result<UserRecord, AppError> {
        let user = self
            .cache
            .identity()
            .get_user_by_id(user_id)
            .await?
            .ok_or(DomainError::not_found("user"))?;
        if !user.can_post() {
            return Err(DomainError::PostingNotAllowed { user_id }.into());
        }
        Ok(user)
    }

    async fn require_topic(&self, topic_id: i64) -> Result<TopicRecord, AppError> {
        let topic = self
            .store
            .find_topic(topic_id)
            .await?
            .ok_or(DomainError::not_found("topic"))?;
        Ok(topic)
    }

    async fn require_post(&self, post_id: i64) -> Result<(PostRecord, TopicRecord), AppError> {
        let post = self
            .store
            .find_post(post_id)
            .await?
            .ok_or(DomainError::not_found("post"))?;
        let topic = self.require_topic(post.topic_id).await?;
        Ok((post, topic))
    }
}

fn footprint_of(topic: &TopicRecord) -> TopicFootprint {
    TopicFootprint::new(topic.id, topic.category_id, topic.author_id)
}
