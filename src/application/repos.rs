//! Repository traits describing the forum's persistence adapter.
//!
//! The cache layer treats the store as the single source of truth: every read
//! accessor falls back to one of these queries on a miss, and every write path
//! goes through one of the `*WriteRepo` traits before the coordinator runs.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::entities::{
    CategoryRecord, PostRecord, SectionRecord, TopicRecord, UserRecord,
};
use crate::domain::types::UserRole;

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Filter for topic aggregate queries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicScope {
    All,
    Category(i64),
    Author(i64),
}

/// Filter for post aggregate queries. Opening posts are included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostScope {
    All,
    Category(i64),
    Topic(i64),
    Author(i64),
}

#[derive(Debug, Clone)]
pub struct CreateUserParams {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub role: UserRole,
}

#[derive(Debug, Clone)]
pub struct CreateTopicParams {
    pub category_id: i64,
    pub author_id: i64,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct UpdateTopicParams {
    pub id: i64,
    pub title: String,
    pub pinned: bool,
    pub locked: bool,
}

#[derive(Debug, Clone)]
pub struct CreatePostParams {
    pub topic_id: i64,
    pub author_id: i64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct UpdatePostParams {
    pub id: i64,
    pub content: String,
}

#[derive(Debug, Clone)]
pub struct UpdateCategoryParams {
    pub id: i64,
    pub section_id: i64,
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct UpdateSectionParams {
    pub id: i64,
    pub name: String,
    pub description: String,
}

#[async_trait]
pub trait UsersRepo: Send + Sync {
    async fn count_users(&self) -> Result<u64, RepoError>;

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError>;

    /// Case-insensitive match on the username column.
    async fn find_user_by_username(&self, username: &str)
    -> Result<Option<UserRecord>, RepoError>;

    /// Case-insensitive match on the email column.
    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError>;
}

#[async_trait]
pub trait UsersWriteRepo: Send + Sync {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError>;

    async fn update_user(&self, user: &UserRecord) -> Result<UserRecord, RepoError>;

    async fn delete_user(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait TopicsRepo: Send + Sync {
    async fn count_topics(&self, scope: TopicScope) -> Result<u64, RepoError>;

    async fn find_topic(&self, id: i64) -> Result<Option<TopicRecord>, RepoError>;

    /// Pinned topics first, then most recently replied.
    async fn list_topics_in_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<TopicRecord>, RepoError>;

    /// Newest first.
    async fn list_topics_by_author(&self, author_id: i64) -> Result<Vec<TopicRecord>, RepoError>;

    async fn list_topic_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, RepoError>;
}

#[async_trait]
pub trait TopicsWriteRepo: Send + Sync {
    /// Creates the topic together with its opening post.
    async fn create_topic(
        &self,
        params: CreateTopicParams,
    ) -> Result<(TopicRecord, PostRecord), RepoError>;

    async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, RepoError>;

    /// Deletes the topic and every post in it.
    async fn delete_topic(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait PostsRepo: Send + Sync {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError>;

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError>;

    /// Oldest first.
    async fn list_posts_in_topic(&self, topic_id: i64) -> Result<Vec<PostRecord>, RepoError>;

    /// Newest first.
    async fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<PostRecord>, RepoError>;

    /// Newest first.
    async fn list_posts_in_category(&self, category_id: i64)
    -> Result<Vec<PostRecord>, RepoError>;

    /// Distinct authors of any post in the topic, opening post included.
    async fn list_poster_ids_in_topic(&self, topic_id: i64) -> Result<Vec<i64>, RepoError>;

    /// Distinct authors of any post in any topic of the category.
    async fn list_poster_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, RepoError>;
}

#[async_trait]
pub trait PostsWriteRepo: Send + Sync {
    /// Inserts a reply and bumps the parent topic's `replied_at`.
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError>;

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError>;

    async fn set_ai_probability(
        &self,
        id: i64,
        probability: f32,
    ) -> Result<PostRecord, RepoError>;

    async fn delete_post(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait CategoriesRepo: Send + Sync {
    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError>;

    async fn list_category_ids_in_section(&self, section_id: i64) -> Result<Vec<i64>, RepoError>;
}

#[async_trait]
pub trait CategoriesWriteRepo: Send + Sync {
    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError>;

    /// Deletes the category with all of its topics and posts.
    async fn delete_category(&self, id: i64) -> Result<(), RepoError>;
}

#[async_trait]
pub trait SectionsWriteRepo: Send + Sync {
    async fn update_section(&self, params: UpdateSectionParams)
    -> Result<SectionRecord, RepoError>;

    /// Deletes the section with all of its categories.
    async fn delete_section(&self, id: i64) -> Result<(), RepoError>;
}

/// Everything the cache and the forum service need from the backing store.
pub trait ForumStore:
    UsersRepo
    + UsersWriteRepo
    + TopicsRepo
    + TopicsWriteRepo
    + PostsRepo
    + PostsWriteRepo
    + CategoriesRepo
    + CategoriesWriteRepo
    + SectionsWriteRepo
{
}

impl<T> ForumStore for T where
    T: UsersRepo
        + UsersWriteRepo
        + TopicsRepo
        + TopicsWriteRepo
        + PostsRepo
        + PostsWriteRepo
        + CategoriesRepo
        + CategoriesWriteRepo
        + SectionsWriteRepo
{
}
