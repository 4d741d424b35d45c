use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("domain entity `{entity}` not found")]
    NotFound { entity: &'static str },
    #[error("domain validation failed: {message}")]
    Validation { message: String },
    #[error("user {user_id} may not post")]
    PostingNotAllowed { user_id: i64 },
    #[error("topic {topic_id} is locked")]
    TopicLocked { topic_id: i64 },
    #[error("post {post_id} opens its topic and can only be removed with it")]
    OpeningPost { post_id: i64 },
}

impl DomainError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}
