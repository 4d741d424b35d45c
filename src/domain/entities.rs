//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::OffsetDateTime;

use crate::domain::types::UserRole;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserRecord {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: UserRole,
    pub motto: String,
    pub profile_pic_url: String,
    pub signature: String,
    pub email_verified: bool,
    pub is_banned: bool,
    pub banned_until: Option<OffsetDateTime>,
    pub ban_reason: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl UserRecord {
    /// Lower-cased username used as the identity-cache key.
    pub fn username_key(&self) -> String {
        normalize_login(&self.username)
    }

    /// Lower-cased email used as the identity-cache key.
    pub fn email_key(&self) -> String {
        normalize_login(&self.email)
    }

    pub fn can_moderate(&self) -> bool {
        self.role >= UserRole::Moderator
    }

    /// Verified, unbanned members may open topics and reply.
    pub fn can_post(&self) -> bool {
        self.role >= UserRole::Member && !self.is_banned
    }
}

/// Usernames and emails are matched case-insensitively.
pub fn normalize_login(value: &str) -> String {
    value.trim().to_lowercase()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectionRecord {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRecord {
    pub id: i64,
    pub section_id: i64,
    pub name: String,
    pub description: String,
    pub position: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRecord {
    pub id: i64,
    pub category_id: i64,
    pub author_id: i64,
    pub title: String,
    pub pinned: bool,
    pub locked: bool,
    pub replied_at: OffsetDateTime,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostRecord {
    pub id: i64,
    pub topic_id: i64,
    pub author_id: i64,
    pub content: String,
    pub ai_probability: Option<f32>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
