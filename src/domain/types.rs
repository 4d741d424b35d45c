//! Shared domain enumerations aligned with persisted database values.

use serde::{Deserialize, Serialize};

/// Account tier. Persisted as a bigint (`users.user_type`), ordered by privilege.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Default,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[repr(i64)]
pub enum UserRole {
    #[default]
    Unverified = 0,
    Member = 1,
    Moderator = 2,
    Admin = 3,
}

impl UserRole {
    pub fn as_str(self) -> &'static str {
        match self {
            UserRole::Unverified => "unverified",
            UserRole::Member => "member",
            UserRole::Moderator => "moderator",
            UserRole::Admin => "admin",
        }
    }
}
