use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{CreateUserParams, RepoError, UsersRepo, UsersWriteRepo},
    domain::{entities::UserRecord, types::UserRole},
};

use super::{
    PostgresStore,
    util::{count_from_db, expect_affected, map_sqlx_error},
};

const USER_COLUMNS: &str = "id, username, email, password_hash, user_type, motto, \
    profile_pic_url, signature, email_verified, is_banned, banned_until, ban_reason, \
    created_at, updated_at";

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    username: String,
    email: String,
    password_hash: String,
    user_type: UserRole,
    motto: Option<String>,
    profile_pic_url: Option<String>,
    signature: Option<String>,
    email_verified: bool,
    is_banned: bool,
    banned_until: Option<OffsetDateTime>,
    ban_reason: Option<String>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<UserRow> for UserRecord {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            role: row.user_type,
            motto: row.motto.unwrap_or_default(),
            profile_pic_url: row.profile_pic_url.unwrap_or_default(),
            signature: row.signature.unwrap_or_default(),
            email_verified: row.email_verified,
            is_banned: row.is_banned,
            banned_until: row.banned_until,
            ban_reason: row.ban_reason.unwrap_or_default(),
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresStore {
    async fn find_user_where(
        &self,
        predicate: &str,
        value: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!(
            "SELECT {USER_COLUMNS} FROM users WHERE {predicate} AND deleted_at IS NULL LIMIT 1"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(value)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }
}

#[async_trait]
impl UsersRepo for PostgresStore {
    async fn count_users(&self) -> Result<u64, RepoError> {
        let count =
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users WHERE deleted_at IS NULL")
                .fetch_one(self.pool())
                .await
                .map_err(map_sqlx_error)?;

        Ok(count_from_db(count))
    }

    async fn find_user_by_id(&self, id: i64) -> Result<Option<UserRecord>, RepoError> {
        let sql = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(UserRecord::from))
    }

    async fn find_user_by_username(
        &self,
        username: &str,
    ) -> Result<Option<UserRecord>, RepoError> {
        self.find_user_where("LOWER(username) = LOWER($1)", username)
            .await
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<UserRecord>, RepoError> {
        self.find_user_where("LOWER(email) = LOWER($1)", email).await
    }
}

#[async_trait]
impl UsersWriteRepo for PostgresStore {
    async fn create_user(&self, params: CreateUserParams) -> Result<UserRecord, RepoError> {
        let sql = format!(
            "INSERT INTO users (username, email, password_hash, user_type, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, now(), now()) \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(params.username.trim())
            .bind(params.email.trim())
            .bind(&params.password_hash)
            .bind(params.role)
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(UserRecord::from(row))
    }

    async fn update_user(&self, user: &UserRecord) -> Result<UserRecord, RepoError> {
        let sql = format!(
            "UPDATE users SET \
                username = $2, email = $3, password_hash = $4, user_type = $5, motto = $6, \
                profile_pic_url = $7, signature = $8, email_verified = $9, is_banned = $10, \
                banned_until = $11, ban_reason = $12, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {USER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, UserRow>(&sql)
            .bind(user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(user.role)
            .bind(&user.motto)
            .bind(&user.profile_pic_url)
            .bind(&user.signature)
            .bind(user.email_verified)
            .bind(user.is_banned)
            .bind(user.banned_until)
            .bind(&user.ban_reason)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(UserRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_user(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE users SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        expect_affected(result.rows_affected())
    }
}
