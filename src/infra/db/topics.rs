use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreateTopicParams, RepoError, TopicScope, TopicsRepo, TopicsWriteRepo, UpdateTopicParams,
    },
    domain::entities::{PostRecord, TopicRecord},
};

use super::{
    PostgresStore,
    posts::{POST_COLUMNS, PostRow},
    util::{count_from_db, expect_affected, map_sqlx_error},
};

pub(super) const TOPIC_COLUMNS: &str = "id, category_id, author_id, title, is_pinned, is_locked, \
    COALESCE(replied_at, created_at) AS replied_at, created_at, updated_at";

#[derive(sqlx::FromRow)]
pub(super) struct TopicRow {
    id: i64,
    category_id: i64,
    author_id: i64,
    title: String,
    is_pinned: bool,
    is_locked: bool,
    replied_at: OffsetDateTime,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<TopicRow> for TopicRecord {
    fn from(row: TopicRow) -> Self {
        Self {
            id: row.id,
            category_id: row.category_id,
            author_id: row.author_id,
            title: row.title,
            pinned: row.is_pinned,
            locked: row.is_locked,
            replied_at: row.replied_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[async_trait]
impl TopicsRepo for PostgresStore {
    async fn count_topics(&self, scope: TopicScope) -> Result<u64, RepoError> {
        let (filter, bound) = match scope {
            TopicScope::All => ("", None),
            TopicScope::Category(id) => (" AND category_id = $1", Some(id)),
            TopicScope::Author(id) => (" AND author_id = $1", Some(id)),
        };
        let sql = format!("SELECT COUNT(*) FROM topics WHERE deleted_at IS NULL{filter}");

        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        if let Some(id) = bound {
            query = query.bind(id);
        }
        let count = query
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(count_from_db(count))
    }

    async fn find_topic(&self, id: i64) -> Result<Option<TopicRecord>, RepoError> {
        let sql =
            format!("SELECT {TOPIC_COLUMNS} FROM topics WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, TopicRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(TopicRecord::from))
    }

    async fn list_topics_in_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<TopicRecord>, RepoError> {
        let sql = format!(
            "SELECT {TOPIC_COLUMNS} FROM topics \
             WHERE category_id = $1 AND deleted_at IS NULL \
             ORDER BY is_pinned DESC, COALESCE(replied_at, created_at) DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, TopicRow>(&sql)
            .bind(category_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TopicRecord::from).collect())
    }

    async fn list_topics_by_author(&self, author_id: i64) -> Result<Vec<TopicRecord>, RepoError> {
        let sql = format!(
            "SELECT {TOPIC_COLUMNS} FROM topics \
             WHERE author_id = $1 AND deleted_at IS NULL \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, TopicRow>(&sql)
            .bind(author_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(TopicRecord::from).collect())
    }

    async fn list_topic_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM topics WHERE category_id = $1 AND deleted_at IS NULL ORDER BY id",
        )
        .bind(category_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl TopicsWriteRepo for PostgresStore {
    async fn create_topic(
        &self,
        params: CreateTopicParams,
    ) -> Result<(TopicRecord, PostRecord), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let topic_sql = format!(
            "INSERT INTO topics \
                (category_id, author_id, title, is_pinned, is_locked, replied_at, created_at, updated_at) \
             VALUES ($1, $2, $3, FALSE, FALSE, now(), now(), now()) \
             RETURNING {TOPIC_COLUMNS}"
        );
        let topic = sqlx::query_as::<_, TopicRow>(&topic_sql)
            .bind(params.category_id)
            .bind(params.author_id)
            .bind(&params.title)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        let post_sql = format!(
            "INSERT INTO posts (topic_id, author_id, content, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) \
             RETURNING {POST_COLUMNS}"
        );
        let opening = sqlx::query_as::<_, PostRow>(&post_sql)
            .bind(topic.id)
            .bind(params.author_id)
            .bind(&params.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok((TopicRecord::from(topic), PostRecord::from(opening)))
    }

    async fn update_topic(&self, params: UpdateTopicParams) -> Result<TopicRecord, RepoError> {
        let sql = format!(
            "UPDATE topics SET title = $2, is_pinned = $3, is_locked = $4, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {TOPIC_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TopicRow>(&sql)
            .bind(params.id)
            .bind(&params.title)
            .bind(params.pinned)
            .bind(params.locked)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(TopicRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_topic(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        sqlx::query(
            "UPDATE posts SET deleted_at = now() WHERE topic_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "UPDATE topics SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_affected(result.rows_affected())?;

        tx.commit().await.map_err(map_sqlx_error)
    }
}
