use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CreatePostParams, PostScope, PostsRepo, PostsWriteRepo, RepoError, UpdatePostParams,
    },
    domain::entities::PostRecord,
};

use super::{
    PostgresStore,
    util::{count_from_db, expect_affected, map_sqlx_error},
};

pub(super) const POST_COLUMNS: &str = "id, topic_id, author_id, content, \
    ai_probability::real AS ai_probability, created_at, updated_at";

const LIVE_TOPICS_IN_CATEGORY: &str =
    "SELECT id FROM topics WHERE category_id = $1 AND deleted_at IS NULL";

#[derive(sqlx::FromRow)]
pub(super) struct PostRow {
    id: i64,
    topic_id: i64,
    author_id: i64,
    content: String,
    ai_probability: Option<f32>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<PostRow> for PostRecord {
    fn from(row: PostRow) -> Self {
        Self {
            id: row.id,
            topic_id: row.topic_id,
            author_id: row.author_id,
            content: row.content,
            ai_probability: row.ai_probability,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl PostgresStore {
    async fn list_posts_where(
        &self,
        predicate: &str,
        order: &str,
        id: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let sql = format!(
            "SELECT {POST_COLUMNS} FROM posts \
             WHERE deleted_at IS NULL AND {predicate} \
             ORDER BY {order}"
        );
        let rows = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(PostRecord::from).collect())
    }
}

#[async_trait]
impl PostsRepo for PostgresStore {
    async fn count_posts(&self, scope: PostScope) -> Result<u64, RepoError> {
        let (filter, bound) = match scope {
            PostScope::All => (String::new(), None),
            PostScope::Topic(id) => (" AND topic_id = $1".to_string(), Some(id)),
            PostScope::Author(id) => (" AND author_id = $1".to_string(), Some(id)),
            PostScope::Category(id) => (
                format!(" AND topic_id IN ({LIVE_TOPICS_IN_CATEGORY})"),
                Some(id),
            ),
        };
        let sql = format!("SELECT COUNT(*) FROM posts WHERE deleted_at IS NULL{filter}");

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

    async fn find_post(&self, id: i64) -> Result<Option<PostRecord>, RepoError> {
        let sql = format!("SELECT {POST_COLUMNS} FROM posts WHERE id = $1 AND deleted_at IS NULL");
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(PostRecord::from))
    }

    async fn list_posts_in_topic(&self, topic_id: i64) -> Result<Vec<PostRecord>, RepoError> {
        self.list_posts_where("topic_id = $1", "created_at ASC, id ASC", topic_id)
            .await
    }

    async fn list_posts_by_author(&self, author_id: i64) -> Result<Vec<PostRecord>, RepoError> {
        self.list_posts_where("author_id = $1", "created_at DESC, id DESC", author_id)
            .await
    }

    async fn list_posts_in_category(
        &self,
        category_id: i64,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let predicate = format!("topic_id IN ({LIVE_TOPICS_IN_CATEGORY})");
        self.list_posts_where(&predicate, "created_at DESC, id DESC", category_id)
            .await
    }

    async fn list_poster_ids_in_topic(&self, topic_id: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT DISTINCT author_id FROM posts \
             WHERE topic_id = $1 AND deleted_at IS NULL \
             ORDER BY author_id",
        )
        .bind(topic_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }

    async fn list_poster_ids_in_category(&self, category_id: i64) -> Result<Vec<i64>, RepoError> {
        let sql = format!(
            "SELECT author_id FROM posts \
             WHERE deleted_at IS NULL AND topic_id IN ({LIVE_TOPICS_IN_CATEGORY}) \
             UNION \
             SELECT author_id FROM topics WHERE category_id = $1 AND deleted_at IS NULL \
             ORDER BY 1"
        );
        sqlx::query_scalar::<_, i64>(&sql)
            .bind(category_id)
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl PostsWriteRepo for PostgresStore {
    async fn create_post(&self, params: CreatePostParams) -> Result<PostRecord, RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        let sql = format!(
            "INSERT INTO posts (topic_id, author_id, content, created_at, updated_at) \
             VALUES ($1, $2, $3, now(), now()) \
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.topic_id)
            .bind(params.author_id)
            .bind(&params.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        sqlx::query("UPDATE topics SET replied_at = $2 WHERE id = $1")
            .bind(params.topic_id)
            .bind(row.created_at)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx_error)?;

        tx.commit().await.map_err(map_sqlx_error)?;

        Ok(PostRecord::from(row))
    }

    async fn update_post(&self, params: UpdatePostParams) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "UPDATE posts SET content = $2, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(params.id)
            .bind(&params.content)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn set_ai_probability(
        &self,
        id: i64,
        probability: f32,
    ) -> Result<PostRecord, RepoError> {
        let sql = format!(
            "UPDATE posts SET ai_probability = $2 \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {POST_COLUMNS}"
        );
        let row = sqlx::query_as::<_, PostRow>(&sql)
            .bind(id)
            .bind(f64::from(probability))
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(PostRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_post(&self, id: i64) -> Result<(), RepoError> {
        let result = sqlx::query(
            "UPDATE posts SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        expect_affected(result.rows_affected())
    }
}
