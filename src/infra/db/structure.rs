use async_trait::async_trait;
use time::OffsetDateTime;

use crate::{
    application::repos::{
        CategoriesRepo, CategoriesWriteRepo, RepoError, SectionsWriteRepo, UpdateCategoryParams,
        UpdateSectionParams,
    },
    domain::entities::{CategoryRecord, SectionRecord},
};

use super::{
    PostgresStore,
    util::{expect_affected, map_sqlx_error},
};

const SECTION_COLUMNS: &str = "id, name, COALESCE(description, '') AS description, \
    \"order\"::int4 AS position, created_at, updated_at";

const CATEGORY_COLUMNS: &str = "id, section_id, name, COALESCE(description, '') AS description, \
    \"order\"::int4 AS position, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct SectionRow {
    id: i64,
    name: String,
    description: String,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<SectionRow> for SectionRecord {
    fn from(row: SectionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i64,
    section_id: i64,
    name: String,
    description: String,
    position: i32,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<CategoryRow> for CategoryRecord {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: row.id,
            section_id: row.section_id,
            name: row.name,
            description: row.description,
            position: row.position,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Soft-delete posts and topics under every live category matched by `scope`.
///
/// `scope` is a predicate over `categories` binding `$1`.
async fn delete_category_contents(
    tx: &mut sqlx::PgConnection,
    scope: &str,
    id: i64,
) -> Result<(), RepoError> {
    let posts = format!(
        "UPDATE posts SET deleted_at = now() \
         WHERE deleted_at IS NULL AND topic_id IN ( \
             SELECT t.id FROM topics t \
             JOIN categories c ON c.id = t.category_id \
             WHERE t.deleted_at IS NULL AND c.deleted_at IS NULL AND {scope})"
    );
    sqlx::query(&posts)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    let topics = format!(
        "UPDATE topics SET deleted_at = now() \
         WHERE deleted_at IS NULL AND category_id IN ( \
             SELECT c.id FROM categories c WHERE c.deleted_at IS NULL AND {scope})"
    );
    sqlx::query(&topics)
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

    Ok(())
}

#[async_trait]
impl CategoriesRepo for PostgresStore {
    async fn find_category(&self, id: i64) -> Result<Option<CategoryRecord>, RepoError> {
        let sql = format!(
            "SELECT {CATEGORY_COLUMNS} FROM categories WHERE id = $1 AND deleted_at IS NULL"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(row.map(CategoryRecord::from))
    }

    async fn list_category_ids_in_section(&self, section_id: i64) -> Result<Vec<i64>, RepoError> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM categories \
             WHERE section_id = $1 AND deleted_at IS NULL \
             ORDER BY \"order\", id",
        )
        .bind(section_id)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl CategoriesWriteRepo for PostgresStore {
    async fn update_category(
        &self,
        params: UpdateCategoryParams,
    ) -> Result<CategoryRecord, RepoError> {
        let sql = format!(
            "UPDATE categories SET section_id = $2, name = $3, description = $4, \
                updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {CATEGORY_COLUMNS}"
        );
        let row = sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(params.id)
            .bind(params.section_id)
            .bind(&params.name)
            .bind(&params.description)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(CategoryRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_category(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        delete_category_contents(&mut tx, "c.id = $1", id).await?;

        let result = sqlx::query(
            "UPDATE categories SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_affected(result.rows_affected())?;

        tx.commit().await.map_err(map_sqlx_error)
    }
}

#[async_trait]
impl SectionsWriteRepo for PostgresStore {
    async fn update_section(
        &self,
        params: UpdateSectionParams,
    ) -> Result<SectionRecord, RepoError> {
        let sql = format!(
            "UPDATE sections SET name = $2, description = $3, updated_at = now() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {SECTION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, SectionRow>(&sql)
            .bind(params.id)
            .bind(&params.name)
            .bind(&params.description)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        row.map(SectionRecord::from).ok_or(RepoError::NotFound)
    }

    async fn delete_section(&self, id: i64) -> Result<(), RepoError> {
        let mut tx = self.begin().await.map_err(map_sqlx_error)?;

        delete_category_contents(&mut tx, "c.section_id = $1", id).await?;

        sqlx::query(
            "UPDATE categories SET deleted_at = now() \
             WHERE section_id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;

        let result = sqlx::query(
            "UPDATE sections SET deleted_at = now() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(map_sqlx_error)?;
        expect_affected(result.rows_affected())?;

        tx.commit().await.map_err(map_sqlx_error)
    }
}
