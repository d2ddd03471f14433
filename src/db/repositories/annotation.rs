//! Annotation repository

use crate::db::DynDatabasePool;
use crate::models::Annotation;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Annotation repository trait
#[async_trait]
pub trait AnnotationRepository: Send + Sync {
    async fn create(&self, annotation: &Annotation) -> Result<Annotation>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Annotation>>;

    /// Persist name, description and data; bumps `updated_at`
    async fn update(&self, annotation: &Annotation) -> Result<Annotation>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Annotations on a slide ordered by name
    async fn list_by_slide(&self, slide_id: i64) -> Result<Vec<Annotation>>;

    /// Whether `(name, author, slide)` is taken by another annotation
    async fn exists(
        &self,
        name: &str,
        author_id: i64,
        slide_id: i64,
        exclude_id: Option<i64>,
    ) -> Result<bool>;
}

/// SQLx-based annotation repository implementation
pub struct SqlxAnnotationRepository {
    pool: DynDatabasePool,
}

impl SqlxAnnotationRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn AnnotationRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl AnnotationRepository for SqlxAnnotationRepository {
    async fn create(&self, annotation: &Annotation) -> Result<Annotation> {
        let result = sqlx::query(
            r#"
            INSERT INTO annotations (name, description, data, author_id, slide_id,
                                     created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&annotation.name)
        .bind(&annotation.description)
        .bind(annotation.data.to_string())
        .bind(annotation.author_id)
        .bind(annotation.slide_id)
        .bind(annotation.created_at)
        .bind(annotation.updated_at)
        .execute(self.pool.sqlite()?)
        .await
        .context("Failed to create annotation")?;

        Ok(Annotation {
            id: result.last_insert_rowid(),
            ..annotation.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Annotation>> {
        get_annotation_by_id(self.pool.sqlite()?, id).await
    }

    async fn update(&self, annotation: &Annotation) -> Result<Annotation> {
        let pool = self.pool.sqlite()?;
        sqlx::query(
            r#"
            UPDATE annotations
            SET name = ?, description = ?, data = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&annotation.name)
        .bind(&annotation.description)
        .bind(annotation.data.to_string())
        .bind(Utc::now())
        .bind(annotation.id)
        .execute(pool)
        .await
        .context("Failed to update annotation")?;

        get_annotation_by_id(pool, annotation.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Annotation not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM annotations WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete annotation")?;
        Ok(())
    }

    async fn list_by_slide(&self, slide_id: i64) -> Result<Vec<Annotation>> {
        let sql = format!(
            "SELECT {} FROM annotations WHERE slide_id = ? ORDER BY name, id",
            ANNOTATION_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(slide_id)
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to list annotations")?;
        rows.iter().map(row_to_annotation).collect()
    }

    async fn exists(
        &self,
        name: &str,
        author_id: i64,
        slide_id: i64,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let row = sqlx::query(
            r#"
            SELECT COUNT(*) as count FROM annotations
            WHERE name = ? AND author_id = ? AND slide_id = ? AND id IS NOT ?
            "#,
        )
        .bind(name)
        .bind(author_id)
        .bind(slide_id)
        .bind(exclude_id)
        .fetch_one(self.pool.sqlite()?)
        .await
        .context("Failed to check annotation name")?;
        Ok(row.get::<i64, _>("count") > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const ANNOTATION_COLUMNS: &str =
    "id, name, description, data, author_id, slide_id, created_at, updated_at";

async fn get_annotation_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Annotation>> {
    let sql = format!("SELECT {} FROM annotations WHERE id = ?", ANNOTATION_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get annotation by id")?;
    row.as_ref().map(row_to_annotation).transpose()
}

fn row_to_annotation(row: &sqlx::sqlite::SqliteRow) -> Result<Annotation> {
    let data: String = row.try_get("data")?;
    Ok(Annotation {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        data: serde_json::from_str(&data).context("Invalid annotation data")?,
        author_id: row.try_get("author_id")?,
        slide_id: row.try_get("slide_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
