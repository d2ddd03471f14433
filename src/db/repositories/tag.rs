//! Tag repository

use crate::db::DynDatabasePool;
use crate::models::{Tag, TagWithCount};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// Tag repository trait
#[async_trait]
pub trait TagRepository: Send + Sync {
    async fn create(&self, tag: &Tag) -> Result<Tag>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>>;

    /// All tags ordered by name, with slide counts
    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Attach a tag to a slide; attaching twice is a no-op
    async fn attach(&self, tag_id: i64, slide_id: i64) -> Result<()>;

    async fn detach(&self, tag_id: i64, slide_id: i64) -> Result<()>;

    async fn tags_for_slide(&self, slide_id: i64) -> Result<Vec<Tag>>;

    async fn slide_ids_for_tag(&self, tag_id: i64) -> Result<Vec<i64>>;
}

/// SQLx-based tag repository implementation
pub struct SqlxTagRepository {
    pool: DynDatabasePool,
}

impl SqlxTagRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn TagRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl TagRepository for SqlxTagRepository {
    async fn create(&self, tag: &Tag) -> Result<Tag> {
        let result = sqlx::query("INSERT INTO tags (name, created_by, created_at) VALUES (?, ?, ?)")
            .bind(&tag.name)
            .bind(tag.created_by)
            .bind(tag.created_at)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to create tag")?;

        Ok(Tag {
            id: result.last_insert_rowid(),
            ..tag.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Tag>> {
        get_tag(self.pool.sqlite()?, TagKey::Id(id)).await
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Tag>> {
        get_tag(self.pool.sqlite()?, TagKey::Name(name)).await
    }

    async fn list_with_counts(&self) -> Result<Vec<TagWithCount>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.created_by, t.created_at, COUNT(st.slide_id) as slide_count
            FROM tags t
            LEFT JOIN slide_tags st ON st.tag_id = t.id
            GROUP BY t.id
            ORDER BY t.name
            "#,
        )
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to list tags")?;

        rows.iter()
            .map(|row| -> Result<TagWithCount> {
                Ok(TagWithCount {
                    tag: row_to_tag(row)?,
                    slide_count: row.try_get("slide_count")?,
                })
            })
            .collect()
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM tags WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete tag")?;
        Ok(())
    }

    async fn attach(&self, tag_id: i64, slide_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO slide_tags (tag_id, slide_id) VALUES (?, ?)")
            .bind(tag_id)
            .bind(slide_id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to attach tag")?;
        Ok(())
    }

    async fn detach(&self, tag_id: i64, slide_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM slide_tags WHERE tag_id = ? AND slide_id = ?")
            .bind(tag_id)
            .bind(slide_id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to detach tag")?;
        Ok(())
    }

    async fn tags_for_slide(&self, slide_id: i64) -> Result<Vec<Tag>> {
        let rows = sqlx::query(
            r#"
            SELECT t.id, t.name, t.created_by, t.created_at
            FROM tags t
            INNER JOIN slide_tags st ON st.tag_id = t.id
            WHERE st.slide_id = ?
            ORDER BY t.name
            "#,
        )
        .bind(slide_id)
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to get tags for slide")?;
        rows.iter().map(row_to_tag).collect()
    }

    async fn slide_ids_for_tag(&self, tag_id: i64) -> Result<Vec<i64>> {
        let rows = sqlx::query("SELECT slide_id FROM slide_tags WHERE tag_id = ? ORDER BY slide_id")
            .bind(tag_id)
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to get slides for tag")?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("slide_id").map_err(Into::into))
            .collect()
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

enum TagKey<'a> {
    Id(i64),
    Name(&'a str),
}

async fn get_tag(pool: &SqlitePool, key: TagKey<'_>) -> Result<Option<Tag>> {
    let query = match key {
        TagKey::Id(id) => {
            sqlx::query("SELECT id, name, created_by, created_at FROM tags WHERE id = ?").bind(id)
        }
        TagKey::Name(name) => {
            sqlx::query("SELECT id, name, created_by, created_at FROM tags WHERE name = ?")
                .bind(name)
        }
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get tag")?;
    row.as_ref().map(row_to_tag).transpose()
}

fn row_to_tag(row: &sqlx::sqlite::SqliteRow) -> Result<Tag> {
    Ok(Tag {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        created_by: row.try_get("created_by")?,
        created_at: row.try_get("created_at")?,
    })
}
