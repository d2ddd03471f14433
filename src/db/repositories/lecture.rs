//! Lecture repository
//!
//! Lectures, the groups they are shared with and their ordered contents.

use super::push_id_list;
use crate::db::DynDatabasePool;
use crate::models::{ContentInput, Lecture, LectureContent};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Folder restriction for lecture listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FolderScope {
    /// Any folder
    #[default]
    Any,
    /// Directly in one folder, or at the top level when `None`
    In(Option<i64>),
}

/// Lecture repository trait
#[async_trait]
pub trait LectureRepository: Send + Sync {
    async fn create(&self, lecture: &Lecture) -> Result<Lecture>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Lecture>>;

    /// Persist the editable fields; bumps `updated_at`
    async fn update(&self, lecture: &Lecture) -> Result<Lecture>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Every lecture in scope, ordered by creation time
    async fn list_all(&self, scope: FolderScope) -> Result<Vec<Lecture>>;

    /// Active lectures shared with any of `group_ids`, plus every lecture
    /// authored by `author_id` when given
    async fn list_viewable(
        &self,
        group_ids: &[i64],
        author_id: Option<i64>,
        scope: FolderScope,
    ) -> Result<Vec<Lecture>>;

    /// Number of lectures in any of `folder_ids`
    async fn count_in_folders(&self, folder_ids: &[i64]) -> Result<i64>;

    /// Replace the groups a lecture is shared with
    async fn set_groups(&self, lecture_id: i64, group_ids: &[i64]) -> Result<()>;

    /// `(id, name)` of the lecture's groups, ordered by name
    async fn groups_for_lecture(&self, lecture_id: i64) -> Result<Vec<(i64, String)>>;

    /// Replace all contents; entries without an order take their slice position
    async fn replace_contents(&self, lecture_id: i64, contents: &[ContentInput]) -> Result<()>;

    /// Contents ordered by position
    async fn contents(&self, lecture_id: i64) -> Result<Vec<LectureContent>>;

    /// Every content referencing a slide, across lectures
    async fn contents_for_slide(&self, slide_id: i64) -> Result<Vec<LectureContent>>;

    async fn delete_contents(&self, ids: &[i64]) -> Result<u64>;
}

/// SQLx-based lecture repository implementation
pub struct SqlxLectureRepository {
    pool: DynDatabasePool,
}

impl SqlxLectureRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn LectureRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl LectureRepository for SqlxLectureRepository {
    async fn create(&self, lecture: &Lecture) -> Result<Lecture> {
        let result = sqlx::query(
            r#"
            INSERT INTO lectures (name, description, author_id, folder_id, is_active,
                                  created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&lecture.name)
        .bind(&lecture.description)
        .bind(lecture.author_id)
        .bind(lecture.folder_id)
        .bind(lecture.is_active)
        .bind(lecture.created_at)
        .bind(lecture.updated_at)
        .execute(self.pool.sqlite()?)
        .await
        .context("Failed to create lecture")?;

        Ok(Lecture {
            id: result.last_insert_rowid(),
            ..lecture.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Lecture>> {
        get_lecture_by_id(self.pool.sqlite()?, id).await
    }

    async fn update(&self, lecture: &Lecture) -> Result<Lecture> {
        let pool = self.pool.sqlite()?;
        sqlx::query(
            r#"
            UPDATE lectures
            SET name = ?, description = ?, folder_id = ?, is_active = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&lecture.name)
        .bind(&lecture.description)
        .bind(lecture.folder_id)
        .bind(lecture.is_active)
        .bind(Utc::now())
        .bind(lecture.id)
        .execute(pool)
        .await
        .context("Failed to update lecture")?;

        get_lecture_by_id(pool, lecture.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Lecture not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM lectures WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete lecture")?;
        Ok(())
    }

    async fn list_all(&self, scope: FolderScope) -> Result<Vec<Lecture>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM lectures WHERE 1 = 1",
            LECTURE_COLUMNS
        ));
        push_scope(&mut qb, scope);
        qb.push(" ORDER BY created_at, id");

        let rows = qb
            .build()
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to list lectures")?;
        rows.iter().map(row_to_lecture).collect()
    }

    async fn list_viewable(
        &self,
        group_ids: &[i64],
        author_id: Option<i64>,
        scope: FolderScope,
    ) -> Result<Vec<Lecture>> {
        list_viewable_lectures(self.pool.sqlite()?, group_ids, author_id, scope).await
    }

    async fn count_in_folders(&self, folder_ids: &[i64]) -> Result<i64> {
        if folder_ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) as count FROM lectures WHERE folder_id IN ");
        push_id_list(&mut qb, folder_ids);
        let row = qb
            .build()
            .fetch_one(self.pool.sqlite()?)
            .await
            .context("Failed to count lectures")?;
        Ok(row.get("count"))
    }

    async fn set_groups(&self, lecture_id: i64, group_ids: &[i64]) -> Result<()> {
        let mut tx = self
            .pool
            .sqlite()?
            .begin()
            .await
            .context("Failed to begin transaction")?;

        sqlx::query("DELETE FROM lecture_groups WHERE lecture_id = ?")
            .bind(lecture_id)
            .execute(&mut *tx)
            .await
            .context("Failed to clear lecture groups")?;

        for group_id in group_ids {
            sqlx::query("INSERT OR IGNORE INTO lecture_groups (lecture_id, group_id) VALUES (?, ?)")
                .bind(lecture_id)
                .bind(*group_id)
                .execute(&mut *tx)
                .await
                .context("Failed to insert lecture group")?;
        }

        tx.commit().await.context("Failed to commit lecture groups")?;
        Ok(())
    }

    async fn groups_for_lecture(&self, lecture_id: i64) -> Result<Vec<(i64, String)>> {
        let rows = sqlx::query(
            r#"
            SELECT g.id, g.name
            FROM auth_groups g
            INNER JOIN lecture_groups lg ON lg.group_id = g.id
            WHERE lg.lecture_id = ?
            ORDER BY g.name
            "#,
        )
        .bind(lecture_id)
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to get lecture groups")?;

        rows.iter()
            .map(|row| -> Result<(i64, String)> {
                Ok((row.try_get("id")?, row.try_get("name")?))
            })
            .collect()
    }

    async fn replace_contents(&self, lecture_id: i64, contents: &[ContentInput]) -> Result<()> {
        replace_lecture_contents(self.pool.sqlite()?, lecture_id, contents).await
    }

    async fn contents(&self, lecture_id: i64) -> Result<Vec<LectureContent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, lecture_id, sort_order, slide_id, annotation_id
            FROM lecture_contents
            WHERE lecture_id = ?
            ORDER BY sort_order
            "#,
        )
        .bind(lecture_id)
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to get lecture contents")?;
        rows.iter().map(row_to_content).collect()
    }

    async fn contents_for_slide(&self, slide_id: i64) -> Result<Vec<LectureContent>> {
        let rows = sqlx::query(
            r#"
            SELECT id, lecture_id, sort_order, slide_id, annotation_id
            FROM lecture_contents
            WHERE slide_id = ?
            ORDER BY lecture_id, sort_order
            "#,
        )
        .bind(slide_id)
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to get contents for slide")?;
        rows.iter().map(row_to_content).collect()
    }

    async fn delete_contents(&self, ids: &[i64]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("DELETE FROM lecture_contents WHERE id IN ");
        push_id_list(&mut qb, ids);
        let result = qb
            .build()
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete lecture contents")?;
        Ok(result.rows_affected())
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const LECTURE_COLUMNS: &str =
    "id, name, description, author_id, folder_id, is_active, created_at, updated_at";

fn push_scope(qb: &mut QueryBuilder<'_, Sqlite>, scope: FolderScope) {
    if let FolderScope::In(folder_id) = scope {
        qb.push(" AND folder_id IS ").push_bind(folder_id);
    }
}

async fn get_lecture_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Lecture>> {
    let sql = format!("SELECT {} FROM lectures WHERE id = ?", LECTURE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get lecture by id")?;
    row.as_ref().map(row_to_lecture).transpose()
}

async fn list_viewable_lectures(
    pool: &SqlitePool,
    group_ids: &[i64],
    author_id: Option<i64>,
    scope: FolderScope,
) -> Result<Vec<Lecture>> {
    let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
        "SELECT {} FROM lectures WHERE (0 = 1",
        LECTURE_COLUMNS
    ));

    if !group_ids.is_empty() {
        qb.push(" OR (is_active = 1 AND id IN (SELECT lecture_id FROM lecture_groups WHERE group_id IN ");
        push_id_list(&mut qb, group_ids);
        qb.push("))");
    }
    if let Some(author_id) = author_id {
        qb.push(" OR author_id = ").push_bind(author_id);
    }
    qb.push(")");
    push_scope(&mut qb, scope);
    qb.push(" ORDER BY created_at, id");

    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list viewable lectures")?;
    rows.iter().map(row_to_lecture).collect()
}

async fn replace_lecture_contents(
    pool: &SqlitePool,
    lecture_id: i64,
    contents: &[ContentInput],
) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM lecture_contents WHERE lecture_id = ?")
        .bind(lecture_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear lecture contents")?;

    for (index, content) in contents.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO lecture_contents (lecture_id, sort_order, slide_id, annotation_id)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(lecture_id)
        .bind(content.position(index))
        .bind(content.slide_id)
        .bind(content.annotation_id)
        .execute(&mut *tx)
        .await
        .context("Failed to insert lecture content")?;
    }

    tx.commit().await.context("Failed to commit lecture contents")?;
    Ok(())
}

fn row_to_lecture(row: &sqlx::sqlite::SqliteRow) -> Result<Lecture> {
    Ok(Lecture {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        author_id: row.try_get("author_id")?,
        folder_id: row.try_get("folder_id")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn row_to_content(row: &sqlx::sqlite::SqliteRow) -> Result<LectureContent> {
    Ok(LectureContent {
        id: row.try_get("id")?,
        lecture_id: row.try_get("lecture_id")?,
        order: row.try_get("sort_order")?,
        slide_id: row.try_get("slide_id")?,
        annotation_id: row.try_get("annotation_id")?,
    })
}
