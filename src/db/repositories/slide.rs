//! Slide repository
//!
//! Database operations for slides. Visibility rules live in the slide
//! service; the queries here only filter by folder and `is_public`.

use super::push_id_list;
use crate::db::DynDatabasePool;
use crate::models::Slide;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use std::sync::Arc;

/// Slide repository trait
#[async_trait]
pub trait SlideRepository: Send + Sync {
    async fn create(&self, slide: &Slide) -> Result<Slide>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Slide>>;

    /// Persist the editable fields; bumps `updated_at`
    async fn update(&self, slide: &Slide) -> Result<Slide>;

    /// Point the slide at a new original file
    async fn set_file(&self, id: i64, file: &str) -> Result<()>;

    async fn set_image_root(&self, id: i64, image_root: &str) -> Result<()>;

    async fn set_metadata(&self, id: i64, metadata: Option<&serde_json::Value>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Every slide ordered by name
    async fn list_all(&self) -> Result<Vec<Slide>>;

    /// Slides directly in `folder_id` (root slides when `None`)
    async fn list_by_folder(&self, folder_id: Option<i64>, public_only: bool) -> Result<Vec<Slide>>;

    /// Slides in any of `folder_ids`
    async fn list_in_folders(&self, folder_ids: &[i64]) -> Result<Vec<Slide>> {
        if folder_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM slides WHERE folder_id IN ",
            SLIDE_COLUMNS
        ));
        push_id_list(&mut qb, folder_ids);
        qb.push(" ORDER BY name");
        fetch_slides(self.pool.sqlite()?, qb).await
    }

    async fn list_viewable(&self, folder_ids: &[i64]) -> Result<Vec<Slide>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {} FROM slides WHERE is_public = 1",
            SLIDE_COLUMNS
        ));
        if !folder_ids.is_empty() {
            qb.push(" OR folder_id IN ");
            push_id_list(&mut qb, folder_ids);
        }
        qb.push(" ORDER BY name");
        fetch_slides(self.pool.sqlite()?, qb).await
    }

    async fn list_by_ids(&self, ids: &[i64]) -> Result<Vec<Slide>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {} FROM slides WHERE id IN ", SLIDE_COLUMNS));
        push_id_list(&mut qb, ids);
        qb.push(" ORDER BY name");
        fetch_slides(self.pool.sqlite()?, qb).await
    }

    async fn count_in_folders(&self, folder_ids: &[i64]) -> Result<i64> {
        if folder_ids.is_empty() {
            return Ok(0);
        }
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT COUNT(*) as count FROM slides WHERE folder_id IN ");
        push_id_list(&mut qb, folder_ids);
        let row = qb
            .build()
            .fetch_one(self.pool.sqlite()?)
            .await
            .context("Failed to count slides")?;
        Ok(row.get("count"))
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const SLIDE_COLUMNS: &str = "id, name, file, information, image_root, metadata, is_public, \
     author_id, folder_id, created_at, updated_at";

async fn create_slide(pool: &SqlitePool, slide: &Slide) -> Result<Slide> {
    let result = sqlx::query(
        r#"
        INSERT INTO slides (name, file, information, image_root, metadata, is_public,
                            author_id, folder_id, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&slide.name)
    .bind(&slide.file)
    .bind(&slide.information)
    .bind(&slide.image_root)
    .bind(slide.metadata.as_ref().map(|m| m.to_string()))
    .bind(slide.is_public)
    .bind(slide.author_id)
    .bind(slide.folder_id)
    .bind(slide.created_at)
    .bind(slide.updated_at)
    .execute(pool)
    .await
    .context("Failed to create slide")?;

    Ok(Slide {
        id: result.last_insert_rowid(),
        ..slide.clone()
    })
}

async fn get_slide_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Slide>> {
    let sql = format!("SELECT {} FROM slides WHERE id = ?", SLIDE_COLUMNS);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get slide by id")?;
    row.as_ref().map(row_to_slide).transpose()
}

async fn fetch_slides(pool: &SqlitePool, mut qb: QueryBuilder<'_, Sqlite>) -> Result<Vec<Slide>> {
    let rows = qb
        .build()
        .fetch_all(pool)
        .await
        .context("Failed to list slides")?;
    rows.iter().map(row_to_slide).collect()
}

fn row_to_slide(row: &sqlx::sqlite::SqliteRow) -> Result<Slide> {
    // Unparsable metadata is kept as a raw string so integrity checks flag it
    let metadata: Option<String> = row.try_get("metadata")?;
    let metadata = metadata.map(|raw| {
        serde_json::from_str(&raw).unwrap_or(serde_json::Value::String(raw))
    });

    Ok(Slide {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        file: row.try_get("file")?,
        information: row.try_get("information")?,
        image_root: row.try_get("image_root")?,
        metadata,
        is_public: row.try_get("is_public")?,
        author_id: row.try_get("author_id")?,
        folder_id: row.try_get("folder_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{FolderRepository, FolderTable, SqlxFolderRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::Folder;
    use serde_json::json;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxSlideRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxSlideRepository::new(pool.clone());
        (pool, repo)
    }

    async fn folder(pool: &DynDatabasePool, name: &str) -> i64 {
        SqlxFolderRepository::new(pool.clone(), FolderTable::Slide)
            .create(&Folder::new(name.to_string(), None, None))
            .await
            .unwrap()
            .id
    }

    async fn slide(repo: &SqlxSlideRepository, name: &str, folder_id: Option<i64>, public: bool) -> Slide {
        let mut slide = Slide::new(name.to_string(), format!("slides/{}.tif", name), None);
        slide.folder_id = folder_id;
        slide.is_public = public;
        repo.create(&slide).await.unwrap()
    }

    #[tokio::test]
    async fn test_create_get_update() {
        let (_pool, repo) = setup_test_repo().await;
        let created = slide(&repo, "CMU-1", None, false).await;
        repo.set_image_root(created.id, &Slide::image_root_for(created.id))
            .await
            .unwrap();

        let mut found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.image_root, format!("images/{}", created.id));
        assert!(found.metadata.is_none());

        found.name = "CMU-2".to_string();
        found.is_public = true;
        let updated = repo.update(&found).await.unwrap();
        assert_eq!(updated.name, "CMU-2");
        assert!(updated.is_public);
    }

    #[tokio::test]
    async fn test_metadata_roundtrip_and_corruption() {
        let (pool, repo) = setup_test_repo().await;
        let created = slide(&repo, "S", None, false).await;

        let metadata = json!({"mpp-x": 0.25, "mpp-y": 0.25, "sourceLens": 20, "created": "x"});
        repo.set_metadata(created.id, Some(&metadata)).await.unwrap();
        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(found.metadata_valid());

        sqlx::query("UPDATE slides SET metadata = 'not json' WHERE id = ?")
            .bind(created.id)
            .execute(pool.sqlite().unwrap())
            .await
            .unwrap();
        let corrupt = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(corrupt.metadata, Some(json!("not json")));
        assert!(!corrupt.metadata_valid());
    }

    #[tokio::test]
    async fn test_folder_queries() {
        let (pool, repo) = setup_test_repo().await;
        let f = folder(&pool, "Pathology").await;
        slide(&repo, "b-private", Some(f), false).await;
        slide(&repo, "a-public", Some(f), true).await;
        slide(&repo, "root-public", None, true).await;
        slide(&repo, "root-private", None, false).await;

        assert_eq!(repo.list_by_folder(Some(f), false).await.unwrap().len(), 2);
        assert_eq!(repo.list_by_folder(Some(f), true).await.unwrap().len(), 1);
        assert_eq!(repo.list_by_folder(None, true).await.unwrap().len(), 1);
        assert_eq!(repo.list_by_folder(None, false).await.unwrap().len(), 2);

        let names: Vec<String> = repo
            .list_in_folders(&[f])
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec!["a-public", "b-private"]);

        assert_eq!(repo.list_viewable(&[]).await.unwrap().len(), 2);
        assert_eq!(repo.list_viewable(&[f]).await.unwrap().len(), 3);
        assert_eq!(repo.count_in_folders(&[f]).await.unwrap(), 2);
        assert_eq!(repo.count_in_folders(&[]).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_folder_delete_detaches_slides() {
        let (pool, repo) = setup_test_repo().await;
        let f = folder(&pool, "Tmp").await;
        let s = slide(&repo, "S", Some(f), false).await;

        SqlxFolderRepository::new(pool.clone(), FolderTable::Slide)
            .delete(f)
            .await
            .unwrap();
        let found = repo.get_by_id(s.id).await.unwrap().unwrap();
        assert_eq!(found.folder_id, None);
    }

    #[tokio::test]
    async fn test_delete_and_list_by_ids() {
        let (_pool, repo) = setup_test_repo().await;
        let a = slide(&repo, "A", None, false).await;
        let b = slide(&repo, "B", None, false).await;

        assert_eq!(repo.list_by_ids(&[a.id, b.id]).await.unwrap().len(), 2);
        repo.delete(a.id).await.unwrap();
        assert_eq!(repo.list_all().await.unwrap().len(), 1);
        assert!(repo.list_by_ids(&[]).await.unwrap().is_empty());
    }
}
