//! Folder repository
//!
//! Slide folders and lecture folders live in two tables with the same shape,
//! so a single implementation serves both, parametrised by [`FolderTable`].

use crate::db::DynDatabasePool;
use crate::models::{Folder, FolderTree};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Which folder hierarchy a repository works on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FolderTable {
    Slide,
    Lecture,
}

impl FolderTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            FolderTable::Slide => "folders",
            FolderTable::Lecture => "lecture_folders",
        }
    }
}

/// Folder repository trait
#[async_trait]
pub trait FolderRepository: Send + Sync {
    async fn create(&self, folder: &Folder) -> Result<Folder>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Folder>>;

    /// All folders ordered by name
    async fn list(&self) -> Result<Vec<Folder>>;

    /// Direct children of `parent_id`, or the base folders when `None`
    async fn children(&self, parent_id: Option<i64>) -> Result<Vec<Folder>>;

    /// Persist name and parent; bumps `updated_at`
    async fn update(&self, folder: &Folder) -> Result<Folder>;

    /// Delete a folder; subfolders are removed by cascade
    async fn delete(&self, id: i64) -> Result<()>;

    /// Whether a sibling named `name` exists under `parent_id`
    async fn exists_by_name(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool>;

    /// Ids of the folder and everything below it
    async fn descendants(&self, id: i64) -> Result<Vec<i64>>;

    /// Path from the base folder down to the folder itself
    async fn ancestors(&self, id: i64) -> Result<Vec<Folder>>;

    async fn count_children(&self, id: i64) -> Result<i64>;

    /// Nested trees rooted at `root_id`, or at every base folder when `None`
    async fn tree(&self, root_id: Option<i64>) -> Result<Vec<FolderTree>>;
}

/// SQLx-based folder repository implementation
pub struct SqlxFolderRepository {
    pool: DynDatabasePool,
    table: FolderTable,
}

impl SqlxFolderRepository {
    pub fn new(pool: DynDatabasePool, table: FolderTable) -> Self {
        Self { pool, table }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool, table: FolderTable) -> Arc<dyn FolderRepository> {
        Arc::new(Self::new(pool, table))
    }

    fn t(&self) -> &'static str {
        self.table.table_name()
    }
}

#[async_trait]
impl FolderRepository for SqlxFolderRepository {
    async fn create(&self, folder: &Folder) -> Result<Folder> {
        let sql = format!(
            "INSERT INTO {} (name, parent_id, author_id, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
            self.t()
        );
        let result = sqlx::query(&sql)
            .bind(&folder.name)
            .bind(folder.parent_id)
            .bind(folder.author_id)
            .bind(folder.created_at)
            .bind(folder.updated_at)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to create folder")?;

        Ok(Folder {
            id: result.last_insert_rowid(),
            ..folder.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Folder>> {
        get_folder(self.pool.sqlite()?, self.t(), id).await
    }

    async fn list(&self) -> Result<Vec<Folder>> {
        list_folders(self.pool.sqlite()?, self.t()).await
    }

    async fn children(&self, parent_id: Option<i64>) -> Result<Vec<Folder>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE parent_id IS ? ORDER BY name",
            FOLDER_COLUMNS,
            self.t()
        );
        let rows = sqlx::query(&sql)
            .bind(parent_id)
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to list child folders")?;
        rows.iter().map(row_to_folder).collect()
    }

    async fn update(&self, folder: &Folder) -> Result<Folder> {
        let pool = self.pool.sqlite()?;
        let sql = format!(
            "UPDATE {} SET name = ?, parent_id = ?, updated_at = ? WHERE id = ?",
            self.t()
        );
        sqlx::query(&sql)
            .bind(&folder.name)
            .bind(folder.parent_id)
            .bind(chrono::Utc::now())
            .bind(folder.id)
            .execute(pool)
            .await
            .context("Failed to update folder")?;

        get_folder(pool, self.t(), folder.id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Folder not found after update"))
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let sql = format!("DELETE FROM {} WHERE id = ?", self.t());
        sqlx::query(&sql)
            .bind(id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete folder")?;
        Ok(())
    }

    async fn exists_by_name(
        &self,
        name: &str,
        parent_id: Option<i64>,
        exclude_id: Option<i64>,
    ) -> Result<bool> {
        let sql = format!(
            "SELECT COUNT(*) as count FROM {} WHERE name = ? AND parent_id IS ? AND id IS NOT ?",
            self.t()
        );
        let row = sqlx::query(&sql)
            .bind(name)
            .bind(parent_id)
            .bind(exclude_id)
            .fetch_one(self.pool.sqlite()?)
            .await
            .context("Failed to check folder name")?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    async fn descendants(&self, id: i64) -> Result<Vec<i64>> {
        let sql = format!(
            r#"
            WITH RECURSIVE subtree(id) AS (
                SELECT id FROM {t} WHERE id = ?
                UNION ALL
                SELECT f.id FROM {t} f INNER JOIN subtree s ON f.parent_id = s.id
            )
            SELECT id FROM subtree
            "#,
            t = self.t()
        );
        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to collect folder descendants")?;
        rows.iter()
            .map(|row| row.try_get::<i64, _>("id").map_err(Into::into))
            .collect()
    }

    async fn ancestors(&self, id: i64) -> Result<Vec<Folder>> {
        let sql = format!(
            r#"
            WITH RECURSIVE chain(id, name, parent_id, author_id, created_at, updated_at, depth) AS (
                SELECT {cols}, 0 FROM {t} WHERE id = ?
                UNION ALL
                SELECT f.id, f.name, f.parent_id, f.author_id, f.created_at, f.updated_at, c.depth + 1
                FROM {t} f INNER JOIN chain c ON f.id = c.parent_id
            )
            SELECT {cols} FROM chain ORDER BY depth DESC
            "#,
            cols = FOLDER_COLUMNS,
            t = self.t()
        );
        let rows = sqlx::query(&sql)
            .bind(id)
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to collect folder ancestors")?;
        rows.iter().map(row_to_folder).collect()
    }

    async fn count_children(&self, id: i64) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) as count FROM {} WHERE parent_id = ?", self.t());
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_one(self.pool.sqlite()?)
            .await
            .context("Failed to count child folders")?;
        Ok(row.get("count"))
    }

    async fn tree(&self, root_id: Option<i64>) -> Result<Vec<FolderTree>> {
        let folders = list_folders(self.pool.sqlite()?, self.t()).await?;
        Ok(build_folder_tree(&folders, root_id))
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const FOLDER_COLUMNS: &str = "id, name, parent_id, author_id, created_at, updated_at";

async fn get_folder(pool: &SqlitePool, table: &str, id: i64) -> Result<Option<Folder>> {
    let sql = format!("SELECT {} FROM {} WHERE id = ?", FOLDER_COLUMNS, table);
    let row = sqlx::query(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get folder by id")?;
    row.as_ref().map(row_to_folder).transpose()
}

async fn list_folders(pool: &SqlitePool, table: &str) -> Result<Vec<Folder>> {
    let sql = format!("SELECT {} FROM {} ORDER BY name", FOLDER_COLUMNS, table);
    let rows = sqlx::query(&sql)
        .fetch_all(pool)
        .await
        .context("Failed to list folders")?;
    rows.iter().map(row_to_folder).collect()
}

fn row_to_folder(row: &sqlx::sqlite::SqliteRow) -> Result<Folder> {
    Ok(Folder {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        parent_id: row.try_get("parent_id")?,
        author_id: row.try_get("author_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Assemble nested trees from a flat, name-ordered folder list
pub fn build_folder_tree(folders: &[Folder], root_id: Option<i64>) -> Vec<FolderTree> {
    let mut by_parent: HashMap<Option<i64>, Vec<&Folder>> = HashMap::new();
    for folder in folders {
        by_parent.entry(folder.parent_id).or_default().push(folder);
    }

    fn subtree(folder: &Folder, by_parent: &HashMap<Option<i64>, Vec<&Folder>>) -> FolderTree {
        let subfolders = by_parent
            .get(&Some(folder.id))
            .map(|children| children.iter().map(|c| subtree(c, by_parent)).collect())
            .unwrap_or_default();
        FolderTree {
            id: Some(folder.id),
            name: folder.name.clone(),
            subfolders,
        }
    }

    match root_id {
        Some(id) => folders
            .iter()
            .filter(|f| f.id == id)
            .map(|f| subtree(f, &by_parent))
            .collect(),
        None => by_parent
            .get(&None)
            .map(|roots| roots.iter().map(|r| subtree(r, &by_parent)).collect())
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo(table: FolderTable) -> SqlxFolderRepository {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxFolderRepository::new(pool, table)
    }

    async fn create(repo: &SqlxFolderRepository, name: &str, parent: Option<i64>) -> Folder {
        repo.create(&Folder::new(name.to_string(), parent, None))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_create_and_children() {
        let repo = setup_test_repo(FolderTable::Slide).await;
        let root = create(&repo, "Pathology", None).await;
        create(&repo, "Liver", Some(root.id)).await;
        create(&repo, "Kidney", Some(root.id)).await;

        let roots = repo.children(None).await.unwrap();
        assert_eq!(roots.len(), 1);
        assert!(roots[0].is_base_folder());

        let names: Vec<String> = repo
            .children(Some(root.id))
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["Kidney", "Liver"]);
        assert_eq!(repo.count_children(root.id).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_sibling_names_unique() {
        let repo = setup_test_repo(FolderTable::Slide).await;
        let root = create(&repo, "Pathology", None).await;
        let kidney = create(&repo, "Kidney", Some(root.id)).await;

        assert!(repo.exists_by_name("Kidney", Some(root.id), None).await.unwrap());
        assert!(!repo
            .exists_by_name("Kidney", Some(root.id), Some(kidney.id))
            .await
            .unwrap());
        assert!(repo.exists_by_name("Pathology", None, None).await.unwrap());
        assert!(!repo.exists_by_name("Kidney", None, None).await.unwrap());

        let dup = repo
            .create(&Folder::new("Pathology".to_string(), None, None))
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_descendants_and_ancestors() {
        let repo = setup_test_repo(FolderTable::Lecture).await;
        let root = create(&repo, "Alice", None).await;
        let a = create(&repo, "A", Some(root.id)).await;
        let b = create(&repo, "B", Some(a.id)).await;
        create(&repo, "Other", None).await;

        let mut ids = repo.descendants(root.id).await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![root.id, a.id, b.id]);

        let path: Vec<String> = repo
            .ancestors(b.id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(path, vec!["Alice", "A", "B"]);
    }

    #[tokio::test]
    async fn test_update_moves_folder() {
        let repo = setup_test_repo(FolderTable::Slide).await;
        let root = create(&repo, "Root1", None).await;
        let mut child = create(&repo, "Child", Some(root.id)).await;

        child.parent_id = None;
        child.name = "Moved".to_string();
        let updated = repo.update(&child).await.unwrap();
        assert_eq!(updated.name, "Moved");
        assert!(updated.is_base_folder());
        assert!(updated.updated_at >= child.updated_at);
    }

    #[tokio::test]
    async fn test_delete_cascades_to_subfolders() {
        let repo = setup_test_repo(FolderTable::Slide).await;
        let root = create(&repo, "Root1", None).await;
        let child = create(&repo, "Child", Some(root.id)).await;

        repo.delete(root.id).await.unwrap();
        assert!(repo.get_by_id(child.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_tree() {
        let repo = setup_test_repo(FolderTable::Slide).await;
        let p = create(&repo, "Pathology", None).await;
        let k = create(&repo, "Kidney", Some(p.id)).await;
        create(&repo, "Glomeruli", Some(k.id)).await;
        create(&repo, "Anatomy", None).await;

        let all = repo.tree(None).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].name, "Anatomy");
        assert_eq!(all[1].total_count(), 3);

        let one = repo.tree(Some(k.id)).await.unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(one[0].subfolders[0].name, "Glomeruli");
    }

    #[test]
    fn test_build_folder_tree_missing_root() {
        assert!(build_folder_tree(&[], Some(3)).is_empty());
        assert!(build_folder_tree(&[], None).is_empty());
    }
}
