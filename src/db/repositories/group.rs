//! Group repository
//!
//! Groups, their permission codenames and their members.

use super::user::{row_to_user, USER_COLUMNS};
use crate::db::DynDatabasePool;
use crate::models::{Group, GroupKind, User};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;
use std::sync::Arc;

/// Group repository trait
#[async_trait]
pub trait GroupRepository: Send + Sync {
    async fn create(&self, group: &Group) -> Result<Group>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Group>>;

    async fn get_by_name(&self, name: &str) -> Result<Option<Group>>;

    /// Publisher group owning a base folder
    async fn get_by_base_folder(&self, folder_id: i64) -> Result<Option<Group>>;

    /// Groups ordered by name, optionally restricted to one kind
    async fn list(&self, kind: Option<GroupKind>) -> Result<Vec<Group>>;

    async fn set_base_folder(&self, group_id: i64, folder_id: Option<i64>) -> Result<()>;

    async fn delete(&self, id: i64) -> Result<()>;

    /// Replace the permission codenames of a group
    async fn set_permissions(&self, group_id: i64, codenames: &[&str]) -> Result<()>;

    async fn get_permissions(&self, group_id: i64) -> Result<Vec<String>>;

    async fn add_member(&self, group_id: i64, user_id: i64) -> Result<()>;

    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<()>;

    async fn list_members(&self, group_id: i64) -> Result<Vec<User>>;

    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>>;

    /// Union of the permission codenames of every group the user belongs to
    async fn permissions_for_user(&self, user_id: i64) -> Result<HashSet<String>>;
}

/// SQLx-based group repository implementation
pub struct SqlxGroupRepository {
    pool: DynDatabasePool,
}

impl SqlxGroupRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn GroupRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl GroupRepository for SqlxGroupRepository {
    async fn create(&self, group: &Group) -> Result<Group> {
        let result = sqlx::query(
            r#"
            INSERT INTO auth_groups (name, kind, base_folder_id, created_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&group.name)
        .bind(group.kind.code())
        .bind(group.base_folder_id)
        .bind(group.created_at)
        .execute(self.pool.sqlite()?)
        .await
        .context("Failed to create group")?;

        Ok(Group {
            id: result.last_insert_rowid(),
            ..group.clone()
        })
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Group>> {
        let sql = format!("SELECT {} FROM auth_groups WHERE id = ?", GROUP_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(self.pool.sqlite()?)
            .await
            .context("Failed to get group by id")?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn get_by_name(&self, name: &str) -> Result<Option<Group>> {
        let sql = format!("SELECT {} FROM auth_groups WHERE name = ?", GROUP_COLUMNS);
        let row = sqlx::query(&sql)
            .bind(name)
            .fetch_optional(self.pool.sqlite()?)
            .await
            .context("Failed to get group by name")?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn get_by_base_folder(&self, folder_id: i64) -> Result<Option<Group>> {
        let sql = format!(
            "SELECT {} FROM auth_groups WHERE base_folder_id = ?",
            GROUP_COLUMNS
        );
        let row = sqlx::query(&sql)
            .bind(folder_id)
            .fetch_optional(self.pool.sqlite()?)
            .await
            .context("Failed to get group by base folder")?;
        row.as_ref().map(row_to_group).transpose()
    }

    async fn list(&self, kind: Option<GroupKind>) -> Result<Vec<Group>> {
        list_groups(self.pool.sqlite()?, kind).await
    }

    async fn set_base_folder(&self, group_id: i64, folder_id: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE auth_groups SET base_folder_id = ? WHERE id = ?")
            .bind(folder_id)
            .bind(group_id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to set group base folder")?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM auth_groups WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete group")?;
        Ok(())
    }

    async fn set_permissions(&self, group_id: i64, codenames: &[&str]) -> Result<()> {
        set_group_permissions(self.pool.sqlite()?, group_id, codenames).await
    }

    async fn get_permissions(&self, group_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT codename FROM group_permissions WHERE group_id = ? ORDER BY codename",
        )
        .bind(group_id)
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to get group permissions")?;
        rows.iter()
            .map(|row| row.try_get::<String, _>("codename").map_err(Into::into))
            .collect()
    }

    async fn add_member(&self, group_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO user_groups (user_id, group_id) VALUES (?, ?)")
            .bind(user_id)
            .bind(group_id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to add group member")?;
        Ok(())
    }

    async fn remove_member(&self, group_id: i64, user_id: i64) -> Result<()> {
        sqlx::query("DELETE FROM user_groups WHERE user_id = ? AND group_id = ?")
            .bind(user_id)
            .bind(group_id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to remove group member")?;
        Ok(())
    }

    async fn list_members(&self, group_id: i64) -> Result<Vec<User>> {
        list_group_members(self.pool.sqlite()?, group_id).await
    }

    async fn groups_for_user(&self, user_id: i64) -> Result<Vec<Group>> {
        let sql = format!(
            r#"
            SELECT {} FROM auth_groups
            WHERE id IN (SELECT group_id FROM user_groups WHERE user_id = ?)
            ORDER BY name
            "#,
            GROUP_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to get groups for user")?;
        rows.iter().map(row_to_group).collect()
    }

    async fn permissions_for_user(&self, user_id: i64) -> Result<HashSet<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT gp.codename
            FROM group_permissions gp
            INNER JOIN user_groups ug ON ug.group_id = gp.group_id
            WHERE ug.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(self.pool.sqlite()?)
        .await
        .context("Failed to get permissions for user")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("codename").map_err(Into::into))
            .collect()
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const GROUP_COLUMNS: &str = "id, name, kind, base_folder_id, created_at";

async fn list_groups(pool: &SqlitePool, kind: Option<GroupKind>) -> Result<Vec<Group>> {
    let rows = match kind {
        Some(kind) => {
            let sql = format!(
                "SELECT {} FROM auth_groups WHERE kind = ? ORDER BY name",
                GROUP_COLUMNS
            );
            sqlx::query(&sql).bind(kind.code()).fetch_all(pool).await
        }
        None => {
            let sql = format!("SELECT {} FROM auth_groups ORDER BY name", GROUP_COLUMNS);
            sqlx::query(&sql).fetch_all(pool).await
        }
    }
    .context("Failed to list groups")?;

    rows.iter().map(row_to_group).collect()
}

async fn set_group_permissions(pool: &SqlitePool, group_id: i64, codenames: &[&str]) -> Result<()> {
    let mut tx = pool.begin().await.context("Failed to begin transaction")?;

    sqlx::query("DELETE FROM group_permissions WHERE group_id = ?")
        .bind(group_id)
        .execute(&mut *tx)
        .await
        .context("Failed to clear group permissions")?;

    for codename in codenames {
        sqlx::query("INSERT OR IGNORE INTO group_permissions (group_id, codename) VALUES (?, ?)")
            .bind(group_id)
            .bind(*codename)
            .execute(&mut *tx)
            .await
            .context("Failed to insert group permission")?;
    }

    tx.commit().await.context("Failed to commit group permissions")?;
    Ok(())
}

async fn list_group_members(pool: &SqlitePool, group_id: i64) -> Result<Vec<User>> {
    let sql = format!(
        r#"
        SELECT {} FROM users
        WHERE id IN (SELECT user_id FROM user_groups WHERE group_id = ?)
        ORDER BY username
        "#,
        USER_COLUMNS
    );
    let rows = sqlx::query(&sql)
        .bind(group_id)
        .fetch_all(pool)
        .await
        .context("Failed to list group members")?;

    rows.iter().map(row_to_user).collect()
}

fn row_to_group(row: &sqlx::sqlite::SqliteRow) -> Result<Group> {
    Ok(Group {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        kind: GroupKind::from_code(row.try_get("kind")?)?,
        base_folder_id: row.try_get("base_folder_id")?,
        created_at: row.try_get("created_at")?,
    })
}
