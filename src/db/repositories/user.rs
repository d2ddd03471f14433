//! User repository
//!
//! Database operations for user accounts.

use crate::db::DynDatabasePool;
use crate::models::User;
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: &User) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    async fn get_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Persist every mutable field of `user`
    async fn update(&self, user: &User) -> Result<User>;

    async fn set_base_lecture_folder(&self, user_id: i64, folder_id: Option<i64>) -> Result<()>;

    /// Owner of a base lecture folder, if any
    async fn get_by_base_lecture_folder(&self, folder_id: i64) -> Result<Option<User>>;

    async fn delete(&self, id: i64) -> Result<()>;

    async fn count(&self) -> Result<i64>;

    /// All users ordered by username
    async fn list(&self) -> Result<Vec<User>>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, user: &User) -> Result<User> {
        create_user(self.pool.sqlite()?, user).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        get_user(self.pool.sqlite()?, UserLookup::Id(id)).await
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        get_user(self.pool.sqlite()?, UserLookup::Username(username)).await
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<User>> {
        get_user(self.pool.sqlite()?, UserLookup::Email(email)).await
    }

    async fn update(&self, user: &User) -> Result<User> {
        update_user(self.pool.sqlite()?, user).await
    }

    async fn set_base_lecture_folder(&self, user_id: i64, folder_id: Option<i64>) -> Result<()> {
        sqlx::query("UPDATE users SET base_lecture_folder_id = ? WHERE id = ?")
            .bind(folder_id)
            .bind(user_id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to set base lecture folder")?;
        Ok(())
    }

    async fn get_by_base_lecture_folder(&self, folder_id: i64) -> Result<Option<User>> {
        get_user(self.pool.sqlite()?, UserLookup::BaseLectureFolder(folder_id)).await
    }

    async fn delete(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to delete user")?;
        Ok(())
    }

    async fn count(&self) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) as count FROM users")
            .fetch_one(self.pool.sqlite()?)
            .await
            .context("Failed to count users")?;
        Ok(row.get("count"))
    }

    async fn list(&self) -> Result<Vec<User>> {
        let rows = sqlx::query(&format!("SELECT {} FROM users ORDER BY username", USER_COLUMNS))
            .fetch_all(self.pool.sqlite()?)
            .await
            .context("Failed to list users")?;
        rows.iter().map(row_to_user).collect()
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

pub(crate) const USER_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     base_lecture_folder_id, is_staff, is_active, date_joined";

async fn create_user(pool: &SqlitePool, user: &User) -> Result<User> {
    let result = sqlx::query(
        r#"
        INSERT INTO users (username, email, password_hash, first_name, last_name,
                           base_lecture_folder_id, is_staff, is_active, date_joined)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.base_lecture_folder_id)
    .bind(user.is_staff)
    .bind(user.is_active)
    .bind(user.date_joined)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        ..user.clone()
    })
}

/// Single-row lookup key
enum UserLookup<'a> {
    Id(i64),
    Username(&'a str),
    Email(&'a str),
    BaseLectureFolder(i64),
}

impl UserLookup<'_> {
    fn column(&self) -> &'static str {
        match self {
            UserLookup::Id(_) => "id",
            UserLookup::Username(_) => "username",
            UserLookup::Email(_) => "email",
            UserLookup::BaseLectureFolder(_) => "base_lecture_folder_id",
        }
    }
}

async fn get_user(pool: &SqlitePool, lookup: UserLookup<'_>) -> Result<Option<User>> {
    let column = lookup.column();
    let sql = format!("SELECT {} FROM users WHERE {} = ?", USER_COLUMNS, column);
    let query = sqlx::query(&sql);
    let query = match lookup {
        UserLookup::Id(id) | UserLookup::BaseLectureFolder(id) => query.bind(id),
        UserLookup::Username(value) | UserLookup::Email(value) => query.bind(value),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .with_context(|| format!("Failed to get user by {}", column))?;

    row.as_ref().map(row_to_user).transpose()
}

async fn update_user(pool: &SqlitePool, user: &User) -> Result<User> {
    sqlx::query(
        r#"
        UPDATE users
        SET username = ?, email = ?, password_hash = ?, first_name = ?, last_name = ?,
            base_lecture_folder_id = ?, is_staff = ?, is_active = ?
        WHERE id = ?
        "#,
    )
    .bind(&user.username)
    .bind(&user.email)
    .bind(&user.password_hash)
    .bind(&user.first_name)
    .bind(&user.last_name)
    .bind(user.base_lecture_folder_id)
    .bind(user.is_staff)
    .bind(user.is_active)
    .bind(user.id)
    .execute(pool)
    .await
    .context("Failed to update user")?;

    get_user(pool, UserLookup::Id(user.id))
        .await?
        .ok_or_else(|| anyhow::anyhow!("User not found after update"))
}

pub(crate) fn row_to_user(row: &sqlx::sqlite::SqliteRow) -> Result<User> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        email: row.try_get("email")?,
        password_hash: row.try_get("password_hash")?,
        first_name: row.try_get("first_name")?,
        last_name: row.try_get("last_name")?,
        base_lecture_folder_id: row.try_get("base_lecture_folder_id")?,
        is_staff: row.try_get("is_staff")?,
        is_active: row.try_get("is_active")?,
        date_joined: row.try_get("date_joined")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_test_repo() -> (DynDatabasePool, SqlxUserRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxUserRepository::new(pool.clone());
        (pool, repo)
    }

    fn test_user(username: &str) -> User {
        User::new(
            username.to_string(),
            Some(format!("{}@example.com", username)),
            "hash".to_string(),
        )
    }

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (_pool, repo) = setup_test_repo().await;
        let created = repo.create(&test_user("alice")).await.unwrap();
        assert!(created.id > 0);

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.username, "alice");
        assert_eq!(by_id.password_hash, "hash");
        assert!(by_id.is_active);

        let by_name = repo.get_by_username("alice").await.unwrap().unwrap();
        assert_eq!(by_name.id, created.id);

        let by_email = repo.get_by_email("alice@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.id, created.id);

        assert!(repo.get_by_username("nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unique_username_constraint() {
        let (_pool, repo) = setup_test_repo().await;
        repo.create(&test_user("alice")).await.unwrap();
        assert!(repo.create(&test_user("alice")).await.is_err());
    }

    #[tokio::test]
    async fn test_update_user() {
        let (_pool, repo) = setup_test_repo().await;
        let mut user = repo.create(&test_user("bob")).await.unwrap();
        user.first_name = "Bob".to_string();
        user.is_staff = true;
        user.email = None;

        let updated = repo.update(&user).await.unwrap();
        assert_eq!(updated.first_name, "Bob");
        assert!(updated.is_staff);
        assert_eq!(updated.email, None);
    }

    #[tokio::test]
    async fn test_count_list_delete() {
        let (_pool, repo) = setup_test_repo().await;
        assert_eq!(repo.count().await.unwrap(), 0);

        let carol = repo.create(&test_user("carol")).await.unwrap();
        repo.create(&test_user("alice")).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 2);

        let names: Vec<String> = repo.list().await.unwrap().into_iter().map(|u| u.username).collect();
        assert_eq!(names, vec!["alice", "carol"]);

        repo.delete(carol.id).await.unwrap();
        assert!(repo.get_by_id(carol.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_base_lecture_folder_link() {
        let (pool, repo) = setup_test_repo().await;
        let user = repo.create(&test_user("dana")).await.unwrap();

        let now = chrono::Utc::now();
        let folder_id = sqlx::query(
            "INSERT INTO lecture_folders (name, created_at, updated_at) VALUES ('Dana', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(pool.sqlite().unwrap())
        .await
        .unwrap()
        .last_insert_rowid();

        repo.set_base_lecture_folder(user.id, Some(folder_id)).await.unwrap();

        let owner = repo.get_by_base_lecture_folder(folder_id).await.unwrap().unwrap();
        assert_eq!(owner.id, user.id);
        assert_eq!(owner.base_lecture_folder_id, Some(folder_id));
    }
}
