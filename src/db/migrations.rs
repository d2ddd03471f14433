//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings and tracked in the
//! `_migrations` table. Each one runs once, in version order.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use super::DynDatabasePool;

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (unique, ascending)
    pub version: i32,
    pub name: &'static str,
    /// SQL statements, separated by `;`
    pub up: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i64,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(150) NOT NULL UNIQUE,
                email VARCHAR(254),
                password_hash VARCHAR(255) NOT NULL,
                first_name VARCHAR(150) NOT NULL DEFAULT '',
                last_name VARCHAR(150) NOT NULL DEFAULT '',
                base_lecture_folder_id INTEGER,
                is_staff BOOLEAN NOT NULL DEFAULT 0,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                date_joined TIMESTAMP NOT NULL,
                FOREIGN KEY (base_lecture_folder_id) REFERENCES lecture_folders(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_users_email ON users(email);
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_folders",
        up: r#"
            CREATE TABLE IF NOT EXISTS folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                parent_id INTEGER,
                author_id INTEGER,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES folders(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL,
                UNIQUE (name, parent_id)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_folders_root_name ON folders(name) WHERE parent_id IS NULL;
            CREATE INDEX IF NOT EXISTS idx_folders_parent_id ON folders(parent_id);
        "#,
    },
    Migration {
        version: 4,
        name: "create_groups",
        up: r#"
            CREATE TABLE IF NOT EXISTS auth_groups (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(150) NOT NULL UNIQUE,
                kind INTEGER NOT NULL,
                base_folder_id INTEGER UNIQUE,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (base_folder_id) REFERENCES folders(id) ON DELETE SET NULL
            );
            CREATE TABLE IF NOT EXISTS group_permissions (
                group_id INTEGER NOT NULL,
                codename VARCHAR(100) NOT NULL,
                PRIMARY KEY (group_id, codename),
                FOREIGN KEY (group_id) REFERENCES auth_groups(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS user_groups (
                user_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                PRIMARY KEY (user_id, group_id),
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (group_id) REFERENCES auth_groups(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_user_groups_group_id ON user_groups(group_id);
        "#,
    },
    Migration {
        version: 5,
        name: "create_slides",
        up: r#"
            CREATE TABLE IF NOT EXISTS slides (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                file VARCHAR(500) NOT NULL,
                information TEXT NOT NULL DEFAULT '',
                image_root VARCHAR(255) NOT NULL DEFAULT '',
                metadata TEXT,
                is_public BOOLEAN NOT NULL DEFAULT 0,
                author_id INTEGER,
                folder_id INTEGER,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (folder_id) REFERENCES folders(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_slides_folder_id ON slides(folder_id);
            CREATE INDEX IF NOT EXISTS idx_slides_is_public ON slides(is_public);
        "#,
    },
    Migration {
        version: 6,
        name: "create_tags",
        up: r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_by INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE TABLE IF NOT EXISTS slide_tags (
                tag_id INTEGER NOT NULL,
                slide_id INTEGER NOT NULL,
                PRIMARY KEY (tag_id, slide_id),
                FOREIGN KEY (tag_id) REFERENCES tags(id) ON DELETE CASCADE,
                FOREIGN KEY (slide_id) REFERENCES slides(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_slide_tags_slide_id ON slide_tags(slide_id);
        "#,
    },
    Migration {
        version: 7,
        name: "create_lecture_folders",
        up: r#"
            CREATE TABLE IF NOT EXISTS lecture_folders (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(255) NOT NULL,
                parent_id INTEGER,
                author_id INTEGER,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (parent_id) REFERENCES lecture_folders(id) ON DELETE CASCADE,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL,
                UNIQUE (name, parent_id)
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_lecture_folders_root_name ON lecture_folders(name) WHERE parent_id IS NULL;
            CREATE INDEX IF NOT EXISTS idx_lecture_folders_parent_id ON lecture_folders(parent_id);
        "#,
    },
    Migration {
        version: 8,
        name: "create_lectures",
        up: r#"
            CREATE TABLE IF NOT EXISTS lectures (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                author_id INTEGER,
                folder_id INTEGER,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE SET NULL,
                FOREIGN KEY (folder_id) REFERENCES lecture_folders(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_lectures_folder_id ON lectures(folder_id);
            CREATE INDEX IF NOT EXISTS idx_lectures_author_id ON lectures(author_id);
            CREATE TABLE IF NOT EXISTS lecture_groups (
                lecture_id INTEGER NOT NULL,
                group_id INTEGER NOT NULL,
                PRIMARY KEY (lecture_id, group_id),
                FOREIGN KEY (lecture_id) REFERENCES lectures(id) ON DELETE CASCADE,
                FOREIGN KEY (group_id) REFERENCES auth_groups(id) ON DELETE CASCADE
            );
        "#,
    },
    Migration {
        version: 9,
        name: "create_annotations",
        up: r#"
            CREATE TABLE IF NOT EXISTS annotations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                data TEXT NOT NULL DEFAULT '{}',
                author_id INTEGER NOT NULL,
                slide_id INTEGER NOT NULL,
                created_at TIMESTAMP NOT NULL,
                updated_at TIMESTAMP NOT NULL,
                FOREIGN KEY (author_id) REFERENCES users(id) ON DELETE CASCADE,
                FOREIGN KEY (slide_id) REFERENCES slides(id) ON DELETE CASCADE,
                UNIQUE (name, author_id, slide_id)
            );
            CREATE INDEX IF NOT EXISTS idx_annotations_slide_id ON annotations(slide_id);
        "#,
    },
    Migration {
        version: 10,
        name: "create_lecture_contents",
        up: r#"
            CREATE TABLE IF NOT EXISTS lecture_contents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                lecture_id INTEGER NOT NULL,
                sort_order INTEGER NOT NULL,
                slide_id INTEGER NOT NULL,
                annotation_id INTEGER,
                FOREIGN KEY (lecture_id) REFERENCES lectures(id) ON DELETE CASCADE,
                FOREIGN KEY (slide_id) REFERENCES slides(id) ON DELETE CASCADE,
                FOREIGN KEY (annotation_id) REFERENCES annotations(id) ON DELETE SET NULL,
                UNIQUE (lecture_id, sort_order)
            );
            CREATE INDEX IF NOT EXISTS idx_lecture_contents_slide_id ON lecture_contents(slide_id);
        "#,
    },
];

/// Run all pending migrations
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool.sqlite()?).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version as i32).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool.sqlite()?, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    pool.execute(
        r#"
        CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name VARCHAR(255) NOT NULL UNIQUE,
            applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .await?;
    Ok(())
}

async fn get_applied_migrations(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

/// Apply one migration and record it, inside a single transaction
async fn apply_migration(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Check if every migration has been applied
pub async fn is_up_to_date(pool: &DynDatabasePool) -> Result<bool> {
    Ok(pending_count(pool).await? == 0)
}

/// Number of migrations not yet applied
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;
    let applied = get_applied_migrations(pool.sqlite()?).await?;
    Ok(MIGRATIONS.len().saturating_sub(applied.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.unwrap();

        let count = run_migrations(&pool).await.unwrap();
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_is_up_to_date_and_pending_count() {
        let pool = create_test_pool().await.unwrap();

        assert!(!is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        run_migrations(&pool).await.unwrap();

        assert!(is_up_to_date(&pool).await.unwrap());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);
    }

    #[test]
    fn test_versions_are_ascending_and_unique() {
        for pair in MIGRATIONS.windows(2) {
            assert!(pair[0].version < pair[1].version);
        }
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INTEGER);\n -- note\n;\nCREATE INDEX i ON a(id);  ";
        let statements = split_sql_statements(sql);
        assert_eq!(
            statements,
            vec!["CREATE TABLE a (id INTEGER)", "CREATE INDEX i ON a(id)"]
        );
    }

    #[tokio::test]
    async fn test_root_folder_names_unique() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();
        let now = Utc::now();

        sqlx::query("INSERT INTO folders (name, created_at, updated_at) VALUES ('Pathology', ?, ?)")
            .bind(now)
            .bind(now)
            .execute(sqlite)
            .await
            .unwrap();
        let dup = sqlx::query(
            "INSERT INTO folders (name, created_at, updated_at) VALUES ('Pathology', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(sqlite)
        .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_folder_delete_nulls_slide_folder() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();
        let now = Utc::now();

        let folder_id = sqlx::query(
            "INSERT INTO folders (name, created_at, updated_at) VALUES ('Histology', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();

        sqlx::query(
            "INSERT INTO slides (name, file, folder_id, created_at, updated_at) VALUES ('s', 'slides/s.svs', ?, ?, ?)",
        )
        .bind(folder_id)
        .bind(now)
        .bind(now)
        .execute(sqlite)
        .await
        .unwrap();

        sqlx::query("DELETE FROM folders WHERE id = ?")
            .bind(folder_id)
            .execute(sqlite)
            .await
            .unwrap();

        let folder: Option<i64> = sqlx::query_scalar("SELECT folder_id FROM slides")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(folder, None);
    }

    #[tokio::test]
    async fn test_lecture_content_order_unique_per_lecture() {
        let pool = migrated_pool().await;
        let sqlite = pool.sqlite().unwrap();
        let now = Utc::now();

        let lecture_id = sqlx::query(
            "INSERT INTO lectures (name, created_at, updated_at) VALUES ('Intro', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();
        let slide_id = sqlx::query(
            "INSERT INTO slides (name, file, created_at, updated_at) VALUES ('s', 'slides/s.svs', ?, ?)",
        )
        .bind(now)
        .bind(now)
        .execute(sqlite)
        .await
        .unwrap()
        .last_insert_rowid();

        let insert = "INSERT INTO lecture_contents (lecture_id, sort_order, slide_id) VALUES (?, 0, ?)";
        sqlx::query(insert)
            .bind(lecture_id)
            .bind(slide_id)
            .execute(sqlite)
            .await
            .unwrap();
        let dup = sqlx::query(insert)
            .bind(lecture_id)
            .bind(slide_id)
            .execute(sqlite)
            .await;
        assert!(dup.is_err());
    }
}
