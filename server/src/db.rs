//! SQLite pool setup and schema.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::config::ServerConfig;

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS todos (
        id          TEXT PRIMARY KEY NOT NULL,
        title       TEXT NOT NULL CHECK (length(title) BETWEEN 1 AND 500),
        description TEXT CHECK (description IS NULL OR length(description) <= 5000),
        title_folded       TEXT NOT NULL DEFAULT '',
        description_folded TEXT,
        completed   INTEGER NOT NULL DEFAULT 0 CHECK (completed IN (0, 1)),
        priority    TEXT NOT NULL DEFAULT 'medium' CHECK (priority IN ('low', 'medium', 'high')),
        due_date    TEXT,
        created_at  TEXT NOT NULL,
        updated_at  TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_todos_completed ON todos (completed)",
    "CREATE INDEX IF NOT EXISTS idx_todos_priority ON todos (priority)",
    "CREATE INDEX IF NOT EXISTS idx_todos_created_at ON todos (created_at)",
];

/// Open a pool for `config.database_url`.
///
/// An in-memory database lives only as long as its connection, so it gets
/// exactly one connection that is never recycled.
pub async fn connect(config: &ServerConfig) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(&config.database_url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = if is_memory(&config.database_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(config.max_connections)
    };
    pool.connect_with(options).await
}

/// Create the table and indexes. Safe to run on every start.
pub async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}

fn is_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_memory_urls() {
        assert!(is_memory("sqlite::memory:"));
        assert!(is_memory("sqlite://file:todos?mode=memory&cache=shared"));
        assert!(!is_memory("sqlite://todos.db"));
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = connect(&ServerConfig::default()).await.unwrap();
        migrate(&pool).await.unwrap();
        migrate(&pool).await.unwrap();
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM todos")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
