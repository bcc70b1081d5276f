//! Local clock database.

mod entries;
mod headers;
mod ledger;
mod pending;
pub(crate) mod rows;

pub use entries::{EntryRepository, HeaderTotal, RunningEntry};
pub use headers::{normalize_handle, HeaderRepository};
pub use ledger::Ledger;
pub use pending::{collect_pending, commit_pending, count_pending, PendingSet, RecordCounts};

pub(crate) use entries::{find_entry, upsert_entry};
pub(crate) use headers::{find_header, header_row_id, upsert_header};

use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// How long a connection waits for another writer before giving up.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("failed to create database directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("no active header matches '{0}'")]
    HeaderNotFound(String),

    #[error("'{query}' matches {count} active headers; use @handle or a longer title")]
    AmbiguousHeader { query: String, count: usize },

    #[error("handle @{0} already belongs to an active header")]
    HandleTaken(String),

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("nothing is clocked in")]
    NothingRunning,
}

/// Opens (creating if needed) the database at `path` and applies migrations.
pub async fn init_db(path: &Path) -> Result<SqlitePool, StoreError> {
    init_db_with_timeout(path, DEFAULT_BUSY_TIMEOUT).await
}

/// Like [`init_db`], with an explicit busy timeout.
pub async fn init_db_with_timeout(
    path: &Path,
    busy_timeout: Duration,
) -> Result<SqlitePool, StoreError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let db_url = format!("sqlite:{}?mode=rwc", path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .create_if_missing(true)
        .busy_timeout(busy_timeout);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    tracing::debug!(path = %path.display(), "opened clock database");

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_init_db_creates_tables() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("nested").join("clock.db");

        let pool = init_db(&db_path).await.unwrap();

        let tables: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx_%' ORDER BY name",
        )
        .fetch_all(&pool)
        .await
        .unwrap();

        let table_names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();
        assert_eq!(table_names, vec!["entries", "headers", "params"]);
        assert!(db_path.exists());
    }

    #[tokio::test]
    async fn test_init_db_is_reentrant() {
        let temp_dir = tempdir().unwrap();
        let db_path = temp_dir.path().join("clock.db");

        init_db(&db_path).await.unwrap().close().await;
        let pool = init_db(&db_path).await.unwrap();

        let ledger = Ledger::read(&pool).await.unwrap();
        assert_eq!(ledger.revision(), 0);
    }
}
