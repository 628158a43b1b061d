//! Storage adapter
//!
//! Typed query modules per table over a shared `SqlitePool`. Every state
//! machine transition goes through a conditional UPDATE — callers never
//! read-then-write.

pub mod entities;
pub mod flows;
pub mod reminders;
pub mod requests;
pub mod responses;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

use shared::error::{AppError, AppResult};

/// Open a pool on the given connection URL.
///
/// WAL journal + busy timeout so concurrent writers queue instead of
/// failing, foreign keys on.
pub async fn connect(database_url: &str) -> AppResult<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| AppError::storage(format!("invalid database url: {e}")))?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .map_err(|e| AppError::storage(format!("failed to open database: {e}")))
}

/// Apply embedded migrations
pub async fn migrate(pool: &SqlitePool) -> AppResult<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| AppError::storage(format!("migration failed: {e}")))?;
    Ok(())
}

/// JSON column helper: serialize a value for storage
pub(crate) fn to_json_text<T: serde::Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|_| "null".to_string())
}

/// JSON column helper: parse a stored column, tolerating legacy nulls
pub(crate) fn from_json_text<T: serde::de::DeserializeOwned + Default>(text: &str) -> T {
    serde_json::from_str(text).unwrap_or_default()
}
