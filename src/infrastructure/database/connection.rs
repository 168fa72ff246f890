//! SQLite connection pool setup: WAL journaling tuned for one writer and
//! several concurrent readers (workers + reconciler + status CLI), grounded
//! on the teacher's `infrastructure::database::connection` module.

use crate::domain::ports::errors::StoreError;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};
use std::str::FromStr;
use std::time::Duration;

/// Open (creating if missing) the SQLite database at `database_url` with
/// WAL mode, `synchronous=NORMAL`, foreign keys on, and a generous busy
/// timeout so a writer mid-transaction doesn't trip `SQLITE_BUSY` in a
/// sibling worker process (spec.md §4.1, §5).
pub async fn connect(database_url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(database_url)
        .map_err(|e| StoreError::Migration(format!("invalid database url: {e}")))?
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .foreign_keys(true)
        .busy_timeout(Duration::from_secs(30))
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .idle_timeout(Duration::from_secs(30))
        .max_lifetime(Duration::from_secs(1800))
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connects_to_in_memory_database() {
        let pool = connect("sqlite::memory:").await.unwrap();
        assert!(!pool.is_closed());
    }
}
