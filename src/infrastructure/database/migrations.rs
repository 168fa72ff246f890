//! Embedded migration runner, grounded on the teacher's
//! `adapters::sqlite::migrations::Migrator`.

use crate::domain::ports::errors::StoreError;
use sqlx::SqlitePool;

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn run_embedded_migrations(&self) -> Result<usize, StoreError> {
        self.ensure_migrations_table().await?;
        let current = self.get_current_version().await?;
        let pending: Vec<_> = all_embedded_migrations()
            .into_iter()
            .filter(|m| m.version > current)
            .collect();

        for migration in &pending {
            self.apply_migration(migration).await?;
        }

        Ok(pending.len())
    }

    async fn ensure_migrations_table(&self) -> Result<(), StoreError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_current_version(&self) -> Result<i64, StoreError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map_or(0, |(v,)| v))
    }

    async fn apply_migration(&self, migration: &Migration) -> Result<(), StoreError> {
        sqlx::raw_sql(migration.sql).execute(&self.pool).await?;

        sqlx::query("INSERT OR IGNORE INTO schema_migrations (version, description) VALUES (?, ?)")
            .bind(migration.version)
            .bind(migration.description)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

fn all_embedded_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "initial schema: tasks, agent_log, run_meta",
        sql: include_str!("../../../migrations/001_initial_schema.sql"),
    }]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database::connection::connect;

    #[tokio::test]
    async fn migrations_are_idempotent() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let migrator = Migrator::new(pool);
        let first = migrator.run_embedded_migrations().await.unwrap();
        let second = migrator.run_embedded_migrations().await.unwrap();
        assert_eq!(first, 1);
        assert_eq!(second, 0);
    }
}
