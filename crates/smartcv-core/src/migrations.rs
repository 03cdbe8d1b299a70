use std::collections::HashSet;

use libsql::params;
use thiserror::Error;

use crate::db::{Database, DbError};

struct Migration {
    version: &'static str,
    sql: &'static str,
}

static MIGRATIONS: &[Migration] = &[
    Migration {
        version: "001_initial",
        sql: include_str!("../../../migrations/001_initial.sql"),
    },
    Migration {
        version: "002_job_listings_and_applications",
        sql: include_str!("../../../migrations/002_job_listings_and_applications.sql"),
    },
    Migration {
        version: "003_daily_usage",
        sql: include_str!("../../../migrations/003_daily_usage.sql"),
    },
    Migration {
        version: "004_application_email_status",
        sql: include_str!("../../../migrations/004_application_email_status.sql"),
    },
];

#[derive(Error, Debug)]
pub enum MigrationError {
    #[error("database error: {0}")]
    Database(#[from] DbError),
    #[error("migration failed: {0}")]
    LibSql(#[from] libsql::Error),
}

async fn apply_migrations(
    conn: &libsql::Connection,
    migrations: &[Migration],
) -> Result<(), MigrationError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (version TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
        (),
    )
    .await?;

    let mut applied = HashSet::new();
    let mut rows = conn
        .query("SELECT version FROM schema_migrations", ())
        .await?;
    while let Some(row) = rows.next().await? {
        let version: String = row.get(0)?;
        applied.insert(version);
    }

    for migration in migrations {
        if applied.contains(migration.version) {
            continue;
        }

        let tx = conn.transaction().await?;
        tx.execute_batch(migration.sql).await?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))",
            params![migration.version],
        )
        .await?;
        tx.commit().await?;
    }

    Ok(())
}

pub async fn run_migrations(db: &Database) -> Result<(), MigrationError> {
    let conn = db.connection().await?;
    apply_migrations(&conn, MIGRATIONS).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::{Connection, params};
    use tempfile::TempDir;

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT name FROM sqlite_master WHERE type='table' AND name = ?1",
                params![name],
            )
            .await
            .expect("query sqlite_master");
        rows.next().await.expect("row result").is_some()
    }

    #[tokio::test]
    async fn applies_all_migrations_and_records_versions() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("db.sqlite");
        let db = Database::new(&db_path).await.expect("create db");

        run_migrations(&db).await.expect("migrations succeed");

        let conn = db.connection().await.expect("open connection");
        assert!(table_exists(&conn, "jobs").await);
        assert!(table_exists(&conn, "job_steps").await);
        assert!(table_exists(&conn, "job_listings").await);
        assert!(table_exists(&conn, "applications").await);
        assert!(table_exists(&conn, "daily_usage").await);

        let mut rows = conn
            .query(
                "SELECT COUNT(*) FROM schema_migrations WHERE version = '001_initial'",
                (),
            )
            .await
            .expect("query schema_migrations");
        let count: i64 = rows
            .next()
            .await
            .expect("row")
            .expect("row value")
            .get(0)
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn rerunning_migrations_is_idempotent() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("db.sqlite");
        let db = Database::new(&db_path).await.expect("create db");

        run_migrations(&db).await.expect("initial migration");
        run_migrations(&db).await.expect("second migration");

        let conn = db.connection().await.expect("open connection");
        let mut rows = conn
            .query("SELECT COUNT(*) FROM schema_migrations", ())
            .await
            .expect("query count");
        let count: i64 = rows
            .next()
            .await
            .expect("row")
            .expect("row value")
            .get(0)
            .expect("count");
        assert_eq!(count, MIGRATIONS.len() as i64);
    }

    #[tokio::test]
    async fn applications_foreign_key_references_job_listing() {
        let dir = TempDir::new().expect("temp dir");
        let db_path = dir.path().join("db.sqlite");
        let db = Database::new(&db_path).await.expect("create db");
        run_migrations(&db).await.expect("migrations succeed");

        let conn = db.connection().await.expect("open connection");
        let result = conn
            .execute(
                "INSERT INTO applications (id, job_listing_id, phone_number, status, created_at) \
                 VALUES ('app-1', 'missing-job', '+2348000000000', 'pending', strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))",
                (),
            )
            .await;
        assert!(
            result.is_err(),
            "inserting an application against a nonexistent job listing should violate the foreign key"
        );
    }
}
