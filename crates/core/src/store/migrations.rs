//! Schema setup for the SQLite store.
//!
//! `_migrations` records the highest applied schema version; on open, every
//! bundled script above it runs once, in order.

use super::StoreError;
use tokio_rusqlite::{Connection, params};

/// Bundled schema scripts, keyed by version.
const MIGRATIONS: &[(i64, &str)] = &[
    (1, include_str!("../../migrations/001_objects.sql")),
    (2, include_str!("../../migrations/002_object_indexes.sql")),
];

/// Bring the schema up to the latest bundled version.
pub async fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.call(|conn| -> Result<(), StoreError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied: i64 = conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?;

        for &(version, sql) in MIGRATIONS.iter().filter(|(version, _)| *version > applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| StoreError::MigrationFailed(format!("version {version}: {e}")))?;
            tx.execute(
                "INSERT INTO _migrations (version, applied_at) VALUES (?1, ?2)",
                params![version, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version, "applied store migration");
        }

        Ok(())
    })
    .await
    .map_err(StoreError::from)
}
