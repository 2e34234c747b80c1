//! Schema migrations, tracked in `_migrations`.
//!
//! Each pending migration runs in its own transaction together with the row
//! recording it, so a failed step leaves the schema at the previous version.

use super::Error;
use tokio_rusqlite::{Connection, params, rusqlite};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// Ordered by version.
const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "cache_stores",
    sql: include_str!("../../migrations/001_cache_stores.sql"),
}];

/// Highest migration version known to this build.
pub fn latest_version() -> i64 {
    MIGRATIONS.last().map_or(0, |m| m.version)
}

/// Apply every migration newer than the recorded schema version.
///
/// # Errors
///
/// Returns `Error::MigrationFailed` naming the step that could not be applied.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied = current_version(conn)?;
        for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
            let fail =
                |e: rusqlite::Error| Error::MigrationFailed(format!("{} ({}): {e}", migration.version, migration.name));

            let tx = conn.transaction().map_err(fail)?;
            tx.execute_batch(migration.sql).map_err(fail)?;
            tx.execute(
                "INSERT INTO _migrations (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![migration.version, migration.name, chrono::Utc::now().to_rfc3339()],
            )
            .map_err(fail)?;
            tx.commit().map_err(fail)?;

            tracing::debug!(version = migration.version, name = migration.name, "applied cache migration");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

fn current_version(conn: &rusqlite::Connection) -> Result<i64, Error> {
    Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM _migrations", [], |row| row.get(0))?)
}
