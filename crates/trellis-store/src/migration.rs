//! Versioned DDL for the `trellis_meta` provenance schema.
//!
//! Applied versions are recorded in `trellis_meta.schema_version`; each
//! open applies whatever suffix of [`MIGRATIONS`](crate::ddl::MIGRATIONS)
//! is newer than the recorded version, so every worker sees the same
//! provenance schema regardless of which one created the database file.

use crate::ddl::MIGRATIONS;
use crate::error::{StoreError, StoreResult};
use duckdb::Connection;

const VERSION_TABLE: &str = "\
CREATE SCHEMA IF NOT EXISTS trellis_meta;
CREATE TABLE IF NOT EXISTS trellis_meta.schema_version (
    version    INTEGER NOT NULL,
    applied_at TIMESTAMP NOT NULL DEFAULT now()
);";

/// Bring the provenance schema up to the newest known version.
pub fn run_migrations(conn: &Connection) -> StoreResult<()> {
    conn.execute_batch(VERSION_TABLE)
        .map_err(|e| StoreError::MigrationError(format!("schema_version bootstrap: {e}")))?;

    let applied: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM trellis_meta.schema_version",
            [],
            |row| row.get(0),
        )
        .map_err(|e| StoreError::MigrationError(format!("version lookup: {e}")))?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > applied) {
        log::debug!("Applying provenance migration v{:03}", migration.version);
        conn.execute_batch(migration.sql)
            .and_then(|()| {
                conn.execute(
                    "INSERT INTO trellis_meta.schema_version (version) VALUES (?)",
                    duckdb::params![migration.version],
                )
            })
            .map_err(|e| {
                StoreError::MigrationError(format!("migration v{:03}: {e}", migration.version))
            })?;
    }
    Ok(())
}
