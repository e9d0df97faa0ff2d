//! Provenance tracking: when and how each key was populated.
//!
//! Every population attempt appends one row to
//! `trellis_meta.population_log`, keyed by (table, canonical key, attempt).
//! Success rows are append-only and never overwritten; recording a second
//! success without `force` fails with [`EngineError::AlreadyPopulated`]. A
//! key's current terminal state is its highest attempt, exposed through
//! the `population_latest` view.
//!
//! All operations take a raw connection so they can run inside the same
//! transaction as the data commit they describe.

use crate::error::{EngineError, EngineResult};
use chrono::NaiveDateTime;
use duckdb::Connection;
use std::fmt;
use trellis_core::{Key, TableName};
use trellis_store::StoreResultExt;

/// Terminal state of one population attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }

    fn parse(text: &str) -> Option<Self> {
        match text {
            "success" => Some(AttemptStatus::Success),
            "failed" => Some(AttemptStatus::Failed),
            _ => None,
        }
    }
}

impl fmt::Display for AttemptStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the provenance log.
#[derive(Debug, Clone)]
pub struct PopulationRecord {
    pub table: TableName,
    pub key: Key,
    pub attempt: i32,
    pub status: AttemptStatus,
    pub message: Option<String>,
    pub completed_at: NaiveDateTime,
}

fn next_attempt(conn: &Connection, table: &TableName, key_json: &str) -> EngineResult<i32> {
    let attempt: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(attempt), 0) FROM trellis_meta.population_log \
             WHERE table_name = ? AND key_json = ?",
            duckdb::params![table.as_str(), key_json],
            |row| row.get(0),
        )
        .query_context("read highest attempt")?;
    Ok(attempt + 1)
}

/// Record a successful population of `key`.
///
/// Fails with [`EngineError::AlreadyPopulated`] when a success already
/// exists and `force` is false; with `force` a new success attempt is
/// appended instead, leaving the earlier record intact.
pub fn record_success(
    conn: &Connection,
    table: &TableName,
    key: &Key,
    force: bool,
) -> EngineResult<()> {
    let key_json = key.canonical()?;
    if !force && is_populated(conn, table, key)? {
        return Err(EngineError::AlreadyPopulated {
            table: table.clone(),
            key: key.clone(),
        });
    }
    let attempt = next_attempt(conn, table, &key_json)?;
    conn.execute(
        "INSERT INTO trellis_meta.population_log (table_name, key_json, attempt, status) \
         VALUES (?, ?, ?, 'success')",
        duckdb::params![table.as_str(), key_json, attempt],
    )
    .query_context("record success")?;
    Ok(())
}

/// Record a failed population attempt for `key`.
pub fn record_failure(
    conn: &Connection,
    table: &TableName,
    key: &Key,
    message: &str,
) -> EngineResult<()> {
    let key_json = key.canonical()?;
    let attempt = next_attempt(conn, table, &key_json)?;
    conn.execute(
        "INSERT INTO trellis_meta.population_log (table_name, key_json, attempt, status, message) \
         VALUES (?, ?, ?, 'failed', ?)",
        duckdb::params![table.as_str(), key_json, attempt, message],
    )
    .query_context("record failure")?;
    Ok(())
}

/// Whether any attempt for `key` has succeeded.
pub fn is_populated(conn: &Connection, table: &TableName, key: &Key) -> EngineResult<bool> {
    let key_json = key.canonical()?;
    let n: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM trellis_meta.population_log \
             WHERE table_name = ? AND key_json = ? AND status = 'success'",
            duckdb::params![table.as_str(), key_json],
            |row| row.get(0),
        )
        .query_context("check populated")?;
    Ok(n > 0)
}

/// The key's latest attempt, or `None` when it has never been attempted.
pub fn latest(
    conn: &Connection,
    table: &TableName,
    key: &Key,
) -> EngineResult<Option<PopulationRecord>> {
    let key_json = key.canonical()?;
    let row = conn.query_row(
        "SELECT attempt, status, message, CAST(completed_at AS VARCHAR) \
         FROM trellis_meta.population_latest \
         WHERE table_name = ? AND key_json = ?",
        duckdb::params![table.as_str(), key_json],
        |row| {
            Ok((
                row.get::<_, i32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, String>(3)?,
            ))
        },
    );
    let (attempt, status, message, completed_at) = match row {
        Ok(r) => r,
        Err(duckdb::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => {
            return Err(
                trellis_store::StoreError::QueryError(format!("read latest attempt: {e}")).into(),
            )
        }
    };
    let status = AttemptStatus::parse(&status).ok_or_else(|| {
        trellis_store::StoreError::QueryError(format!("unexpected attempt status '{status}'"))
    })?;
    let completed_at = NaiveDateTime::parse_from_str(&completed_at, "%Y-%m-%d %H:%M:%S%.f")
        .map_err(|e| {
            trellis_store::StoreError::QueryError(format!(
                "unparseable completion time '{completed_at}': {e}"
            ))
        })?;
    Ok(Some(PopulationRecord {
        table: table.clone(),
        key: key.clone(),
        attempt,
        status,
        message,
        completed_at,
    }))
}

/// Keys of `table` whose latest attempt failed.
pub fn failed_keys(conn: &Connection, table: &TableName) -> EngineResult<Vec<Key>> {
    let mut stmt = conn
        .prepare(
            "SELECT key_json FROM trellis_meta.population_latest \
             WHERE table_name = ? AND status = 'failed' ORDER BY key_json",
        )
        .query_context("prepare failed keys")?;
    let key_jsons = stmt
        .query_map(duckdb::params![table.as_str()], |row| {
            row.get::<_, String>(0)
        })
        .query_context("list failed keys")?
        .collect::<Result<Vec<_>, _>>()
        .query_context("read failed keys")?;
    key_jsons
        .iter()
        .map(|j| Key::from_canonical(j).map_err(EngineError::from))
        .collect()
}

/// Remove all provenance for `key`. Used by the deletion cascade.
pub fn clear(conn: &Connection, table: &TableName, key: &Key) -> EngineResult<()> {
    let key_json = key.canonical()?;
    conn.execute(
        "DELETE FROM trellis_meta.population_log WHERE table_name = ? AND key_json = ?",
        duckdb::params![table.as_str(), key_json],
    )
    .query_context("clear provenance")?;
    Ok(())
}

#[cfg(test)]
#[path = "lineage_test.rs"]
mod tests;
