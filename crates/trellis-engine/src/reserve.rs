//! Job reservations: optimistic per-key locking through the store.
//!
//! A worker claims a key by inserting a marker row into
//! `trellis_meta.job_reservation`; the table's primary key makes the
//! insert the atomic arbiter between racing workers, with no in-process
//! locking. Losing the race is expected steady-state under concurrency —
//! the populate loop converts [`EngineError::ReservationConflict`] into a
//! skip, never into a caller-visible failure.
//!
//! Reservations are released under the same transaction that commits the
//! key. Markers left behind by crashed workers are cleared only by the
//! explicit administrative calls below, never implicitly.

use crate::error::{EngineError, EngineResult};
use duckdb::Connection;
use trellis_core::{Key, TableName};
use trellis_store::StoreResultExt;

/// Claim `key` for `worker`.
///
/// Fails with [`EngineError::ReservationConflict`] when another worker
/// already holds the marker.
pub fn try_reserve(
    conn: &Connection,
    worker: &str,
    table: &TableName,
    key: &Key,
) -> EngineResult<()> {
    let key_json = key.canonical()?;
    let inserted = conn
        .execute(
            "INSERT INTO trellis_meta.job_reservation (table_name, key_json, worker) \
             VALUES (?, ?, ?) ON CONFLICT DO NOTHING",
            duckdb::params![table.as_str(), key_json, worker],
        )
        .query_context("reserve job")?;
    if inserted == 0 {
        return Err(EngineError::ReservationConflict {
            table: table.clone(),
            key: key.clone(),
        });
    }
    Ok(())
}

/// Release the marker for `key`, if any.
pub fn release(conn: &Connection, table: &TableName, key: &Key) -> EngineResult<()> {
    let key_json = key.canonical()?;
    conn.execute(
        "DELETE FROM trellis_meta.job_reservation WHERE table_name = ? AND key_json = ?",
        duckdb::params![table.as_str(), key_json],
    )
    .query_context("release job")?;
    Ok(())
}

/// Drop every reservation held on `table`; returns the number removed.
pub fn clear_reservations(conn: &Connection, table: &TableName) -> EngineResult<usize> {
    let removed = conn
        .execute(
            "DELETE FROM trellis_meta.job_reservation WHERE table_name = ?",
            duckdb::params![table.as_str()],
        )
        .query_context("clear reservations")?;
    Ok(removed)
}

/// Drop reservations older than `older_than`, across all tables.
///
/// Administrative cleanup for markers orphaned by crashed workers.
pub fn clear_stale(conn: &Connection, older_than: chrono::Duration) -> EngineResult<usize> {
    let removed = conn
        .execute(
            "DELETE FROM trellis_meta.job_reservation \
             WHERE reserved_at < now() - INTERVAL 1 SECOND * ?",
            duckdb::params![older_than.num_seconds()],
        )
        .query_context("clear stale reservations")?;
    Ok(removed)
}

#[cfg(test)]
#[path = "reserve_test.rs"]
mod tests;
