//! Error types for the population engine.

use thiserror::Error;
use trellis_core::{Key, TableName};

/// Population engine errors.
///
/// Structural ([`Schema`](EngineError::Schema)) and store errors always
/// abort a run. Per-key computation failures are contained to the key's
/// transaction and surface only when `suppress_errors` is off.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Structural misdefinition, surfaced from graph construction or lookup.
    #[error(transparent)]
    Schema(#[from] trellis_core::SchemaError),

    /// Store-level failure.
    #[error(transparent)]
    Store(#[from] trellis_store::StoreError),

    /// The registered computation failed for one key (P001).
    #[error("[P001] Computation failed for '{table}' key {key}: {message}")]
    Computation {
        table: TableName,
        key: Key,
        message: String,
    },

    /// A success record already exists for the key (P002).
    #[error("[P002] Key {key} of '{table}' is already populated; pass force to recompute")]
    AlreadyPopulated { table: TableName, key: Key },

    /// Deleting the key would orphan dependent records (P003).
    #[error("[P003] Cannot delete key {key} of '{table}': dependent records exist in {dependents}")]
    Integrity {
        table: TableName,
        key: Key,
        dependents: String,
    },

    /// Another worker holds the reservation for the key (P004).
    ///
    /// Expected steady-state under concurrency; `populate` converts this
    /// into a skip and never surfaces it to the caller.
    #[error("[P004] Key {key} of '{table}' is reserved by another worker")]
    ReservationConflict { table: TableName, key: Key },

    /// No computation registered for an auto-populated table with pending
    /// keys (P005).
    #[error("[P005] No computation registered for table '{table}'")]
    MissingComputation { table: TableName },

    /// The key does not fit the table's primary key (P006).
    #[error("[P006] Key {key} does not fit the primary key of '{table}': {reason}")]
    MalformedKey {
        table: TableName,
        key: Key,
        reason: String,
    },
}

/// Result type alias for [`EngineError`].
pub type EngineResult<T> = Result<T, EngineError>;
