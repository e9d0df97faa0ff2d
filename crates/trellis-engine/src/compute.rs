//! The computation capability: user logic invoked per key.
//!
//! Any table whose tier is auto-populated registers a [`Compute`]
//! implementation. The engine resolves the key and its parent rows,
//! invokes `compute`, and commits whatever records come back; the logic
//! itself stays opaque to the engine.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use trellis_core::{Key, Record, TableName};

/// Failure raised by a table's computation for one key.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct ComputeError {
    message: String,
}

impl ComputeError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Parent rows resolved for one key, one entry per foreign key in
/// declaration order.
#[derive(Debug, Clone, Default)]
pub struct ParentData {
    entries: Vec<(TableName, Vec<Record>)>,
}

impl ParentData {
    pub(crate) fn push(&mut self, table: TableName, records: Vec<Record>) {
        self.entries.push((table, records));
    }

    /// Rows of the first foreign key referencing `table`.
    pub fn rows(&self, table: &str) -> Option<&[Record]> {
        self.entries
            .iter()
            .find(|(name, _)| name == table)
            .map(|(_, records)| records.as_slice())
    }

    /// The single row of `table` matching the key, when there is exactly one.
    pub fn row(&self, table: &str) -> Option<&Record> {
        match self.rows(table) {
            Some([record]) => Some(record),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableName, &[Record])> {
        self.entries
            .iter()
            .map(|(name, records)| (name, records.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A table's registered computation.
///
/// `Send + Sync` so a worker may parallelize keys and so timed-out
/// invocations can run on a helper thread.
pub trait Compute: Send + Sync {
    fn compute(&self, key: &Key, parents: &ParentData) -> Result<Vec<Record>, ComputeError>;
}

impl<F> Compute for F
where
    F: Fn(&Key, &ParentData) -> Result<Vec<Record>, ComputeError> + Send + Sync,
{
    fn compute(&self, key: &Key, parents: &ParentData) -> Result<Vec<Record>, ComputeError> {
        self(key, parents)
    }
}

/// Registry mapping auto-populated tables to their computations.
#[derive(Clone, Default)]
pub struct ComputeRegistry {
    map: HashMap<TableName, Arc<dyn Compute>>,
}

impl ComputeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `compute` for `table`, replacing any previous registration.
    pub fn register(&mut self, table: impl Into<TableName>, compute: impl Compute + 'static) {
        self.map.insert(table.into(), Arc::new(compute));
    }

    pub fn get(&self, table: &str) -> Option<Arc<dyn Compute>> {
        self.map.get(table).cloned()
    }

    pub fn contains(&self, table: &str) -> bool {
        self.map.contains_key(table)
    }
}

impl fmt::Debug for ComputeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputeRegistry")
            .field("tables", &self.map.keys().collect::<Vec<_>>())
            .finish()
    }
}
