//! The population sweep: draw eligible keys, compute, commit.
//!
//! Tables are processed in dependency order. For each auto-populated
//! table the engine repeatedly re-evaluates the key source, draws a batch
//! of candidate keys, invokes the registered computation per key, and
//! commits the output records together with their success provenance (and
//! the reservation release, when reserving) in one transaction. Atomicity
//! is per key, not per batch: `batch_size` only governs draw granularity,
//! so a crash mid-sweep leaves every committed key committed and nothing
//! else.

use crate::compute::{Compute, ComputeError, ComputeRegistry, ParentData};
use crate::error::{EngineError, EngineResult};
use crate::key_source::{resolve_parents, KeySource};
use crate::{lineage, reserve};
use duckdb::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;
use trellis_core::{Key, PopulateDefaults, Record, SchemaGraph, TableDef, TableName};
use trellis_store::Store;
use uuid::Uuid;

/// Predicate limiting which candidate keys a run touches.
pub type KeyPredicate = Arc<dyn Fn(&Key) -> bool + Send + Sync>;

/// Knobs for one population run.
#[derive(Clone)]
pub struct PopulateOptions {
    /// Only keys matching the predicate are drawn.
    pub restrict: Option<KeyPredicate>,
    /// How many keys are drawn per sweep iteration.
    pub batch_size: usize,
    /// Reserve each key before computing so cooperating workers don't
    /// duplicate work.
    pub reserve_jobs: bool,
    /// Record per-key failures and continue instead of aborting the run.
    pub suppress_errors: bool,
    /// Explicit override of the default dependency order.
    pub order: Option<Vec<TableName>>,
    /// Cap on keys computed per table per invocation.
    pub max_calls: Option<usize>,
    /// Wall-clock bound per computation; an overrun is a computation
    /// failure subject to `suppress_errors`.
    pub timeout: Option<Duration>,
    /// Re-attempt keys whose latest attempt failed.
    pub retry_failed: bool,
}

impl Default for PopulateOptions {
    fn default() -> Self {
        Self::from_config(&PopulateDefaults::default())
    }
}

impl PopulateOptions {
    /// Seed options from the pipeline configuration's populate defaults.
    pub fn from_config(defaults: &PopulateDefaults) -> Self {
        Self {
            restrict: None,
            batch_size: defaults.batch_size.max(1),
            reserve_jobs: defaults.reserve_jobs,
            suppress_errors: defaults.suppress_errors,
            order: None,
            max_calls: None,
            timeout: None,
            retry_failed: false,
        }
    }
}

impl fmt::Debug for PopulateOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PopulateOptions")
            .field("restrict", &self.restrict.as_ref().map(|_| "<predicate>"))
            .field("batch_size", &self.batch_size)
            .field("reserve_jobs", &self.reserve_jobs)
            .field("suppress_errors", &self.suppress_errors)
            .field("order", &self.order)
            .field("max_calls", &self.max_calls)
            .field("timeout", &self.timeout)
            .field("retry_failed", &self.retry_failed)
            .finish()
    }
}

/// Outcome of a population run, summed across all swept tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopulateSummary {
    /// Keys for which the computation was invoked.
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Keys skipped because another worker held their reservation.
    pub skipped_reserved: usize,
}

impl PopulateSummary {
    fn absorb(&mut self, other: PopulateSummary) {
        self.attempted += other.attempted;
        self.succeeded += other.succeeded;
        self.failed += other.failed;
        self.skipped_reserved += other.skipped_reserved;
    }
}

/// Population state of one table: committed, failed, and still-eligible
/// key counts.
#[derive(Debug, Clone, Serialize)]
pub struct TableProgress {
    pub table: TableName,
    /// Keys whose latest attempt succeeded.
    pub populated: usize,
    /// Keys whose latest attempt failed.
    pub failed: usize,
    /// Keys currently eligible and never terminally attempted.
    pub pending: usize,
}

/// The population engine for one worker.
///
/// Holds the schema graph, the computation registry, and a UUID identity
/// recorded on this worker's reservations. Cooperating workers each build
/// their own engine over their own [`Store`]; all coordination between
/// them happens through the store's constraints.
pub struct PopulationEngine<'g> {
    graph: &'g SchemaGraph,
    registry: ComputeRegistry,
    worker: String,
}

impl<'g> PopulationEngine<'g> {
    pub fn new(graph: &'g SchemaGraph, registry: ComputeRegistry) -> Self {
        Self {
            graph,
            registry,
            worker: Uuid::new_v4().to_string(),
        }
    }

    /// This worker's reservation identity.
    pub fn worker(&self) -> &str {
        &self.worker
    }

    /// Populate `tables` (and their auto-populated ancestors) in
    /// dependency order.
    ///
    /// Always returns a summary on partial failure; only structural,
    /// store, and — when `suppress_errors` is off — computation errors
    /// abort the run. Re-running after a successful or partial run never
    /// recomputes committed keys.
    pub fn populate(
        &self,
        store: &Store,
        tables: &[TableName],
        options: &PopulateOptions,
    ) -> EngineResult<PopulateSummary> {
        let order = match &options.order {
            Some(order) => {
                for table in order {
                    self.graph.table(table.as_str())?;
                }
                order.clone()
            }
            None => self.graph.population_order(tables)?,
        };

        let mut summary = PopulateSummary::default();
        for table in &order {
            let def = self.graph.table(table.as_str())?;
            if !def.tier.is_auto_populated() {
                continue;
            }
            let table_summary = self.populate_table(store, def, options)?;
            if table_summary != PopulateSummary::default() {
                log::info!(
                    "Populated {table}: {} succeeded, {} failed, {} reserved elsewhere",
                    table_summary.succeeded,
                    table_summary.failed,
                    table_summary.skipped_reserved
                );
            }
            summary.absorb(table_summary);
        }
        Ok(summary)
    }

    /// Sweep one table until its key source runs dry or `max_calls` is hit.
    fn populate_table(
        &self,
        store: &Store,
        def: &TableDef,
        options: &PopulateOptions,
    ) -> EngineResult<PopulateSummary> {
        let source = KeySource::new(self.graph, def.name.as_str())?;
        let compute = self.registry.get(def.name.as_str());
        let mut summary = PopulateSummary::default();
        // Keys acted on this run, so a re-evaluated source doesn't hand
        // back a key we already skipped or (under suppression) failed.
        let mut seen: HashSet<String> = HashSet::new();

        'sweep: loop {
            let skip_failed: HashSet<String> = if options.retry_failed {
                HashSet::new()
            } else {
                lineage::failed_keys(store.conn(), &def.name)?
                    .iter()
                    .map(Key::canonical)
                    .collect::<Result<_, _>>()?
            };

            let mut batch: Vec<(Key, String)> = Vec::new();
            for key in source.pending(store.conn())? {
                if batch.len() >= options.batch_size {
                    break;
                }
                let canon = key.canonical()?;
                if seen.contains(&canon) || skip_failed.contains(&canon) {
                    continue;
                }
                if let Some(predicate) = &options.restrict {
                    if !predicate(&key) {
                        continue;
                    }
                }
                batch.push((key, canon));
            }
            if batch.is_empty() {
                break;
            }
            let compute = match &compute {
                Some(compute) => compute,
                None => {
                    return Err(EngineError::MissingComputation {
                        table: def.name.clone(),
                    })
                }
            };

            for (key, canon) in batch {
                if options.max_calls.is_some_and(|cap| summary.attempted >= cap) {
                    break 'sweep;
                }
                seen.insert(canon);

                if options.reserve_jobs {
                    match reserve::try_reserve(store.conn(), &self.worker, &def.name, &key) {
                        Ok(()) => {}
                        Err(EngineError::ReservationConflict { .. }) => {
                            log::debug!(
                                "Key {key} of {} is reserved by another worker, skipping",
                                def.name
                            );
                            summary.skipped_reserved += 1;
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                }

                summary.attempted += 1;
                match self.process_key(store, def, Arc::clone(compute), &key, options) {
                    Ok(()) => summary.succeeded += 1,
                    Err(EngineError::Computation {
                        table,
                        key,
                        message,
                    }) => {
                        if !options.suppress_errors {
                            if options.reserve_jobs {
                                reserve::release(store.conn(), &table, &key)?;
                            }
                            return Err(EngineError::Computation {
                                table,
                                key,
                                message,
                            });
                        }
                        log::warn!("Suppressed failure for {table} key {key}: {message}");
                        store.transaction::<_, _, EngineError>(|conn| {
                            lineage::record_failure(conn, &table, &key, &message)?;
                            if options.reserve_jobs {
                                reserve::release(conn, &table, &key)?;
                            }
                            Ok(())
                        })?;
                        summary.failed += 1;
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(summary)
    }

    /// Compute one key and commit its records atomically.
    ///
    /// Nothing is written until the computation has succeeded and its
    /// output has been checked; the data rows, the success provenance, and
    /// the reservation release then commit together or not at all.
    fn process_key(
        &self,
        store: &Store,
        def: &TableDef,
        compute: Arc<dyn Compute>,
        key: &Key,
        options: &PopulateOptions,
    ) -> EngineResult<()> {
        let parents = resolve_parents(self.graph, store.conn(), def, key)?;
        let records = invoke(compute, key.clone(), parents, options.timeout).map_err(|e| {
            EngineError::Computation {
                table: def.name.clone(),
                key: key.clone(),
                message: e.message().to_string(),
            }
        })?;
        verify_output(def, key, &records)?;

        store.transaction::<_, _, EngineError>(|conn| {
            for record in &records {
                trellis_store::rows::insert_record(conn, def, record)?;
            }
            lineage::record_success(conn, &def.name, key, false)?;
            if options.reserve_jobs {
                reserve::release(conn, &def.name, key)?;
            }
            Ok(())
        })
    }
}

/// Run the computation, bounded by the wall-clock limit when one is set.
///
/// The bounded variant runs on a helper thread; on overrun the thread is
/// abandoned (its eventual result is dropped with the channel) and the
/// overrun reported as a computation failure.
fn invoke(
    compute: Arc<dyn Compute>,
    key: Key,
    parents: ParentData,
    timeout: Option<Duration>,
) -> Result<Vec<Record>, ComputeError> {
    let Some(limit) = timeout else {
        return compute.compute(&key, &parents);
    };
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        let _ = tx.send(compute.compute(&key, &parents));
    });
    match rx.recv_timeout(limit) {
        Ok(result) => result,
        Err(_) => Err(ComputeError::new(format!(
            "computation exceeded the {}ms wall-clock limit",
            limit.as_millis()
        ))),
    }
}

/// Check that the computation produced at least one record and that every
/// record embeds the populated key verbatim.
///
/// An empty output would commit provenance for a key the store still
/// reports as pending, so it is rejected as a computation failure.
fn verify_output(def: &TableDef, key: &Key, records: &[Record]) -> EngineResult<()> {
    let fail = |message: String| EngineError::Computation {
        table: def.name.clone(),
        key: key.clone(),
        message,
    };
    if records.is_empty() {
        return Err(fail("computation returned no records".to_string()));
    }
    for record in records {
        for (attr, value) in key.iter() {
            match record.get(attr) {
                Some(v) if v == value => {}
                Some(v) => {
                    return Err(fail(format!(
                        "output record carries {attr}={v}, expected {attr}={value}"
                    )))
                }
                None => return Err(fail(format!("output record is missing key attribute {attr}"))),
            }
        }
    }
    Ok(())
}

/// Population state of one auto-populated table.
pub fn population_status(
    conn: &Connection,
    graph: &SchemaGraph,
    table: &str,
) -> EngineResult<TableProgress> {
    let def = graph.table(table)?;
    let source = KeySource::new(graph, table)?;

    let count_status = |status: &str| -> EngineResult<usize> {
        let n: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM trellis_meta.population_latest \
                 WHERE table_name = ? AND status = ?",
                duckdb::params![def.name.as_str(), status],
                |row| row.get(0),
            )
            .map_err(|e| {
                trellis_store::StoreError::QueryError(format!("count {status} attempts: {e}"))
            })?;
        Ok(n as usize)
    };
    let populated = count_status("success")?;
    let failed = count_status("failed")?;

    // Latest-failed keys still show up in the key source (they have
    // provenance but no data rows); report them as failed, not pending.
    let failed_set: HashSet<String> = lineage::failed_keys(conn, &def.name)?
        .iter()
        .map(Key::canonical)
        .collect::<Result<_, _>>()?;
    let mut pending = 0usize;
    for key in source.pending(conn)? {
        if !failed_set.contains(&key.canonical()?) {
            pending += 1;
        }
    }

    Ok(TableProgress {
        table: def.name.clone(),
        populated,
        failed,
        pending,
    })
}

#[cfg(test)]
#[path = "populate_test.rs"]
mod tests;
