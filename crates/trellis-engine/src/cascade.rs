//! Cascaded deletion: remove a key and everything derived from it.
//!
//! Dependents are deleted deepest-descendants-first so foreign keys never
//! dangle mid-cascade, and the whole cascade runs in one transaction:
//! either every affected record across every descendant table is removed,
//! or none are. Provenance rows for deleted auto-populated records are
//! cleared alongside them, so the lineage is free to be recomputed once
//! its upstream returns.

use crate::error::{EngineError, EngineResult};
use crate::lineage;
use crate::reserve;
use duckdb::Connection;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use trellis_core::{Key, SchemaGraph, TableDef, TableName};
use trellis_store::rows;
use trellis_store::Store;

/// Rows removed by one delete call, per table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    deleted: BTreeMap<TableName, usize>,
}

impl DeleteReport {
    fn add(&mut self, table: &TableName, rows: usize) {
        if rows > 0 {
            *self.deleted.entry(table.clone()).or_insert(0) += rows;
        }
    }

    /// Rows removed from `table`.
    pub fn table(&self, table: &str) -> usize {
        self.deleted.get(table).copied().unwrap_or(0)
    }

    /// Total rows removed across all tables.
    pub fn total(&self) -> usize {
        self.deleted.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TableName, usize)> {
        self.deleted.iter().map(|(t, &n)| (t, n))
    }
}

/// Delete `key` from `table`.
///
/// The key must cover the table's full primary key. With `cascade` off,
/// any dependent rows referencing the key fail the call with
/// [`EngineError::Integrity`] and nothing is deleted. With `cascade` on,
/// all transitively dependent rows are removed first, deepest descendants
/// first, together with their provenance — all in a single transaction.
pub fn delete(
    graph: &SchemaGraph,
    store: &Store,
    table: &str,
    key: &Key,
    cascade: bool,
) -> EngineResult<DeleteReport> {
    let def = graph.table(table)?;
    check_full_key(def, key)?;

    let mut report = DeleteReport::default();
    store.transaction::<_, _, EngineError>(|conn| {
        if !cascade {
            check_no_dependents(graph, conn, def, key)?;
        }
        delete_tree(graph, conn, def, key, &mut report)?;
        Ok(())
    })?;
    if report.total() > 0 {
        log::info!(
            "Deleted key {key} of {table}: {} rows across {} tables",
            report.total(),
            report.iter().count()
        );
    }
    Ok(report)
}

/// The key must name exactly the table's primary-key attributes.
fn check_full_key(def: &TableDef, key: &Key) -> EngineResult<()> {
    let malformed = |reason: String| EngineError::MalformedKey {
        table: def.name.clone(),
        key: key.clone(),
        reason,
    };
    for attr in def.primary_key() {
        if !key.contains(attr) {
            return Err(malformed(format!("missing key attribute '{attr}'")));
        }
    }
    for attr in key.attrs() {
        if !def.attribute(attr).is_some_and(|a| a.in_key) {
            return Err(malformed(format!("'{attr}' is not a primary-key attribute")));
        }
    }
    Ok(())
}

/// Fail with [`EngineError::Integrity`] when any immediate dependent row
/// references `key`. Checking one level is enough: deeper descendants can
/// only exist through an immediate one.
fn check_no_dependents(
    graph: &SchemaGraph,
    conn: &Connection,
    def: &TableDef,
    key: &Key,
) -> EngineResult<()> {
    let mut dependents: Vec<String> = Vec::new();
    for child_name in graph.children(def.name.as_str()) {
        let child = graph.table(child_name.as_str())?;
        for restriction in child_restrictions(child, def, key)? {
            let n = rows::count_records(conn, child, &restriction)?;
            if n > 0 {
                dependents.push(format!("{child_name} ({n} rows)"));
            }
        }
    }
    if !dependents.is_empty() {
        return Err(EngineError::Integrity {
            table: def.name.clone(),
            key: key.clone(),
            dependents: dependents.join(", "),
        });
    }
    Ok(())
}

/// Restrictions selecting the rows of `child` that reference `key` of
/// `parent`, one per foreign key between the two tables.
fn child_restrictions(
    child: &TableDef,
    parent: &TableDef,
    key: &Key,
) -> EngineResult<Vec<Key>> {
    let mut restrictions = Vec::new();
    for fk in child.foreign_keys.iter().filter(|fk| fk.parent == parent.name) {
        let mut restriction = Key::new();
        for (child_attr, parent_attr) in &fk.attr_map {
            let value = key.get(parent_attr).ok_or_else(|| EngineError::MalformedKey {
                table: parent.name.clone(),
                key: key.clone(),
                reason: format!("missing key attribute '{parent_attr}'"),
            })?;
            restriction.set(child_attr.clone(), value.clone());
        }
        restrictions.push(restriction);
    }
    Ok(restrictions)
}

/// Delete every row of `def` matching `restriction`, recursing into
/// dependents first.
///
/// Each affected row's full key is enumerated before recursion so child
/// restrictions are always complete, whatever subset of the child's key
/// the restriction itself covers.
fn delete_tree(
    graph: &SchemaGraph,
    conn: &Connection,
    def: &TableDef,
    restriction: &Key,
    report: &mut DeleteReport,
) -> EngineResult<()> {
    let keys = rows::select_keys(conn, def, restriction)?;
    if keys.is_empty() {
        return Ok(());
    }

    for key in &keys {
        for child_name in graph.children(def.name.as_str()) {
            let child = graph.table(child_name.as_str())?;
            for child_restriction in child_restrictions(child, def, key)? {
                delete_tree(graph, conn, child, &child_restriction, report)?;
            }
        }
    }

    if def.tier.is_auto_populated() {
        clear_provenance(conn, def, &keys)?;
    }
    let removed = rows::delete_records(conn, def, restriction)?;
    report.add(&def.name, removed);
    Ok(())
}

/// Clear provenance and reservations for the deleted rows.
///
/// Provenance is keyed by the inherited sub-key the key source
/// enumerates, which may group several rows; projections are deduplicated
/// before clearing.
fn clear_provenance(conn: &Connection, def: &TableDef, keys: &[Key]) -> EngineResult<()> {
    let source_attrs = def.inherited_key_attrs();
    let mut cleared: BTreeSet<String> = BTreeSet::new();
    for key in keys {
        let lineage_key = key.project(&source_attrs);
        if cleared.insert(lineage_key.canonical()?) {
            lineage::clear(conn, &def.name, &lineage_key)?;
            reserve::release(conn, &def.name, &lineage_key)?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "cascade_test.rs"]
mod tests;
