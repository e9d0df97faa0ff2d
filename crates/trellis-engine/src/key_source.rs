//! Key source resolution: which keys of a table are eligible to populate.
//!
//! The candidate set is the AND-join of the table's parents' primary keys
//! projected onto the table's inherited key attributes, minus keys already
//! present in the table. A key with several parents becomes eligible only
//! once every parent has a matching record; this is what gates diamond
//! dependencies.
//!
//! The query is a pure function of current store state, re-evaluated from
//! scratch on every call — never a stateful iterator — so a partially
//! consumed sweep can always restart safely.

use crate::error::{EngineError, EngineResult};
use duckdb::Connection;
use trellis_core::{AttrType, Key, SchemaError, SchemaGraph, TableDef, Value};
use trellis_store::StoreResultExt;

/// Precomputed pending-key query for one auto-populated table.
pub struct KeySource {
    source_attrs: Vec<(String, AttrType)>,
    sql: String,
}

impl KeySource {
    /// Build the join plan for `table` from its key-embedded foreign keys.
    pub fn new(graph: &SchemaGraph, table: &str) -> EngineResult<Self> {
        let child = graph.table(table)?;
        let fks = child.key_foreign_keys();
        if fks.is_empty() {
            return Err(EngineError::Schema(SchemaError::TierViolation {
                table: child.name.to_string(),
                reason: format!("{} tables have no key source", child.tier),
            }));
        }

        // First parent to provide a child attribute wins; later parents
        // sharing the attribute contribute join conditions instead.
        let mut providers: Vec<(&str, usize, &str)> = Vec::new();
        let mut conditions: Vec<String> = Vec::new();
        let mut from: Vec<String> = Vec::new();
        for (i, fk) in fks.iter().enumerate() {
            from.push(format!("{} t{i}", fk.parent));
            for (child_attr, parent_attr) in &fk.attr_map {
                match providers.iter().find(|(c, _, _)| c == child_attr) {
                    Some((_, j, existing)) => {
                        conditions.push(format!("t{j}.{existing} = t{i}.{parent_attr}"));
                    }
                    None => providers.push((child_attr, i, parent_attr)),
                }
            }
        }

        let source_attrs: Vec<(String, AttrType)> = child
            .inherited_key_attrs()
            .into_iter()
            .map(|attr| {
                let ty = child
                    .attribute(attr)
                    .map(|a| a.attr_type)
                    .unwrap_or(AttrType::Text);
                (attr.to_string(), ty)
            })
            .collect();

        let mut select = Vec::new();
        let mut anti = Vec::new();
        for (attr, ty) in &source_attrs {
            let (_, i, parent_attr) = providers
                .iter()
                .find(|(c, _, _)| c == attr)
                .ok_or_else(|| {
                    EngineError::Schema(SchemaError::UnknownAttribute {
                        table: child.name.to_string(),
                        attribute: attr.clone(),
                    })
                })?;
            let expr = match ty {
                AttrType::Timestamp => format!("CAST(t{i}.{parent_attr} AS VARCHAR) AS {attr}"),
                _ => format!("t{i}.{parent_attr} AS {attr}"),
            };
            select.push(expr);
            anti.push(format!("c.{attr} = t{i}.{parent_attr}"));
        }

        conditions.push(format!(
            "NOT EXISTS (SELECT 1 FROM {} c WHERE {})",
            child.name,
            anti.join(" AND ")
        ));

        let order = source_attrs
            .iter()
            .map(|(attr, _)| attr.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "SELECT DISTINCT {} FROM {} WHERE {} ORDER BY {order}",
            select.join(", "),
            from.join(", "),
            conditions.join(" AND ")
        );

        Ok(Self { source_attrs, sql })
    }

    /// Attributes the source enumerates (the table's inherited key).
    pub fn source_attrs(&self) -> Vec<&str> {
        self.source_attrs.iter().map(|(a, _)| a.as_str()).collect()
    }

    /// Current candidate keys, in deterministic key order.
    pub fn pending(&self, conn: &Connection) -> EngineResult<Vec<Key>> {
        let mut stmt = conn
            .prepare(&self.sql)
            .query_context("prepare key source")?;
        let keys = stmt
            .query_map([], |row| {
                let mut key = Key::new();
                for (i, (attr, ty)) in self.source_attrs.iter().enumerate() {
                    let value = match ty {
                        AttrType::Integer => row.get::<_, i64>(i).map(Value::Int)?,
                        AttrType::Real => row.get::<_, f64>(i).map(Value::Float)?,
                        AttrType::Boolean => row.get::<_, bool>(i).map(Value::Bool)?,
                        AttrType::Text | AttrType::Timestamp => {
                            row.get::<_, String>(i).map(Value::Text)?
                        }
                    };
                    key.set(attr.clone(), value);
                }
                Ok(key)
            })
            .query_context("evaluate key source")?
            .collect::<Result<Vec<_>, _>>()
            .query_context("read key source rows")?;
        Ok(keys)
    }
}

/// Parent rows for one key, resolved through every foreign key of `child`.
///
/// Non-key references (e.g. lookup tables) are restricted only by the key
/// attributes they share with the key, which may be none — the whole
/// parent table is handed to the computation in that case.
pub(crate) fn resolve_parents(
    graph: &SchemaGraph,
    conn: &Connection,
    child: &TableDef,
    key: &Key,
) -> EngineResult<crate::compute::ParentData> {
    let mut parents = crate::compute::ParentData::default();
    for fk in &child.foreign_keys {
        let parent = graph.table(fk.parent.as_str())?;
        let mut restriction = Key::new();
        for (child_attr, parent_attr) in &fk.attr_map {
            if let Some(value) = key.get(child_attr) {
                restriction.set(parent_attr.clone(), value.clone());
            }
        }
        let records = trellis_store::rows::fetch_records(conn, parent, &restriction)?;
        parents.push(fk.parent.clone(), records);
    }
    Ok(parents)
}

#[cfg(test)]
#[path = "key_source_test.rs"]
mod tests;
