//! Typed row access: inserts, fetches, deletes, and key enumeration.
//!
//! Attribute names have been validated as identifiers at graph
//! registration; values are always bound as statement parameters, never
//! rendered into SQL text.

use crate::error::{StoreError, StoreResult, StoreResultExt};
use duckdb::types::{ToSql, ToSqlOutput, Value as DuckValue};
use duckdb::{params_from_iter, Connection};
use trellis_core::{AttrType, Key, Record, TableDef, Value};

/// Borrowed [`Value`] adapter implementing DuckDB's `ToSql`.
pub(crate) struct SqlValue<'a>(pub &'a Value);

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> duckdb::Result<ToSqlOutput<'_>> {
        let v = match self.0 {
            Value::Null => DuckValue::Null,
            Value::Bool(b) => DuckValue::Boolean(*b),
            Value::Int(i) => DuckValue::BigInt(*i),
            Value::Float(f) => DuckValue::Double(*f),
            Value::Text(s) => DuckValue::Text(s.clone()),
        };
        Ok(ToSqlOutput::Owned(v))
    }
}

/// `a = ? AND b = ?` over the restriction's attributes; `TRUE` when empty.
fn predicate(restriction: &Key) -> String {
    if restriction.is_empty() {
        "TRUE".to_string()
    } else {
        restriction
            .attrs()
            .map(|a| format!("{a} = ?"))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}

fn restriction_params(restriction: &Key) -> Vec<SqlValue<'_>> {
    restriction.iter().map(|(_, v)| SqlValue(v)).collect()
}

fn check_restriction(def: &TableDef, restriction: &Key) -> StoreResult<()> {
    for attr in restriction.attrs() {
        if !def.has_attribute(attr) {
            return Err(StoreError::MalformedRow {
                table: def.name.to_string(),
                reason: format!("unknown attribute '{attr}' in restriction"),
            });
        }
    }
    Ok(())
}

/// Column list for SELECT, casting timestamps to text so every value fits
/// the [`Value`] enum.
fn select_list(def: &TableDef) -> String {
    def.attributes
        .iter()
        .map(|a| match a.attr_type {
            AttrType::Timestamp => format!("CAST({0} AS VARCHAR) AS {0}", a.name),
            _ => a.name.clone(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

fn read_record(def: &TableDef, row: &duckdb::Row<'_>) -> duckdb::Result<Record> {
    let mut record = Record::new();
    for (i, attr) in def.attributes.iter().enumerate() {
        let value = match attr.attr_type {
            AttrType::Integer => row.get::<_, Option<i64>>(i)?.map(Value::Int),
            AttrType::Real => row.get::<_, Option<f64>>(i)?.map(Value::Float),
            AttrType::Boolean => row.get::<_, Option<bool>>(i)?.map(Value::Bool),
            AttrType::Text | AttrType::Timestamp => {
                row.get::<_, Option<String>>(i)?.map(Value::Text)
            }
        };
        record.insert(attr.name.clone(), value.unwrap_or(Value::Null));
    }
    Ok(record)
}

/// Insert one record. The primary-key constraint rejects duplicates.
pub fn insert_record(conn: &Connection, def: &TableDef, record: &Record) -> StoreResult<()> {
    for attr in record.keys() {
        if !def.has_attribute(attr) {
            return Err(StoreError::MalformedRow {
                table: def.name.to_string(),
                reason: format!("unknown attribute '{attr}'"),
            });
        }
    }
    for attr in &def.attributes {
        if !attr.nullable && !record.contains_key(&attr.name) {
            return Err(StoreError::MalformedRow {
                table: def.name.to_string(),
                reason: format!("missing attribute '{}'", attr.name),
            });
        }
    }

    let columns: Vec<&str> = record.keys().map(String::as_str).collect();
    let placeholders = vec!["?"; columns.len()].join(", ");
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        def.name,
        columns.join(", "),
        placeholders
    );
    conn.execute(&sql, params_from_iter(record.values().map(SqlValue)))
        .query_context(&format!("insert into {}", def.name))?;
    Ok(())
}

/// Fetch all records matching the restriction, ordered by primary key.
pub fn fetch_records(conn: &Connection, def: &TableDef, restriction: &Key) -> StoreResult<Vec<Record>> {
    check_restriction(def, restriction)?;
    let sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY {}",
        select_list(def),
        def.name,
        predicate(restriction),
        def.primary_key().join(", ")
    );
    let mut stmt = conn
        .prepare(&sql)
        .query_context(&format!("prepare fetch from {}", def.name))?;
    let records = stmt
        .query_map(params_from_iter(restriction_params(restriction)), |row| {
            read_record(def, row)
        })
        .query_context(&format!("fetch from {}", def.name))?
        .collect::<Result<Vec<_>, _>>()
        .query_context(&format!("read rows from {}", def.name))?;
    Ok(records)
}

/// Count records matching the restriction.
pub fn count_records(conn: &Connection, def: &TableDef, restriction: &Key) -> StoreResult<i64> {
    check_restriction(def, restriction)?;
    let sql = format!(
        "SELECT COUNT(*) FROM {} WHERE {}",
        def.name,
        predicate(restriction)
    );
    conn.query_row(
        &sql,
        params_from_iter(restriction_params(restriction)),
        |row| row.get(0),
    )
    .query_context(&format!("count {}", def.name))
}

/// Whether any record matches the restriction.
pub fn record_exists(conn: &Connection, def: &TableDef, restriction: &Key) -> StoreResult<bool> {
    Ok(count_records(conn, def, restriction)? > 0)
}

/// Delete records matching the restriction; returns the number removed.
pub fn delete_records(conn: &Connection, def: &TableDef, restriction: &Key) -> StoreResult<usize> {
    check_restriction(def, restriction)?;
    let sql = format!("DELETE FROM {} WHERE {}", def.name, predicate(restriction));
    conn.execute(&sql, params_from_iter(restriction_params(restriction)))
        .query_context(&format!("delete from {}", def.name))
}

/// Distinct primary keys matching the restriction, in key order.
pub fn select_keys(conn: &Connection, def: &TableDef, restriction: &Key) -> StoreResult<Vec<Key>> {
    check_restriction(def, restriction)?;
    let pk_attrs: Vec<(&str, AttrType)> = def
        .attributes
        .iter()
        .filter(|a| a.in_key)
        .map(|a| (a.name.as_str(), a.attr_type))
        .collect();
    let select = pk_attrs
        .iter()
        .map(|(name, ty)| match ty {
            AttrType::Timestamp => format!("CAST({name} AS VARCHAR) AS {name}"),
            _ => (*name).to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ");
    let order = pk_attrs
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "SELECT DISTINCT {select} FROM {} WHERE {} ORDER BY {order}",
        def.name,
        predicate(restriction)
    );
    let mut stmt = conn
        .prepare(&sql)
        .query_context(&format!("prepare keys of {}", def.name))?;
    let keys = stmt
        .query_map(params_from_iter(restriction_params(restriction)), |row| {
            let mut key = Key::new();
            for (i, (name, ty)) in pk_attrs.iter().enumerate() {
                let value = match ty {
                    AttrType::Integer => row.get::<_, i64>(i).map(Value::Int)?,
                    AttrType::Real => row.get::<_, f64>(i).map(Value::Float)?,
                    AttrType::Boolean => row.get::<_, bool>(i).map(Value::Bool)?,
                    AttrType::Text | AttrType::Timestamp => {
                        row.get::<_, String>(i).map(Value::Text)?
                    }
                };
                key.set(*name, value);
            }
            Ok(key)
        })
        .query_context(&format!("keys of {}", def.name))?
        .collect::<Result<Vec<_>, _>>()
        .query_context(&format!("read keys of {}", def.name))?;
    Ok(keys)
}

#[cfg(test)]
#[path = "rows_test.rs"]
mod tests;
