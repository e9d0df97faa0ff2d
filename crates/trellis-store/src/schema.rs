//! Generated DDL for user data tables.
//!
//! Table definitions from the schema graph become `CREATE TABLE`
//! statements, executed in dependency order so foreign keys always
//! reference existing tables. DuckDB enforces the constraints but has no
//! `ON DELETE CASCADE`; cascaded deletes are performed by the engine,
//! children first.

use crate::connection::Store;
use crate::error::{StoreError, StoreResult};
use trellis_core::{SchemaGraph, TableDef, TableName};

/// Render the `CREATE TABLE` statement for one table definition.
///
/// Foreign-key column lists are ordered by the parent's primary key so the
/// referenced column tuple always matches the parent's declaration.
pub fn create_table_sql(graph: &SchemaGraph, def: &TableDef) -> StoreResult<String> {
    let mut lines: Vec<String> = Vec::new();

    for attr in &def.attributes {
        let null = if attr.nullable && !attr.in_key {
            ""
        } else {
            " NOT NULL"
        };
        lines.push(format!("    {} {}{}", attr.name, attr.attr_type.sql_type(), null));
    }

    let pk = def.primary_key().join(", ");
    lines.push(format!("    PRIMARY KEY ({pk})"));

    for fk in &def.foreign_keys {
        let parent = graph.table(fk.parent.as_str())?;
        let mut child_cols = Vec::new();
        let mut parent_cols = Vec::new();
        for parent_attr in parent.primary_key() {
            let child_attr = fk
                .attr_map
                .iter()
                .find(|(_, p)| p == parent_attr)
                .map(|(c, _)| c.as_str())
                .ok_or_else(|| StoreError::DeployError(format!(
                    "foreign key on '{}' does not map parent attribute '{parent_attr}'",
                    def.name
                )))?;
            child_cols.push(child_attr);
            parent_cols.push(parent_attr);
        }
        lines.push(format!(
            "    FOREIGN KEY ({}) REFERENCES {} ({})",
            child_cols.join(", "),
            fk.parent,
            parent_cols.join(", ")
        ));
    }

    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n);",
        def.name,
        lines.join(",\n")
    ))
}

/// Create every registered table, parents first. Idempotent.
pub fn deploy(store: &Store, graph: &SchemaGraph) -> StoreResult<()> {
    let all: Vec<TableName> = graph.tables().map(|d| d.name.clone()).collect();
    for name in graph.population_order(&all)? {
        let def = graph.table(name.as_str())?;
        let sql = create_table_sql(graph, def)?;
        store
            .conn()
            .execute_batch(&sql)
            .map_err(|e| StoreError::DeployError(format!("create table '{name}': {e}")))?;
        log::debug!("Deployed table {name} ({} tier)", def.tier);
    }
    Ok(())
}

#[cfg(test)]
#[path = "schema_test.rs"]
mod tests;
