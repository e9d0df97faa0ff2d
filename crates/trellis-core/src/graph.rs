//! Schema graph: registration, validation, and dependency ordering.
//!
//! Tables must be registered after their parents, so every edge points at
//! the newest node and the graph stays acyclic by construction; the DAG
//! invariant is still re-checked after every registration.

use crate::error::{CoreResult, SchemaError};
use crate::table::TableDef;
use crate::table_name::TableName;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{BTreeSet, HashMap, HashSet};

/// A directed acyclic graph of table dependencies.
///
/// Owns the table definitions for the lifetime of the process and is
/// read-only after construction. Graphs are explicit values — there is no
/// ambient registry, so independent graphs can coexist.
#[derive(Debug, Default)]
pub struct SchemaGraph {
    /// Edges run parent -> child, so a topological sort yields parents first.
    graph: DiGraph<TableName, ()>,
    /// Map from table name to node index; indices follow registration order.
    node_map: HashMap<TableName, NodeIndex>,
    defs: HashMap<TableName, TableDef>,
}

impl SchemaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a table definition.
    ///
    /// Fails with [`SchemaError`] when a foreign key references an
    /// undefined table, the attribute mapping is malformed, a tier
    /// invariant is violated, or the edge would introduce a cycle.
    pub fn register(&mut self, def: TableDef) -> CoreResult<()> {
        self.validate_def(&def)?;

        let idx = self.graph.add_node(def.name.clone());
        self.node_map.insert(def.name.clone(), idx);
        for fk in &def.foreign_keys {
            let parent_idx = self.node_map[&fk.parent];
            self.graph.add_edge(parent_idx, idx, ());
        }
        self.defs.insert(def.name.clone(), def);

        self.validate()
    }

    fn validate_def(&self, def: &TableDef) -> CoreResult<()> {
        validate_identifier(def.name.as_str(), "table")?;
        if self.defs.contains_key(&def.name) {
            return Err(SchemaError::DuplicateTable {
                name: def.name.to_string(),
            });
        }

        if def.attributes.is_empty() || def.primary_key().is_empty() {
            return Err(SchemaError::EmptyPrimaryKey {
                table: def.name.to_string(),
            });
        }
        let mut seen = HashSet::new();
        for attr in &def.attributes {
            validate_identifier(&attr.name, "attribute")?;
            if !seen.insert(attr.name.as_str()) {
                return Err(SchemaError::InvalidName {
                    name: attr.name.clone(),
                    context: format!("duplicate attribute on table '{}'", def.name),
                });
            }
        }

        match def.tier {
            crate::Tier::Manual | crate::Tier::Lookup => {
                if !def.foreign_keys.is_empty() {
                    return Err(SchemaError::TierViolation {
                        table: def.name.to_string(),
                        reason: format!("{} tables are entry points and take no foreign keys", def.tier),
                    });
                }
            }
            crate::Tier::Imported | crate::Tier::Computed => {
                if def.key_foreign_keys().is_empty() {
                    return Err(SchemaError::TierViolation {
                        table: def.name.to_string(),
                        reason: format!(
                            "{} tables need at least one foreign key embedded in their primary key",
                            def.tier
                        ),
                    });
                }
            }
        }

        for fk in &def.foreign_keys {
            self.validate_fk(def, fk)?;
        }
        Ok(())
    }

    fn validate_fk(&self, def: &TableDef, fk: &crate::ForeignKey) -> CoreResult<()> {
        if fk.parent == def.name {
            return Err(SchemaError::CircularDependency {
                cycle: format!("{} -> {}", def.name, def.name),
            });
        }
        let parent = self
            .defs
            .get(&fk.parent)
            .ok_or_else(|| SchemaError::UndefinedParent {
                table: def.name.to_string(),
                parent: fk.parent.to_string(),
            })?;

        let mut mapped_child = HashSet::new();
        let mut mapped_parent = HashSet::new();
        for (child_attr, parent_attr) in &fk.attr_map {
            let child_def = def.attribute(child_attr).ok_or_else(|| SchemaError::UnknownAttribute {
                table: def.name.to_string(),
                attribute: child_attr.clone(),
            })?;
            let parent_def =
                parent
                    .attribute(parent_attr)
                    .ok_or_else(|| SchemaError::UnknownAttribute {
                        table: parent.name.to_string(),
                        attribute: parent_attr.clone(),
                    })?;
            if !parent_def.in_key {
                return Err(SchemaError::MalformedForeignKey {
                    table: def.name.to_string(),
                    parent: parent.name.to_string(),
                    reason: format!("'{parent_attr}' is not part of the parent's primary key"),
                });
            }
            if child_def.attr_type != parent_def.attr_type {
                return Err(SchemaError::MalformedForeignKey {
                    table: def.name.to_string(),
                    parent: parent.name.to_string(),
                    reason: format!(
                        "type mismatch on '{child_attr}' -> '{parent_attr}'"
                    ),
                });
            }
            if !mapped_child.insert(child_attr.as_str()) || !mapped_parent.insert(parent_attr.as_str()) {
                return Err(SchemaError::MalformedForeignKey {
                    table: def.name.to_string(),
                    parent: parent.name.to_string(),
                    reason: format!("attribute mapped twice: '{child_attr}' -> '{parent_attr}'"),
                });
            }
        }

        let parent_pk: HashSet<&str> = parent.primary_key().into_iter().collect();
        if mapped_parent != parent_pk {
            return Err(SchemaError::MalformedForeignKey {
                table: def.name.to_string(),
                parent: parent.name.to_string(),
                reason: "mapping must cover the parent's full primary key".to_string(),
            });
        }
        Ok(())
    }

    /// Validate the DAG invariant.
    pub fn validate(&self) -> CoreResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(SchemaError::CircularDependency {
                cycle: self.find_cycle_path(cycle.node_id()),
            }),
        }
    }

    /// Find a cycle path starting from a node for error reporting.
    fn find_cycle_path(&self, start: NodeIndex) -> String {
        let mut path: Vec<String> = vec![self.graph[start].to_string()];
        let mut current = start;
        let mut visited = HashSet::new();
        visited.insert(current);

        while let Some(edge) = self.graph.edges(current).next() {
            let target = edge.target();
            path.push(self.graph[target].to_string());
            if target == start || visited.contains(&target) {
                break;
            }
            visited.insert(target);
            current = target;
        }
        path.join(" -> ")
    }

    pub fn contains(&self, table: &str) -> bool {
        self.defs.contains_key(table)
    }

    pub fn table(&self, table: &str) -> CoreResult<&TableDef> {
        self.defs.get(table).ok_or_else(|| SchemaError::UnknownTable {
            name: table.to_string(),
        })
    }

    /// All table definitions in registration order.
    pub fn tables(&self) -> impl Iterator<Item = &TableDef> {
        self.graph
            .node_indices()
            .map(move |idx| &self.defs[&self.graph[idx]])
    }

    /// Immediate parents of a table.
    pub fn parents(&self, table: &str) -> Vec<TableName> {
        self.neighbors(table, petgraph::Direction::Incoming)
    }

    /// Immediate dependents of a table.
    pub fn children(&self, table: &str) -> Vec<TableName> {
        self.neighbors(table, petgraph::Direction::Outgoing)
    }

    fn neighbors(&self, table: &str, direction: petgraph::Direction) -> Vec<TableName> {
        let Some(&idx) = self.node_map.get(table) else {
            return Vec::new();
        };
        let mut out: Vec<NodeIndex> = self.graph.neighbors_directed(idx, direction).collect();
        out.sort();
        out.dedup();
        out.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    /// Transitive closure of parent tables.
    pub fn ancestors(&self, table: &str) -> Vec<TableName> {
        self.collect_reachable(table, petgraph::Direction::Incoming)
    }

    /// Transitive closure of dependent tables.
    pub fn descendants(&self, table: &str) -> Vec<TableName> {
        self.collect_reachable(table, petgraph::Direction::Outgoing)
    }

    fn collect_reachable(&self, table: &str, direction: petgraph::Direction) -> Vec<TableName> {
        let Some(&start) = self.node_map.get(table) else {
            return Vec::new();
        };
        let mut result = Vec::new();
        let mut visited = HashSet::new();
        self.collect_reachable_dfs(start, direction, &mut result, &mut visited);
        result.into_iter().map(|i| self.graph[i].clone()).collect()
    }

    fn collect_reachable_dfs(
        &self,
        idx: NodeIndex,
        direction: petgraph::Direction,
        result: &mut Vec<NodeIndex>,
        visited: &mut HashSet<NodeIndex>,
    ) {
        for neighbor in self.graph.neighbors_directed(idx, direction) {
            if visited.insert(neighbor) {
                result.push(neighbor);
                self.collect_reachable_dfs(neighbor, direction, result, visited);
            }
        }
    }

    /// Topological population order for the requested tables plus all of
    /// their ancestors, parents first.
    ///
    /// Ties among independent tables are broken by registration order so
    /// repeated runs schedule identically. Acyclicity should hold by
    /// construction; it is re-validated here regardless.
    pub fn population_order(&self, tables: &[TableName]) -> CoreResult<Vec<TableName>> {
        let mut wanted: BTreeSet<NodeIndex> = BTreeSet::new();
        for table in tables {
            let &idx = self
                .node_map
                .get(table.as_str())
                .ok_or_else(|| SchemaError::UnknownTable {
                    name: table.to_string(),
                })?;
            wanted.insert(idx);
            let mut visited = HashSet::new();
            let mut reachable = Vec::new();
            self.collect_reachable_dfs(
                idx,
                petgraph::Direction::Incoming,
                &mut reachable,
                &mut visited,
            );
            wanted.extend(reachable);
        }

        // Kahn's algorithm over the induced subgraph; the BTreeSet pops the
        // lowest node index first, which is registration order.
        let mut indegree: HashMap<NodeIndex, usize> = HashMap::new();
        for &idx in &wanted {
            let n = self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Incoming)
                .filter(|p| wanted.contains(p))
                .count();
            indegree.insert(idx, n);
        }

        let mut ready: BTreeSet<NodeIndex> = indegree
            .iter()
            .filter(|(_, &n)| n == 0)
            .map(|(&idx, _)| idx)
            .collect();
        let mut order = Vec::with_capacity(wanted.len());

        while let Some(&idx) = ready.iter().next() {
            ready.remove(&idx);
            order.push(self.graph[idx].clone());
            for child in self
                .graph
                .neighbors_directed(idx, petgraph::Direction::Outgoing)
            {
                if let Some(n) = indegree.get_mut(&child) {
                    *n = n.saturating_sub(1);
                    if *n == 0 {
                        ready.insert(child);
                    }
                }
            }
        }

        if order.len() != wanted.len() {
            return Err(SchemaError::CircularDependency {
                cycle: "unresolvable population order".to_string(),
            });
        }
        Ok(order)
    }
}

/// Names become unquoted SQL identifiers; restrict them accordingly.
fn validate_identifier(name: &str, context: &str) -> CoreResult<()> {
    let mut chars = name.chars();
    let head_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !head_ok || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(SchemaError::InvalidName {
            name: name.to_string(),
            context: context.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
#[path = "graph_test.rs"]
mod tests;
