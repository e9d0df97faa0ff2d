//! Tests for key source resolution and parent-row lookup.

use crate::key_source::{resolve_parents, KeySource};
use trellis_core::{AttrType, Key, Record, SchemaGraph, TableDef, Tier, Value};
use trellis_store::{schema, Store};

// ── Helpers ────────────────────────────────────────────────────────────

fn pipeline() -> SchemaGraph {
    let mut graph = SchemaGraph::new();
    let session = TableDef::build("session", Tier::Manual)
        .key_attr("session_id", AttrType::Integer)
        .attr("subject", AttrType::Text)
        .finish();
    let trial = TableDef::build("trial", Tier::Imported)
        .inherits(&session)
        .key_attr("trial_id", AttrType::Integer)
        .finish();
    let spike_count = TableDef::build("spike_count", Tier::Computed)
        .inherits(&trial)
        .attr("n_spikes", AttrType::Integer)
        .finish();
    graph.register(session).unwrap();
    graph.register(trial).unwrap();
    graph.register(spike_count).unwrap();
    graph
}

fn deployed(graph: &SchemaGraph) -> Store {
    let store = Store::open_memory().unwrap();
    schema::deploy(&store, graph).unwrap();
    store
}

fn row(pairs: Vec<(&str, Value)>) -> Record {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}

fn insert(store: &Store, graph: &SchemaGraph, table: &str, record: Record) {
    let def = graph.table(table).unwrap();
    trellis_store::rows::insert_record(store.conn(), def, &record).unwrap();
}

fn insert_session(store: &Store, graph: &SchemaGraph, session_id: i64) {
    insert(
        store,
        graph,
        "session",
        row(vec![
            ("session_id", Value::Int(session_id)),
            ("subject", Value::Text("cousteau".into())),
        ]),
    );
}

fn insert_trial(store: &Store, graph: &SchemaGraph, session_id: i64, trial_id: i64) {
    insert(
        store,
        graph,
        "trial",
        row(vec![
            ("session_id", Value::Int(session_id)),
            ("trial_id", Value::Int(trial_id)),
        ]),
    );
}

// ── Pending keys ───────────────────────────────────────────────────────

#[test]
fn pending_lists_parent_keys_missing_from_child() {
    let graph = pipeline();
    let store = deployed(&graph);
    insert_session(&store, &graph, 1);
    insert_session(&store, &graph, 2);

    let source = KeySource::new(&graph, "trial").unwrap();
    let pending = source.pending(store.conn()).unwrap();
    assert_eq!(pending.len(), 2);
    assert_eq!(pending[0], Key::new().with("session_id", 1i64));

    // Any trial row for a session marks that session handled.
    insert_trial(&store, &graph, 1, 10);
    let pending = source.pending(store.conn()).unwrap();
    assert_eq!(pending, vec![Key::new().with("session_id", 2i64)]);
}

#[test]
fn child_key_spans_every_inherited_attribute() {
    let graph = pipeline();
    let store = deployed(&graph);
    insert_session(&store, &graph, 1);
    insert_trial(&store, &graph, 1, 10);
    insert_trial(&store, &graph, 1, 11);

    let source = KeySource::new(&graph, "spike_count").unwrap();
    assert_eq!(source.source_attrs(), vec!["session_id", "trial_id"]);
    let pending = source.pending(store.conn()).unwrap();
    assert_eq!(
        pending,
        vec![
            Key::new().with("session_id", 1i64).with("trial_id", 10i64),
            Key::new().with("session_id", 1i64).with("trial_id", 11i64),
        ]
    );
}

#[test]
fn and_join_requires_every_parent() {
    let mut graph = SchemaGraph::new();
    let base = TableDef::build("base", Tier::Manual)
        .key_attr("base_id", AttrType::Integer)
        .finish();
    let left = TableDef::build("left_branch", Tier::Computed)
        .inherits(&base)
        .attr("lv", AttrType::Integer)
        .finish();
    let right = TableDef::build("right_branch", Tier::Computed)
        .inherits(&base)
        .attr("rv", AttrType::Integer)
        .finish();
    let merged = TableDef::build("merged", Tier::Computed)
        .inherits(&left)
        .inherits(&right)
        .attr("mv", AttrType::Integer)
        .finish();
    graph.register(base).unwrap();
    graph.register(left).unwrap();
    graph.register(right).unwrap();
    graph.register(merged).unwrap();
    let store = deployed(&graph);

    insert(&store, &graph, "base", row(vec![("base_id", Value::Int(1))]));
    insert(
        &store,
        &graph,
        "left_branch",
        row(vec![("base_id", Value::Int(1)), ("lv", Value::Int(5))]),
    );

    // One arm of the diamond is not enough.
    let source = KeySource::new(&graph, "merged").unwrap();
    assert!(source.pending(store.conn()).unwrap().is_empty());

    insert(
        &store,
        &graph,
        "right_branch",
        row(vec![("base_id", Value::Int(1)), ("rv", Value::Int(7))]),
    );
    assert_eq!(
        source.pending(store.conn()).unwrap(),
        vec![Key::new().with("base_id", 1i64)]
    );
}

#[test]
fn pending_is_a_pure_requery() {
    let graph = pipeline();
    let store = deployed(&graph);
    insert_session(&store, &graph, 1);
    insert_session(&store, &graph, 2);

    let source = KeySource::new(&graph, "trial").unwrap();
    let first = source.pending(store.conn()).unwrap();
    let second = source.pending(store.conn()).unwrap();
    assert_eq!(first, second, "re-evaluation without store changes is stable");

    // Consuming part of one evaluation does not pin the next one.
    insert_trial(&store, &graph, 1, 10);
    let third = source.pending(store.conn()).unwrap();
    assert_eq!(third, vec![Key::new().with("session_id", 2i64)]);
}

#[test]
fn pending_order_is_deterministic() {
    let graph = pipeline();
    let store = deployed(&graph);
    for session_id in [3, 1, 2] {
        insert_session(&store, &graph, session_id);
    }

    let source = KeySource::new(&graph, "trial").unwrap();
    let pending = source.pending(store.conn()).unwrap();
    let ids: Vec<i64> = pending
        .iter()
        .map(|k| k.get("session_id").unwrap().as_int().unwrap())
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
}

#[test]
fn manual_tables_have_no_key_source() {
    let graph = pipeline();
    assert!(KeySource::new(&graph, "session").is_err());
}

// ── Non-key references ─────────────────────────────────────────────────

fn pipeline_with_lookup() -> SchemaGraph {
    let mut graph = SchemaGraph::new();
    let session = TableDef::build("session", Tier::Manual)
        .key_attr("session_id", AttrType::Integer)
        .finish();
    let method = TableDef::build("method", Tier::Lookup)
        .key_attr("method_id", AttrType::Integer)
        .attr("label", AttrType::Text)
        .finish();
    let result = TableDef::build("analysis_result", Tier::Computed)
        .inherits(&session)
        .attr("method_id", AttrType::Integer)
        .attr("score", AttrType::Real)
        .foreign_key(trellis_core::ForeignKey::new("method").map("method_id", "method_id"))
        .finish();
    graph.register(session).unwrap();
    graph.register(method).unwrap();
    graph.register(result).unwrap();
    graph
}

#[test]
fn non_key_reference_does_not_gate_eligibility() {
    let graph = pipeline_with_lookup();
    let store = deployed(&graph);
    insert(&store, &graph, "session", row(vec![("session_id", Value::Int(1))]));

    // The lookup table is empty; the session key is still eligible.
    let source = KeySource::new(&graph, "analysis_result").unwrap();
    assert_eq!(source.source_attrs(), vec!["session_id"]);
    assert_eq!(
        source.pending(store.conn()).unwrap(),
        vec![Key::new().with("session_id", 1i64)]
    );
}

// ── Parent resolution ──────────────────────────────────────────────────

#[test]
fn resolve_parents_restricts_by_key_and_passes_lookups_whole() {
    let graph = pipeline_with_lookup();
    let store = deployed(&graph);
    insert(&store, &graph, "session", row(vec![("session_id", Value::Int(1))]));
    insert(&store, &graph, "session", row(vec![("session_id", Value::Int(2))]));
    for (method_id, label) in [(1, "psth"), (2, "rate")] {
        insert(
            &store,
            &graph,
            "method",
            row(vec![
                ("method_id", Value::Int(method_id)),
                ("label", Value::Text(label.into())),
            ]),
        );
    }

    let def = graph.table("analysis_result").unwrap();
    let key = Key::new().with("session_id", 1i64);
    let parents = resolve_parents(&graph, store.conn(), def, &key).unwrap();

    let session_rows = parents.rows("session").unwrap();
    assert_eq!(session_rows.len(), 1);
    assert_eq!(session_rows[0].get("session_id"), Some(&Value::Int(1)));

    // The non-key reference shares no attribute with the key, so the whole
    // lookup table is handed to the computation.
    assert_eq!(parents.rows("method").unwrap().len(), 2);
}
