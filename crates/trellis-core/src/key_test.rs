//! Tests for key canonicalization and access.

use crate::key::Key;
use crate::value::Value;

#[test]
fn canonical_is_insertion_order_independent() {
    let a = Key::new().with("session_id", 1i64).with("trial_id", 2i64);
    let b = Key::new().with("trial_id", 2i64).with("session_id", 1i64);
    assert_eq!(a.canonical().unwrap(), b.canonical().unwrap());
    assert_eq!(a.canonical().unwrap(), r#"{"session_id":1,"trial_id":2}"#);
}

#[test]
fn canonical_roundtrip() {
    let key = Key::new()
        .with("session_id", 42i64)
        .with("subject", "cousteau")
        .with("weight", 3.5f64);
    let text = key.canonical().unwrap();
    let back = Key::from_canonical(&text).unwrap();
    assert_eq!(back, key);
}

#[test]
fn display_lists_attrs() {
    let key = Key::new().with("session_id", 1i64).with("trial_id", 2i64);
    assert_eq!(format!("{key}"), "(session_id=1, trial_id=2)");
}

#[test]
fn project_takes_subset() {
    let key = Key::new().with("a", 1i64).with("b", 2i64).with("c", 3i64);
    let sub = key.project(&["a", "c", "missing"]);
    assert_eq!(sub.len(), 2);
    assert_eq!(sub.get("a"), Some(&Value::Int(1)));
    assert!(!sub.contains("b"));
}

#[test]
fn get_and_contains() {
    let key = Key::new().with("session_id", 1i64);
    assert!(key.contains("session_id"));
    assert_eq!(key.get("session_id"), Some(&Value::Int(1)));
    assert_eq!(key.get("nope"), None);
    assert!(!Key::new().contains("session_id"));
    assert!(Key::new().is_empty());
}

#[test]
fn to_record_carries_values() {
    let key = Key::new().with("session_id", 1i64);
    let record = key.to_record();
    assert_eq!(record.get("session_id"), Some(&Value::Int(1)));
}
