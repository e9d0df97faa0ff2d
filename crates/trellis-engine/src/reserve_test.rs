//! Tests for job reservation markers.

use crate::error::EngineError;
use crate::reserve;
use trellis_core::{Key, TableName};
use trellis_store::Store;

fn setup() -> (Store, TableName, Key) {
    let store = Store::open_memory().unwrap();
    let table = TableName::new("spike_count");
    let key = Key::new().with("session_id", 1i64).with("trial_id", 10i64);
    (store, table, key)
}

#[test]
fn second_worker_loses_the_race() {
    let (store, table, key) = setup();
    reserve::try_reserve(store.conn(), "worker-a", &table, &key).unwrap();

    let err = reserve::try_reserve(store.conn(), "worker-b", &table, &key).unwrap_err();
    assert!(matches!(err, EngineError::ReservationConflict { .. }));

    // The losing attempt must not have displaced the holder.
    let holder: String = store
        .conn()
        .query_row(
            "SELECT worker FROM trellis_meta.job_reservation WHERE table_name = 'spike_count'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(holder, "worker-a");
}

#[test]
fn release_frees_the_key() {
    let (store, table, key) = setup();
    reserve::try_reserve(store.conn(), "worker-a", &table, &key).unwrap();
    reserve::release(store.conn(), &table, &key).unwrap();
    reserve::try_reserve(store.conn(), "worker-b", &table, &key).unwrap();
}

#[test]
fn release_of_unreserved_key_is_a_noop() {
    let (store, table, key) = setup();
    reserve::release(store.conn(), &table, &key).unwrap();
}

#[test]
fn distinct_keys_do_not_contend() {
    let (store, table, key) = setup();
    let other = Key::new().with("session_id", 1i64).with("trial_id", 11i64);
    reserve::try_reserve(store.conn(), "worker-a", &table, &key).unwrap();
    reserve::try_reserve(store.conn(), "worker-b", &table, &other).unwrap();
}

#[test]
fn clear_reservations_is_per_table() {
    let (store, table, key) = setup();
    let other_table = TableName::new("burst_rate");
    reserve::try_reserve(store.conn(), "worker-a", &table, &key).unwrap();
    reserve::try_reserve(store.conn(), "worker-a", &other_table, &key).unwrap();

    assert_eq!(reserve::clear_reservations(store.conn(), &table).unwrap(), 1);
    reserve::try_reserve(store.conn(), "worker-b", &table, &key).unwrap();
    let err = reserve::try_reserve(store.conn(), "worker-b", &other_table, &key).unwrap_err();
    assert!(matches!(err, EngineError::ReservationConflict { .. }));
}

#[test]
fn clear_stale_spares_fresh_markers() {
    let (store, table, key) = setup();
    reserve::try_reserve(store.conn(), "worker-a", &table, &key).unwrap();
    store
        .conn()
        .execute(
            "INSERT INTO trellis_meta.job_reservation (table_name, key_json, worker, reserved_at) \
             VALUES ('spike_count', '{\"trial_id\": 99}', 'crashed', now() - INTERVAL 1 HOUR)",
            [],
        )
        .unwrap();

    let removed = reserve::clear_stale(store.conn(), chrono::Duration::minutes(30)).unwrap();
    assert_eq!(removed, 1, "only the hour-old marker is stale");

    let err = reserve::try_reserve(store.conn(), "worker-b", &table, &key).unwrap_err();
    assert!(matches!(err, EngineError::ReservationConflict { .. }));
}
