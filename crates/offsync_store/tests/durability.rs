//! On-disk durability tests for the local store.

use offsync_store::{
    app_schema, LocalStore, StoreError, APP_SCHEMA_VERSION, RESPONSE_CACHE, SYNC_QUEUE,
};
use proptest::prelude::*;
use serde_json::{json, Map, Value};
use tempfile::tempdir;

#[test]
fn records_survive_reopen() {
    let dir = tempdir().unwrap();

    {
        let store = LocalStore::open(dir.path()).unwrap();
        store.upgrade(&app_schema()).unwrap();
        store
            .add(
                SYNC_QUEUE,
                json!({"id": "m1", "status": "pending", "enqueued_at": 10}),
            )
            .unwrap();
        store
            .update(
                RESPONSE_CACHE,
                json!({"endpoint_key": "/api/categories", "payload": [1, 2], "fetched_at": 5}),
            )
            .unwrap();
    }

    let store = LocalStore::open(dir.path()).unwrap();
    assert_eq!(store.schema_version(), APP_SCHEMA_VERSION);
    assert_eq!(store.get(SYNC_QUEUE, "m1").unwrap()["status"], "pending");
    assert_eq!(
        store.get(RESPONSE_CACHE, "/api/categories").unwrap()["payload"],
        json!([1, 2])
    );
    assert_eq!(
        store
            .get_by_index(SYNC_QUEUE, "by_status", &json!("pending"))
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn reopening_with_same_schema_adds_no_frames() {
    let dir = tempdir().unwrap();
    {
        let store = LocalStore::open(dir.path()).unwrap();
        store.upgrade(&app_schema()).unwrap();
    }

    let store = LocalStore::open(dir.path()).unwrap();
    let before = store.stats().unwrap().log_size;
    assert!(store.upgrade(&app_schema()).unwrap().is_noop());
    assert_eq!(store.stats().unwrap().log_size, before);
}

#[test]
fn concurrent_open_is_locked() {
    let dir = tempdir().unwrap();
    let _store = LocalStore::open(dir.path()).unwrap();
    assert!(matches!(
        LocalStore::open(dir.path()),
        Err(StoreError::Locked)
    ));
}

#[test]
fn corrupted_frame_is_reported() {
    let dir = tempdir().unwrap();
    {
        let store = LocalStore::open(dir.path()).unwrap();
        store.upgrade(&app_schema()).unwrap();
    }

    let log = dir.path().join("store.log");
    let mut bytes = std::fs::read(&log).unwrap();
    let mid = bytes.len() / 2;
    bytes[mid] ^= 0x5A;
    std::fs::write(&log, bytes).unwrap();

    assert!(matches!(
        LocalStore::open(dir.path()),
        Err(StoreError::Corrupted { .. })
    ));
}

#[test]
fn compaction_then_reopen() {
    let dir = tempdir().unwrap();
    {
        let store = LocalStore::open(dir.path()).unwrap();
        store.upgrade(&app_schema()).unwrap();
        for rev in 0..10 {
            store
                .update("products", json!({"id": "p1", "rev": rev, "categoryId": "c1"}))
                .unwrap();
        }
        store.compact().unwrap();
    }

    let store = LocalStore::open(dir.path()).unwrap();
    assert_eq!(store.get("products", "p1").unwrap()["rev"], 9);
    assert_eq!(
        store
            .get_by_index("products", "by_category", &json!("c1"))
            .unwrap()
            .len(),
        1
    );
}

fn field_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i64>().prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        "[a-zA-Z0-9 ]{0,16}".prop_map(Value::from),
        Just(Value::Null),
    ]
}

fn record() -> impl Strategy<Value = Value> {
    (
        "[a-z0-9]{1,8}",
        prop::collection::btree_map("[a-z]{1,6}", field_value(), 0..6),
    )
        .prop_map(|(id, fields)| {
            let mut map: Map<String, Value> = fields.into_iter().collect();
            map.insert("id".into(), Value::from(id));
            Value::Object(map)
        })
}

proptest! {
    #[test]
    fn update_then_get_round_trips(records in prop::collection::vec(record(), 1..8)) {
        let store = LocalStore::in_memory().unwrap();
        store.upgrade(&app_schema()).unwrap();

        for record in &records {
            let key = store.update("orders", record.clone()).unwrap();
            prop_assert_eq!(&store.get("orders", &key).unwrap(), record);
        }
    }

    #[test]
    fn replayed_store_matches_written_records(records in prop::collection::vec(record(), 1..8)) {
        let backend = offsync_store::MemoryBackend::new();
        let mut expected = std::collections::BTreeMap::new();
        {
            let store = LocalStore::with_backend(Box::new(backend.clone())).unwrap();
            store.upgrade(&app_schema()).unwrap();
            for record in &records {
                let key = store.update("orders", record.clone()).unwrap();
                expected.insert(key, record.clone());
            }
        }

        let store = LocalStore::with_backend(Box::new(backend)).unwrap();
        for (key, record) in &expected {
            prop_assert_eq!(&store.get("orders", key).unwrap(), record);
        }
    }
}
