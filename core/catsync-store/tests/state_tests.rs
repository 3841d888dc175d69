use catsync_model::{Attribute, AttributeType, Resource, Schema};
use catsync_store::{BatchWriter, Row, SqliteStore, StateReader, StorageError};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn store() -> SqliteStore {
    let schema = Schema::new(vec![
        Resource::new(
            "prices",
            vec![
                Attribute::primary_key("id", AttributeType::Uuid),
                Attribute::new("amount", AttributeType::Float64),
                Attribute::new("created_at", AttributeType::Time),
                Attribute::new("updated_at", AttributeType::Time),
            ],
        ),
        Resource::new(
            "created_only",
            vec![
                Attribute::primary_key("id", AttributeType::Int64),
                Attribute::new("created_at", AttributeType::DateTime),
            ],
        ),
        Resource::new(
            "countries",
            vec![
                Attribute::primary_key("code", AttributeType::String),
                Attribute::new("label", AttributeType::String),
            ],
        ),
    ])
    .unwrap();
    let store = SqliteStore::open_in_memory(Arc::new(schema)).unwrap();
    store.ensure_tables().unwrap();
    store
}

fn price(created: &str, updated: Option<&str>) -> Row {
    json!({
        "id": uuid::Uuid::new_v4().to_string(),
        "amount": 1.0,
        "created_at": created,
        "updated_at": updated,
    })
    .as_object()
    .unwrap()
    .clone()
}

// ── latest_state ────────────────────────────────────────────────

#[test]
fn latest_state_empty_table_is_none() {
    let store = store();
    assert_eq!(store.latest_state("prices").unwrap(), None);
}

#[test]
fn latest_state_takes_max_over_both_columns() {
    let store = store();
    let batch = vec![
        price("2024-01-01T10:00:00Z", None),
        price("2024-01-02T10:00:00Z", Some("2024-01-05T08:30:00Z")),
        price("2024-01-04T00:00:00Z", None),
    ];
    assert!(!store.insert_batch("prices", &batch).is_failed());

    let latest = store.latest_state("prices").unwrap().unwrap();
    assert_eq!(latest.to_rfc3339(), "2024-01-05T08:30:00+00:00");
}

#[test]
fn latest_state_compares_instants_not_text() {
    let store = store();
    // 10:00+02:00 is 08:00Z, earlier than 09:00Z.
    let batch = vec![
        price("2024-01-01T09:00:00Z", None),
        price("2024-01-01T10:00:00+02:00", None),
    ];
    store.insert_batch("prices", &batch);

    let latest = store.latest_state("prices").unwrap().unwrap();
    assert_eq!(latest.to_rfc3339(), "2024-01-01T09:00:00+00:00");
}

#[test]
fn latest_state_with_created_at_only() {
    let store = store();
    let row = json!({"id": 1, "created_at": "2023-06-01 12:00:00"})
        .as_object()
        .unwrap()
        .clone();
    store.insert_batch("created_only", &[row]);

    let latest = store.latest_state("created_only").unwrap().unwrap();
    assert_eq!(latest.to_rfc3339(), "2023-06-01T12:00:00+00:00");
}

#[test]
fn latest_state_without_change_tracking_columns() {
    let store = store();
    assert!(matches!(
        store.latest_state("countries"),
        Err(StorageError::NoChangeTracking(name)) if name == "countries"
    ));
}

#[test]
fn latest_state_unknown_resource() {
    let store = store();
    assert!(matches!(
        store.latest_state("nope"),
        Err(StorageError::UnknownResource(_))
    ));
}

// ── total_items ─────────────────────────────────────────────────

#[test]
fn total_items_counts_rows() {
    let store = store();
    assert_eq!(store.total_items("prices").unwrap(), 0);

    let batch: Vec<Row> = (0..42).map(|_| price("2024-01-01T00:00:00Z", None)).collect();
    store.insert_batch("prices", &batch);
    assert_eq!(store.total_items("prices").unwrap(), 42);
}

#[test]
fn total_items_unknown_resource() {
    let store = store();
    assert!(store.total_items("nope").is_err());
}
