mod common;

use catsync_model::{Attribute, AttributeType, Resource};
use catsync_store::{BatchOutcome, BatchWriter, Row, StateReader, StorageError, StorageResult};
use catsync_sync::{CatalogClient, ResourceSynchronizer, SyncError, SyncMode, SyncPass};
use chrono::{DateTime, TimeZone, Utc};
use common::{lines_path, mock_config, mount_auth, ndjson_response};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Debug, Clone, PartialEq)]
enum Call {
    Insert(usize),
    Upsert(usize),
    Delete(Vec<Value>),
}

/// Records every batch it receives; optionally fails the n-th one (1-based).
#[derive(Default)]
struct RecordingStore {
    state: Option<DateTime<Utc>>,
    no_change_tracking: bool,
    fail_batch: Option<usize>,
    calls: Mutex<Vec<Call>>,
}

impl RecordingStore {
    fn with_state(state: DateTime<Utc>) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) -> BatchOutcome {
        let rows = match &call {
            Call::Insert(n) | Call::Upsert(n) => *n,
            Call::Delete(ids) => ids.len(),
        };
        let mut calls = self.calls.lock().unwrap();
        calls.push(call);
        if self.fail_batch == Some(calls.len()) {
            BatchOutcome::Failed {
                rows,
                error: "constraint violation".to_string(),
            }
        } else {
            BatchOutcome::Committed { rows }
        }
    }
}

impl BatchWriter for RecordingStore {
    fn insert_batch(&self, _resource: &str, rows: &[Row]) -> BatchOutcome {
        self.record(Call::Insert(rows.len()))
    }

    fn upsert_batch(&self, _resource: &str, rows: &[Row]) -> BatchOutcome {
        self.record(Call::Upsert(rows.len()))
    }

    fn delete_batch(&self, _resource: &str, ids: &[Value]) -> BatchOutcome {
        self.record(Call::Delete(ids.to_vec()))
    }
}

impl StateReader for RecordingStore {
    fn latest_state(&self, resource: &str) -> StorageResult<Option<DateTime<Utc>>> {
        if self.no_change_tracking {
            return Err(StorageError::NoChangeTracking(resource.to_string()));
        }
        Ok(self.state)
    }

    fn total_items(&self, _resource: &str) -> StorageResult<u64> {
        Ok(0)
    }
}

fn promotions() -> Resource {
    Resource::new(
        "promotions",
        vec![
            Attribute::primary_key("id", AttributeType::Int64),
            Attribute::new("title", AttributeType::String),
            Attribute::new("created_at", AttributeType::Time),
        ],
    )
}

fn ids(range: std::ops::Range<i64>) -> Vec<Value> {
    range.map(|i| json!({"id": i})).collect()
}

async fn synchronizer(
    server: &MockServer,
    store: RecordingStore,
) -> (ResourceSynchronizer<RecordingStore>, Arc<RecordingStore>) {
    mount_auth(server).await;
    let client = Arc::new(CatalogClient::new(mock_config(server)).unwrap());
    let store = Arc::new(store);
    (ResourceSynchronizer::new(client, Arc::clone(&store)), store)
}

async fn mount_lines(server: &MockServer, pass: &str, records: &[Value], times: u64) {
    Mock::given(method("GET"))
        .and(path(lines_path("promotions", pass)))
        .respond_with(ndjson_response(records))
        .expect(times)
        .mount(server)
        .await;
}

// ── Mode selection ──────────────────────────────────────────────

#[tokio::test]
async fn empty_store_runs_only_full_pass() {
    let server = MockServer::start().await;
    let (sync, store) = synchronizer(&server, RecordingStore::default()).await;

    mount_lines(&server, "full", &ids(0..3), 1).await;
    for pass in ["created", "updated", "deleted"] {
        mount_lines(&server, pass, &[], 0).await;
    }

    let report = sync.sync(&promotions()).await.unwrap();
    assert_eq!(report.mode, SyncMode::Full);
    assert_eq!(report.passes.len(), 1);
    assert_eq!(report.passes[0].pass, SyncPass::Full);
    assert_eq!(report.passes[0].items, 3);
    assert_eq!(store.calls(), vec![Call::Insert(3)]);
}

#[tokio::test]
async fn existing_state_runs_three_delta_passes_in_order() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let (sync, store) = synchronizer(&server, RecordingStore::with_state(since)).await;

    mount_lines(&server, "full", &[], 0).await;
    for (pass, records) in [
        ("created", ids(0..2)),
        ("updated", ids(2..5)),
        ("deleted", vec![json!({"id": 7}), json!(8), json!("9")]),
    ] {
        Mock::given(method("GET"))
            .and(path(lines_path("promotions", pass)))
            .and(query_param("delta_timestamp", "2024-05-01T12:00:00.000000Z"))
            .respond_with(ndjson_response(&records))
            .expect(1)
            .mount(&server)
            .await;
    }

    let report = sync.sync(&promotions()).await.unwrap();
    assert_eq!(report.mode, SyncMode::Delta { since });
    let passes: Vec<SyncPass> = report.passes.iter().map(|p| p.pass).collect();
    assert_eq!(passes, SyncPass::DELTA.to_vec());
    assert_eq!(
        store.calls(),
        vec![
            Call::Insert(2),
            Call::Upsert(3),
            Call::Delete(vec![json!(7), json!(8), json!("9")]),
        ]
    );
}

#[tokio::test]
async fn untracked_empty_resource_gets_full_sync() {
    let server = MockServer::start().await;
    let store = RecordingStore {
        no_change_tracking: true,
        ..Default::default()
    };
    let (sync, _store) = synchronizer(&server, store).await;

    assert_eq!(sync.select_mode(&promotions()).await.unwrap(), SyncMode::Full);
}

fn full_only(mut resource: Resource) -> Resource {
    resource.allowed_query_modes = vec!["full".to_string()];
    resource
}

#[tokio::test]
async fn full_only_resource_with_local_rows_is_rejected() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    let (sync, store) = synchronizer(&server, RecordingStore::with_state(since)).await;
    for pass in ["full", "created", "updated", "deleted"] {
        mount_lines(&server, pass, &[], 0).await;
    }

    let err = sync.sync(&full_only(promotions())).await.unwrap_err();
    assert!(matches!(err, SyncError::DeltaNotAllowed(name) if name == "promotions"));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn full_only_resource_syncs_while_empty() {
    let server = MockServer::start().await;
    let (sync, _store) = synchronizer(&server, RecordingStore::default()).await;

    let resource = full_only(promotions());
    assert_eq!(sync.select_mode(&resource).await.unwrap(), SyncMode::Full);
}

// ── Batching ────────────────────────────────────────────────────

#[tokio::test]
async fn twelve_thousand_records_flush_in_default_batches() {
    let server = MockServer::start().await;
    let (sync, store) = synchronizer(&server, RecordingStore::default()).await;

    mount_lines(&server, "full", &ids(0..12_000), 1).await;

    let report = sync.sync(&promotions()).await.unwrap();
    assert_eq!(
        store.calls(),
        vec![Call::Insert(5000), Call::Insert(5000), Call::Insert(2000)]
    );
    assert_eq!(report.passes[0].items, 12_000);
    assert_eq!(report.passes[0].batches, 3);
}

#[tokio::test]
async fn exact_multiple_has_no_empty_tail_batch() {
    let server = MockServer::start().await;
    let (sync, store) = synchronizer(&server, RecordingStore::default()).await;
    let sync = sync.with_batch_size(4);

    mount_lines(&server, "full", &ids(0..8), 1).await;

    sync.sync(&promotions()).await.unwrap();
    assert_eq!(store.calls(), vec![Call::Insert(4), Call::Insert(4)]);
}

#[tokio::test]
async fn empty_stream_writes_nothing() {
    let server = MockServer::start().await;
    let (sync, store) = synchronizer(&server, RecordingStore::default()).await;

    mount_lines(&server, "full", &[], 1).await;

    let report = sync.sync(&promotions()).await.unwrap();
    assert_eq!(report.passes[0].items, 0);
    assert_eq!(report.passes[0].batches, 0);
    assert!(store.calls().is_empty());
}

// ── Failure handling ────────────────────────────────────────────

#[tokio::test]
async fn failed_batch_is_counted_and_pass_continues() {
    let server = MockServer::start().await;
    let store = RecordingStore {
        fail_batch: Some(2),
        ..Default::default()
    };
    let (sync, store) = synchronizer(&server, store).await;
    let sync = sync.with_batch_size(2);

    mount_lines(&server, "full", &ids(0..5), 1).await;

    let report = sync.sync(&promotions()).await.unwrap();
    let pass = &report.passes[0];
    assert_eq!(pass.batches, 3);
    assert_eq!(pass.failed_batches, 1);
    assert_eq!(pass.failed_items, 2);
    assert_eq!(pass.applied_items(), 3);
    assert_eq!(report.failed_batches(), 1);
    assert_eq!(store.calls().len(), 3);
}

#[tokio::test]
async fn failed_fetch_stops_remaining_passes() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let (sync, store) = synchronizer(&server, RecordingStore::with_state(since)).await;

    Mock::given(method("GET"))
        .and(path(lines_path("promotions", "created")))
        .respond_with(ResponseTemplate::new(500))
        .expect(1)
        .mount(&server)
        .await;
    mount_lines(&server, "updated", &[], 0).await;
    mount_lines(&server, "deleted", &[], 0).await;

    let err = sync.sync(&promotions()).await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch { status: Some(500), .. }));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn invalid_json_line_aborts_pass() {
    let server = MockServer::start().await;
    let (sync, store) = synchronizer(&server, RecordingStore::default()).await;

    Mock::given(method("GET"))
        .and(path(lines_path("promotions", "full")))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"id\":1}\n{\"id\":\n"))
        .mount(&server)
        .await;

    let err = sync.sync(&promotions()).await.unwrap_err();
    assert!(matches!(err, SyncError::Parse { line: 2, .. }));
    assert!(store.calls().is_empty());
}

#[tokio::test]
async fn non_object_record_aborts_insert_pass() {
    let server = MockServer::start().await;
    let (sync, _store) = synchronizer(&server, RecordingStore::default()).await;

    mount_lines(&server, "full", &[json!({"id": 1}), json!([1, 2])], 1).await;

    let err = sync.sync(&promotions()).await.unwrap_err();
    assert!(matches!(err, SyncError::Parse { line: 2, .. }));
}

#[tokio::test]
async fn deleted_record_without_key_aborts_pass() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let (sync, _store) = synchronizer(&server, RecordingStore::with_state(since)).await;

    mount_lines(&server, "created", &[], 1).await;
    mount_lines(&server, "updated", &[], 1).await;
    mount_lines(&server, "deleted", &[json!({"title": "gone"})], 1).await;

    let err = sync.sync(&promotions()).await.unwrap_err();
    assert!(err.to_string().contains("`id`"));
}

#[tokio::test]
async fn deleted_records_use_declared_primary_key() {
    let server = MockServer::start().await;
    let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    let (sync, store) = synchronizer(&server, RecordingStore::with_state(since)).await;

    let countries = Resource::new(
        "countries",
        vec![
            Attribute::primary_key("code", AttributeType::String),
            Attribute::new("created_at", AttributeType::Time),
        ],
    );
    Mock::given(method("GET"))
        .and(path("/api/v1/retail/resource/countries/de/deleted/lines"))
        .respond_with(ndjson_response(&[json!({"code": "AT"}), json!({"code": "CH"})]))
        .mount(&server)
        .await;

    let report = sync
        .run_pass(&countries, SyncPass::Deleted, Some(since))
        .await
        .unwrap();
    assert_eq!(report.items, 2);
    assert_eq!(store.calls(), vec![Call::Delete(vec![json!("AT"), json!("CH")])]);
}
