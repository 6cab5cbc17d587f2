//! Offline queue integration tests.
//!
//! Drives the save -> queue -> sync -> purge flow against a real SQLite file
//! and a mock HTTP server.
//!
//! Run with: `cd nightlightrs && cargo test --test offline_sync`

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use chrono::{TimeZone, Utc};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nightlightrs::{
    DiagnosticLog, DiagnosticSink, LOCATION_CATEGORY, LocationClient, LocationPayload,
    LocationSample, OfflineQueue, OfflineStore, RecordStatus, RemoteDelivery, SaveError,
    SaveOptions, SaveOutcome, SavePipeline, StaticToken, SyncPipeline,
};

struct Pipeline {
    store: Arc<OfflineStore>,
    diagnostics: Arc<DiagnosticLog>,
    save: SavePipeline,
    queue: OfflineQueue,
    _tmp: TempDir,
}

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Helper: wire the pipelines to a temp DB and the mock server.
fn pipeline(server: &MockServer, token: Option<&str>) -> Pipeline {
    init();
    let tmp = TempDir::new().expect("failed to create temp dir");
    let db_path = tmp.path().join("nightlight.db");
    let db_path = db_path.to_str().unwrap();

    let store = Arc::new(OfflineStore::open(db_path).expect("failed to open store"));
    let diagnostics = Arc::new(DiagnosticLog::open(db_path).expect("failed to open log"));
    let sink: Arc<dyn DiagnosticSink> = diagnostics.clone();

    let client = LocationClient::new(
        &format!("{}/api/location", server.uri()),
        Duration::from_secs(5),
    )
    .unwrap();
    let delivery = Arc::new(RemoteDelivery::new(
        client,
        StaticToken(token.map(str::to_string)),
    ));

    let save = SavePipeline::new(store.clone(), delivery.clone(), sink.clone());
    let sync = Arc::new(SyncPipeline::new(store.clone(), delivery, sink.clone()));
    let queue = OfflineQueue::new(store.clone(), sync, sink);

    Pipeline {
        store,
        diagnostics,
        save,
        queue,
        _tmp: tmp,
    }
}

fn sample(longitude: f64) -> LocationSample {
    LocationSample::new(48.0, longitude, 5.0, "foreground")
        .with_captured_at(Utc.with_ymd_and_hms(2022, 6, 1, 14, 42, 55).unwrap())
}

async fn mount_success(server: &MockServer, expected_calls: u64) {
    Mock::given(method("POST"))
        .and(path("/api/location"))
        .and(header("authorization", "Bearer abc"))
        .and(body_string_contains("source=foreground"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"success": true})))
        .expect(expected_calls)
        .mount(server)
        .await;
}

// ============================================================================
// Save
// ============================================================================

#[tokio::test]
async fn test_offline_save_creates_one_pending_record() {
    let server = MockServer::start().await;
    let p = pipeline(&server, Some("abc"));

    let fix = sample(-114.0);
    let outcome = p
        .save
        .save_sample(&fix, SaveOptions::offline_first())
        .await
        .unwrap();
    let SaveOutcome::Queued { id } = outcome else {
        panic!("expected queued, got {:?}", outcome);
    };

    let records = p.store.list_all().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, id);
    assert_eq!(records[0].category, LOCATION_CATEGORY);
    assert_eq!(records[0].status, RecordStatus::Pending);
    assert_eq!(records[0].created_at, "2022-06-01T14:42:55.000Z");
    assert_eq!(
        LocationPayload::decode(&records[0].payload).unwrap(),
        fix.to_payload()
    );
}

#[tokio::test]
async fn test_invalid_sample_adds_no_record() {
    let server = MockServer::start().await;
    mount_success(&server, 0).await;
    let p = pipeline(&server, Some("abc"));

    for bad in [
        LocationSample::new(91.0, 0.0, 5.0, "foreground"),
        LocationSample::new(0.0, 181.0, 5.0, "foreground"),
        LocationSample::new(f64::NAN, 0.0, 5.0, "foreground"),
    ] {
        let err = p
            .save
            .save_sample(&bad, SaveOptions::network_first())
            .await
            .unwrap_err();
        assert!(matches!(err, SaveError::Validation(_)));
    }

    assert!(p.store.list_all().unwrap().is_empty());
    assert_eq!(p.diagnostics.list().unwrap().len(), 3);
}

#[tokio::test]
async fn test_network_first_delivers_without_queueing() {
    let server = MockServer::start().await;
    mount_success(&server, 1).await;
    let p = pipeline(&server, Some("abc"));

    let outcome = p
        .save
        .save_sample(&sample(-114.0), SaveOptions::network_first())
        .await
        .unwrap();
    assert_eq!(outcome, SaveOutcome::Delivered);
    assert!(p.store.list_all().unwrap().is_empty());
}

// ============================================================================
// Sync and purge
// ============================================================================

#[tokio::test]
async fn test_server_down_then_recovered() {
    let server = MockServer::start().await;
    let p = pipeline(&server, Some("abc"));

    // Nothing mounted: the server answers 404 and the fix is queued
    let outcome = p
        .save
        .save_sample(&sample(-114.0), SaveOptions::network_first())
        .await
        .unwrap();
    assert!(matches!(outcome, SaveOutcome::Queued { .. }));

    let report = p.queue.sync_and_purge().await.unwrap().unwrap();
    assert_eq!(report.sync.deferred, 1);
    assert_eq!(report.purged, 0);
    assert_eq!(p.queue.summary().unwrap().pending, 1);

    mount_success(&server, 1).await;
    let report = p.queue.sync_and_purge().await.unwrap().unwrap();
    assert_eq!(report.sync.delivered, 1);
    assert_eq!(report.purged, 1);
    assert_eq!(p.queue.summary().unwrap().total(), 0);
}

#[tokio::test]
async fn test_malformed_record_marked_error() {
    let server = MockServer::start().await;
    mount_success(&server, 2).await;
    let p = pipeline(&server, Some("abc"));

    for longitude in [-114.0, -114.01] {
        let json = sample(longitude).to_payload().to_json().unwrap();
        p.store.append(LOCATION_CATEGORY, &json).unwrap();
    }
    let bad = p
        .store
        .append(LOCATION_CATEGORY, r#"{"lat": "north", "long": -114.0}"#)
        .unwrap();

    let report = p.queue.sync_and_purge().await.unwrap().unwrap();
    assert_eq!(report.sync.attempted, 3);
    assert_eq!(report.sync.delivered, 2);
    assert_eq!(report.sync.errored, 1);
    assert_eq!(report.purged, 2);

    let remaining = p.store.list_all().unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, bad);
    assert_eq!(remaining[0].status, RecordStatus::Error);

    // ERROR records are never retried
    let report = p.queue.sync_and_purge().await.unwrap().unwrap();
    assert_eq!(report.sync.attempted, 0);
}

#[tokio::test]
async fn test_empty_queue_makes_no_calls() {
    let server = MockServer::start().await;
    mount_success(&server, 0).await;
    let p = pipeline(&server, Some("abc"));

    let report = p.queue.sync_and_purge().await.unwrap().unwrap();
    assert_eq!(report.sync.attempted, 0);
    assert_eq!(report.purged, 0);
}

#[tokio::test]
async fn test_missing_token_keeps_records_pending() {
    let server = MockServer::start().await;
    mount_success(&server, 0).await;
    let p = pipeline(&server, None);

    p.save
        .save_sample(&sample(-114.0), SaveOptions::network_first())
        .await
        .unwrap();
    let report = p.queue.sync_and_purge().await.unwrap().unwrap();
    assert_eq!(report.sync.deferred, 1);
    assert_eq!(p.queue.summary().unwrap().pending, 1);
}

// ============================================================================
// Storage
// ============================================================================

#[test]
fn test_queue_survives_reopen() {
    init();
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("nightlight.db");
    let db_path = db_path.to_str().unwrap();

    let json = sample(-114.0).to_payload().to_json().unwrap();
    let id = {
        let store = OfflineStore::open(db_path).unwrap();
        store.append(LOCATION_CATEGORY, &json).unwrap()
    };

    let store = OfflineStore::open(db_path).unwrap();
    let record = store.get(id).unwrap().unwrap();
    assert_eq!(record.payload, json);
    assert_eq!(record.status, RecordStatus::Pending);
}

#[test]
fn test_concurrent_appends_from_two_connections() {
    init();
    let tmp = TempDir::new().unwrap();
    let db_path = tmp.path().join("nightlight.db");
    let db_path = db_path.to_str().unwrap().to_string();

    // Schema first, then foreground and background each hold their own connection
    OfflineStore::open(&db_path).unwrap();
    let handles: Vec<_> = (0..2)
        .map(|_| {
            let db_path = db_path.clone();
            thread::spawn(move || {
                let store = OfflineStore::open(&db_path).unwrap();
                (0..50)
                    .map(|i| {
                        let fix = LocationSample::new(48.0, -114.0 + i as f64 * 0.001, 5.0, "t");
                        let json = fix.to_payload().to_json().unwrap();
                        store.append(LOCATION_CATEGORY, &json).unwrap()
                    })
                    .collect::<Vec<i64>>()
            })
        })
        .collect();

    let mut ids: Vec<i64> = handles
        .into_iter()
        .flat_map(|h| h.join().unwrap())
        .collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), 100);

    let store = OfflineStore::open(&db_path).unwrap();
    assert_eq!(store.summary().unwrap().pending, 100);
}
