//! Sync pipeline: drain PENDING location records to the server.
//!
//! Every pending record is attempted concurrently and the call returns only
//! once all attempts have settled. Outcomes per record:
//! - malformed payload: marked ERROR, never sent
//! - delivered: marked COMPLETE
//! - delivery failed: left PENDING for the next sync
//!
//! Nothing is deleted here.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::future::join_all;
use log::{info, warn};

use nightlight::{Delivery, LOCATION_CATEGORY, LocationPayload};

use crate::diagnostics::DiagnosticSink;
use crate::elapsed_ms;
use crate::error::StoreError;
use crate::store::{OfflineStore, QueuedRecord, RecordStatus};

const AREA: &str = "syncLocation";

/// Aggregate result of one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub attempted: u32,
    pub delivered: u32,
    pub errored: u32,
    /// Delivery failed; still PENDING
    pub deferred: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Delivered,
    Errored,
    Deferred,
}

pub struct SyncPipeline {
    store: Arc<OfflineStore>,
    delivery: Arc<dyn Delivery>,
    diagnostics: Arc<dyn DiagnosticSink>,
    in_flight: AtomicBool,
}

/// Clears the in-flight flag when a guarded sync ends, even on panic.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SyncPipeline {
    pub fn new(
        store: Arc<OfflineStore>,
        delivery: Arc<dyn Delivery>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            store,
            delivery,
            diagnostics,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Run a sync unless one started through this method is still running.
    pub async fn try_sync_pending(&self) -> Option<Result<SyncReport, StoreError>> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            info!("[SyncPipeline] Sync already in progress, skipping");
            return None;
        }
        let _guard = InFlightGuard(&self.in_flight);
        Some(self.sync_pending().await)
    }

    /// Attempt delivery of every PENDING location record.
    ///
    /// Fails only when the queue cannot be read. Per-record failures are
    /// reflected in the report and the diagnostic log.
    pub async fn sync_pending(&self) -> Result<SyncReport, StoreError> {
        let start = Instant::now();
        let pending: Vec<QueuedRecord> = self
            .store
            .list_all()?
            .into_iter()
            .filter(|r| r.status == RecordStatus::Pending && r.category == LOCATION_CATEGORY)
            .collect();

        if pending.is_empty() {
            return Ok(SyncReport::default());
        }

        info!("[SyncPipeline] Syncing {} pending records", pending.len());
        let outcomes = join_all(pending.iter().map(|record| self.sync_record(record))).await;

        let mut report = SyncReport {
            attempted: outcomes.len() as u32,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                RecordOutcome::Delivered => report.delivered += 1,
                RecordOutcome::Errored => report.errored += 1,
                RecordOutcome::Deferred => report.deferred += 1,
            }
        }

        self.diagnostics.info(
            AREA,
            &format!(
                "Sync finished: {} attempted, {} delivered, {} errored, {} deferred",
                report.attempted, report.delivered, report.errored, report.deferred
            ),
        );
        info!("[SyncPipeline] Done ({} ms)", elapsed_ms(start));
        Ok(report)
    }

    async fn sync_record(&self, record: &QueuedRecord) -> RecordOutcome {
        let payload = match LocationPayload::decode(&record.payload) {
            Ok(payload) => payload,
            Err(e) => {
                self.diagnostics
                    .error(AREA, &format!("Record {} is malformed: {}", record.id, e));
                self.mark(record.id, RecordStatus::Error);
                return RecordOutcome::Errored;
            }
        };

        match self.delivery.deliver(&payload, &record.created_at).await {
            Ok(()) => {
                self.mark(record.id, RecordStatus::Complete);
                RecordOutcome::Delivered
            }
            Err(e) => {
                self.diagnostics.error(
                    AREA,
                    &format!("Record {} not delivered, will retry: {}", record.id, e),
                );
                RecordOutcome::Deferred
            }
        }
    }

    /// A failed status write leaves the record PENDING, so it is retried later.
    fn mark(&self, id: i64, status: RecordStatus) {
        if let Err(e) = self.store.update_status(id, status) {
            warn!("[SyncPipeline] Could not mark record {} {:?}: {}", id, status, e);
            self.diagnostics
                .error(AREA, &format!("Could not mark record {} {:?}: {}", id, status, e));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::NullSink;
    use async_trait::async_trait;
    use nightlight::DeliveryError;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Fails delivery for payloads at the listed latitudes.
    struct MockDelivery {
        fail_lats: Vec<f64>,
        calls: Mutex<Vec<(LocationPayload, String)>>,
    }

    impl MockDelivery {
        fn new(fail_lats: Vec<f64>) -> Arc<Self> {
            Arc::new(Self {
                fail_lats,
                calls: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Delivery for MockDelivery {
        async fn deliver(
            &self,
            payload: &LocationPayload,
            timestamp: &str,
        ) -> Result<(), DeliveryError> {
            self.calls
                .lock()
                .unwrap()
                .push((payload.clone(), timestamp.to_string()));
            if self.fail_lats.contains(&payload.lat) {
                Err(DeliveryError::Http { status: 503 })
            } else {
                Ok(())
            }
        }
    }

    fn setup(delivery: Arc<MockDelivery>) -> (Arc<OfflineStore>, SyncPipeline) {
        let store = Arc::new(OfflineStore::in_memory().unwrap());
        let pipeline = SyncPipeline::new(store.clone(), delivery, Arc::new(NullSink));
        (store, pipeline)
    }

    #[tokio::test]
    async fn test_empty_queue() {
        let delivery = MockDelivery::new(vec![]);
        let (_, pipeline) = setup(delivery.clone());

        let report = pipeline.sync_pending().await.unwrap();
        assert_eq!(report, SyncReport::default());
        assert_eq!(delivery.call_count(), 0);
    }

    #[tokio::test]
    async fn test_malformed_record_marked_error() {
        let delivery = MockDelivery::new(vec![]);
        let (store, pipeline) = setup(delivery.clone());
        let first = store
            .append("location", r#"{"lat":48.1,"long":-114.1,"acc":5,"src":"test"}"#)
            .unwrap();
        let second = store.append("location", r#"{"lat":48.2,"acc":5}"#).unwrap();
        let third = store
            .append("location", r#"{"lat":48.3,"long":-114.3,"acc":5,"src":"test"}"#)
            .unwrap();

        let report = pipeline.sync_pending().await.unwrap();
        assert_eq!(report.attempted, 3);
        assert_eq!(report.delivered, 2);
        assert_eq!(report.errored, 1);
        assert_eq!(delivery.call_count(), 2);

        assert_eq!(store.get(first).unwrap().unwrap().status, RecordStatus::Complete);
        assert_eq!(store.get(second).unwrap().unwrap().status, RecordStatus::Error);
        assert_eq!(store.get(third).unwrap().unwrap().status, RecordStatus::Complete);
    }

    #[tokio::test]
    async fn test_delivery_failure_stays_pending() {
        let delivery = MockDelivery::new(vec![48.2]);
        let (store, pipeline) = setup(delivery.clone());
        store.append("location", r#"{"lat":48.1,"long":-114.1}"#).unwrap();
        let failing = store.append("location", r#"{"lat":48.2,"long":-114.2}"#).unwrap();

        let report = pipeline.sync_pending().await.unwrap();
        assert_eq!(report.attempted, 2);
        assert_eq!(report.delivered, 1);
        assert_eq!(report.errored, 0);
        assert_eq!(report.deferred, 1);
        assert_eq!(store.get(failing).unwrap().unwrap().status, RecordStatus::Pending);

        // Retried on the next pass, completed records are not resent
        let report = pipeline.sync_pending().await.unwrap();
        assert_eq!(report.attempted, 1);
        assert_eq!(delivery.call_count(), 3);
    }

    #[tokio::test]
    async fn test_skips_other_categories_and_statuses() {
        let delivery = MockDelivery::new(vec![]);
        let (store, pipeline) = setup(delivery.clone());
        store.append("note", r#"{"text":"hello"}"#).unwrap();
        let done = store.append("location", r#"{"lat":1,"long":2}"#).unwrap();
        store.update_status(done, RecordStatus::Complete).unwrap();

        let report = pipeline.sync_pending().await.unwrap();
        assert_eq!(report.attempted, 0);
        assert_eq!(delivery.call_count(), 0);
    }

    /// Each delivery waits until every record has started its own.
    struct BarrierDelivery {
        barrier: tokio::sync::Barrier,
    }

    #[async_trait]
    impl Delivery for BarrierDelivery {
        async fn deliver(&self, _: &LocationPayload, _: &str) -> Result<(), DeliveryError> {
            self.barrier.wait().await;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_records_delivered_concurrently() {
        let store = Arc::new(OfflineStore::in_memory().unwrap());
        for lat in [48.1, 48.2, 48.3] {
            store
                .append("location", &format!(r#"{{"lat":{},"long":-114.0}}"#, lat))
                .unwrap();
        }
        let delivery = Arc::new(BarrierDelivery {
            barrier: tokio::sync::Barrier::new(3),
        });
        let pipeline = SyncPipeline::new(store.clone(), delivery, Arc::new(NullSink));

        let report = tokio::time::timeout(Duration::from_secs(5), pipeline.sync_pending())
            .await
            .expect("deliveries ran one at a time")
            .unwrap();
        assert_eq!(report.delivered, 3);
        assert_eq!(store.summary().unwrap().complete, 3);
    }

    #[tokio::test]
    async fn test_delivers_capture_timestamp() {
        let delivery = MockDelivery::new(vec![]);
        let (store, pipeline) = setup(delivery.clone());
        store
            .append_at("location", r#"{"lat":1,"long":2}"#, "2022-06-01T14:42:55.000Z")
            .unwrap();

        pipeline.sync_pending().await.unwrap();
        let calls = delivery.calls.lock().unwrap();
        assert_eq!(calls[0].1, "2022-06-01T14:42:55.000Z");
    }

    #[tokio::test]
    async fn test_try_sync_guard() {
        let delivery = MockDelivery::new(vec![]);
        let (_, pipeline) = setup(delivery);

        pipeline.in_flight.store(true, Ordering::SeqCst);
        assert!(pipeline.try_sync_pending().await.is_none());

        pipeline.in_flight.store(false, Ordering::SeqCst);
        assert!(pipeline.try_sync_pending().await.is_some());
        assert!(!pipeline.is_syncing());
    }
}
