//! Offline data screen operations.
//!
//! Wraps the store and sync pipeline with the two compound actions the
//! offline screen needs: sync-then-purge and the per-record distance list.

use std::sync::Arc;

use log::info;

use nightlight::LocationPayload;
use nightlight::geo_utils::consecutive_distances;

use crate::diagnostics::DiagnosticSink;
use crate::error::StoreError;
use crate::store::{OfflineStore, QueueSummary, QueuedRecord, RecordStatus, StatusFilter};
use crate::sync::{SyncPipeline, SyncReport};

const AREA: &str = "offlineQueue";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PurgeReport {
    pub sync: SyncReport,
    /// COMPLETE records deleted after the sync
    pub purged: usize,
}

/// A record with its distance from the record listed before it.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordDistance {
    pub record: QueuedRecord,
    /// Whole meters; `None` when either payload cannot be decoded
    pub distance_meters: Option<f64>,
}

pub struct OfflineQueue {
    store: Arc<OfflineStore>,
    sync: Arc<SyncPipeline>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl OfflineQueue {
    pub fn new(
        store: Arc<OfflineStore>,
        sync: Arc<SyncPipeline>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            store,
            sync,
            diagnostics,
        }
    }

    /// Sync pending records, then delete the ones now COMPLETE.
    ///
    /// Returns `Ok(None)` without doing anything if a sync is already running.
    pub async fn sync_and_purge(&self) -> Result<Option<PurgeReport>, StoreError> {
        let Some(result) = self.sync.try_sync_pending().await else {
            return Ok(None);
        };
        let sync = result?;
        let purged = self
            .store
            .delete_by_status(StatusFilter::Only(RecordStatus::Complete))?;
        self.diagnostics
            .info(AREA, &format!("Deleted {} completed records", purged));
        info!(
            "[OfflineQueue] Synced {} of {}, purged {}",
            sync.delivered, sync.attempted, purged
        );
        Ok(Some(PurgeReport { sync, purged }))
    }

    pub fn summary(&self) -> Result<QueueSummary, StoreError> {
        self.store.summary()
    }

    /// All records newest first, each with its distance from the previous entry.
    ///
    /// The first record's distance is 0.
    pub fn records_with_distances(&self) -> Result<Vec<RecordDistance>, StoreError> {
        let records = self.store.list_all()?;
        let coords: Vec<Option<(f64, f64)>> = records
            .iter()
            .map(|r| {
                LocationPayload::decode(&r.payload)
                    .ok()
                    .map(|p| (p.lat, p.long))
            })
            .collect();
        let distances = consecutive_distances(&coords);

        Ok(records
            .into_iter()
            .zip(distances)
            .map(|(record, distance)| RecordDistance {
                record,
                distance_meters: distance.map(f64::round),
            })
            .collect())
    }
}
