//! Save pipeline: network first, offline queue on any failure.
//!
//! Safe to call from the foreground and the background task at the same
//! time. Each call either delivers or inserts its own row, so overlap can at
//! worst produce a duplicate delivery, never a lost sample.

use std::sync::Arc;
use std::time::Instant;

use log::debug;

use nightlight::geo_utils::format_db_timestamp;
use nightlight::{Delivery, LOCATION_CATEGORY, LocationSample};

use crate::diagnostics::DiagnosticSink;
use crate::elapsed_ms;
use crate::error::SaveError;
use crate::store::OfflineStore;

const AREA: &str = "saveLocation";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SaveOptions {
    pub attempt_network: bool,
}

impl SaveOptions {
    /// Try the server first, queue on failure.
    pub fn network_first() -> Self {
        Self {
            attempt_network: true,
        }
    }

    /// Queue without touching the network.
    pub fn offline_first() -> Self {
        Self {
            attempt_network: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    Delivered,
    Queued { id: i64 },
}

pub struct SavePipeline {
    store: Arc<OfflineStore>,
    delivery: Arc<dyn Delivery>,
    diagnostics: Arc<dyn DiagnosticSink>,
}

impl SavePipeline {
    pub fn new(
        store: Arc<OfflineStore>,
        delivery: Arc<dyn Delivery>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            store,
            delivery,
            diagnostics,
        }
    }

    pub fn store(&self) -> &Arc<OfflineStore> {
        &self.store
    }

    /// Deliver or queue one sample.
    ///
    /// Invalid coordinates fail before anything is sent or written.
    pub async fn save_sample(
        &self,
        sample: &LocationSample,
        options: SaveOptions,
    ) -> Result<SaveOutcome, SaveError> {
        let start = Instant::now();

        let payload = sample.to_payload();
        let json = match payload.to_json() {
            Ok(json) => json,
            Err(e) => {
                self.diagnostics
                    .error(AREA, &format!("Rejected sample from {}: {}", sample.source, e));
                return Err(e.into());
            }
        };
        let timestamp = format_db_timestamp(&sample.captured_at);

        if options.attempt_network {
            match self.delivery.deliver(&payload, &timestamp).await {
                Ok(()) => {
                    debug!(
                        "[SavePipeline] Delivered {} sample ({} ms)",
                        sample.source,
                        elapsed_ms(start)
                    );
                    return Ok(SaveOutcome::Delivered);
                }
                Err(e) => {
                    self.diagnostics
                        .error(AREA, &format!("Delivery failed, queueing offline: {}", e));
                }
            }
        }

        let id = self.store.append_at(LOCATION_CATEGORY, &json, &timestamp)?;
        self.diagnostics
            .info(AREA, &format!("Queued {} sample as record {}", sample.source, id));
        Ok(SaveOutcome::Queued { id })
    }
}
