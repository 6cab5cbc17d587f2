//! Foreground tracking.
//!
//! Owns the publisher for the lifetime of a foreground session: `start`
//! opens a platform watch that publishes every fix and saves the ones that
//! moved far enough, `stop` closes the watch and clears the publisher.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};
use tokio::runtime::Handle;

use nightlight::{
    FixCallback, LocationError, LocationProvider, LocationPublisher, LocationSample,
    RecurringFixConfig, SubscriptionHandle,
};

use crate::save::{SaveOptions, SavePipeline};

pub struct ForegroundTracker {
    location: Arc<dyn LocationProvider>,
    publisher: Arc<LocationPublisher>,
    save: Arc<SavePipeline>,
    runtime: Handle,
    watch: Mutex<Option<SubscriptionHandle>>,
}

impl ForegroundTracker {
    /// `runtime` runs the saves triggered from watch callbacks.
    pub fn new(
        location: Arc<dyn LocationProvider>,
        publisher: Arc<LocationPublisher>,
        save: Arc<SavePipeline>,
        runtime: Handle,
    ) -> Self {
        Self {
            location,
            publisher,
            save,
            runtime,
            watch: Mutex::new(None),
        }
    }

    fn watch(&self) -> MutexGuard<'_, Option<SubscriptionHandle>> {
        self.watch.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn publisher(&self) -> &Arc<LocationPublisher> {
        &self.publisher
    }

    pub fn is_running(&self) -> bool {
        self.watch().is_some()
    }

    /// Start watching. Returns false if already running.
    pub async fn start(&self, config: RecurringFixConfig) -> Result<bool, LocationError> {
        if self.is_running() {
            return Ok(false);
        }
        if !self.location.has_permission().await {
            warn!("[ForegroundTracker] Location permission not granted");
            return Err(LocationError::PermissionDenied);
        }

        let handle = self
            .location
            .start_recurring_fix(config, self.fix_callback())
            .await?;

        let mut watch = self.watch();
        if watch.is_some() {
            // Lost a race with another start; keep the first watch
            self.location.stop_recurring_fix(&handle);
            return Ok(false);
        }
        info!(
            "[ForegroundTracker] Watching (min {:.0}m / {}ms)",
            config.min_distance_meters, config.min_interval_ms
        );
        *watch = Some(handle);
        Ok(true)
    }

    /// Stop watching and clear the publisher. Returns false if not running.
    pub fn stop(&self) -> bool {
        let Some(handle) = self.watch().take() else {
            return false;
        };
        self.location.stop_recurring_fix(&handle);
        self.publisher.clear();
        info!("[ForegroundTracker] Stopped");
        true
    }

    fn fix_callback(&self) -> FixCallback {
        let publisher = Arc::clone(&self.publisher);
        let save = Arc::clone(&self.save);
        let runtime = self.runtime.clone();

        Arc::new(move |sample: LocationSample| {
            publisher.publish(sample.clone());
            if !publisher.ready_to_save() {
                return;
            }
            let save = Arc::clone(&save);
            runtime.spawn(async move {
                if let Err(e) = save.save_sample(&sample, SaveOptions::network_first()).await {
                    warn!("[ForegroundTracker] Save failed: {}", e);
                }
            });
        })
    }
}

impl Drop for ForegroundTracker {
    fn drop(&mut self) {
        self.stop();
    }
}
