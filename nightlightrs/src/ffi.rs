//! FFI bindings for mobile platforms (iOS/Android).
//!
//! The host creates one [`LocationCore`] per process and implements three
//! callback interfaces: auth tokens, platform location, and the OS task
//! runner. Everything else (queue, sync, scheduling, tracking) lives behind
//! the object. Geo helpers are exported as free functions prefixed `ffi_`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::{info, warn};
use tokio::runtime::Runtime;

use nightlight::geo_utils;
use nightlight::{
    FixCallback, LocationError, LocationProvider, LocationPublisher, LocationSample,
    RecurringFixConfig, RemoteDelivery, SubscriptionHandle, TokenStore,
};

use crate::acquisition::{BestAccuracyLocation, TimeoutLocation};
use crate::diagnostics::{DiagnosticLog, DiagnosticSink};
use crate::error::SchedulerError;
use crate::ffi_types::{
    FfiError, FfiFixOutcome, FfiLocationFix, FfiLogRecord, FfiPurgeReport, FfiQueueSummary,
    FfiQueuedRecord, FfiRecordDistance, FfiRecordStatus, FfiSaveOutcome, FfiSeverity,
    FfiSyncReport, FfiUserSettings, FfiWakeupReport,
};
use crate::http::LocationClient;
use crate::queue::OfflineQueue;
use crate::save::{SaveOptions, SavePipeline};
use crate::scheduler::{BackgroundScheduler, BackgroundWakeup, TaskHost, WakeupHandler};
use crate::settings::{CoreConfig, SharedSettings, UserSettings};
use crate::store::{OfflineStore, StatusFilter};
use crate::sync::SyncPipeline;
use crate::tracker::ForegroundTracker;
use crate::{elapsed_ms, init_logging};

/// Background fixes: ask up to this many times for a tight fix
const BACKGROUND_FIX_ATTEMPTS: u32 = 3;
const BACKGROUND_TARGET_ACCURACY_METERS: f64 = 20.0;
/// Stay well inside the OS background execution window
const BACKGROUND_FIX_TIMEOUT: Duration = Duration::from_secs(25);

// ============================================================================
// Callback Interfaces
// ============================================================================

/// Auth token storage on the host.
#[uniffi::export(callback_interface)]
pub trait TokenProvider: Send + Sync {
    /// Current bearer token, or None when logged out.
    fn get_token(&self) -> Option<String>;
}

/// Platform positioning API.
#[uniffi::export(callback_interface)]
pub trait PlatformLocation: Send + Sync {
    fn has_permission(&self) -> bool;

    /// One-shot, highest-accuracy fix. May block until the platform answers.
    fn current_fix(&self) -> FfiFixOutcome;

    /// Start a watch. Fixes are reported via `LocationCore::on_location_update`
    /// with the same `watch_id`. Returns false if the platform refused.
    fn start_watch(&self, watch_id: u64, min_distance_meters: f64, min_interval_ms: u64) -> bool;

    fn stop_watch(&self, watch_id: u64);
}

/// OS background task runner.
///
/// When the OS fires a registered task the host calls
/// `LocationCore::run_background_task` with its name.
#[uniffi::export(callback_interface)]
pub trait HostTaskRunner: Send + Sync {
    /// Returns false if the OS refused the registration.
    fn register_task(&self, name: String, interval_minutes: u32) -> bool;

    fn unregister_task(&self, name: String);

    fn is_task_registered(&self, name: String) -> bool;
}

// ============================================================================
// Host Adapters
// ============================================================================

struct HostTokens(Box<dyn TokenProvider>);

#[async_trait]
impl TokenStore for HostTokens {
    async fn token(&self) -> Option<String> {
        self.0.get_token()
    }
}

/// [`LocationProvider`] backed by the host, routing watch updates by id.
struct HostLocation {
    platform: Arc<dyn PlatformLocation>,
    watches: Mutex<HashMap<u64, (SubscriptionHandle, FixCallback)>>,
    next_watch_id: AtomicU64,
}

impl HostLocation {
    fn new(platform: Box<dyn PlatformLocation>) -> Self {
        Self {
            platform: Arc::from(platform),
            watches: Mutex::new(HashMap::new()),
            next_watch_id: AtomicU64::new(1),
        }
    }

    fn watches(&self) -> MutexGuard<'_, HashMap<u64, (SubscriptionHandle, FixCallback)>> {
        self.watches.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Deliver a fix to the watch's callback. Unknown or stopped watches are ignored.
    fn dispatch(&self, watch_id: u64, sample: LocationSample) -> bool {
        let callback = self
            .watches()
            .get(&watch_id)
            .filter(|(handle, _)| handle.is_active())
            .map(|(_, cb)| Arc::clone(cb));
        match callback {
            Some(cb) => {
                cb(sample);
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl LocationProvider for HostLocation {
    /// The host call blocks; it runs on the blocking pool so a timeout around
    /// this future still fires.
    async fn current_fix(&self) -> Result<LocationSample, LocationError> {
        let platform = Arc::clone(&self.platform);
        let outcome = tokio::task::spawn_blocking(move || platform.current_fix())
            .await
            .map_err(|e| {
                LocationError::HardwareUnavailable(format!("location request failed: {}", e))
            })?;
        match outcome {
            FfiFixOutcome::Fix { fix } => Ok(fix.into()),
            FfiFixOutcome::PermissionDenied => Err(LocationError::PermissionDenied),
            FfiFixOutcome::Unavailable { message } => Err(LocationError::HardwareUnavailable(message)),
        }
    }

    async fn start_recurring_fix(
        &self,
        config: RecurringFixConfig,
        callback: FixCallback,
    ) -> Result<SubscriptionHandle, LocationError> {
        let id = self.next_watch_id.fetch_add(1, Ordering::SeqCst);
        let handle = SubscriptionHandle::new(id);
        self.watches().insert(id, (handle.clone(), callback));

        if !self
            .platform
            .start_watch(id, config.min_distance_meters, config.min_interval_ms)
        {
            self.watches().remove(&id);
            return Err(LocationError::HardwareUnavailable(
                "platform refused location watch".to_string(),
            ));
        }
        Ok(handle)
    }

    fn stop_recurring_fix(&self, handle: &SubscriptionHandle) {
        if handle.deactivate() {
            self.watches().remove(&handle.id());
            self.platform.stop_watch(handle.id());
        }
    }

    async fn has_permission(&self) -> bool {
        self.platform.has_permission()
    }
}

/// [`TaskHost`] backed by the host's OS task runner.
struct HostTasks {
    runner: Box<dyn HostTaskRunner>,
    handlers: Mutex<HashMap<String, Arc<dyn WakeupHandler>>>,
}

impl HostTasks {
    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Arc<dyn WakeupHandler>>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handler(&self, name: &str) -> Option<Arc<dyn WakeupHandler>> {
        self.handlers().get(name).cloned()
    }
}

impl TaskHost for HostTasks {
    fn register_recurring_task(
        &self,
        name: &str,
        interval_minutes: u32,
        handler: Arc<dyn WakeupHandler>,
    ) -> Result<(), SchedulerError> {
        if !self.runner.register_task(name.to_string(), interval_minutes) {
            return Err(SchedulerError::RegistrationRejected(name.to_string()));
        }
        self.handlers().insert(name.to_string(), handler);
        Ok(())
    }

    fn unregister_task(&self, name: &str) -> Result<(), SchedulerError> {
        self.runner.unregister_task(name.to_string());
        self.handlers().remove(name);
        Ok(())
    }

    fn is_registered(&self, name: &str) -> bool {
        self.runner.is_task_registered(name.to_string())
    }
}

// ============================================================================
// Location Core
// ============================================================================

/// Offline-first location capture and sync for one app process.
#[derive(uniffi::Object)]
pub struct LocationCore {
    runtime: Runtime,
    config: CoreConfig,
    store: Arc<OfflineStore>,
    diagnostics: Arc<DiagnosticLog>,
    save: Arc<SavePipeline>,
    sync: Arc<SyncPipeline>,
    queue: OfflineQueue,
    settings: Arc<SharedSettings>,
    location: Arc<HostLocation>,
    tasks: Arc<HostTasks>,
    scheduler: BackgroundScheduler,
    wakeup: Arc<BackgroundWakeup>,
    tracker: ForegroundTracker,
}

impl LocationCore {
    /// Build the core from an explicit config (used by the exported constructor and tests).
    pub fn with_config(
        config: CoreConfig,
        tokens: Box<dyn TokenProvider>,
        location: Box<dyn PlatformLocation>,
        tasks: Box<dyn HostTaskRunner>,
    ) -> Result<Self, FfiError> {
        init_logging();
        let start = Instant::now();

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .map_err(|e| FfiError::Config(format!("Failed to create runtime: {}", e)))?;

        let store = Arc::new(OfflineStore::open(&config.db_path)?);
        let diagnostics = Arc::new(DiagnosticLog::open(&config.db_path)?);
        let sink: Arc<dyn DiagnosticSink> = diagnostics.clone();

        let client = LocationClient::from_config(&config).map_err(FfiError::Config)?;
        let delivery = Arc::new(RemoteDelivery::new(client, HostTokens(tokens)));

        let save = Arc::new(SavePipeline::new(store.clone(), delivery.clone(), sink.clone()));
        let sync = Arc::new(SyncPipeline::new(store.clone(), delivery, sink.clone()));
        let queue = OfflineQueue::new(store.clone(), sync.clone(), sink.clone());
        let settings = Arc::new(SharedSettings::default());

        let location = Arc::new(HostLocation::new(location));
        let background_location = Arc::new(TimeoutLocation::new(
            BestAccuracyLocation::new(
                location.clone(),
                BACKGROUND_FIX_ATTEMPTS,
                BACKGROUND_TARGET_ACCURACY_METERS,
            ),
            BACKGROUND_FIX_TIMEOUT,
        ));
        let wakeup = Arc::new(BackgroundWakeup::new(
            background_location,
            save.clone(),
            sync.clone(),
            settings.clone(),
            sink,
        ));

        let tasks = Arc::new(HostTasks {
            runner: tasks,
            handlers: Mutex::new(HashMap::new()),
        });
        let scheduler = BackgroundScheduler::new(
            tasks.clone(),
            &config.background_task_name,
            config.background_interval_minutes,
            wakeup.clone(),
        );

        let tracker = ForegroundTracker::new(
            location.clone(),
            Arc::new(LocationPublisher::new()),
            save.clone(),
            runtime.handle().clone(),
        );

        info!(
            "[LocationCore] Ready with {} -> {} ({} ms)",
            config.db_path,
            config.location_url(),
            elapsed_ms(start)
        );

        Ok(Self {
            runtime,
            config,
            store,
            diagnostics,
            save,
            sync,
            queue,
            settings,
            location,
            tasks,
            scheduler,
            wakeup,
            tracker,
        })
    }
}

#[uniffi::export]
impl LocationCore {
    #[uniffi::constructor]
    pub fn new(
        db_path: String,
        api_url: String,
        tokens: Box<dyn TokenProvider>,
        location: Box<dyn PlatformLocation>,
        tasks: Box<dyn HostTaskRunner>,
    ) -> Result<Arc<Self>, FfiError> {
        let config = CoreConfig::from_env()
            .with_db_path(&db_path)
            .with_api_url(&api_url);
        Ok(Arc::new(Self::with_config(config, tokens, location, tasks)?))
    }

    // ------------------------------------------------------------------------
    // Acquisition and saving
    // ------------------------------------------------------------------------

    pub fn current_fix(&self) -> FfiFixOutcome {
        self.runtime.block_on(self.location.current_fix()).into()
    }

    /// Save one fix. `attempt_network` false queues it without sending.
    pub fn save_fix(
        &self,
        fix: FfiLocationFix,
        attempt_network: bool,
    ) -> Result<FfiSaveOutcome, FfiError> {
        let sample: LocationSample = fix.into();
        let options = if attempt_network {
            SaveOptions::network_first()
        } else {
            SaveOptions::offline_first()
        };
        let outcome = self.runtime.block_on(self.save.save_sample(&sample, options))?;
        Ok(outcome.into())
    }

    // ------------------------------------------------------------------------
    // Sync and offline queue
    // ------------------------------------------------------------------------

    pub fn sync_pending(&self) -> Result<FfiSyncReport, FfiError> {
        let report = self.runtime.block_on(self.sync.sync_pending())?;
        Ok(report.into())
    }

    /// Sync, then delete COMPLETE records. None if a sync was already running.
    pub fn sync_and_purge(&self) -> Result<Option<FfiPurgeReport>, FfiError> {
        let report = self.runtime.block_on(self.queue.sync_and_purge())?;
        Ok(report.map(Into::into))
    }

    pub fn list_records(&self) -> Result<Vec<FfiQueuedRecord>, FfiError> {
        Ok(self.store.list_all()?.into_iter().map(Into::into).collect())
    }

    pub fn record_distances(&self) -> Result<Vec<FfiRecordDistance>, FfiError> {
        Ok(self
            .queue
            .records_with_distances()?
            .into_iter()
            .map(Into::into)
            .collect())
    }

    pub fn queue_summary(&self) -> Result<FfiQueueSummary, FfiError> {
        Ok(self.queue.summary()?.into())
    }

    pub fn delete_record(&self, id: i64) -> Result<bool, FfiError> {
        Ok(self.store.delete_one(id)?)
    }

    /// Delete records in `status`, or every record when None.
    pub fn delete_records(&self, status: Option<FfiRecordStatus>) -> Result<u32, FfiError> {
        let filter = match status {
            Some(s) => StatusFilter::Only(s.into()),
            None => StatusFilter::All,
        };
        Ok(self.store.delete_by_status(filter)? as u32)
    }

    // ------------------------------------------------------------------------
    // Diagnostic log
    // ------------------------------------------------------------------------

    pub fn list_logs(&self) -> Result<Vec<FfiLogRecord>, FfiError> {
        Ok(self.diagnostics.list()?.into_iter().map(Into::into).collect())
    }

    pub fn delete_logs(&self) -> Result<u32, FfiError> {
        Ok(self.diagnostics.delete_all()? as u32)
    }

    pub fn write_log(&self, area: String, message: String, severity: FfiSeverity) {
        self.diagnostics.write(&area, &message, severity.into());
    }

    // ------------------------------------------------------------------------
    // Settings
    // ------------------------------------------------------------------------

    /// Replace user settings from the server's settings JSON.
    pub fn apply_settings_json(&self, json: String) -> FfiUserSettings {
        let settings = UserSettings::from_json(&json);
        self.settings.replace(settings);
        settings.into()
    }

    // ------------------------------------------------------------------------
    // Background task
    // ------------------------------------------------------------------------

    pub fn start_background(&self) -> Result<bool, FfiError> {
        Ok(self.scheduler.register()?)
    }

    pub fn stop_background(&self) -> Result<bool, FfiError> {
        Ok(self.scheduler.unregister()?)
    }

    pub fn is_background_registered(&self) -> bool {
        self.tasks.is_registered(self.scheduler.task_name())
    }

    /// Run one wake-up for the named task. Called by the host when the OS fires it.
    pub fn run_background_task(&self, name: String) -> Result<FfiWakeupReport, FfiError> {
        init_logging();
        let handler: Arc<dyn WakeupHandler> = if name == self.config.background_task_name {
            self.wakeup.clone()
        } else {
            self.tasks
                .handler(&name)
                .ok_or_else(|| FfiError::Scheduler(format!("unknown task {}", name)))?
        };
        let report = self.runtime.block_on(handler.on_wakeup());
        Ok(report.into())
    }

    // ------------------------------------------------------------------------
    // Foreground tracking
    // ------------------------------------------------------------------------

    pub fn start_foreground(
        &self,
        min_distance_meters: f64,
        min_interval_ms: u64,
    ) -> Result<bool, FfiError> {
        let config = RecurringFixConfig::default()
            .with_min_distance(min_distance_meters)
            .with_min_interval_ms(min_interval_ms);
        Ok(self.runtime.block_on(self.tracker.start(config))?)
    }

    pub fn stop_foreground(&self) -> bool {
        self.tracker.stop()
    }

    /// Host entry point for fixes from a watch started by `start_watch`.
    pub fn on_location_update(&self, watch_id: u64, fix: FfiLocationFix) {
        if !self.location.dispatch(watch_id, fix.into()) {
            warn!("[LocationCore] Fix for unknown watch {}", watch_id);
        }
    }

    pub fn latest_fix(&self) -> Option<FfiLocationFix> {
        self.tracker.publisher().latest().map(Into::into)
    }
}

// ============================================================================
// Geo Utilities
// ============================================================================

/// Coordinate pair for FFI
#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct FfiCoordinate {
    pub latitude: f64,
    pub longitude: f64,
}

/// Great-circle distance in meters.
#[uniffi::export]
pub fn ffi_haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    geo_utils::haversine_distance(lat1, lon1, lat2, lon2)
}

#[uniffi::export]
pub fn ffi_haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    geo_utils::haversine_miles(lat1, lon1, lat2, lon2)
}

#[uniffi::export]
pub fn ffi_should_persist(
    current: FfiLocationFix,
    previous: FfiLocationFix,
    threshold_meters: f64,
) -> bool {
    geo_utils::should_persist(&current.into(), &previous.into(), threshold_meters)
}

/// Parse `"(lat, lng)"`.
#[uniffi::export]
pub fn ffi_parse_coordinates(value: String) -> Option<FfiCoordinate> {
    geo_utils::parse_coordinate_string(&value).map(|(latitude, longitude)| FfiCoordinate {
        latitude,
        longitude,
    })
}

/// `2022-06-01T14:42:55.865Z` -> `06/01/2022 at 2:42 pm.`
#[uniffi::export]
pub fn ffi_format_display_date(value: String) -> Option<String> {
    geo_utils::format_display_date(&value)
}

#[uniffi::export]
pub fn ffi_meters_to_feet(meters: f64) -> f64 {
    geo_utils::meters_to_feet(meters)
}

#[uniffi::export]
pub fn ffi_miles_to_meters(miles: f64) -> i64 {
    geo_utils::miles_to_meters(miles)
}

#[uniffi::export]
pub fn ffi_miles_to_feet(miles: f64) -> i64 {
    geo_utils::miles_to_feet(miles)
}

#[uniffi::export]
pub fn ffi_feet_to_miles(feet: f64) -> f64 {
    geo_utils::feet_to_miles(feet)
}
