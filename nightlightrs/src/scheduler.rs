//! Background wake-ups.
//!
//! The host OS owns the actual recurring task; [`TaskHost`] is the thin
//! platform adapter. Each wake-up runs one acquisition, one offline-first
//! save and one sync, with no retries inside the invocation.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

use async_trait::async_trait;
use log::{info, warn};

use nightlight::geo_utils::sample_distance;
use nightlight::{LocationError, LocationProvider, LocationSample};

use crate::diagnostics::DiagnosticSink;
use crate::elapsed_ms;
use crate::error::SchedulerError;
use crate::save::{SaveOptions, SaveOutcome, SavePipeline};
use crate::settings::SettingsProvider;
use crate::sync::{SyncPipeline, SyncReport};

const AREA: &str = "backgroundTask";

// ============================================================================
// Host Seams
// ============================================================================

/// Work performed on each OS wake-up.
#[async_trait]
pub trait WakeupHandler: Send + Sync {
    async fn on_wakeup(&self) -> WakeupReport;
}

/// Platform task runner.
pub trait TaskHost: Send + Sync {
    fn register_recurring_task(
        &self,
        name: &str,
        interval_minutes: u32,
        handler: Arc<dyn WakeupHandler>,
    ) -> Result<(), SchedulerError>;

    fn unregister_task(&self, name: &str) -> Result<(), SchedulerError>;

    fn is_registered(&self, name: &str) -> bool;
}

// ============================================================================
// Scheduler
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Unregistered,
    Registered,
}

/// Registers one named recurring task with the host.
pub struct BackgroundScheduler {
    host: Arc<dyn TaskHost>,
    task_name: String,
    interval_minutes: u32,
    handler: Arc<dyn WakeupHandler>,
}

impl BackgroundScheduler {
    pub fn new(
        host: Arc<dyn TaskHost>,
        task_name: &str,
        interval_minutes: u32,
        handler: Arc<dyn WakeupHandler>,
    ) -> Self {
        Self {
            host,
            task_name: task_name.to_string(),
            interval_minutes,
            handler,
        }
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    pub fn state(&self) -> SchedulerState {
        if self.host.is_registered(&self.task_name) {
            SchedulerState::Registered
        } else {
            SchedulerState::Unregistered
        }
    }

    /// Register the task. Returns false if it was already registered.
    pub fn register(&self) -> Result<bool, SchedulerError> {
        if self.state() == SchedulerState::Registered {
            info!("[BackgroundScheduler] {} already registered", self.task_name);
            return Ok(false);
        }
        self.host.register_recurring_task(
            &self.task_name,
            self.interval_minutes,
            Arc::clone(&self.handler),
        )?;
        info!(
            "[BackgroundScheduler] Registered {} every {} min",
            self.task_name, self.interval_minutes
        );
        Ok(true)
    }

    /// Unregister the task. Returns false if it was not registered.
    pub fn unregister(&self) -> Result<bool, SchedulerError> {
        if self.state() == SchedulerState::Unregistered {
            return Ok(false);
        }
        self.host.unregister_task(&self.task_name)?;
        info!("[BackgroundScheduler] Unregistered {}", self.task_name);
        Ok(true)
    }

    pub fn handler(&self) -> &Arc<dyn WakeupHandler> {
        &self.handler
    }
}

// ============================================================================
// Wake-up Handler
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum FixStep {
    Acquired(LocationSample),
    Failed(LocationError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum SaveStep {
    Saved(SaveOutcome),
    /// Too close to the last saved fix
    Skipped { moved_meters: f64 },
    Failed(String),
    /// No fix to save
    NotAttempted,
}

/// What one wake-up did.
#[derive(Debug, Clone, PartialEq)]
pub struct WakeupReport {
    pub fix: FixStep,
    pub save: SaveStep,
    /// `None` when the sync could not run (already running or queue unreadable)
    pub sync: Option<SyncReport>,
}

/// Acquire, save offline-first, then sync.
pub struct BackgroundWakeup {
    location: Arc<dyn LocationProvider>,
    save: Arc<SavePipeline>,
    sync: Arc<SyncPipeline>,
    settings: Arc<dyn SettingsProvider>,
    diagnostics: Arc<dyn DiagnosticSink>,
    last_saved: Mutex<Option<LocationSample>>,
}

impl BackgroundWakeup {
    pub fn new(
        location: Arc<dyn LocationProvider>,
        save: Arc<SavePipeline>,
        sync: Arc<SyncPipeline>,
        settings: Arc<dyn SettingsProvider>,
        diagnostics: Arc<dyn DiagnosticSink>,
    ) -> Self {
        Self {
            location,
            save,
            sync,
            settings,
            diagnostics,
            last_saved: Mutex::new(None),
        }
    }

    fn last_saved(&self) -> Option<LocationSample> {
        self.last_saved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn remember(&self, sample: LocationSample) {
        *self.last_saved.lock().unwrap_or_else(PoisonError::into_inner) = Some(sample);
    }

    async fn save_step(&self, fix: &LocationSample) -> SaveStep {
        let threshold = self.settings.current().update_distance_meters;
        if let Some(previous) = self.last_saved() {
            let moved_meters = sample_distance(fix, &previous);
            if moved_meters <= threshold {
                info!(
                    "[BackgroundWakeup] Moved {:.0}m (< {:.0}m), not saving",
                    moved_meters, threshold
                );
                return SaveStep::Skipped { moved_meters };
            }
        }

        match self.save.save_sample(fix, SaveOptions::offline_first()).await {
            Ok(outcome) => {
                self.remember(fix.clone());
                SaveStep::Saved(outcome)
            }
            Err(e) => {
                self.diagnostics
                    .error(AREA, &format!("Could not save background fix: {}", e));
                SaveStep::Failed(e.to_string())
            }
        }
    }
}

#[async_trait]
impl WakeupHandler for BackgroundWakeup {
    async fn on_wakeup(&self) -> WakeupReport {
        let start = Instant::now();

        let (fix, save) = match self.location.current_fix().await {
            Ok(sample) => {
                let save = self.save_step(&sample).await;
                (FixStep::Acquired(sample), save)
            }
            Err(e) => {
                self.diagnostics
                    .error(AREA, &format!("No location fix: {}", e));
                (FixStep::Failed(e), SaveStep::NotAttempted)
            }
        };

        let sync = match self.sync.try_sync_pending().await {
            Some(Ok(report)) => Some(report),
            Some(Err(e)) => {
                warn!("[BackgroundWakeup] Sync failed: {}", e);
                self.diagnostics.error(AREA, &format!("Sync failed: {}", e));
                None
            }
            None => None,
        };

        info!("[BackgroundWakeup] Wake-up done ({} ms)", elapsed_ms(start));
        WakeupReport { fix, save, sync }
    }
}
