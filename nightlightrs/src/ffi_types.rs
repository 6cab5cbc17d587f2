//! FFI-safe types with UniFFI derives.
//!
//! These mirror the core types; conversion happens at the FFI boundary.

use chrono::{DateTime, Utc};
use thiserror::Error;

use nightlight::{LocationError, LocationSample, ValidationError};

use crate::diagnostics::{LogRecord, Severity};
use crate::error::{SaveError, SchedulerError, StoreError};
use crate::queue::{PurgeReport, RecordDistance};
use crate::save::SaveOutcome;
use crate::scheduler::{FixStep, SaveStep, WakeupReport};
use crate::settings::UserSettings;
use crate::store::{QueueSummary, QueuedRecord, RecordStatus};
use crate::sync::SyncReport;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum FfiError {
    #[error("invalid location: {0}")]
    Validation(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("location error: {0}")]
    Location(String),

    #[error("scheduler error: {0}")]
    Scheduler(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<ValidationError> for FfiError {
    fn from(e: ValidationError) -> Self {
        FfiError::Validation(e.to_string())
    }
}

impl From<StoreError> for FfiError {
    fn from(e: StoreError) -> Self {
        FfiError::Storage(e.to_string())
    }
}

impl From<SaveError> for FfiError {
    fn from(e: SaveError) -> Self {
        match e {
            SaveError::Validation(v) => v.into(),
            SaveError::Persistence(p) => p.into(),
        }
    }
}

impl From<LocationError> for FfiError {
    fn from(e: LocationError) -> Self {
        FfiError::Location(e.to_string())
    }
}

impl From<SchedulerError> for FfiError {
    fn from(e: SchedulerError) -> Self {
        FfiError::Scheduler(e.to_string())
    }
}

// ============================================================================
// Location
// ============================================================================

/// GPS fix for FFI
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiLocationFix {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: Option<f64>,
    pub accuracy: f64,
    /// Unix milliseconds
    pub captured_at_ms: i64,
    pub source: String,
}

impl From<LocationSample> for FfiLocationFix {
    fn from(s: LocationSample) -> Self {
        Self {
            latitude: s.latitude,
            longitude: s.longitude,
            elevation: s.elevation_meters,
            accuracy: s.accuracy_meters,
            captured_at_ms: s.captured_at.timestamp_millis(),
            source: s.source,
        }
    }
}

impl From<FfiLocationFix> for LocationSample {
    fn from(f: FfiLocationFix) -> Self {
        let captured_at: DateTime<Utc> =
            DateTime::from_timestamp_millis(f.captured_at_ms).unwrap_or_else(Utc::now);
        Self {
            latitude: f.latitude,
            longitude: f.longitude,
            elevation_meters: f.elevation,
            accuracy_meters: f.accuracy,
            captured_at,
            source: f.source,
        }
    }
}

/// Result of a one-shot fix request
#[derive(Debug, Clone, PartialEq, uniffi::Enum)]
pub enum FfiFixOutcome {
    Fix { fix: FfiLocationFix },
    PermissionDenied,
    Unavailable { message: String },
}

impl From<Result<LocationSample, LocationError>> for FfiFixOutcome {
    fn from(result: Result<LocationSample, LocationError>) -> Self {
        match result {
            Ok(sample) => FfiFixOutcome::Fix { fix: sample.into() },
            Err(LocationError::PermissionDenied) => FfiFixOutcome::PermissionDenied,
            Err(e) => FfiFixOutcome::Unavailable {
                message: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Queue
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiRecordStatus {
    Pending,
    Complete,
    Error,
}

impl From<RecordStatus> for FfiRecordStatus {
    fn from(s: RecordStatus) -> Self {
        match s {
            RecordStatus::Pending => FfiRecordStatus::Pending,
            RecordStatus::Complete => FfiRecordStatus::Complete,
            RecordStatus::Error => FfiRecordStatus::Error,
        }
    }
}

impl From<FfiRecordStatus> for RecordStatus {
    fn from(s: FfiRecordStatus) -> Self {
        match s {
            FfiRecordStatus::Pending => RecordStatus::Pending,
            FfiRecordStatus::Complete => RecordStatus::Complete,
            FfiRecordStatus::Error => RecordStatus::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiQueuedRecord {
    pub id: i64,
    pub category: String,
    pub payload: String,
    pub created_at: String,
    pub status: FfiRecordStatus,
}

impl From<QueuedRecord> for FfiQueuedRecord {
    fn from(r: QueuedRecord) -> Self {
        Self {
            id: r.id,
            category: r.category,
            payload: r.payload,
            created_at: r.created_at,
            status: r.status.into(),
        }
    }
}

/// Queued record with its distance from the previous one in the list
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiRecordDistance {
    pub record: FfiQueuedRecord,
    pub distance_meters: Option<f64>,
}

impl From<RecordDistance> for FfiRecordDistance {
    fn from(r: RecordDistance) -> Self {
        Self {
            record: r.record.into(),
            distance_meters: r.distance_meters,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct FfiQueueSummary {
    pub pending: u32,
    pub complete: u32,
    pub error: u32,
    pub total: u32,
}

impl From<QueueSummary> for FfiQueueSummary {
    fn from(s: QueueSummary) -> Self {
        Self {
            pending: s.pending,
            complete: s.complete,
            error: s.error,
            total: s.total(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSaveOutcome {
    Delivered,
    Queued { id: i64 },
}

impl From<SaveOutcome> for FfiSaveOutcome {
    fn from(o: SaveOutcome) -> Self {
        match o {
            SaveOutcome::Delivered => FfiSaveOutcome::Delivered,
            SaveOutcome::Queued { id } => FfiSaveOutcome::Queued { id },
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, uniffi::Record)]
pub struct FfiSyncReport {
    pub attempted: u32,
    pub delivered: u32,
    pub errored: u32,
    pub deferred: u32,
}

impl From<SyncReport> for FfiSyncReport {
    fn from(r: SyncReport) -> Self {
        Self {
            attempted: r.attempted,
            delivered: r.delivered,
            errored: r.errored,
            deferred: r.deferred,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Record)]
pub struct FfiPurgeReport {
    pub sync: FfiSyncReport,
    pub purged: u32,
}

impl From<PurgeReport> for FfiPurgeReport {
    fn from(r: PurgeReport) -> Self {
        Self {
            sync: r.sync.into(),
            purged: r.purged as u32,
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, uniffi::Enum)]
pub enum FfiSeverity {
    Info,
    Error,
}

impl From<Severity> for FfiSeverity {
    fn from(s: Severity) -> Self {
        match s {
            Severity::Info => FfiSeverity::Info,
            Severity::Error => FfiSeverity::Error,
        }
    }
}

impl From<FfiSeverity> for Severity {
    fn from(s: FfiSeverity) -> Self {
        match s {
            FfiSeverity::Info => Severity::Info,
            FfiSeverity::Error => Severity::Error,
        }
    }
}

#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiLogRecord {
    pub id: i64,
    pub timestamp: String,
    pub area: String,
    pub message: String,
    pub severity: FfiSeverity,
}

impl From<LogRecord> for FfiLogRecord {
    fn from(r: LogRecord) -> Self {
        Self {
            id: r.id,
            timestamp: r.timestamp,
            area: r.area,
            message: r.message,
            severity: r.severity.into(),
        }
    }
}

// ============================================================================
// Settings and Background
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, uniffi::Record)]
pub struct FfiUserSettings {
    pub update_distance_meters: f64,
    pub history_display_density: u32,
}

impl From<UserSettings> for FfiUserSettings {
    fn from(s: UserSettings) -> Self {
        Self {
            update_distance_meters: s.update_distance_meters,
            history_display_density: s.history_display_density,
        }
    }
}

/// Summary of one background wake-up
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct FfiWakeupReport {
    pub fix: Option<FfiLocationFix>,
    /// Why no fix was obtained
    pub fix_error: Option<String>,
    pub save: Option<FfiSaveOutcome>,
    /// Fix was too close to the last saved one
    pub save_skipped: bool,
    pub save_error: Option<String>,
    pub sync: Option<FfiSyncReport>,
}

impl From<WakeupReport> for FfiWakeupReport {
    fn from(r: WakeupReport) -> Self {
        let (fix, fix_error) = match r.fix {
            FixStep::Acquired(sample) => (Some(sample.into()), None),
            FixStep::Failed(e) => (None, Some(e.to_string())),
        };
        let (save, save_skipped, save_error) = match r.save {
            SaveStep::Saved(outcome) => (Some(outcome.into()), false, None),
            SaveStep::Skipped { .. } => (None, true, None),
            SaveStep::Failed(message) => (None, false, Some(message)),
            SaveStep::NotAttempted => (None, false, None),
        };
        Self {
            fix,
            fix_error,
            save,
            save_skipped,
            save_error,
            sync: r.sync.map(Into::into),
        }
    }
}
