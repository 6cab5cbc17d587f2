//! Nightlightrs - Mobile core for the Nightlight location-sharing client
//!
//! This crate provides:
//! - SQLite offline queue and diagnostic log
//! - HTTP client for the location API
//! - Save and sync pipelines (network first, offline fallback, later reconciliation)
//! - Background wake-up scheduling and foreground tracking
//! - UniFFI bindings for iOS/Android

use std::time::Instant;

// Re-export the core types
pub use nightlight::*;

// Unified error handling
pub mod error;
pub use error::{SaveError, SchedulerError, StoreError};

// Schema migrations
pub mod migrations;

// Offline queue storage
pub mod store;
pub use store::{OfflineStore, QueueSummary, QueuedRecord, RecordStatus, StatusFilter};

// Diagnostic log table
pub mod diagnostics;
pub use diagnostics::{DiagnosticLog, DiagnosticSink, LogRecord, NullSink, Severity};

// HTTP client for the location API
pub mod http;
pub use http::LocationClient;

// User settings and core configuration
pub mod settings;
pub use settings::{CoreConfig, SettingsProvider, SharedSettings, StaticSettings, UserSettings};

// Save pipeline
pub mod save;
pub use save::{SaveOptions, SaveOutcome, SavePipeline};

// Sync pipeline
pub mod sync;
pub use sync::{SyncPipeline, SyncReport};

// Offline data screen facade
pub mod queue;
pub use queue::{OfflineQueue, PurgeReport};

// Acquisition decorators
pub mod acquisition;
pub use acquisition::{BestAccuracyLocation, TimeoutLocation};

// Background wake-ups
pub mod scheduler;
pub use scheduler::{BackgroundScheduler, BackgroundWakeup, TaskHost, WakeupHandler, WakeupReport};

// Foreground tracking
pub mod tracker;
pub use tracker::ForegroundTracker;

// FFI bindings for mobile platforms
pub mod ffi;
pub mod ffi_types;

uniffi::setup_scaffolding!();

/// Helper to calculate elapsed milliseconds from an Instant
#[inline]
pub(crate) fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Initialize logging for Android
#[cfg(target_os = "android")]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("nightlightrs"),
    );
}

/// Initialize logging for iOS
#[cfg(target_os = "ios")]
pub(crate) fn init_logging() {
    use std::sync::Once;

    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = oslog::OsLogger::new("com.nightlight.core")
            .level_filter(log::LevelFilter::Debug)
            .init();
    });
}

#[cfg(not(any(target_os = "android", target_os = "ios")))]
pub(crate) fn init_logging() {
    // No-op on desktop and in tests
}
