//! # Nightlight
//!
//! Core location types and pure algorithms for the Nightlight location-sharing client.
//!
//! This library provides:
//! - GPS samples and the compact `{lat, long, acc, src}` payload stored in the offline queue
//! - Haversine distance, unit conversions, coordinate parsing and timestamp formatting
//! - An in-memory location publisher with distance-based save gating
//! - Capability traits for location acquisition and remote delivery
//!
//! Storage, HTTP and mobile bindings live in `nightlightrs`.
//!
//! ## Quick Start
//!
//! ```rust
//! use nightlight::{LocationSample, geo_utils::should_persist};
//!
//! let previous = LocationSample::new(48.0, -114.01, 5.0, "example");
//! let current = LocationSample::new(48.0, -114.0, 5.0, "example");
//!
//! // ~744m apart, so a 409m gate fires
//! assert!(should_persist(&current, &previous, 409.0));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{DeliveryError, LocationError, ValidationError};

// Geographic utilities (distance, conversions, timestamps)
pub mod geo_utils;
pub use geo_utils::{haversine_distance, should_persist};

// Offline queue payload codec
pub mod payload;
pub use payload::{LOCATION_CATEGORY, LocationPayload};

// Foreground pub/sub location service
pub mod publisher;
pub use publisher::{DEFAULT_SAVE_DISTANCE_METERS, LocationPublisher, SubscriptionId};

// Location acquisition capability
pub mod location;
pub use location::{FixCallback, LocationProvider, RecurringFixConfig, SubscriptionHandle};

// Remote location API capability
pub mod api;
pub use api::{
    ApiResponse, Delivery, LocationApi, LocationSubmission, RemoteDelivery, StaticToken, TokenStore,
};

/// Source label for fixes captured while the app is in the foreground.
pub const SOURCE_FOREGROUND: &str = "foreground";

/// Source label for fixes captured by the OS-scheduled background task.
pub const SOURCE_BACKGROUND: &str = "background-task";

// ============================================================================
// Core Types
// ============================================================================

/// A single GPS fix produced by location acquisition.
///
/// Samples are transient: they are never stored directly, only as a
/// [`LocationPayload`] wrapped in a queued record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level, when the platform reports one
    pub elevation_meters: Option<f64>,
    /// Horizontal accuracy radius in meters
    pub accuracy_meters: f64,
    pub captured_at: DateTime<Utc>,
    /// Who produced the fix ("foreground", "background-task", ...)
    pub source: String,
}

impl LocationSample {
    /// Create a sample captured now.
    pub fn new(latitude: f64, longitude: f64, accuracy_meters: f64, source: &str) -> Self {
        Self {
            latitude,
            longitude,
            elevation_meters: None,
            accuracy_meters,
            captured_at: Utc::now(),
            source: source.to_string(),
        }
    }

    pub fn with_elevation(mut self, elevation_meters: f64) -> Self {
        self.elevation_meters = Some(elevation_meters);
        self
    }

    pub fn with_captured_at(mut self, captured_at: DateTime<Utc>) -> Self {
        self.captured_at = captured_at;
        self
    }

    /// Check that latitude and longitude are usable coordinates.
    pub fn validate(&self) -> Result<(), ValidationError> {
        error::validate_coordinates(self.latitude, self.longitude)
    }

    /// The compact form stored in the offline queue.
    pub fn to_payload(&self) -> LocationPayload {
        LocationPayload::from_sample(self)
    }
}
