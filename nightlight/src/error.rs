//! Unified error handling for the nightlight library.
//!
//! Three failure families exist: bad coordinates or payloads (`ValidationError`),
//! location acquisition failures (`LocationError`) and remote delivery
//! failures (`DeliveryError`). Delivery failures are never fatal: callers
//! fall back to the offline queue.

use thiserror::Error;

/// A sample or stored payload that cannot be used as a location.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("payload has no latitude")]
    MissingLatitude,

    #[error("payload has no longitude")]
    MissingLongitude,

    #[error("latitude is not a number: {0}")]
    LatitudeNotNumeric(String),

    #[error("longitude is not a number: {0}")]
    LongitudeNotNumeric(String),

    #[error("latitude {0} is outside [-90, 90]")]
    LatitudeOutOfRange(f64),

    #[error("longitude {0} is outside [-180, 180]")]
    LongitudeOutOfRange(f64),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}

/// Location acquisition failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,

    #[error("location hardware unavailable: {0}")]
    HardwareUnavailable(String),

    #[error("no location fix within {after_ms}ms")]
    Timeout { after_ms: u64 },
}

/// Remote delivery of a location failed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DeliveryError {
    /// Network unreachable, DNS failure, timeout, unreadable response
    #[error("transport error: {0}")]
    Transport(String),

    #[error("server returned HTTP {status}")]
    Http { status: u16 },

    /// Server refused the bearer token
    #[error("unauthorized")]
    Unauthorized,

    /// Server answered but did not report success
    #[error("rejected by server: {message}")]
    Rejected { message: String },

    /// No auth token available, nothing was sent
    #[error("no auth token available")]
    MissingToken,
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Check latitude/longitude are finite and inside their valid ranges.
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() {
        return Err(ValidationError::LatitudeNotNumeric(latitude.to_string()));
    }
    if !longitude.is_finite() {
        return Err(ValidationError::LongitudeNotNumeric(longitude.to_string()));
    }
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(ValidationError::LatitudeOutOfRange(latitude));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(ValidationError::LongitudeOutOfRange(longitude));
    }
    Ok(())
}
