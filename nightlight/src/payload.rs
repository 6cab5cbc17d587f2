//! Offline queue payload codec.
//!
//! Queued records carry a compact JSON object `{"lat", "long", "acc", "src"}`.
//! Decoding is strict about coordinates and lenient about the rest: a missing
//! accuracy reads as 0 and a missing source as the empty string.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::LocationSample;
use crate::error::{ValidationError, validate_coordinates};

/// Category tag for location records in the offline queue.
pub const LOCATION_CATEGORY: &str = "location";

/// The compact location stored as a queued record's payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationPayload {
    pub lat: f64,
    pub long: f64,
    #[serde(default)]
    pub acc: f64,
    #[serde(default)]
    pub src: String,
}

impl LocationPayload {
    pub fn from_sample(sample: &LocationSample) -> Self {
        Self {
            lat: sample.latitude,
            long: sample.longitude,
            acc: sample.accuracy_meters,
            src: sample.source.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        validate_coordinates(self.lat, self.long)
    }

    /// Serialize after validating coordinates.
    pub fn to_json(&self) -> Result<String, ValidationError> {
        self.validate()?;
        serde_json::to_string(self).map_err(|e| ValidationError::MalformedPayload(e.to_string()))
    }

    /// Decode a stored payload.
    ///
    /// Numbers encoded as strings (`"48.2"`) are accepted, matching what
    /// older clients wrote.
    pub fn decode(json: &str) -> Result<Self, ValidationError> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| ValidationError::MalformedPayload(e.to_string()))?;
        let object = value
            .as_object()
            .ok_or_else(|| ValidationError::MalformedPayload("payload is not an object".into()))?;

        let lat = match object.get("lat") {
            None | Some(Value::Null) => return Err(ValidationError::MissingLatitude),
            Some(v) => numeric(v).ok_or_else(|| ValidationError::LatitudeNotNumeric(v.to_string()))?,
        };
        let long = match object.get("long") {
            None | Some(Value::Null) => return Err(ValidationError::MissingLongitude),
            Some(v) => numeric(v).ok_or_else(|| ValidationError::LongitudeNotNumeric(v.to_string()))?,
        };
        let acc = object.get("acc").and_then(numeric).unwrap_or(0.0);
        let src = match object.get("src") {
            Some(Value::String(s)) => s.clone(),
            _ => String::new(),
        };

        let payload = Self { lat, long, acc, src };
        payload.validate()?;
        Ok(payload)
    }
}

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}
