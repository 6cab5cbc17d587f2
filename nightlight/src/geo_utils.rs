//! Geographic and time utilities.
//!
//! Distance, unit conversion, coordinate parsing and the timestamp formats
//! used by the offline queue and the user-facing screens.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::LocationSample;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

pub const METERS_PER_MILE: f64 = 1609.34;
pub const FEET_PER_MILE: f64 = 5280.0;
pub const FEET_PER_METER: f64 = 3.281;

// ============================================================================
// Distance
// ============================================================================

/// Great-circle distance between two points in meters.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);

    let c = 2.0 * a.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}

/// Distance between two samples in meters.
pub fn sample_distance(a: &LocationSample, b: &LocationSample) -> f64 {
    haversine_distance(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Great-circle distance in miles.
pub fn haversine_miles(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    haversine_distance(lat1, lon1, lat2, lon2) / METERS_PER_MILE
}

/// True when `current` has moved strictly more than `threshold_meters` from `previous`.
pub fn should_persist(
    current: &LocationSample,
    previous: &LocationSample,
    threshold_meters: f64,
) -> bool {
    sample_distance(current, previous) > threshold_meters
}

/// Distance from each point to the one before it, in meters.
///
/// The first entry is 0. An entry is `None` when it or the point before it
/// is missing.
pub fn consecutive_distances(points: &[Option<(f64, f64)>]) -> Vec<Option<f64>> {
    points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            if i == 0 {
                return Some(0.0);
            }
            match (points[i - 1], *point) {
                (Some((lat1, lon1)), Some((lat2, lon2))) => {
                    Some(haversine_distance(lat1, lon1, lat2, lon2))
                }
                _ => None,
            }
        })
        .collect()
}

// ============================================================================
// Unit Conversions
// ============================================================================

pub fn feet_to_miles(feet: f64) -> f64 {
    feet / FEET_PER_MILE
}

/// Miles to whole feet.
pub fn miles_to_feet(miles: f64) -> i64 {
    (miles * FEET_PER_MILE).round() as i64
}

/// Miles to whole meters.
pub fn miles_to_meters(miles: f64) -> i64 {
    (miles * METERS_PER_MILE).round() as i64
}

/// Meters to feet; meters are truncated to a whole number first.
pub fn meters_to_feet(meters: f64) -> f64 {
    meters.trunc() * FEET_PER_METER
}

// ============================================================================
// Parsing
// ============================================================================

/// Parse a `"(lat, lng)"` string as produced by map pickers.
///
/// Surrounding parentheses and whitespace are optional.
pub fn parse_coordinate_string(input: &str) -> Option<(f64, f64)> {
    let trimmed = input
        .trim()
        .trim_start_matches('(')
        .trim_end_matches(')');
    let (lat, lng) = trimmed.split_once(',')?;
    let lat = lat.trim().parse::<f64>().ok()?;
    let lng = lng.trim().parse::<f64>().ok()?;
    if !lat.is_finite() || !lng.is_finite() {
        return None;
    }
    Some((lat, lng))
}

// ============================================================================
// Timestamps
// ============================================================================

/// Storage timestamp format: `2022-06-01T14:42:55.000Z` (UTC, millisecond precision).
pub fn format_db_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

pub fn db_timestamp_now() -> String {
    format_db_timestamp(&Utc::now())
}

/// Parse a storage timestamp back into UTC.
///
/// Accepts RFC 3339 with any offset and the bare `YYYY-MM-DD HH:MM:SS` form.
pub fn parse_db_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Clock display format `YYYY/MM/DD HH:MM:SS` in the given zone.
pub fn format_local_timestamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y/%m/%d %H:%M:%S").to_string()
}

/// History display format: `06/01/2022 at 2:42 pm.`
///
/// Returns `None` for values that are not RFC 3339 timestamps.
pub fn format_display_date(value: &str) -> Option<String> {
    let parsed = DateTime::parse_from_rfc3339(value).ok()?;
    Some(parsed.format("%m/%d/%Y at %-I:%M %P.").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // One hundredth of a degree of longitude at 48N
        let d = haversine_distance(48.0, -114.01, 48.0, -114.0);
        assert!((d - 744.0).abs() < 5.0, "got {}", d);

        assert_eq!(haversine_distance(10.0, 10.0, 10.0, 10.0), 0.0);
    }

    #[test]
    fn test_haversine_symmetric() {
        let a = haversine_distance(51.5074, -0.1278, 48.8566, 2.3522);
        let b = haversine_distance(48.8566, 2.3522, 51.5074, -0.1278);
        assert!((a - b).abs() < 1e-6);
        // London to Paris is roughly 344km
        assert!((a / 1000.0 - 344.0).abs() < 5.0);
    }

    #[test]
    fn test_should_persist_threshold_is_strict() {
        let previous = LocationSample::new(48.0, -114.01, 5.0, "test");
        let current = LocationSample::new(48.0, -114.0, 5.0, "test");
        assert!(should_persist(&current, &previous, 409.0));
        assert!(!should_persist(&current, &previous, 1000.0));
        assert!(!should_persist(&current, &current, 0.0));
    }

    #[test]
    fn test_conversions() {
        assert_eq!(miles_to_feet(1.0), 5280);
        assert_eq!(miles_to_meters(1.0), 1609);
        assert!((feet_to_miles(2640.0) - 0.5).abs() < 1e-9);
        assert!((meters_to_feet(10.9) - 32.81).abs() < 1e-9);
    }

    #[test]
    fn test_parse_coordinate_string() {
        assert_eq!(
            parse_coordinate_string("(48.27, -114.34)"),
            Some((48.27, -114.34))
        );
        assert_eq!(parse_coordinate_string("48.27,-114.34"), Some((48.27, -114.34)));
        assert_eq!(parse_coordinate_string("(48.27)"), None);
        assert_eq!(parse_coordinate_string("(abc, 1)"), None);
    }

    #[test]
    fn test_consecutive_distances() {
        assert!(consecutive_distances(&[]).is_empty());
        let d = consecutive_distances(&[
            Some((48.0, -114.01)),
            Some((48.0, -114.0)),
            Some((48.0, -114.0)),
            None,
            Some((48.0, -114.0)),
        ]);
        assert_eq!(d.len(), 5);
        assert_eq!(d[0], Some(0.0));
        assert!(d[1].unwrap() > 700.0);
        assert_eq!(d[2], Some(0.0));
        assert_eq!(d[3], None);
        assert_eq!(d[4], None);

        // A missing first point still reads as 0
        assert_eq!(consecutive_distances(&[None]), vec![Some(0.0)]);
    }

    #[test]
    fn test_haversine_miles() {
        // One degree of latitude is about 69 miles
        let miles = haversine_miles(48.0, -114.0, 49.0, -114.0);
        assert!((miles - 69.1).abs() < 0.5, "got {}", miles);
    }

    #[test]
    fn test_db_timestamp_format() {
        let at = Utc.with_ymd_and_hms(2022, 6, 1, 14, 42, 55).unwrap();
        assert_eq!(format_db_timestamp(&at), "2022-06-01T14:42:55.000Z");
        assert_eq!(parse_db_timestamp("2022-06-01T14:42:55.000Z"), Some(at));
        assert_eq!(parse_db_timestamp("2022-06-01 14:42:55"), Some(at));
        assert_eq!(parse_db_timestamp("yesterday"), None);
    }

    #[test]
    fn test_display_formats() {
        assert_eq!(
            format_display_date("2022-06-01T14:42:55.865Z").as_deref(),
            Some("06/01/2022 at 2:42 pm.")
        );
        assert_eq!(
            format_display_date("2022-06-01T00:05:00.000Z").as_deref(),
            Some("06/01/2022 at 12:05 am.")
        );
        assert_eq!(format_display_date("not a date"), None);

        let at = Utc.with_ymd_and_hms(2022, 6, 1, 9, 3, 7).unwrap();
        assert_eq!(format_local_timestamp(&at), "2022/06/01 09:03:07");
    }
}
