//! User settings and core configuration.

use std::sync::{PoisonError, RwLock};

use log::warn;
use serde_json::Value;

// ============================================================================
// User Settings
// ============================================================================

pub const DEFAULT_UPDATE_DISTANCE_METERS: f64 = 20.0;
pub const DEFAULT_HISTORY_DISPLAY_DENSITY: u32 = 0;

/// Per-user preferences fetched from the server.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UserSettings {
    /// Minimum movement between background saves
    pub update_distance_meters: f64,
    /// How many history points the map shows; presentation only
    pub history_display_density: u32,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            update_distance_meters: DEFAULT_UPDATE_DISTANCE_METERS,
            history_display_density: DEFAULT_HISTORY_DISPLAY_DENSITY,
        }
    }
}

impl UserSettings {
    /// Parse the server's settings object.
    ///
    /// Values may arrive as numbers or numeric strings. Anything missing or
    /// unreadable falls back to its default, as does a non-positive distance.
    pub fn from_json(json: &str) -> Self {
        let value: Value = match serde_json::from_str(json) {
            Ok(v) => v,
            Err(e) => {
                warn!("[Settings] Unreadable settings JSON, using defaults: {}", e);
                return Self::default();
            }
        };

        let update_distance_meters = value
            .get("updateDistance")
            .and_then(lenient_number)
            .filter(|d| *d > 0.0)
            .unwrap_or(DEFAULT_UPDATE_DISTANCE_METERS);
        let history_display_density = value
            .get("updateSpeed")
            .and_then(lenient_number)
            .filter(|d| *d >= 0.0)
            .map(|d| d as u32)
            .unwrap_or(DEFAULT_HISTORY_DISPLAY_DENSITY);

        Self {
            update_distance_meters,
            history_display_density,
        }
    }
}

/// Integer-prefix parse of a JSON number or string ("500m" reads as 500).
fn lenient_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().map(f64::trunc),
        Value::String(s) => {
            let s = s.trim();
            let end = s
                .char_indices()
                .find(|(i, c)| !(c.is_ascii_digit() || (*i == 0 && (*c == '-' || *c == '+'))))
                .map(|(i, _)| i)
                .unwrap_or(s.len());
            s[..end].parse::<i64>().ok().map(|n| n as f64)
        }
        _ => None,
    }
}

/// Source of the current user settings.
pub trait SettingsProvider: Send + Sync {
    fn current(&self) -> UserSettings;
}

/// Settings that never change.
pub struct StaticSettings(pub UserSettings);

impl SettingsProvider for StaticSettings {
    fn current(&self) -> UserSettings {
        self.0
    }
}

/// Settings replaced whenever the host fetches new ones.
#[derive(Default)]
pub struct SharedSettings {
    inner: RwLock<UserSettings>,
}

impl SharedSettings {
    pub fn new(settings: UserSettings) -> Self {
        Self {
            inner: RwLock::new(settings),
        }
    }

    pub fn replace(&self, settings: UserSettings) {
        *self.inner.write().unwrap_or_else(PoisonError::into_inner) = settings;
    }
}

impl SettingsProvider for SharedSettings {
    fn current(&self) -> UserSettings {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Core Configuration
// ============================================================================

/// Wiring for the mobile core.
#[derive(Debug, Clone, PartialEq)]
pub struct CoreConfig {
    pub api_url: String,
    /// Path appended to `api_url` for location submissions
    pub location_endpoint: String,
    pub db_path: String,
    pub background_task_name: String,
    pub background_interval_minutes: u32,
    pub request_timeout_secs: u64,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            location_endpoint: "/api/location".to_string(),
            db_path: "nightlight.db".to_string(),
            background_task_name: "nightlight-background-location".to_string(),
            background_interval_minutes: 15,
            request_timeout_secs: 30,
        }
    }
}

impl CoreConfig {
    /// Constructs a config from environment variables.
    ///
    /// Environment variables:
    /// - `NIGHTLIGHT_API_URL`
    /// - `NIGHTLIGHT_DB_PATH`
    /// - `NIGHTLIGHT_BG_INTERVAL_MIN` (default: 15)
    /// - `NIGHTLIGHT_HTTP_TIMEOUT_SECS` (default: 30)
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`CoreConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(url) = lookup("NIGHTLIGHT_API_URL").filter(|s| !s.trim().is_empty()) {
            config.api_url = url.trim().to_string();
        }
        if let Some(path) = lookup("NIGHTLIGHT_DB_PATH").filter(|s| !s.trim().is_empty()) {
            config.db_path = path;
        }
        if let Some(minutes) = lookup("NIGHTLIGHT_BG_INTERVAL_MIN").and_then(|s| s.trim().parse().ok())
        {
            config.background_interval_minutes = minutes;
        }
        if let Some(secs) = lookup("NIGHTLIGHT_HTTP_TIMEOUT_SECS").and_then(|s| s.trim().parse().ok())
        {
            config.request_timeout_secs = secs;
        }
        config
    }

    pub fn with_api_url(mut self, api_url: &str) -> Self {
        self.api_url = api_url.to_string();
        self
    }

    pub fn with_location_endpoint(mut self, endpoint: &str) -> Self {
        self.location_endpoint = endpoint.to_string();
        self
    }

    pub fn with_db_path(mut self, db_path: &str) -> Self {
        self.db_path = db_path.to_string();
        self
    }

    pub fn with_background_task_name(mut self, name: &str) -> Self {
        self.background_task_name = name.to_string();
        self
    }

    pub fn with_background_interval_minutes(mut self, minutes: u32) -> Self {
        self.background_interval_minutes = minutes;
        self
    }

    pub fn with_request_timeout_secs(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    /// Full URL for location submissions.
    pub fn location_url(&self) -> String {
        format!(
            "{}/{}",
            self.api_url.trim_end_matches('/'),
            self.location_endpoint.trim_start_matches('/')
        )
    }
}
