//! Location acquisition capability.
//!
//! Foreground watches and OS background wake-ups produce fixes through the
//! same trait, so either strategy can be swapped in without touching the
//! save or sync pipelines.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::LocationSample;
use crate::error::LocationError;

/// Parameters for a recurring platform watch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecurringFixConfig {
    /// Minimum movement before the platform reports a new fix
    pub min_distance_meters: f64,
    /// Minimum time between reported fixes
    pub min_interval_ms: u64,
}

impl Default for RecurringFixConfig {
    fn default() -> Self {
        Self {
            min_distance_meters: 20.0,
            min_interval_ms: 15_000,
        }
    }
}

impl RecurringFixConfig {
    pub fn with_min_distance(mut self, meters: f64) -> Self {
        self.min_distance_meters = meters;
        self
    }

    pub fn with_min_interval_ms(mut self, ms: u64) -> Self {
        self.min_interval_ms = ms;
        self
    }
}

/// Callback invoked with each fix from a recurring watch.
pub type FixCallback = Arc<dyn Fn(LocationSample) + Send + Sync>;

/// Handle to an active recurring watch.
///
/// Clones share the same active flag, so stopping through any clone stops them all.
#[derive(Debug, Clone)]
pub struct SubscriptionHandle {
    id: u64,
    active: Arc<AtomicBool>,
}

impl SubscriptionHandle {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            active: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Mark the handle stopped. Returns true only for the call that stopped it.
    pub fn deactivate(&self) -> bool {
        self.active.swap(false, Ordering::SeqCst)
    }
}

/// Platform positioning capability.
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// One-shot, highest-accuracy fix.
    async fn current_fix(&self) -> Result<LocationSample, LocationError>;

    /// Start a recurring watch; `callback` receives each new fix.
    async fn start_recurring_fix(
        &self,
        config: RecurringFixConfig,
        callback: FixCallback,
    ) -> Result<SubscriptionHandle, LocationError>;

    /// Cancel a watch. Stopping an inactive handle is a no-op.
    fn stop_recurring_fix(&self, handle: &SubscriptionHandle);

    /// Whether foreground location permission is granted.
    async fn has_permission(&self) -> bool {
        true
    }
}

#[async_trait]
impl<T: LocationProvider + ?Sized> LocationProvider for Arc<T> {
    async fn current_fix(&self) -> Result<LocationSample, LocationError> {
        (**self).current_fix().await
    }

    async fn start_recurring_fix(
        &self,
        config: RecurringFixConfig,
        callback: FixCallback,
    ) -> Result<SubscriptionHandle, LocationError> {
        (**self).start_recurring_fix(config, callback).await
    }

    fn stop_recurring_fix(&self, handle: &SubscriptionHandle) {
        (**self).stop_recurring_fix(handle)
    }

    async fn has_permission(&self) -> bool {
        (**self).has_permission().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedLocation {
        stops: Mutex<u32>,
    }

    #[async_trait]
    impl LocationProvider for FixedLocation {
        async fn current_fix(&self) -> Result<LocationSample, LocationError> {
            Ok(LocationSample::new(48.0, -114.0, 4.0, "test"))
        }

        async fn start_recurring_fix(
            &self,
            _config: RecurringFixConfig,
            callback: FixCallback,
        ) -> Result<SubscriptionHandle, LocationError> {
            callback(LocationSample::new(48.0, -114.0, 4.0, "watch"));
            Ok(SubscriptionHandle::new(7))
        }

        fn stop_recurring_fix(&self, handle: &SubscriptionHandle) {
            if handle.deactivate() {
                *self.stops.lock().unwrap() += 1;
            }
        }
    }

    #[tokio::test]
    async fn test_stop_is_idempotent() {
        let provider = Arc::new(FixedLocation {
            stops: Mutex::new(0),
        });
        let seen = Arc::new(Mutex::new(0));
        let s = Arc::clone(&seen);
        let handle = provider
            .start_recurring_fix(
                RecurringFixConfig::default(),
                Arc::new(move |_: LocationSample| *s.lock().unwrap() += 1),
            )
            .await
            .unwrap();

        assert_eq!(handle.id(), 7);
        assert_eq!(*seen.lock().unwrap(), 1);

        provider.stop_recurring_fix(&handle);
        provider.stop_recurring_fix(&handle.clone());
        assert!(!handle.is_active());
        assert_eq!(*provider.stops.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_default_permission_and_arc_forwarding() {
        let provider: Arc<dyn LocationProvider> = Arc::new(FixedLocation {
            stops: Mutex::new(0),
        });
        assert!(provider.has_permission().await);
        let fix = provider.current_fix().await.unwrap();
        assert_eq!(fix.source, "test");
    }

    #[test]
    fn test_config_builder() {
        let config = RecurringFixConfig::default()
            .with_min_distance(50.0)
            .with_min_interval_ms(1_000);
        assert_eq!(config.min_distance_meters, 50.0);
        assert_eq!(config.min_interval_ms, 1_000);
    }
}
