//! Acquisition decorators.
//!
//! Both wrap any [`LocationProvider`] and change only how one-shot fixes are
//! obtained. Recurring watches pass straight through.

use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};

use nightlight::{
    FixCallback, LocationError, LocationProvider, LocationSample, RecurringFixConfig,
    SubscriptionHandle,
};

/// Bounds `current_fix` with a timeout.
pub struct TimeoutLocation<P> {
    inner: P,
    timeout: Duration,
}

impl<P: LocationProvider> TimeoutLocation<P> {
    pub fn new(inner: P, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl<P: LocationProvider> LocationProvider for TimeoutLocation<P> {
    async fn current_fix(&self) -> Result<LocationSample, LocationError> {
        match tokio::time::timeout(self.timeout, self.inner.current_fix()).await {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout {
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    async fn start_recurring_fix(
        &self,
        config: RecurringFixConfig,
        callback: FixCallback,
    ) -> Result<SubscriptionHandle, LocationError> {
        self.inner.start_recurring_fix(config, callback).await
    }

    fn stop_recurring_fix(&self, handle: &SubscriptionHandle) {
        self.inner.stop_recurring_fix(handle)
    }

    async fn has_permission(&self) -> bool {
        self.inner.has_permission().await
    }
}

/// Polls `current_fix` until the reported accuracy is good enough.
///
/// Background wake-ups often get a coarse first fix; asking again usually
/// tightens it. Returns the most accurate fix seen across at most
/// `max_attempts` requests.
pub struct BestAccuracyLocation<P> {
    inner: P,
    max_attempts: u32,
    target_accuracy_meters: f64,
}

impl<P: LocationProvider> BestAccuracyLocation<P> {
    pub fn new(inner: P, max_attempts: u32, target_accuracy_meters: f64) -> Self {
        Self {
            inner,
            max_attempts: max_attempts.max(1),
            target_accuracy_meters,
        }
    }
}

#[async_trait]
impl<P: LocationProvider> LocationProvider for BestAccuracyLocation<P> {
    async fn current_fix(&self) -> Result<LocationSample, LocationError> {
        let mut best: Option<LocationSample> = None;
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.inner.current_fix().await {
                Ok(fix) => {
                    debug!(
                        "[BestAccuracyLocation] Attempt {}: accuracy {:.1}m",
                        attempt, fix.accuracy_meters
                    );
                    let good_enough = fix.accuracy_meters <= self.target_accuracy_meters;
                    if best
                        .as_ref()
                        .is_none_or(|b| fix.accuracy_meters < b.accuracy_meters)
                    {
                        best = Some(fix);
                    }
                    if good_enough {
                        break;
                    }
                }
                Err(LocationError::PermissionDenied) => return Err(LocationError::PermissionDenied),
                Err(e) => last_error = Some(e),
            }
        }

        match best {
            Some(fix) => {
                info!(
                    "[BestAccuracyLocation] Using fix with accuracy {:.1}m",
                    fix.accuracy_meters
                );
                Ok(fix)
            }
            None => Err(last_error.unwrap_or_else(|| {
                LocationError::HardwareUnavailable("no fix obtained".to_string())
            })),
        }
    }

    async fn start_recurring_fix(
        &self,
        config: RecurringFixConfig,
        callback: FixCallback,
    ) -> Result<SubscriptionHandle, LocationError> {
        self.inner.start_recurring_fix(config, callback).await
    }

    fn stop_recurring_fix(&self, handle: &SubscriptionHandle) {
        self.inner.stop_recurring_fix(handle)
    }

    async fn has_permission(&self) -> bool {
        self.inner.has_permission().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Returns scripted results in order, repeating the last one.
    struct ScriptedLocation {
        script: Vec<Result<f64, LocationError>>,
        calls: Mutex<usize>,
        delay: Duration,
    }

    impl ScriptedLocation {
        fn new(script: Vec<Result<f64, LocationError>>) -> Self {
            Self {
                script,
                calls: Mutex::new(0),
                delay: Duration::ZERO,
            }
        }

        fn calls(&self) -> usize {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl LocationProvider for ScriptedLocation {
        async fn current_fix(&self) -> Result<LocationSample, LocationError> {
            let index = {
                let mut calls = self.calls.lock().unwrap();
                *calls += 1;
                (*calls - 1).min(self.script.len() - 1)
            };
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.script[index]
                .clone()
                .map(|acc| LocationSample::new(48.0, -114.0, acc, "test"))
        }

        async fn start_recurring_fix(
            &self,
            _config: RecurringFixConfig,
            _callback: FixCallback,
        ) -> Result<SubscriptionHandle, LocationError> {
            Ok(SubscriptionHandle::new(1))
        }

        fn stop_recurring_fix(&self, handle: &SubscriptionHandle) {
            handle.deactivate();
        }
    }

    #[tokio::test]
    async fn test_timeout_fires() {
        let mut slow = ScriptedLocation::new(vec![Ok(5.0)]);
        slow.delay = Duration::from_millis(200);
        let provider = TimeoutLocation::new(slow, Duration::from_millis(20));

        assert_eq!(
            provider.current_fix().await,
            Err(LocationError::Timeout { after_ms: 20 })
        );
    }

    #[tokio::test]
    async fn test_timeout_passes_fast_fix() {
        let provider = TimeoutLocation::new(
            ScriptedLocation::new(vec![Ok(5.0)]),
            Duration::from_secs(1),
        );
        assert_eq!(provider.current_fix().await.unwrap().accuracy_meters, 5.0);
    }

    #[tokio::test]
    async fn test_best_accuracy_stops_when_good_enough() {
        let provider = BestAccuracyLocation::new(
            ScriptedLocation::new(vec![Ok(900.0), Ok(40.0), Ok(8.0), Ok(3.0)]),
            5,
            10.0,
        );
        let fix = provider.current_fix().await.unwrap();
        assert_eq!(fix.accuracy_meters, 8.0);
        assert_eq!(provider.inner.calls(), 3);
    }

    #[tokio::test]
    async fn test_best_accuracy_returns_best_seen() {
        let provider = BestAccuracyLocation::new(
            ScriptedLocation::new(vec![
                Ok(300.0),
                Err(LocationError::HardwareUnavailable("gps".into())),
                Ok(120.0),
            ]),
            3,
            10.0,
        );
        assert_eq!(provider.current_fix().await.unwrap().accuracy_meters, 120.0);
    }

    #[tokio::test]
    async fn test_best_accuracy_errors() {
        let provider = BestAccuracyLocation::new(
            ScriptedLocation::new(vec![Err(LocationError::PermissionDenied)]),
            3,
            10.0,
        );
        assert_eq!(
            provider.current_fix().await,
            Err(LocationError::PermissionDenied)
        );
        assert_eq!(provider.inner.calls(), 1);

        let provider = BestAccuracyLocation::new(
            ScriptedLocation::new(vec![Err(LocationError::HardwareUnavailable("gps".into()))]),
            2,
            10.0,
        );
        assert!(matches!(
            provider.current_fix().await,
            Err(LocationError::HardwareUnavailable(_))
        ));
    }
}
