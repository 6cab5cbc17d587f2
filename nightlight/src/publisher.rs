//! In-memory location pub/sub.
//!
//! The foreground tracker publishes every fix here; screens subscribe to
//! redraw. The publisher also remembers the last two fixes so it can answer
//! whether the device has moved far enough to warrant a save.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::debug;

use crate::LocationSample;
use crate::geo_utils::should_persist;

/// Movement required between published fixes before a save is worthwhile.
pub const DEFAULT_SAVE_DISTANCE_METERS: f64 = 409.0;

/// Handle returned by [`LocationPublisher::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Arc<dyn Fn(&LocationSample) + Send + Sync>;

struct PublisherState {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    latest: Option<LocationSample>,
    previous: Option<LocationSample>,
    save_distance_meters: f64,
}

pub struct LocationPublisher {
    state: Mutex<PublisherState>,
}

impl Default for LocationPublisher {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationPublisher {
    pub fn new() -> Self {
        Self::with_save_distance(DEFAULT_SAVE_DISTANCE_METERS)
    }

    pub fn with_save_distance(save_distance_meters: f64) -> Self {
        Self {
            state: Mutex::new(PublisherState {
                next_id: 1,
                subscribers: Vec::new(),
                latest: None,
                previous: None,
                save_distance_meters,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PublisherState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(&LocationSample) + Send + Sync + 'static,
    {
        let mut state = self.lock();
        let id = SubscriptionId(state.next_id);
        state.next_id += 1;
        state.subscribers.push((id, Arc::new(callback)));
        id
    }

    /// Returns false when the id was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut state = self.lock();
        let before = state.subscribers.len();
        state.subscribers.retain(|(sid, _)| *sid != id);
        state.subscribers.len() != before
    }

    /// Record a new fix and notify subscribers in subscription order.
    ///
    /// Callbacks run without the lock held, so they may subscribe or read state.
    pub fn publish(&self, sample: LocationSample) {
        let subscribers: Vec<Subscriber> = {
            let mut state = self.lock();
            state.previous = state.latest.take();
            state.latest = Some(sample.clone());
            state.subscribers.iter().map(|(_, s)| Arc::clone(s)).collect()
        };
        debug!(
            "[LocationPublisher] Fix ({:.5}, {:.5}) to {} subscribers",
            sample.latitude,
            sample.longitude,
            subscribers.len()
        );
        for subscriber in subscribers {
            subscriber(&sample);
        }
    }

    /// Drop all subscribers and forget remembered fixes.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.subscribers.clear();
        state.latest = None;
        state.previous = None;
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    pub fn latest(&self) -> Option<LocationSample> {
        self.lock().latest.clone()
    }

    pub fn previous(&self) -> Option<LocationSample> {
        self.lock().previous.clone()
    }

    /// Whether the latest fix is far enough from the one before it.
    ///
    /// With only one fix published there is nothing to compare, so it is
    /// always worth saving. With none, there is nothing to save.
    pub fn ready_to_save(&self) -> bool {
        let state = self.lock();
        match (&state.latest, &state.previous) {
            (Some(_), None) => true,
            (Some(latest), Some(previous)) => {
                should_persist(latest, previous, state.save_distance_meters)
            }
            (None, _) => false,
        }
    }

    pub fn save_distance(&self) -> f64 {
        self.lock().save_distance_meters
    }

    pub fn set_save_distance(&self, meters: f64) {
        self.lock().save_distance_meters = meters;
    }
}
