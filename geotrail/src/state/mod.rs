//! Per-device tracking state.
//!
//! Maintains one [`DeviceState`] per distinct device identifier, created
//! lazily on first fix. Ingestion for different devices proceeds in
//! parallel; ingestion for the same device is serialized through the
//! per-device mutex, because mutations to one device's state are not
//! commutative - order determines trip boundaries.
//!
//! # Design
//!
//! - Devices live in a [`DashMap`] so unrelated devices never block each
//!   other.
//! - Each device's state sits behind a `parking_lot::Mutex`. Every critical
//!   section in the engine is synchronous, so the lock is never held across
//!   an await point.
//! - History is a bounded insertion-ordered ring: the most recent
//!   [`DEFAULT_HISTORY_CAPACITY`] fixes, oldest evicted first.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::Serialize;

use crate::geo::Coordinates;
use crate::model::{Fix, TripId};

/// Default number of fixes retained per device.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// Shared handle to one device's mutable tracking state.
pub type DeviceStateHandle = Arc<Mutex<DeviceState>>;

/// Mutable tracking state for one device.
///
/// Two distinct position references are kept on purpose: `last_fix` feeds
/// trip-gap detection and is updated by every fix, jittered or not, while
/// `last_trip_point` feeds jitter detection and only moves when a point is
/// actually written to a trip. Collapsing them would change trip-gap
/// semantics during long stationary periods.
#[derive(Debug, Default)]
pub struct DeviceState {
    /// Most recent fix, accepted or jitter-filtered.
    pub last_fix: Option<Fix>,
    /// Coordinates of the last point written to the active trip.
    pub last_trip_point: Option<Coordinates>,
    /// Bounded ring of the most recent fixes, oldest first.
    pub history: VecDeque<Fix>,
    /// Currently open trip, if any.
    pub active_trip: Option<TripId>,
    /// Next point sequence number within the active trip.
    pub next_seq: u64,
}

impl DeviceState {
    /// Create empty state for a device that has not reported yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a fix into `last_fix` and the history ring, evicting the
    /// oldest entry once `capacity` is exceeded.
    pub fn observe(&mut self, fix: Fix, capacity: usize) {
        self.last_fix = Some(fix.clone());
        self.history.push_back(fix);
        while self.history.len() > capacity {
            self.history.pop_front();
        }
    }
}

/// Read-only view of one device's live state.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceSnapshot {
    /// Most recent fix, or `None` for an unknown device.
    pub current: Option<Fix>,
    /// Recent fixes in arrival order, oldest first.
    pub history: Vec<Fix>,
}

impl DeviceSnapshot {
    /// Snapshot of a device that has never reported.
    pub fn empty() -> Self {
        Self {
            current: None,
            history: Vec::new(),
        }
    }
}

/// In-memory mapping from device identifier to tracking state.
///
/// Supports concurrent reads from many query callers while the segmentation
/// engine performs exclusive per-device mutation.
#[derive(Debug)]
pub struct DeviceStateStore {
    devices: DashMap<String, DeviceStateHandle>,
    history_capacity: usize,
}

impl Default for DeviceStateStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceStateStore {
    /// Create a store with the default history capacity.
    pub fn new() -> Self {
        Self::with_history_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a store retaining at most `capacity` fixes per device.
    pub fn with_history_capacity(capacity: usize) -> Self {
        Self {
            devices: DashMap::new(),
            history_capacity: capacity,
        }
    }

    /// History capacity applied to every device.
    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Look up a device's state, creating empty state on first contact.
    pub fn get_or_create(&self, device_id: &str) -> DeviceStateHandle {
        if let Some(existing) = self.devices.get(device_id) {
            return Arc::clone(existing.value());
        }
        Arc::clone(
            self.devices
                .entry(device_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(DeviceState::new())))
                .value(),
        )
    }

    /// Snapshot one device, or `None` if it has never reported.
    pub fn snapshot(&self, device_id: &str) -> Option<DeviceSnapshot> {
        self.devices.get(device_id).map(|entry| {
            let state = entry.value().lock();
            DeviceSnapshot {
                current: state.last_fix.clone(),
                history: state.history.iter().cloned().collect(),
            }
        })
    }

    /// Snapshot every known device, keyed by device id.
    pub fn snapshot_all(&self) -> BTreeMap<String, DeviceSnapshot> {
        self.devices
            .iter()
            .map(|entry| {
                let state = entry.value().lock();
                (
                    entry.key().clone(),
                    DeviceSnapshot {
                        current: state.last_fix.clone(),
                        history: state.history.iter().cloned().collect(),
                    },
                )
            })
            .collect()
    }

    /// All known device identifiers, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Handles to every device's state, for callers that need exclusive
    /// access across the whole fleet (reset).
    pub fn handles(&self) -> Vec<(String, DeviceStateHandle)> {
        self.devices
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect()
    }

    /// Number of known devices.
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether no device has reported yet.
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Remove every device's state. Persisted trips are not touched; this
    /// only clears the live view.
    pub fn reset_all(&self) {
        self.devices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn fix(device: &str, n: i64) -> Fix {
        Fix::new(
            device,
            41.0 + n as f64 * 0.001,
            29.0,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(n),
        )
    }

    #[test]
    fn test_get_or_create_is_lazy_and_stable() {
        let store = DeviceStateStore::new();
        assert!(store.is_empty());

        let first = store.get_or_create("bike1");
        let second = store.get_or_create("bike1");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_observe_updates_last_fix_and_history() {
        let mut state = DeviceState::new();
        state.observe(fix("bike1", 0), 200);
        state.observe(fix("bike1", 1), 200);

        assert_eq!(state.history.len(), 2);
        assert_eq!(state.last_fix.as_ref().unwrap().timestamp, fix("bike1", 1).timestamp);
        // History is arrival-ordered, oldest first.
        assert_eq!(state.history[0].timestamp, fix("bike1", 0).timestamp);
    }

    #[test]
    fn test_history_evicts_oldest_past_capacity() {
        let mut state = DeviceState::new();
        for n in 0..250 {
            state.observe(fix("bike1", n), DEFAULT_HISTORY_CAPACITY);
        }

        assert_eq!(state.history.len(), DEFAULT_HISTORY_CAPACITY);
        // Entries 0..=49 were evicted; the ring starts at 50.
        assert_eq!(state.history.front().unwrap().timestamp, fix("bike1", 50).timestamp);
        assert_eq!(state.history.back().unwrap().timestamp, fix("bike1", 249).timestamp);
    }

    #[test]
    fn test_snapshot_unknown_device_is_none() {
        let store = DeviceStateStore::new();
        assert!(store.snapshot("ghost").is_none());
    }

    #[test]
    fn test_snapshot_is_independent_copy() {
        let store = DeviceStateStore::new();
        let handle = store.get_or_create("bike1");
        handle.lock().observe(fix("bike1", 0), 200);

        let snap = store.snapshot("bike1").unwrap();
        handle.lock().observe(fix("bike1", 1), 200);

        // The earlier snapshot does not see the later fix.
        assert_eq!(snap.history.len(), 1);
    }

    #[test]
    fn test_device_ids_sorted() {
        let store = DeviceStateStore::new();
        store.get_or_create("zulu");
        store.get_or_create("alpha");
        store.get_or_create("mike");

        assert_eq!(store.device_ids(), vec!["alpha", "mike", "zulu"]);
    }

    #[test]
    fn test_reset_all_clears_every_device() {
        let store = DeviceStateStore::new();
        store.get_or_create("bike1").lock().observe(fix("bike1", 0), 200);
        store.get_or_create("car2").lock().observe(fix("car2", 0), 200);

        store.reset_all();

        assert!(store.is_empty());
        assert!(store.snapshot_all().is_empty());
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn test_history_never_exceeds_capacity(
                capacity in 1usize..64,
                count in 0usize..256,
            ) {
                let mut state = DeviceState::new();
                for n in 0..count {
                    state.observe(fix("dev", n as i64), capacity);
                }
                prop_assert!(state.history.len() <= capacity);
                prop_assert_eq!(state.history.len(), count.min(capacity));
            }

            #[test]
            fn test_history_keeps_most_recent_in_order(
                capacity in 1usize..32,
                count in 1usize..128,
            ) {
                let mut state = DeviceState::new();
                for n in 0..count {
                    state.observe(fix("dev", n as i64), capacity);
                }
                let expected_first = count.saturating_sub(capacity) as i64;
                let timestamps: Vec<_> =
                    state.history.iter().map(|f| f.timestamp).collect();
                for (offset, ts) in timestamps.iter().enumerate() {
                    prop_assert_eq!(
                        *ts,
                        fix("dev", expected_first + offset as i64).timestamp
                    );
                }
            }
        }
    }
}
