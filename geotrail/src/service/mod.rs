//! Boundary operations of the tracking core.
//!
//! [`TrackingService`] ties the segmentation engine, device state store,
//! trip store, and broadcaster together and exposes the operations adapters
//! call: batch ingest, current-position and history queries, trip listing,
//! reset, and live subscription. Adapters (such as the HTTP surface in
//! `geotrail-cli`) stay thin translation layers over this type.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::broadcast::{Broadcaster, SubscriberFilter, Subscription};
use crate::engine::{IngestError, TripSegmenter};
use crate::model::{AcceptedFix, TripRecord};
use crate::state::{DeviceSnapshot, DeviceStateStore};
use crate::store::{TripStore, TripStoreError};
use crate::telemetry::{TelemetrySnapshot, TrackerMetrics};

/// Device id used when an inbound report names none.
pub const DEFAULT_DEVICE_ID: &str = "default";

/// The assembled tracking core.
pub struct TrackingService {
    states: Arc<DeviceStateStore>,
    engine: TripSegmenter,
    store: Arc<dyn TripStore>,
    broadcaster: Arc<Broadcaster>,
    metrics: Arc<TrackerMetrics>,
}

impl TrackingService {
    /// Assemble the service from its components. Callers normally go
    /// through [`crate::app::TrackerApp`], which also owns the persistence
    /// writer feeding `engine`.
    pub fn new(
        states: Arc<DeviceStateStore>,
        engine: TripSegmenter,
        store: Arc<dyn TripStore>,
        broadcaster: Arc<Broadcaster>,
        metrics: Arc<TrackerMetrics>,
    ) -> Self {
        Self {
            states,
            engine,
            store,
            broadcaster,
            metrics,
        }
    }

    /// Ingest one inbound report for one or more devices.
    ///
    /// Every device in the batch is stamped with the same receipt-time
    /// instant and processed independently; there is no cross-device
    /// interaction. An empty id list falls back to
    /// [`DEFAULT_DEVICE_ID`]. Accepted fixes are broadcast to matching
    /// subscribers before this call returns.
    pub fn ingest(
        &self,
        device_ids: &[String],
        lat: f64,
        lng: f64,
    ) -> Result<Vec<AcceptedFix>, IngestError> {
        let timestamp = Utc::now();
        let default_ids;
        let ids: &[String] = if device_ids.is_empty() {
            default_ids = [DEFAULT_DEVICE_ID.to_string()];
            &default_ids
        } else {
            device_ids
        };

        let mut accepted = Vec::with_capacity(ids.len());
        for device_id in ids {
            let result = self.engine.ingest(device_id, lat, lng, timestamp)?;
            debug!(device_id = %device_id, recorded = result.recorded, "Ingested fix");
            self.broadcaster.publish(&result.fix);
            accepted.push(result);
        }
        Ok(accepted)
    }

    /// Current position and bounded history for one device. Unknown
    /// devices yield an empty snapshot, never an error.
    pub fn current_and_history(&self, device_id: &str) -> DeviceSnapshot {
        self.states
            .snapshot(device_id)
            .unwrap_or_else(DeviceSnapshot::empty)
    }

    /// Current position and bounded history for every known device.
    pub fn all_current_and_history(&self) -> BTreeMap<String, DeviceSnapshot> {
        self.states.snapshot_all()
    }

    /// All trips for a device ordered by start time, points in `seq`
    /// order, including the currently open trip if any.
    pub async fn list_trips(&self, device_id: &str) -> Result<Vec<TripRecord>, TripStoreError> {
        self.store.list_trips(device_id).await
    }

    /// All known device identifiers, sorted.
    pub fn device_ids(&self) -> Vec<String> {
        self.states.device_ids()
    }

    /// Seal open trips and clear all live device state. Persisted trips
    /// and points are untouched.
    pub fn reset_all(&self) {
        self.engine.reset_all();
    }

    /// Open a live subscription.
    ///
    /// The subscription first receives each matching device's last known
    /// fix as a snapshot catch-up, then subsequent live fixes as they are
    /// accepted.
    pub fn subscribe(&self, filter: SubscriberFilter) -> Subscription {
        let catch_up: Vec<_> = self
            .states
            .snapshot_all()
            .into_iter()
            .filter(|(device_id, _)| filter.matches(device_id))
            .filter_map(|(_, snapshot)| snapshot.current)
            .collect();
        self.broadcaster.subscribe(filter, catch_up)
    }

    /// Point-in-time pipeline counters.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.metrics.snapshot()
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.broadcaster.subscriber_count()
    }
}
