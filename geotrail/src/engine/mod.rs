//! Trip segmentation engine.
//!
//! Consumes one incoming fix at a time for a device and decides whether to
//! discard it as stationary jitter, append it to the active trip, or close
//! the active trip and open a new one. The two heuristics are orthogonal on
//! purpose: a long reporting gap always forces a new trip even if the
//! resulting displacement is small, because elapsed time, not distance, is
//! the dominant trip-boundary signal. Distance filtering exists purely to
//! keep GPS noise out of the point log while a device sits still.
//!
//! # Decision procedure
//!
//! ```text
//! fix ──► gap since last_fix > TRIP_GAP? ──yes──► close open trip,
//!              │                                  open new trip, seq = 0
//!              no
//!              ▼
//!         within MIN_DISTANCE of last_trip_point? ──yes──► history only
//!              │
//!              no ──► append as next point of the open trip
//! ```
//!
//! Every structurally valid fix updates `last_fix` and the history ring,
//! jittered or not. `last_trip_point` only moves when a point is written to
//! a trip; the two references must not be collapsed (see `state` module).
//!
//! Persistence is enqueued, never awaited: the device lock is held only for
//! the synchronous decision, so ingestion for unrelated devices proceeds in
//! parallel and storage latency never reaches the caller.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::geo::Coordinates;
use crate::model::{AcceptedFix, Fix, Trip, TripId, TripPoint};
use crate::state::{DeviceState, DeviceStateStore};
use crate::store::{PersistCommand, PersistenceHandle};
use crate::telemetry::TrackerMetrics;

/// Reporting gap beyond which a new trip starts regardless of distance.
pub const DEFAULT_TRIP_GAP: Duration = Duration::from_secs(5 * 60);

/// Minimum displacement from the last recorded trip point for a fix to
/// count as movement.
pub const DEFAULT_MIN_DISTANCE_M: f64 = 10.0;

/// Tunables for trip segmentation.
#[derive(Debug, Clone)]
pub struct SegmenterConfig {
    /// Time gap that closes the current trip.
    pub trip_gap: Duration,
    /// Jitter radius in metres.
    pub min_distance_m: f64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            trip_gap: DEFAULT_TRIP_GAP,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

/// Errors rejecting a fix before any state mutation.
#[derive(Debug, Error, PartialEq)]
pub enum IngestError {
    /// Latitude is NaN or infinite.
    #[error("latitude is not a finite number: {0}")]
    InvalidLatitude(f64),

    /// Longitude is NaN or infinite.
    #[error("longitude is not a finite number: {0}")]
    InvalidLongitude(f64),
}

/// The stateful ingestion-and-segmentation core.
///
/// Owns trip id allocation and all mutation of [`DeviceState`]; no other
/// component writes device state directly. One instance serves every device
/// concurrently - per-device serialization comes from the state store's
/// per-device locks, not from a global lock.
pub struct TripSegmenter {
    states: Arc<DeviceStateStore>,
    persistence: PersistenceHandle,
    metrics: Arc<TrackerMetrics>,
    config: SegmenterConfig,
    trip_gap_ms: i64,
    next_trip_id: AtomicU64,
}

impl TripSegmenter {
    /// Create an engine with default thresholds.
    pub fn new(
        states: Arc<DeviceStateStore>,
        persistence: PersistenceHandle,
        metrics: Arc<TrackerMetrics>,
    ) -> Self {
        Self::with_config(states, persistence, metrics, SegmenterConfig::default())
    }

    /// Create an engine with custom thresholds.
    pub fn with_config(
        states: Arc<DeviceStateStore>,
        persistence: PersistenceHandle,
        metrics: Arc<TrackerMetrics>,
        config: SegmenterConfig,
    ) -> Self {
        let trip_gap_ms = config.trip_gap.as_millis().min(i64::MAX as u128) as i64;
        Self {
            states,
            persistence,
            metrics,
            config,
            trip_gap_ms,
            next_trip_id: AtomicU64::new(1),
        }
    }

    /// Seed the trip id allocator so new ids stay above ids persisted by
    /// previous runs.
    pub fn with_first_trip_id(self, first: u64) -> Self {
        self.next_trip_id.store(first.max(1), Ordering::Relaxed);
        self
    }

    /// Ingest one fix for one device.
    ///
    /// The timestamp is the receipt-time instant assigned by the caller,
    /// never taken from the remote device. Returns the accepted fix with a
    /// flag telling whether it was written to a trip; errs only when a
    /// coordinate is non-finite, in which case nothing was mutated.
    pub fn ingest(
        &self,
        device_id: &str,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    ) -> Result<AcceptedFix, IngestError> {
        if !lat.is_finite() {
            return Err(IngestError::InvalidLatitude(lat));
        }
        if !lng.is_finite() {
            return Err(IngestError::InvalidLongitude(lng));
        }

        let fix = Fix::new(device_id, lat, lng, timestamp);
        let handle = self.states.get_or_create(device_id);
        let mut state = handle.lock();

        let gap_exceeded = state.last_fix.as_ref().map_or(true, |prev| {
            (timestamp - prev.timestamp).num_milliseconds() > self.trip_gap_ms
        });
        // A device with no recorded trip point yet is never jitter.
        let is_jitter = state.last_trip_point.map_or(false, |last| {
            last.distance_m(&fix.coordinates()) < self.config.min_distance_m
        });

        state.observe(fix.clone(), self.states.history_capacity());
        self.metrics.fix_accepted();

        let recorded = if gap_exceeded {
            if let Some(trip_id) = state.active_trip.take() {
                self.persistence.submit(PersistCommand::CloseTrip {
                    trip_id,
                    ended_at: timestamp,
                });
                self.metrics.trip_closed();
                debug!(device_id, %trip_id, "Trip closed by reporting gap");
            }
            self.append_to_trip(&mut state, device_id, lat, lng, timestamp);
            true
        } else if !is_jitter {
            self.append_to_trip(&mut state, device_id, lat, lng, timestamp);
            true
        } else {
            self.metrics.fix_jittered();
            false
        };

        Ok(AcceptedFix {
            fix,
            trip_id: state.active_trip,
            recorded,
        })
    }

    /// Seal every open trip and clear all live device state. Persisted
    /// trips and points are untouched.
    pub fn reset_all(&self) {
        let ended_at = Utc::now();
        for (device_id, handle) in self.states.handles() {
            let mut state = handle.lock();
            if let Some(trip_id) = state.active_trip.take() {
                self.persistence.submit(PersistCommand::CloseTrip { trip_id, ended_at });
                self.metrics.trip_closed();
                debug!(device_id = %device_id, %trip_id, "Trip closed by reset");
            }
        }
        self.states.reset_all();
        info!("Cleared all live device state");
    }

    /// Current thresholds.
    pub fn config(&self) -> &SegmenterConfig {
        &self.config
    }

    /// Append a point to the device's open trip, opening one first if
    /// needed. Caller holds the device lock.
    fn append_to_trip(
        &self,
        state: &mut DeviceState,
        device_id: &str,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    ) -> TripId {
        let trip_id = match state.active_trip {
            Some(id) => id,
            None => {
                let id = TripId(self.next_trip_id.fetch_add(1, Ordering::Relaxed));
                self.persistence
                    .submit(PersistCommand::OpenTrip(Trip::open(id, device_id, timestamp)));
                self.metrics.trip_opened();
                state.active_trip = Some(id);
                state.next_seq = 0;
                debug!(device_id, trip_id = %id, "Trip opened");
                id
            }
        };

        let seq = state.next_seq;
        state.next_seq += 1;
        self.persistence.submit(PersistCommand::AppendPoint(TripPoint {
            trip_id,
            seq,
            lat,
            lng,
            timestamp,
        }));
        state.last_trip_point = Some(Coordinates::new(lat, lng));
        trip_id
    }
}
