//! Atomic counters for the ingestion pipeline.

use std::sync::atomic::{AtomicU64, Ordering};

use super::TelemetrySnapshot;

/// Lock-free counters updated by the engine, broadcaster, and persistence
/// writer. All updates use relaxed ordering; the counters are statistics,
/// not synchronization.
#[derive(Debug, Default)]
pub struct TrackerMetrics {
    fixes_accepted: AtomicU64,
    fixes_jittered: AtomicU64,
    trips_opened: AtomicU64,
    trips_closed: AtomicU64,
    broadcast_delivered: AtomicU64,
    broadcast_dropped: AtomicU64,
    persistence_failures: AtomicU64,
}

impl TrackerMetrics {
    /// Create zeroed metrics.
    pub fn new() -> Self {
        Self::default()
    }

    /// A fix passed validation and updated device state.
    pub fn fix_accepted(&self) {
        self.fixes_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// A fix was classified as stationary jitter (no trip point written).
    pub fn fix_jittered(&self) {
        self.fixes_jittered.fetch_add(1, Ordering::Relaxed);
    }

    /// A new trip was opened.
    pub fn trip_opened(&self) {
        self.trips_opened.fetch_add(1, Ordering::Relaxed);
    }

    /// An open trip was sealed.
    pub fn trip_closed(&self) {
        self.trips_closed.fetch_add(1, Ordering::Relaxed);
    }

    /// A fix was delivered to one subscriber.
    pub fn broadcast_delivered(&self) {
        self.broadcast_delivered.fetch_add(1, Ordering::Relaxed);
    }

    /// A fix was skipped for one subscriber (queue full).
    pub fn broadcast_dropped(&self) {
        self.broadcast_dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// A persistence-port call failed and was absorbed.
    pub fn persistence_failure(&self) {
        self.persistence_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of all counters.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            fixes_accepted: self.fixes_accepted.load(Ordering::Relaxed),
            fixes_jittered: self.fixes_jittered.load(Ordering::Relaxed),
            trips_opened: self.trips_opened.load(Ordering::Relaxed),
            trips_closed: self.trips_closed.load(Ordering::Relaxed),
            broadcast_delivered: self.broadcast_delivered.load(Ordering::Relaxed),
            broadcast_dropped: self.broadcast_dropped.load(Ordering::Relaxed),
            persistence_failures: self.persistence_failures.load(Ordering::Relaxed),
        }
    }
}
