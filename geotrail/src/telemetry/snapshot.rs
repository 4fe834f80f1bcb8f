//! Point-in-time view of the tracking counters.

use serde::Serialize;

/// A copy of every counter in [`super::TrackerMetrics`] at one instant.
///
/// Counters are sampled independently with relaxed ordering, so a snapshot
/// taken during concurrent ingestion may be internally skewed by a few
/// events. That is fine for statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TelemetrySnapshot {
    /// Fixes that passed validation and updated device state.
    pub fixes_accepted: u64,
    /// Fixes classified as stationary jitter.
    pub fixes_jittered: u64,
    /// Trips opened.
    pub trips_opened: u64,
    /// Trips sealed.
    pub trips_closed: u64,
    /// Per-subscriber deliveries.
    pub broadcast_delivered: u64,
    /// Per-subscriber skips due to a full queue.
    pub broadcast_dropped: u64,
    /// Persistence-port calls that failed and were absorbed.
    pub persistence_failures: u64,
}

impl TelemetrySnapshot {
    /// Fixes that were written to a trip (accepted minus jittered).
    pub fn fixes_recorded(&self) -> u64 {
        self.fixes_accepted.saturating_sub(self.fixes_jittered)
    }
}
