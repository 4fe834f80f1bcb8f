//! Core data model for tracking.
//!
//! These types cross the boundaries between the segmentation engine, the
//! persistence port, the broadcaster, and the HTTP adapter, so they all
//! carry serde derives. Timestamps serialize as RFC 3339 strings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::geo::Coordinates;

/// One reported position observation for a device.
///
/// Immutable once created. The timestamp is assigned at receipt time by the
/// ingestion boundary, never taken from the remote device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// Identifier of the reporting device.
    pub device_id: String,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Receipt-time instant.
    pub timestamp: DateTime<Utc>,
}

impl Fix {
    /// Create a new fix.
    pub fn new(
        device_id: impl Into<String>,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            lat,
            lng,
            timestamp,
        }
    }

    /// The coordinate pair of this fix.
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lng)
    }
}

/// Identifier of a trip, unique within the process and its trip store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TripId(pub u64);

impl fmt::Display for TripId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A maximal run of a device's points with no inter-point gap exceeding the
/// trip gap threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trip {
    /// Trip identifier.
    pub id: TripId,
    /// Device this trip belongs to.
    pub device_id: String,
    /// When the trip opened.
    pub started_at: DateTime<Utc>,
    /// When the trip was sealed; `None` while the trip is open.
    pub ended_at: Option<DateTime<Utc>>,
}

impl Trip {
    /// Create a new open trip.
    pub fn open(id: TripId, device_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            id,
            device_id: device_id.into(),
            started_at,
            ended_at: None,
        }
    }

    /// Whether the trip has not been sealed yet.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

/// One recorded point of a trip. Append-only; `seq` orders the points of a
/// trip contiguously from 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripPoint {
    /// Trip this point belongs to.
    pub trip_id: TripId,
    /// Position within the trip, starting at 0.
    pub seq: u64,
    /// Latitude in degrees.
    pub lat: f64,
    /// Longitude in degrees.
    pub lng: f64,
    /// Receipt-time instant of the underlying fix.
    pub timestamp: DateTime<Utc>,
}

/// A trip together with its points in `seq` order, as returned by trip
/// listing queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripRecord {
    /// The trip itself.
    #[serde(flatten)]
    pub trip: Trip,
    /// Points ordered by `seq`.
    pub points: Vec<TripPoint>,
}

/// Result of ingesting one fix for one device.
///
/// Every structurally valid fix is accepted: it always updates the device's
/// last-known position and history. `recorded` tells whether it was also
/// written to a trip, or filtered as stationary jitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AcceptedFix {
    /// The fix as stored.
    pub fix: Fix,
    /// The device's active trip after this fix, if any.
    pub trip_id: Option<TripId>,
    /// Whether the fix was appended to a trip (`false` for jitter).
    pub recorded: bool,
}
