//! The trip persistence port.
//!
//! # Design Principles
//!
//! - **Minimal interface**: open, close, append, list - nothing
//!   storage-specific leaks through.
//! - **Dyn-compatible**: async methods return `Pin<Box<dyn Future>>` so the
//!   engine can hold an `Arc<dyn TripStore>` and swap backends.
//! - **Caller-assigned ids**: trip ids are allocated by the engine, so an
//!   `open_trip` never blocks acknowledgment on a storage round trip.
//!   [`TripStore::latest_trip_id`] exposes the persisted high-water mark for
//!   seeding the allocator at startup.
//!
//! # Thread Safety
//!
//! All implementations must be `Send + Sync` for use across async tasks.

use std::future::Future;
use std::pin::Pin;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::model::{Trip, TripId, TripPoint, TripRecord};

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors that can occur during trip store operations.
#[derive(Debug, Error)]
pub enum TripStoreError {
    /// I/O error from a disk-backed store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A log record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The referenced trip has never been opened in this store.
    #[error("unknown trip: {0}")]
    UnknownTrip(TripId),

    /// Backend-specific error.
    #[error("backend error: {0}")]
    Backend(String),
}

/// Durable record of trips and their points.
pub trait TripStore: Send + Sync {
    /// Record a newly opened trip. The trip carries its engine-assigned id
    /// and `ended_at = None`.
    fn open_trip(&self, trip: Trip) -> BoxFuture<'_, Result<(), TripStoreError>>;

    /// Seal a trip. A trip's `ended_at` is set exactly once.
    fn close_trip(
        &self,
        trip_id: TripId,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), TripStoreError>>;

    /// Append one point to an open trip. Points arrive in `seq` order per
    /// trip and must be retrievable in that order.
    fn append_point(&self, point: TripPoint) -> BoxFuture<'_, Result<(), TripStoreError>>;

    /// All trips for a device ordered by `started_at`, each with its points
    /// ordered by `seq`. Includes the currently open trip, if any. Unknown
    /// devices yield an empty list, never an error.
    fn list_trips<'a>(
        &'a self,
        device_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TripRecord>, TripStoreError>>;

    /// Highest trip id ever recorded, or `None` for an empty store.
    fn latest_trip_id(&self) -> BoxFuture<'_, Result<Option<TripId>, TripStoreError>>;
}
