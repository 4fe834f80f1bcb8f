//! In-memory trip store.
//!
//! The default port implementation: trips and points live in concurrent
//! maps, so reads from query callers never block the persistence writer.
//! Also serves as the index behind [`super::JsonlTripStore`] and as the
//! test double for the engine.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;

use crate::model::{Trip, TripId, TripPoint, TripRecord};

use super::traits::{BoxFuture, TripStore, TripStoreError};

#[derive(Debug, Clone)]
struct TripEntry {
    trip: Trip,
    points: Vec<TripPoint>,
}

/// Concurrent in-memory implementation of [`TripStore`].
#[derive(Debug, Default)]
pub struct MemoryTripStore {
    trips: DashMap<TripId, TripEntry>,
    by_device: DashMap<String, Vec<TripId>>,
    latest_id: AtomicU64,
}

impl MemoryTripStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trips recorded (open and sealed).
    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }

    pub(crate) fn insert_trip(&self, trip: Trip) -> Result<(), TripStoreError> {
        self.latest_id.fetch_max(trip.id.0, Ordering::Relaxed);
        self.by_device
            .entry(trip.device_id.clone())
            .or_default()
            .push(trip.id);
        self.trips.insert(
            trip.id,
            TripEntry {
                trip,
                points: Vec::new(),
            },
        );
        Ok(())
    }

    pub(crate) fn seal_trip(
        &self,
        trip_id: TripId,
        ended_at: DateTime<Utc>,
    ) -> Result<(), TripStoreError> {
        let mut entry = self
            .trips
            .get_mut(&trip_id)
            .ok_or(TripStoreError::UnknownTrip(trip_id))?;
        entry.trip.ended_at = Some(ended_at);
        Ok(())
    }

    pub(crate) fn push_point(&self, point: TripPoint) -> Result<(), TripStoreError> {
        let mut entry = self
            .trips
            .get_mut(&point.trip_id)
            .ok_or(TripStoreError::UnknownTrip(point.trip_id))?;
        entry.points.push(point);
        Ok(())
    }

    pub(crate) fn trips_for(&self, device_id: &str) -> Vec<TripRecord> {
        let ids = match self.by_device.get(device_id) {
            Some(ids) => ids.clone(),
            None => return Vec::new(),
        };

        let mut records: Vec<TripRecord> = ids
            .iter()
            .filter_map(|id| self.trips.get(id))
            .map(|entry| {
                let mut points = entry.points.clone();
                points.sort_by_key(|p| p.seq);
                TripRecord {
                    trip: entry.trip.clone(),
                    points,
                }
            })
            .collect();
        records.sort_by_key(|r| (r.trip.started_at, r.trip.id));
        records
    }

    pub(crate) fn highest_id(&self) -> Option<TripId> {
        match self.latest_id.load(Ordering::Relaxed) {
            0 => None,
            id => Some(TripId(id)),
        }
    }
}

impl TripStore for MemoryTripStore {
    fn open_trip(&self, trip: Trip) -> BoxFuture<'_, Result<(), TripStoreError>> {
        Box::pin(async move { self.insert_trip(trip) })
    }

    fn close_trip(
        &self,
        trip_id: TripId,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), TripStoreError>> {
        Box::pin(async move { self.seal_trip(trip_id, ended_at) })
    }

    fn append_point(&self, point: TripPoint) -> BoxFuture<'_, Result<(), TripStoreError>> {
        Box::pin(async move { self.push_point(point) })
    }

    fn list_trips<'a>(
        &'a self,
        device_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TripRecord>, TripStoreError>> {
        Box::pin(async move { Ok(self.trips_for(device_id)) })
    }

    fn latest_trip_id(&self) -> BoxFuture<'_, Result<Option<TripId>, TripStoreError>> {
        Box::pin(async move { Ok(self.highest_id()) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(secs)
    }

    fn point(trip_id: TripId, seq: u64, secs: i64) -> TripPoint {
        TripPoint {
            trip_id,
            seq,
            lat: 41.0,
            lng: 29.0,
            timestamp: ts(secs),
        }
    }

    #[tokio::test]
    async fn test_open_append_close_list() {
        let store = MemoryTripStore::new();
        store
            .open_trip(Trip::open(TripId(1), "bike1", ts(0)))
            .await
            .unwrap();
        store.append_point(point(TripId(1), 0, 0)).await.unwrap();
        store.append_point(point(TripId(1), 1, 30)).await.unwrap();
        store.close_trip(TripId(1), ts(60)).await.unwrap();

        let trips = store.list_trips("bike1").await.unwrap();
        assert_eq!(trips.len(), 1);
        assert_eq!(trips[0].trip.ended_at, Some(ts(60)));
        assert_eq!(trips[0].points.len(), 2);
        assert_eq!(trips[0].points[0].seq, 0);
        assert_eq!(trips[0].points[1].seq, 1);
    }

    #[tokio::test]
    async fn test_open_trip_has_null_ended_at_until_closed() {
        let store = MemoryTripStore::new();
        store
            .open_trip(Trip::open(TripId(1), "bike1", ts(0)))
            .await
            .unwrap();

        let trips = store.list_trips("bike1").await.unwrap();
        assert!(trips[0].trip.is_open());
    }

    #[tokio::test]
    async fn test_trips_ordered_by_started_at() {
        let store = MemoryTripStore::new();
        // Inserted out of chronological order on purpose.
        store
            .open_trip(Trip::open(TripId(2), "bike1", ts(600)))
            .await
            .unwrap();
        store
            .open_trip(Trip::open(TripId(1), "bike1", ts(0)))
            .await
            .unwrap();

        let trips = store.list_trips("bike1").await.unwrap();
        assert_eq!(trips[0].trip.id, TripId(1));
        assert_eq!(trips[1].trip.id, TripId(2));
    }

    #[tokio::test]
    async fn test_unknown_device_lists_empty() {
        let store = MemoryTripStore::new();
        assert!(store.list_trips("ghost").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_trip_errors() {
        let store = MemoryTripStore::new();
        let err = store.close_trip(TripId(9), ts(0)).await.unwrap_err();
        assert!(matches!(err, TripStoreError::UnknownTrip(TripId(9))));

        let err = store.append_point(point(TripId(9), 0, 0)).await.unwrap_err();
        assert!(matches!(err, TripStoreError::UnknownTrip(TripId(9))));
    }

    #[tokio::test]
    async fn test_latest_trip_id_tracks_high_water_mark() {
        let store = MemoryTripStore::new();
        assert_eq!(store.latest_trip_id().await.unwrap(), None);

        store
            .open_trip(Trip::open(TripId(3), "a", ts(0)))
            .await
            .unwrap();
        store
            .open_trip(Trip::open(TripId(7), "b", ts(1)))
            .await
            .unwrap();
        store
            .open_trip(Trip::open(TripId(5), "c", ts(2)))
            .await
            .unwrap();

        assert_eq!(store.latest_trip_id().await.unwrap(), Some(TripId(7)));
    }

    #[tokio::test]
    async fn test_devices_do_not_share_trips() {
        let store = MemoryTripStore::new();
        store
            .open_trip(Trip::open(TripId(1), "bike1", ts(0)))
            .await
            .unwrap();
        store
            .open_trip(Trip::open(TripId(2), "car2", ts(0)))
            .await
            .unwrap();

        assert_eq!(store.list_trips("bike1").await.unwrap().len(), 1);
        assert_eq!(store.list_trips("car2").await.unwrap().len(), 1);
    }
}
