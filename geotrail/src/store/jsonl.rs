//! Disk-backed trip store using an append-only JSON-lines event log.
//!
//! Every mutation is one JSON object per line (`trip_opened`,
//! `point_appended`, `trip_closed`). On open the log is replayed into an
//! in-memory [`MemoryTripStore`] index, which serves all reads; writes go to
//! the index first and then to the log, so a disk failure degrades to
//! memory-only behavior instead of stalling the pipeline.
//!
//! Malformed lines (a torn tail write after a crash) are skipped with a
//! warning rather than failing startup.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::model::{Trip, TripId, TripPoint, TripRecord};

use super::memory::MemoryTripStore;
use super::traits::{BoxFuture, TripStore, TripStoreError};
use serde::{Deserialize, Serialize};

/// One record of the event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum LogEvent {
    TripOpened {
        id: TripId,
        device_id: String,
        started_at: DateTime<Utc>,
    },
    PointAppended {
        trip_id: TripId,
        seq: u64,
        lat: f64,
        lng: f64,
        timestamp: DateTime<Utc>,
    },
    TripClosed {
        id: TripId,
        ended_at: DateTime<Utc>,
    },
}

/// JSON-lines implementation of [`TripStore`].
pub struct JsonlTripStore {
    index: MemoryTripStore,
    log: Mutex<File>,
    path: PathBuf,
}

impl JsonlTripStore {
    /// Open (or create) the log at `path`, replaying existing events into
    /// the in-memory index.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, TripStoreError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let index = MemoryTripStore::new();
        match tokio::fs::read_to_string(&path).await {
            Ok(contents) => {
                let mut replayed = 0usize;
                for (lineno, line) in contents.lines().enumerate() {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<LogEvent>(line) {
                        Ok(event) => {
                            if let Err(e) = apply_event(&index, event) {
                                warn!(
                                    line = lineno + 1,
                                    error = %e,
                                    "Skipping inconsistent trip log event"
                                );
                            } else {
                                replayed += 1;
                            }
                        }
                        Err(e) => {
                            warn!(
                                line = lineno + 1,
                                error = %e,
                                "Skipping malformed trip log line"
                            );
                        }
                    }
                }
                info!(
                    path = %path.display(),
                    events = replayed,
                    trips = index.trip_count(),
                    "Replayed trip log"
                );
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Starting new trip log");
            }
            Err(e) => return Err(e.into()),
        }

        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            index,
            log: Mutex::new(log),
            path,
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn append_event(&self, event: &LogEvent) -> Result<(), TripStoreError> {
        let mut line = serde_json::to_string(event)?;
        line.push('\n');
        let mut log = self.log.lock().await;
        log.write_all(line.as_bytes()).await?;
        log.flush().await?;
        Ok(())
    }
}

fn apply_event(index: &MemoryTripStore, event: LogEvent) -> Result<(), TripStoreError> {
    match event {
        LogEvent::TripOpened {
            id,
            device_id,
            started_at,
        } => index.insert_trip(Trip::open(id, device_id, started_at)),
        LogEvent::PointAppended {
            trip_id,
            seq,
            lat,
            lng,
            timestamp,
        } => index.push_point(TripPoint {
            trip_id,
            seq,
            lat,
            lng,
            timestamp,
        }),
        LogEvent::TripClosed { id, ended_at } => index.seal_trip(id, ended_at),
    }
}

impl TripStore for JsonlTripStore {
    fn open_trip(&self, trip: Trip) -> BoxFuture<'_, Result<(), TripStoreError>> {
        Box::pin(async move {
            let event = LogEvent::TripOpened {
                id: trip.id,
                device_id: trip.device_id.clone(),
                started_at: trip.started_at,
            };
            self.index.insert_trip(trip)?;
            self.append_event(&event).await
        })
    }

    fn close_trip(
        &self,
        trip_id: TripId,
        ended_at: DateTime<Utc>,
    ) -> BoxFuture<'_, Result<(), TripStoreError>> {
        Box::pin(async move {
            self.index.seal_trip(trip_id, ended_at)?;
            self.append_event(&LogEvent::TripClosed {
                id: trip_id,
                ended_at,
            })
            .await
        })
    }

    fn append_point(&self, point: TripPoint) -> BoxFuture<'_, Result<(), TripStoreError>> {
        Box::pin(async move {
            let event = LogEvent::PointAppended {
                trip_id: point.trip_id,
                seq: point.seq,
                lat: point.lat,
                lng: point.lng,
                timestamp: point.timestamp,
            };
            self.index.push_point(point)?;
            self.append_event(&event).await
        })
    }

    fn list_trips<'a>(
        &'a self,
        device_id: &'a str,
    ) -> BoxFuture<'a, Result<Vec<TripRecord>, TripStoreError>> {
        Box::pin(async move { Ok(self.index.trips_for(device_id)) })
    }

    fn latest_trip_id(&self) -> BoxFuture<'_, Result<Option<TripId>, TripStoreError>> {
        Box::pin(async move { Ok(self.index.highest_id()) })
    }
}
