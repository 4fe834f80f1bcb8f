//! Background persistence writer.
//!
//! The segmentation engine must never wait on storage, so it emits
//! [`PersistCommand`]s into an unbounded channel and acknowledges as soon as
//! in-memory state and broadcast are updated. The [`PersistenceWriter`] is a
//! long-lived task that drains the channel and applies each command to the
//! [`TripStore`] in arrival order - the channel's FIFO ordering carries the
//! causal order per device and trip.
//!
//! Store failures are logged and counted, never propagated: a trip may end
//! up under-persisted relative to live state, which is the accepted
//! trade-off.
//!
//! # Example
//!
//! ```ignore
//! use geotrail::store::{MemoryTripStore, PersistenceWriter};
//!
//! let store = Arc::new(MemoryTripStore::new());
//! let (writer, handle) = PersistenceWriter::new(store, metrics);
//!
//! let shutdown = CancellationToken::new();
//! tokio::spawn(writer.run(shutdown.clone()));
//!
//! handle.submit(PersistCommand::OpenTrip(trip));
//! ```

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::model::{Trip, TripId, TripPoint};
use crate::telemetry::TrackerMetrics;

use super::traits::TripStore;

/// One persistence mutation, applied in submission order.
#[derive(Debug, Clone)]
pub enum PersistCommand {
    /// Record a newly opened trip.
    OpenTrip(Trip),
    /// Append one point to an open trip.
    AppendPoint(TripPoint),
    /// Seal a trip.
    CloseTrip {
        /// Trip to seal.
        trip_id: TripId,
        /// Sealing instant.
        ended_at: DateTime<Utc>,
    },
}

/// Cloneable producer side of the persistence channel.
#[derive(Debug, Clone)]
pub struct PersistenceHandle {
    tx: mpsc::UnboundedSender<PersistCommand>,
}

impl PersistenceHandle {
    /// Enqueue a command. Never blocks; if the writer has stopped the
    /// command is dropped, matching best-effort durability.
    pub fn submit(&self, command: PersistCommand) {
        if self.tx.send(command).is_err() {
            debug!("Persistence writer stopped; dropping command");
        }
    }
}

/// Long-lived task applying persistence commands to a [`TripStore`].
pub struct PersistenceWriter {
    store: Arc<dyn TripStore>,
    metrics: Arc<TrackerMetrics>,
    rx: mpsc::UnboundedReceiver<PersistCommand>,
}

impl PersistenceWriter {
    /// Create the writer and its producer handle.
    pub fn new(
        store: Arc<dyn TripStore>,
        metrics: Arc<TrackerMetrics>,
    ) -> (Self, PersistenceHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self { store, metrics, rx },
            PersistenceHandle { tx },
        )
    }

    /// Process commands until every producer is dropped or `shutdown` fires.
    /// On shutdown the already-queued commands are drained first, so a clean
    /// stop never loses acknowledged writes.
    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(command) => self.apply(command).await,
                    None => break,
                },
                () = shutdown.cancelled() => {
                    self.rx.close();
                    while let Ok(command) = self.rx.try_recv() {
                        self.apply(command).await;
                    }
                    break;
                }
            }
        }
        debug!("Persistence writer stopped");
    }

    async fn apply(&self, command: PersistCommand) {
        let (op, trip_id, result) = match command {
            PersistCommand::OpenTrip(trip) => {
                let id = trip.id;
                ("open_trip", id, self.store.open_trip(trip).await)
            }
            PersistCommand::AppendPoint(point) => {
                let id = point.trip_id;
                ("append_point", id, self.store.append_point(point).await)
            }
            PersistCommand::CloseTrip { trip_id, ended_at } => (
                "close_trip",
                trip_id,
                self.store.close_trip(trip_id, ended_at).await,
            ),
        };

        if let Err(error) = result {
            self.metrics.persistence_failure();
            warn!(op, %trip_id, error = %error, "Trip persistence failed");
        }
    }
}
