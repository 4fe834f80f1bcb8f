//! Application lifecycle.
//!
//! [`TrackerApp`] coordinates startup and shutdown of the tracking
//! pipeline: it opens the configured trip store, seeds the trip id
//! allocator from the persisted high-water mark, spawns the persistence
//! writer, and assembles the [`TrackingService`] handed to adapters.
//!
//! # Startup Sequence
//!
//! 1. Open the trip store backend (replaying the log for `jsonl`)
//! 2. Probe the persisted trip id high-water mark
//! 3. Spawn the persistence writer on its cancellation token
//! 4. Assemble engine, broadcaster, and service
//!
//! # Example
//!
//! ```ignore
//! use geotrail::app::{AppConfig, TrackerApp};
//!
//! let app = TrackerApp::start(AppConfig::default()).await?;
//! let service = app.service();
//!
//! // ... serve requests ...
//!
//! app.shutdown().await;
//! ```

mod config;
mod error;

pub use config::{AppConfig, StorageConfig};
pub use error::AppError;

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::broadcast::Broadcaster;
use crate::engine::TripSegmenter;
use crate::service::TrackingService;
use crate::state::DeviceStateStore;
use crate::store::{JsonlTripStore, MemoryTripStore, PersistenceWriter, TripStore};
use crate::telemetry::TrackerMetrics;

/// A running tracking pipeline.
pub struct TrackerApp {
    service: Arc<TrackingService>,
    writer_task: JoinHandle<()>,
    cancellation: CancellationToken,
}

impl TrackerApp {
    /// Start the pipeline with the given configuration.
    pub async fn start(config: AppConfig) -> Result<Self, AppError> {
        let store: Arc<dyn TripStore> = match &config.storage {
            StorageConfig::Memory => {
                info!("Using in-memory trip store");
                Arc::new(MemoryTripStore::new())
            }
            StorageConfig::Jsonl { path } => {
                info!(path = %path.display(), "Using JSON-lines trip store");
                Arc::new(
                    JsonlTripStore::open(path)
                        .await
                        .map_err(AppError::StoreOpen)?,
                )
            }
        };

        let first_trip_id = store
            .latest_trip_id()
            .await
            .map_err(AppError::StoreProbe)?
            .map_or(1, |id| id.0 + 1);

        let metrics = Arc::new(TrackerMetrics::new());
        let states = Arc::new(DeviceStateStore::with_history_capacity(
            config.history_capacity,
        ));

        let (writer, persistence) = PersistenceWriter::new(Arc::clone(&store), Arc::clone(&metrics));
        let cancellation = CancellationToken::new();
        let writer_task = tokio::spawn(writer.run(cancellation.child_token()));

        let engine = TripSegmenter::with_config(
            Arc::clone(&states),
            persistence,
            Arc::clone(&metrics),
            config.segmenter.clone(),
        )
        .with_first_trip_id(first_trip_id);

        let broadcaster = Arc::new(Broadcaster::with_config(
            Arc::clone(&metrics),
            config.broadcaster.clone(),
        ));

        let service = Arc::new(TrackingService::new(
            states,
            engine,
            store,
            broadcaster,
            metrics,
        ));

        info!(first_trip_id, "Tracking pipeline started");
        Ok(Self {
            service,
            writer_task,
            cancellation,
        })
    }

    /// Shared handle to the assembled service.
    pub fn service(&self) -> Arc<TrackingService> {
        Arc::clone(&self.service)
    }

    /// Cancellation token observed by the pipeline's background tasks.
    pub fn cancellation(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    /// Stop the pipeline, draining queued persistence commands first.
    pub async fn shutdown(self) {
        info!("Shutting down tracking pipeline");
        self.cancellation.cancel();
        if let Err(e) = self.writer_task.await {
            warn!(error = %e, "Persistence writer did not stop cleanly");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_start_ingest_shutdown_with_memory_store() {
        let app = TrackerApp::start(AppConfig::default()).await.unwrap();
        let service = app.service();

        service.ingest(&ids(&["bike1"]), 41.0, 29.0).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(service.list_trips("bike1").await.unwrap().len(), 1);

        app.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_writes() {
        let app = TrackerApp::start(AppConfig::default()).await.unwrap();
        let service = app.service();

        // Shut down immediately after ingesting; the queued open/append
        // commands must still land in the store.
        service.ingest(&ids(&["bike1"]), 41.0, 29.0).unwrap();
        app.shutdown().await;

        assert_eq!(service.list_trips("bike1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_trip_ids_resume_after_restart_with_jsonl_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trips.jsonl");
        let config = AppConfig::default().with_jsonl_storage(path.clone());

        let first_trip_id = {
            let app = TrackerApp::start(config.clone()).await.unwrap();
            let accepted = app.service().ingest(&ids(&["bike1"]), 41.0, 29.0).unwrap();
            let id = accepted[0].trip_id.unwrap();
            app.shutdown().await;
            id
        };

        let app = TrackerApp::start(config).await.unwrap();
        let accepted = app.service().ingest(&ids(&["bike1"]), 41.0, 29.0).unwrap();
        let second_trip_id = accepted[0].trip_id.unwrap();
        assert!(
            second_trip_id > first_trip_id,
            "trip ids must not collide across restarts: {} vs {}",
            first_trip_id,
            second_trip_id
        );

        // The restarted process also sees the persisted trip.
        let trips = app.service().list_trips("bike1").await.unwrap();
        assert_eq!(trips.len(), 2);
        app.shutdown().await;
    }
}
