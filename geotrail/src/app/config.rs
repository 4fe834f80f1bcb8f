//! Application configuration for TrackerApp.
//!
//! `AppConfig` combines the component configurations needed to bootstrap
//! the tracking pipeline. It is usually derived from a loaded
//! [`ConfigFile`], keeping the translation logic in one place rather than
//! scattered in CLI code.

use std::path::PathBuf;
use std::time::Duration;

use crate::broadcast::BroadcasterConfig;
use crate::config::{ConfigFile, StorageKind};
use crate::engine::SegmenterConfig;
use crate::state::DEFAULT_HISTORY_CAPACITY;

/// Trip storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageConfig {
    /// Keep trips in memory only.
    Memory,
    /// Append-only JSON-lines log at the given path.
    Jsonl {
        /// Log file location.
        path: PathBuf,
    },
}

/// Application configuration combining all component configs.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Segmentation thresholds.
    pub segmenter: SegmenterConfig,
    /// Fixes retained per device.
    pub history_capacity: usize,
    /// Broadcaster tunables.
    pub broadcaster: BroadcasterConfig,
    /// Trip storage backend.
    pub storage: StorageConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            segmenter: SegmenterConfig::default(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            broadcaster: BroadcasterConfig::default(),
            storage: StorageConfig::Memory,
        }
    }
}

impl AppConfig {
    /// Build application config from a loaded configuration file.
    pub fn from_config_file(config: &ConfigFile) -> Self {
        let storage = match config.storage.kind {
            StorageKind::Memory => StorageConfig::Memory,
            StorageKind::Jsonl => StorageConfig::Jsonl {
                path: config
                    .storage
                    .path
                    .clone()
                    .unwrap_or_else(ConfigFile::default_trip_log_path),
            },
        };

        Self {
            segmenter: SegmenterConfig {
                trip_gap: Duration::from_secs(config.tracking.trip_gap_secs),
                min_distance_m: config.tracking.min_distance_m,
            },
            history_capacity: config.tracking.history_capacity,
            broadcaster: BroadcasterConfig {
                channel_capacity: config.broadcast.channel_capacity,
            },
            storage,
        }
    }

    /// Use the in-memory trip store.
    pub fn with_memory_storage(mut self) -> Self {
        self.storage = StorageConfig::Memory;
        self
    }

    /// Use the JSON-lines trip store at `path`.
    pub fn with_jsonl_storage(mut self, path: PathBuf) -> Self {
        self.storage = StorageConfig::Jsonl { path };
        self
    }
}
