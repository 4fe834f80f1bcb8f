//! Configuration file handling.
//!
//! GeoTrail reads an INI file with all values defaulted, so an absent file
//! or an absent key is never an error:
//!
//! ```ini
//! [server]
//! bind = 127.0.0.1:3000
//!
//! [tracking]
//! trip_gap_secs = 300
//! min_distance_m = 10.0
//! history_capacity = 200
//!
//! [storage]
//! kind = memory          ; or "jsonl"
//! path = /var/lib/geotrail/trips.jsonl
//!
//! [broadcast]
//! channel_capacity = 64
//!
//! [log]
//! directory = /var/log/geotrail
//! ```

use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;
use thiserror::Error;

/// Errors loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// I/O error reading or writing the file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid INI.
    #[error("failed to read config file: {0}")]
    Ini(#[from] ini::Error),

    /// A key holds a value of the wrong shape.
    #[error("invalid value for [{section}] {key}: {value:?}")]
    InvalidValue {
        /// Section the key lives in.
        section: String,
        /// Offending key.
        key: String,
        /// Raw value found.
        value: String,
    },
}

/// `[server]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerSection {
    /// Socket address the HTTP adapter binds to.
    pub bind: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:3000".to_string(),
        }
    }
}

/// `[tracking]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingSection {
    /// Reporting gap in seconds that closes the current trip.
    pub trip_gap_secs: u64,
    /// Jitter radius in metres.
    pub min_distance_m: f64,
    /// Fixes retained per device.
    pub history_capacity: usize,
}

impl Default for TrackingSection {
    fn default() -> Self {
        Self {
            trip_gap_secs: 300,
            min_distance_m: 10.0,
            history_capacity: 200,
        }
    }
}

/// Storage backend selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StorageKind {
    /// Keep trips in memory only.
    #[default]
    Memory,
    /// Append-only JSON-lines log on disk.
    Jsonl,
}

impl FromStr for StorageKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "jsonl" => Ok(Self::Jsonl),
            _ => Err(()),
        }
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StorageSection {
    /// Backend to persist trips in.
    pub kind: StorageKind,
    /// Log path for the `jsonl` backend; defaulted under the platform data
    /// directory when unset.
    pub path: Option<PathBuf>,
}

/// `[broadcast]` section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastSection {
    /// Per-subscriber queue depth.
    pub channel_capacity: usize,
}

impl Default for BroadcastSection {
    fn default() -> Self {
        Self {
            channel_capacity: 64,
        }
    }
}

/// `[log]` section.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct LogSection {
    /// Directory for rolling log files; stderr-only when unset.
    pub directory: Option<PathBuf>,
}

/// The parsed configuration file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConfigFile {
    /// `[server]` settings.
    pub server: ServerSection,
    /// `[tracking]` settings.
    pub tracking: TrackingSection,
    /// `[storage]` settings.
    pub storage: StorageSection,
    /// `[broadcast]` settings.
    pub broadcast: BroadcastSection,
    /// `[log]` settings.
    pub log: LogSection,
}

impl ConfigFile {
    /// Default location: `<config dir>/geotrail/geotrail.ini`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("geotrail").join("geotrail.ini"))
    }

    /// Default trip log location for the `jsonl` backend:
    /// `<data dir>/geotrail/trips.jsonl`.
    pub fn default_trip_log_path() -> PathBuf {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("geotrail")
            .join("trips.jsonl")
    }

    /// Load from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load from an explicit path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        let mut config = Self::default();

        if let Some(bind) = ini.get_from(Some("server"), "bind") {
            config.server.bind = bind.to_string();
        }
        if let Some(v) = parse_key(&ini, "tracking", "trip_gap_secs")? {
            config.tracking.trip_gap_secs = v;
        }
        if let Some(v) = parse_key(&ini, "tracking", "min_distance_m")? {
            config.tracking.min_distance_m = v;
        }
        if let Some(v) = parse_key(&ini, "tracking", "history_capacity")? {
            config.tracking.history_capacity = v;
        }
        if let Some(raw) = ini.get_from(Some("storage"), "kind") {
            config.storage.kind =
                raw.parse()
                    .map_err(|()| ConfigError::InvalidValue {
                        section: "storage".to_string(),
                        key: "kind".to_string(),
                        value: raw.to_string(),
                    })?;
        }
        if let Some(path) = ini.get_from(Some("storage"), "path") {
            config.storage.path = Some(PathBuf::from(path));
        }
        if let Some(v) = parse_key(&ini, "broadcast", "channel_capacity")? {
            config.broadcast.channel_capacity = v;
        }
        if let Some(dir) = ini.get_from(Some("log"), "directory") {
            config.log.directory = Some(PathBuf::from(dir));
        }

        Ok(config)
    }

    /// Write this configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut ini = Ini::new();
        ini.with_section(Some("server"))
            .set("bind", self.server.bind.clone());
        ini.with_section(Some("tracking"))
            .set("trip_gap_secs", self.tracking.trip_gap_secs.to_string())
            .set("min_distance_m", self.tracking.min_distance_m.to_string())
            .set(
                "history_capacity",
                self.tracking.history_capacity.to_string(),
            );
        let kind = match self.storage.kind {
            StorageKind::Memory => "memory",
            StorageKind::Jsonl => "jsonl",
        };
        let mut storage = ini.with_section(Some("storage"));
        let storage = storage.set("kind", kind);
        if let Some(ref p) = self.storage.path {
            storage.set("path", p.display().to_string());
        }
        ini.with_section(Some("broadcast")).set(
            "channel_capacity",
            self.broadcast.channel_capacity.to_string(),
        );
        if let Some(ref dir) = self.log.directory {
            ini.with_section(Some("log"))
                .set("directory", dir.display().to_string());
        }

        ini.write_to_file(path)?;
        Ok(())
    }
}

fn parse_key<T: FromStr>(
    ini: &Ini,
    section: &str,
    key: &str,
) -> Result<Option<T>, ConfigError> {
    match ini.get_from(Some(section), key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue {
                section: section.to_string(),
                key: key.to_string(),
                value: raw.to_string(),
            }),
    }
}
