//! Tracking telemetry for observability and user feedback.
//!
//! Lock-free atomic counters instrumenting the ingestion pipeline with
//! minimal overhead.
//!
//! # Architecture
//!
//! ```text
//! Engine / Broadcaster / Writer ──► TrackerMetrics ──► TelemetrySnapshot
//!                                   (atomic counters)  (point-in-time copy)
//! ```

mod metrics;
mod snapshot;

pub use metrics::TrackerMetrics;
pub use snapshot::TelemetrySnapshot;
