//! GeoTrail - Live geolocation tracking with trip segmentation
//!
//! This library provides the core functionality for ingesting a stream of
//! position reports per tracked device, filtering stationary GPS jitter,
//! segmenting the stream into discrete trips, persisting trips through an
//! asynchronous storage port, and fanning accepted fixes out to live
//! subscribers.
//!
//! # Architecture
//!
//! ```text
//! inbound fix ──► TripSegmenter ──► DeviceStateStore (per-device state)
//!                      │      └───► PersistenceWriter ──► TripStore
//!                      ▼
//!                 Broadcaster ──► live subscribers (filtered fan-out)
//! ```
//!
//! The [`service::TrackingService`] façade ties the components together and
//! exposes the boundary operations consumed by adapters such as the HTTP
//! surface in `geotrail-cli`.

pub mod app;
pub mod broadcast;
pub mod config;
pub mod engine;
pub mod geo;
pub mod model;
pub mod service;
pub mod state;
pub mod store;
pub mod telemetry;
