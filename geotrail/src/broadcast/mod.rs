//! Live fan-out of accepted fixes to subscribers.
//!
//! The registry keys subscribers by a process-unique id in a concurrent
//! map, so registration and removal are constant-time and safe to race with
//! concurrent publishes. Each subscriber owns an independent bounded queue:
//! delivery is best-effort, and a subscriber that cannot currently accept a
//! push is skipped for that event without blocking other subscribers or the
//! ingestion path.
//!
//! On subscribe the caller supplies a snapshot of last-known fixes, which is
//! enqueued before the subscriber is registered - so catch-up always
//! precedes live events on the channel and no duplicate is possible.
//!
//! Dropping a [`Subscription`] unsubscribes it; explicit removal is
//! idempotent, so the transport adapter and the drop path can both fire.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

use crate::model::Fix;
use crate::telemetry::TrackerMetrics;

/// Default per-subscriber queue depth.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Tunables for the broadcaster.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Per-subscriber queue depth. Once full, events are skipped for that
    /// subscriber until it drains.
    pub channel_capacity: usize,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Which devices a subscriber wants. An empty set means every device.
#[derive(Debug, Clone, Default)]
pub struct SubscriberFilter {
    devices: HashSet<String>,
}

impl SubscriberFilter {
    /// Subscribe to every device.
    pub fn all() -> Self {
        Self::default()
    }

    /// Subscribe to the given device ids only.
    pub fn devices<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            devices: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Whether the filter admits a device.
    pub fn matches(&self, device_id: &str) -> bool {
        self.devices.is_empty() || self.devices.contains(device_id)
    }

    /// Whether this filter admits every device.
    pub fn is_all(&self) -> bool {
        self.devices.is_empty()
    }
}

struct SubscriberEntry {
    filter: SubscriberFilter,
    tx: mpsc::Sender<Fix>,
}

/// Registry of live subscribers with filtered best-effort fan-out.
pub struct Broadcaster {
    subscribers: DashMap<u64, SubscriberEntry>,
    next_id: AtomicU64,
    metrics: Arc<TrackerMetrics>,
    config: BroadcasterConfig,
}

impl Broadcaster {
    /// Create a broadcaster with the default queue depth.
    pub fn new(metrics: Arc<TrackerMetrics>) -> Self {
        Self::with_config(metrics, BroadcasterConfig::default())
    }

    /// Create a broadcaster with a custom configuration.
    pub fn with_config(metrics: Arc<TrackerMetrics>, config: BroadcasterConfig) -> Self {
        Self {
            subscribers: DashMap::new(),
            next_id: AtomicU64::new(1),
            metrics,
            config,
        }
    }

    /// Register a subscriber.
    ///
    /// `catch_up` fixes are queued ahead of registration, so the returned
    /// subscription sees them before any live event. A catch-up overflowing
    /// the queue is truncated; live delivery is unaffected.
    pub fn subscribe(
        self: &Arc<Self>,
        filter: SubscriberFilter,
        catch_up: Vec<Fix>,
    ) -> Subscription {
        let (tx, rx) = mpsc::channel(self.config.channel_capacity);

        for fix in catch_up {
            if tx.try_send(fix).is_err() {
                debug!("Catch-up snapshot exceeds subscriber queue; truncating");
                break;
            }
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.insert(id, SubscriberEntry { filter, tx });
        debug!(subscription = id, "Subscriber registered");

        Subscription {
            id,
            rx,
            registry: Arc::downgrade(self),
        }
    }

    /// Remove a subscriber. Safe to call more than once.
    pub fn unsubscribe(&self, id: u64) -> bool {
        let removed = self.subscribers.remove(&id).is_some();
        if removed {
            debug!(subscription = id, "Subscriber removed");
        }
        removed
    }

    /// Deliver a fix to every subscriber whose filter admits its device.
    ///
    /// Never blocks. Slow subscribers are skipped for this event;
    /// disconnected subscribers are dropped from the registry.
    pub fn publish(&self, fix: &Fix) {
        let mut disconnected = Vec::new();

        for entry in self.subscribers.iter() {
            if !entry.filter.matches(&fix.device_id) {
                continue;
            }
            match entry.tx.try_send(fix.clone()) {
                Ok(()) => self.metrics.broadcast_delivered(),
                Err(TrySendError::Full(_)) => {
                    self.metrics.broadcast_dropped();
                    trace!(
                        subscription = *entry.key(),
                        device_id = %fix.device_id,
                        "Subscriber queue full; skipping event"
                    );
                }
                Err(TrySendError::Closed(_)) => disconnected.push(*entry.key()),
            }
        }

        // Removal happens outside the iteration to avoid holding a shard
        // lock while mutating the map.
        for id in disconnected {
            self.unsubscribe(id);
        }
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

/// Receiving side of one subscription.
///
/// Lives as long as the underlying connection; dropping it removes the
/// registry entry (at the latest on the next publish).
pub struct Subscription {
    id: u64,
    rx: mpsc::Receiver<Fix>,
    registry: Weak<Broadcaster>,
}

impl Subscription {
    /// This subscription's registry id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Receive the next fix: catch-up entries first, then live events.
    /// Returns `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<Fix> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`recv`](Self::recv).
    pub fn try_recv(&mut self) -> Option<Fix> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.unsubscribe(self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn broadcaster() -> Arc<Broadcaster> {
        Arc::new(Broadcaster::new(Arc::new(TrackerMetrics::new())))
    }

    fn fix(device: &str, n: i64) -> Fix {
        Fix::new(
            device,
            41.0,
            29.0,
            Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap() + chrono::Duration::seconds(n),
        )
    }

    #[tokio::test]
    async fn test_empty_filter_receives_every_device() {
        let b = broadcaster();
        let mut sub = b.subscribe(SubscriberFilter::all(), Vec::new());

        b.publish(&fix("bike1", 0));
        b.publish(&fix("car2", 1));

        assert_eq!(sub.recv().await.unwrap().device_id, "bike1");
        assert_eq!(sub.recv().await.unwrap().device_id, "car2");
    }

    #[tokio::test]
    async fn test_filtered_subscriber_only_sees_matching_devices() {
        let b = broadcaster();
        let mut sub = b.subscribe(SubscriberFilter::devices(["bike1"]), Vec::new());

        b.publish(&fix("car2", 0));
        b.publish(&fix("bike1", 1));

        let received = sub.recv().await.unwrap();
        assert_eq!(received.device_id, "bike1");
        assert!(sub.try_recv().is_none(), "no further events queued");
    }

    #[tokio::test]
    async fn test_catch_up_precedes_live_events() {
        let b = broadcaster();
        let mut sub = b.subscribe(
            SubscriberFilter::all(),
            vec![fix("bike1", 0), fix("car2", 0)],
        );
        b.publish(&fix("bike1", 5));

        assert_eq!(sub.recv().await.unwrap().timestamp, fix("bike1", 0).timestamp);
        assert_eq!(sub.recv().await.unwrap().device_id, "car2");
        assert_eq!(sub.recv().await.unwrap().timestamp, fix("bike1", 5).timestamp);
    }

    #[tokio::test]
    async fn test_slow_subscriber_skipped_without_blocking_others() {
        let metrics = Arc::new(TrackerMetrics::new());
        let b = Arc::new(Broadcaster::with_config(
            metrics.clone(),
            BroadcasterConfig {
                channel_capacity: 1,
            },
        ));
        let mut slow = b.subscribe(SubscriberFilter::all(), Vec::new());
        let mut healthy = b.subscribe(SubscriberFilter::all(), Vec::new());

        // `slow` never drains; its queue holds one event, the second is
        // skipped for it but still reaches `healthy`.
        b.publish(&fix("bike1", 0));
        b.publish(&fix("bike1", 1));

        assert_eq!(healthy.try_recv().unwrap().timestamp, fix("bike1", 0).timestamp);
        assert_eq!(healthy.try_recv().unwrap().timestamp, fix("bike1", 1).timestamp);
        assert_eq!(slow.try_recv().unwrap().timestamp, fix("bike1", 0).timestamp);
        assert!(slow.try_recv().is_none());
        assert_eq!(metrics.snapshot().broadcast_dropped, 1);
        assert_eq!(b.subscriber_count(), 2, "slow subscriber is skipped, not removed");
    }

    #[tokio::test]
    async fn test_publish_after_disconnect_removes_subscriber() {
        let b = broadcaster();
        let sub = b.subscribe(SubscriberFilter::all(), Vec::new());
        assert_eq!(b.subscriber_count(), 1);

        drop(sub);
        // Drop already removed it; publishing neither errors nor delivers.
        b.publish(&fix("bike1", 0));
        assert_eq!(b.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_unsubscribe_is_idempotent() {
        let b = broadcaster();
        let sub = b.subscribe(SubscriberFilter::all(), Vec::new());
        let id = sub.id();

        assert!(b.unsubscribe(id));
        assert!(!b.unsubscribe(id));
        drop(sub); // drop path fires too, still fine
        assert_eq!(b.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_closed_receiver_pruned_on_publish() {
        let b = broadcaster();
        let mut sub = b.subscribe(SubscriberFilter::all(), Vec::new());
        // Close the receiving half without dropping the Subscription, as a
        // transport teardown would.
        sub.rx.close();

        b.publish(&fix("bike1", 0));
        assert_eq!(b.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_oversized_catch_up_is_truncated() {
        let b = Arc::new(Broadcaster::with_config(
            Arc::new(TrackerMetrics::new()),
            BroadcasterConfig {
                channel_capacity: 2,
            },
        ));
        let mut sub = b.subscribe(
            SubscriberFilter::all(),
            (0..5).map(|n| fix("bike1", n)).collect(),
        );

        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_some());
        assert!(sub.try_recv().is_none());
    }

    #[test]
    fn test_filter_matching() {
        assert!(SubscriberFilter::all().matches("anything"));
        let filter = SubscriberFilter::devices(["a", "b"]);
        assert!(filter.matches("a"));
        assert!(!filter.matches("c"));
        assert!(!filter.is_all());
    }
}
