//! Event bus: one bounded publish point per stream.
//!
//! The ingestion layer publishes validated heartbeat records; each stream's
//! pipeline task is the single consumer of its channel. Bounded sends give
//! backpressure instead of unbounded queue growth.

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::mpsc;

use heartwatch_core::types::{HeartbeatRecord, WatchError};

/// Default per-stream channel capacity.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1024;

/// Routes heartbeat records to per-stream channels.
#[derive(Debug, Default)]
pub struct EventBus {
    senders: RwLock<HashMap<String, mpsc::Sender<HeartbeatRecord>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            senders: RwLock::new(HashMap::new()),
        }
    }

    /// Create the publish point for a stream and hand back the consumer end.
    ///
    /// Returns `None` if a live publish point already exists — the engine
    /// keeps one pipeline per stream. A leftover entry whose consumer is
    /// gone is replaced.
    pub fn register(
        &self,
        stream_name: &str,
        capacity: usize,
    ) -> Option<mpsc::Receiver<HeartbeatRecord>> {
        let mut senders = self.senders.write().expect("bus lock poisoned");
        if let Some(existing) = senders.get(stream_name)
            && !existing.is_closed()
        {
            return None;
        }
        let (tx, rx) = mpsc::channel(capacity);
        senders.insert(stream_name.to_owned(), tx);
        Some(rx)
    }

    /// Remove the publish point for a stream. Returns whether one existed.
    pub fn deregister(&self, stream_name: &str) -> bool {
        let mut senders = self.senders.write().expect("bus lock poisoned");
        senders.remove(stream_name).is_some()
    }

    /// Publish a record to its stream's channel.
    ///
    /// Awaits channel capacity (backpressure), never IO. Fails with
    /// `NotSubscribed` when no publish point exists and `PipelineClosed`
    /// when the consumer has gone away.
    pub async fn publish(&self, record: HeartbeatRecord) -> Result<(), WatchError> {
        let sender = {
            let senders = self.senders.read().expect("bus lock poisoned");
            senders.get(&record.stream_name).cloned()
        };
        let Some(sender) = sender else {
            return Err(WatchError::NotSubscribed(record.stream_name));
        };

        let stream_name = record.stream_name.clone();
        sender
            .send(record)
            .await
            .map_err(|_| WatchError::PipelineClosed(stream_name))
    }

    /// Stream names with a live publish point.
    pub fn active_streams(&self) -> Vec<String> {
        let senders = self.senders.read().expect("bus lock poisoned");
        let mut streams: Vec<String> = senders
            .iter()
            .filter(|(_, tx)| !tx.is_closed())
            .map(|(name, _)| name.clone())
            .collect();
        streams.sort();
        streams
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn record(stream: &str, customer: i64) -> HeartbeatRecord {
        HeartbeatRecord {
            id: Uuid::new_v4(),
            customer_id: customer,
            customer_name: "Customer_X".to_owned(),
            stream_name: stream.to_owned(),
            app_name: "worker".to_owned(),
            app_version: "1.0".to_owned(),
            instance_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn publish_reaches_registered_consumer() {
        let bus = EventBus::new();
        let mut rx = bus.register("WebShop", 8).expect("register");

        bus.publish(record("WebShop", 10)).await.expect("publish");

        let received = rx.recv().await.expect("record delivered");
        assert_eq!(received.customer_id, 10);
        assert_eq!(received.stream_name, "WebShop");
    }

    #[tokio::test]
    async fn publish_without_registration_fails() {
        let bus = EventBus::new();
        let err = bus.publish(record("WebShop", 10)).await.unwrap_err();
        assert!(matches!(err, WatchError::NotSubscribed(name) if name == "WebShop"));
    }

    #[tokio::test]
    async fn publish_after_consumer_dropped_fails() {
        let bus = EventBus::new();
        let rx = bus.register("WebShop", 8).expect("register");
        drop(rx);

        let err = bus.publish(record("WebShop", 10)).await.unwrap_err();
        assert!(matches!(err, WatchError::PipelineClosed(name) if name == "WebShop"));
    }

    #[tokio::test]
    async fn double_register_rejected_while_live() {
        let bus = EventBus::new();
        let _rx = bus.register("WebShop", 8).expect("first register");
        assert!(bus.register("WebShop", 8).is_none());
    }

    #[tokio::test]
    async fn register_replaces_closed_entry() {
        let bus = EventBus::new();
        let rx = bus.register("WebShop", 8).expect("first register");
        drop(rx);

        let mut rx = bus.register("WebShop", 8).expect("re-register after close");
        bus.publish(record("WebShop", 10)).await.expect("publish");
        assert!(rx.recv().await.is_some());
    }

    #[tokio::test]
    async fn deregister_removes_publish_point() {
        let bus = EventBus::new();
        let _rx = bus.register("WebShop", 8).expect("register");
        assert!(bus.deregister("WebShop"));
        assert!(!bus.deregister("WebShop"));

        let err = bus.publish(record("WebShop", 10)).await.unwrap_err();
        assert!(matches!(err, WatchError::NotSubscribed(_)));
    }

    #[tokio::test]
    async fn active_streams_sorted_and_live_only() {
        let bus = EventBus::new();
        let _a = bus.register("WebShop", 8).expect("register");
        let _b = bus.register("MasterProcess", 8).expect("register");
        let dead = bus.register("Batch", 8).expect("register");
        drop(dead);

        assert_eq!(bus.active_streams(), vec!["MasterProcess", "WebShop"]);
    }
}
