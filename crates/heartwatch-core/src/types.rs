use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ─── Heartbeat ────────────────────────────────────────────────────

/// One accepted, validated liveness signal from a monitored instance.
///
/// Records reach the core only after the ingestion layer has filled in
/// `id`/`created_at` and verified that `stream_name` is configured and
/// `customer_id`/`instance_id` are non-empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatRecord {
    pub id: Uuid,
    pub customer_id: i64,
    pub customer_name: String,
    pub stream_name: String,
    pub app_name: String,
    pub app_version: String,
    pub instance_id: Uuid,
    pub created_at: DateTime<Utc>,
}

impl HeartbeatRecord {
    /// The grouping key this record belongs to.
    pub fn key(&self) -> GroupKey {
        GroupKey {
            stream_name: self.stream_name.clone(),
            customer_id: self.customer_id,
        }
    }
}

/// Identifies one monitored group: a customer within a stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroupKey {
    pub stream_name: String,
    pub customer_id: i64,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.stream_name, self.customer_id)
    }
}

// ─── Disconnect ───────────────────────────────────────────────────

/// Raised once per silence episode when a group's idle deadline passes,
/// carrying the last heartbeat seen for that group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisconnectEvent {
    pub stream_name: String,
    pub customer_id: i64,
    pub customer_name: String,
    pub instance_id: Uuid,
    pub last_seen_at: DateTime<Utc>,
}

impl DisconnectEvent {
    /// Derive the event from the expiring group's last record.
    pub fn from_record(record: &HeartbeatRecord) -> Self {
        Self {
            stream_name: record.stream_name.clone(),
            customer_id: record.customer_id,
            customer_name: record.customer_name.clone(),
            instance_id: record.instance_id,
            last_seen_at: record.created_at,
        }
    }
}

// ─── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum WatchError {
    /// The stream name is not in the registry.
    #[error("unknown stream: {0}")]
    UnknownStream(String),

    /// The stream is configured but no pipeline is running for it.
    #[error("stream not subscribed: {0}")]
    NotSubscribed(String),

    /// The pipeline for this stream has stopped accepting records.
    #[error("pipeline closed for stream: {0}")]
    PipelineClosed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(stream: &str, customer: i64) -> HeartbeatRecord {
        HeartbeatRecord {
            id: Uuid::new_v4(),
            customer_id: customer,
            customer_name: "Customer_X".to_owned(),
            stream_name: stream.to_owned(),
            app_name: "BackgroundWorker_8".to_owned(),
            app_version: "1.0.8".to_owned(),
            instance_id: Uuid::new_v4(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn key_combines_stream_and_customer() {
        let rec = record("WebShop", 10);
        let key = rec.key();
        assert_eq!(key.stream_name, "WebShop");
        assert_eq!(key.customer_id, 10);
        assert_eq!(key.to_string(), "WebShop/10");
    }

    #[test]
    fn disconnect_copies_record_fields() {
        let rec = record("WebShop", 10);
        let event = DisconnectEvent::from_record(&rec);
        assert_eq!(event.stream_name, rec.stream_name);
        assert_eq!(event.customer_id, rec.customer_id);
        assert_eq!(event.customer_name, rec.customer_name);
        assert_eq!(event.instance_id, rec.instance_id);
        assert_eq!(event.last_seen_at, rec.created_at);
    }

    #[test]
    fn record_round_trips_through_json() {
        let rec = record("MasterProcess", 7);
        let json = serde_json::to_string(&rec).expect("serialize");
        let back: HeartbeatRecord = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, rec);
    }
}
