//! Per-stream group table: the grouping/timeout state machine.
//!
//! One table per stream, owned by that stream's pipeline task. Each
//! customer key holds at most one live group carrying the last heartbeat
//! seen and an idle deadline. A heartbeat creates or refreshes the group
//! and pushes the deadline; a sweep past the deadline removes the group
//! and derives exactly one disconnect event from the captured record.
//!
//! Pure and deterministic: all time values are passed in as parameters.

use std::collections::HashMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::types::{DisconnectEvent, HeartbeatRecord};

// ─── Group ────────────────────────────────────────────────────────

/// One active silence-detection cycle for a customer key.
#[derive(Debug, Clone)]
struct Group {
    last_record: HeartbeatRecord,
    deadline: DateTime<Utc>,
}

/// Result of recording a heartbeat into the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BeatOutcome {
    /// No group existed for the key; a new cycle begins.
    Started,
    /// An existing group was refreshed and its deadline pushed.
    Refreshed,
}

// ─── Group Table ──────────────────────────────────────────────────

/// Tracks every live group of one stream.
///
/// The owning task serializes all mutations, so a heartbeat arriving while
/// a deadline is due resolves deterministically: whichever operation runs
/// first wins, and the loser observes a consistent table (refreshed group,
/// or no group at all).
#[derive(Debug)]
pub struct GroupTable {
    stream_name: String,
    timeout: TimeDelta,
    groups: HashMap<i64, Group>,
}

impl GroupTable {
    /// Create an empty table for a stream with its resolved idle timeout.
    pub fn new(stream_name: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self {
            stream_name: stream_name.into(),
            timeout: TimeDelta::from_std(timeout).unwrap_or(TimeDelta::MAX),
            groups: HashMap::new(),
        }
    }

    /// Record a heartbeat: create the group on first sight, otherwise
    /// replace `last_record` and push the deadline to `now + timeout`.
    ///
    /// Routing records from another stream into this table is a programming
    /// error, not a runtime condition.
    pub fn record_heartbeat(&mut self, record: HeartbeatRecord, now: DateTime<Utc>) -> BeatOutcome {
        debug_assert_eq!(
            record.stream_name, self.stream_name,
            "record routed to wrong stream table"
        );

        let deadline = now + self.timeout;
        match self.groups.insert(
            record.customer_id,
            Group {
                last_record: record,
                deadline,
            },
        ) {
            None => BeatOutcome::Started,
            Some(_) => BeatOutcome::Refreshed,
        }
    }

    /// Remove every group whose deadline has passed and derive one
    /// disconnect event per removed group, from its captured last record.
    ///
    /// Capture, removal and derivation happen in one step: after this call
    /// the expired keys are gone from the table, so the next heartbeat for
    /// such a key starts a brand-new cycle.
    pub fn expire_due(&mut self, now: DateTime<Utc>) -> Vec<DisconnectEvent> {
        let due: Vec<i64> = self
            .groups
            .iter()
            .filter(|(_, group)| group.deadline <= now)
            .map(|(customer_id, _)| *customer_id)
            .collect();

        let mut events = Vec::with_capacity(due.len());
        for customer_id in due {
            if let Some(group) = self.groups.remove(&customer_id) {
                events.push(DisconnectEvent::from_record(&group.last_record));
            }
        }
        events
    }

    /// Earliest pending deadline across all live groups.
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.groups.values().map(|g| g.deadline).min()
    }

    /// Number of live groups.
    pub fn active_groups(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

// ─── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::Duration;
    use uuid::Uuid;

    /// Deterministic timeline base; offsets below are in seconds.
    fn at(secs: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap() + TimeDelta::seconds(secs)
    }

    fn beat(customer: i64, secs: i64) -> HeartbeatRecord {
        HeartbeatRecord {
            id: Uuid::new_v4(),
            customer_id: customer,
            customer_name: format!("Customer_{customer}"),
            stream_name: "WebShop".to_owned(),
            app_name: "BackgroundWorker_8".to_owned(),
            app_version: "1.0.8".to_owned(),
            instance_id: Uuid::new_v4(),
            created_at: at(secs),
        }
    }

    fn table() -> GroupTable {
        GroupTable::new("WebShop", Duration::from_secs(30))
    }

    #[test]
    fn empty_table_has_no_deadline() {
        let table = table();
        assert!(table.is_empty());
        assert!(table.next_deadline().is_none());
    }

    #[test]
    fn first_beat_starts_group() {
        let mut table = table();
        let outcome = table.record_heartbeat(beat(10, 0), at(0));
        assert_eq!(outcome, BeatOutcome::Started);
        assert_eq!(table.active_groups(), 1);
        assert_eq!(table.next_deadline(), Some(at(30)));
    }

    #[test]
    fn repeat_beat_refreshes_and_pushes_deadline() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));
        let outcome = table.record_heartbeat(beat(10, 10), at(10));
        assert_eq!(outcome, BeatOutcome::Refreshed);
        assert_eq!(table.active_groups(), 1, "exactly one live group per key");
        assert_eq!(table.next_deadline(), Some(at(40)));
    }

    #[test]
    fn no_expiry_before_deadline() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));
        assert!(table.expire_due(at(29)).is_empty());
        assert_eq!(table.active_groups(), 1);
    }

    #[test]
    fn expiry_emits_once_and_removes_group() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));

        let events = table.expire_due(at(30));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].customer_id, 10);
        assert!(table.is_empty());

        // A second sweep finds nothing: one event per silence episode.
        assert!(table.expire_due(at(60)).is_empty());
    }

    #[test]
    fn expiry_carries_last_record() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));
        let last = beat(10, 10);
        let expected_instance = last.instance_id;
        table.record_heartbeat(last, at(10));

        let events = table.expire_due(at(40));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instance_id, expected_instance);
        assert_eq!(events[0].last_seen_at, at(10));
        assert_eq!(events[0].customer_name, "Customer_10");
    }

    #[test]
    fn beat_after_expiry_starts_fresh_cycle() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));
        assert_eq!(table.expire_due(at(30)).len(), 1);

        let outcome = table.record_heartbeat(beat(10, 50), at(50));
        assert_eq!(outcome, BeatOutcome::Started);
        assert_eq!(table.next_deadline(), Some(at(80)));
    }

    #[test]
    fn keys_are_independent() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));
        table.record_heartbeat(beat(20, 20), at(20));

        // Customer 10 expires at t=30; customer 20's timer is untouched.
        let events = table.expire_due(at(35));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].customer_id, 10);
        assert_eq!(table.active_groups(), 1);
        assert_eq!(table.next_deadline(), Some(at(50)));
    }

    #[test]
    fn beats_on_one_key_never_reset_another() {
        let mut table = table();
        table.record_heartbeat(beat(10, 0), at(0));
        // A flood of beats for customer 20 around customer 10's deadline.
        for secs in [5, 10, 15, 20, 25, 29] {
            table.record_heartbeat(beat(20, secs), at(secs));
        }

        let events = table.expire_due(at(30));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].customer_id, 10);
    }

    #[test]
    fn simultaneous_deadlines_emit_one_event_each() {
        let mut table = table();
        table.record_heartbeat(beat(1, 0), at(0));
        table.record_heartbeat(beat(2, 0), at(0));
        table.record_heartbeat(beat(3, 0), at(0));

        let mut events = table.expire_due(at(30));
        events.sort_by_key(|e| e.customer_id);
        let customers: Vec<i64> = events.iter().map(|e| e.customer_id).collect();
        assert_eq!(customers, vec![1, 2, 3]);
        assert!(table.is_empty());
    }

    /// The reference timeline: default timeout 30, beats at t=0 and t=10,
    /// disconnect at t=40 carrying the t=10 record, new cycle at t=50,
    /// second disconnect at t=80.
    #[test]
    fn reference_timeline_two_episodes() {
        let mut table = table();

        table.record_heartbeat(beat(10, 0), at(0));
        assert!(table.expire_due(at(0)).is_empty());

        let second = beat(10, 10);
        let second_instance = second.instance_id;
        table.record_heartbeat(second, at(10));
        assert!(table.expire_due(at(39)).is_empty(), "deadline moved to t=40");

        let events = table.expire_due(at(40));
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].instance_id, second_instance);
        assert_eq!(events[0].last_seen_at, at(10));

        table.record_heartbeat(beat(10, 50), at(50));
        assert!(table.expire_due(at(50)).is_empty(), "no event on restart");
        assert!(table.expire_due(at(79)).is_empty());

        let events = table.expire_due(at(80));
        assert_eq!(events.len(), 1, "second episode emits again");
        assert_eq!(events[0].last_seen_at, at(50));
    }

    #[test]
    fn burst_before_expiry_collapses_to_last_record() {
        let mut table = table();
        let mut last_instance = None;
        for secs in [0, 1, 2, 3, 4] {
            let rec = beat(10, secs);
            last_instance = Some(rec.instance_id);
            table.record_heartbeat(rec, at(secs));
        }

        let events = table.expire_due(at(34));
        assert_eq!(events.len(), 1, "burst still yields one event");
        assert_eq!(events[0].instance_id, last_instance.unwrap());
        assert_eq!(events[0].last_seen_at, at(4));
    }
}
