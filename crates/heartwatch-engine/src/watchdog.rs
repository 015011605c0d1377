//! Watchdog engine: per-stream grouping/timeout pipelines.
//!
//! One tokio task per subscribed stream owns that stream's
//! [`GroupTable`] and serializes heartbeat handling against deadline
//! sweeps, so a heartbeat racing a due timer resolves to exactly one of
//! two consistent outcomes: the group is refreshed (no event), or the
//! group expired first (one event) and the heartbeat starts a new cycle.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use heartwatch_core::group::{BeatOutcome, GroupTable};
use heartwatch_core::registry::StreamRegistry;
use heartwatch_core::types::{HeartbeatRecord, WatchError};

use crate::bus::{DEFAULT_CHANNEL_CAPACITY, EventBus};
use crate::dispatch::Dispatcher;

// ─── Engine ───────────────────────────────────────────────────────

/// Running pipeline for one stream.
struct Pipeline {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// The watchdog: subscribes streams, routes heartbeats, raises one
/// disconnect event per silence episode.
///
/// Constructed once at startup and shared by reference; holds no global
/// state. Timeouts are resolved from the registry once per stream at
/// subscribe time.
pub struct WatchdogEngine {
    registry: Arc<StreamRegistry>,
    dispatcher: Dispatcher,
    bus: EventBus,
    channel_capacity: usize,
    pipelines: Mutex<HashMap<String, Pipeline>>,
}

impl WatchdogEngine {
    pub fn new(registry: Arc<StreamRegistry>, dispatcher: Dispatcher) -> Self {
        Self::with_channel_capacity(registry, dispatcher, DEFAULT_CHANNEL_CAPACITY)
    }

    pub fn with_channel_capacity(
        registry: Arc<StreamRegistry>,
        dispatcher: Dispatcher,
        channel_capacity: usize,
    ) -> Self {
        Self {
            registry,
            dispatcher,
            bus: EventBus::new(),
            channel_capacity,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Activate the grouping pipeline for a stream.
    ///
    /// Idempotent: returns `Ok(true)` when a pipeline was started and
    /// `Ok(false)` when one is already running. Unconfigured streams are
    /// rejected. Must be called from within a tokio runtime.
    pub fn subscribe(&self, stream_name: &str) -> Result<bool, WatchError> {
        if !self.registry.contains(stream_name) {
            return Err(WatchError::UnknownStream(stream_name.to_owned()));
        }

        let mut pipelines = self.pipelines.lock().expect("pipeline lock poisoned");
        if let Some(existing) = pipelines.get(stream_name) {
            if !existing.handle.is_finished() {
                return Ok(false);
            }
            // A finished pipeline leaves a stale entry behind; replace it.
            pipelines.remove(stream_name);
            self.bus.deregister(stream_name);
        }

        let Some(rx) = self.bus.register(stream_name, self.channel_capacity) else {
            return Ok(false);
        };

        let timeout = self.registry.timeout_for(stream_name);
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run_pipeline(
            stream_name.to_owned(),
            timeout,
            rx,
            cancel.clone(),
            self.dispatcher.clone(),
        ));
        pipelines.insert(stream_name.to_owned(), Pipeline { cancel, handle });

        tracing::info!(
            stream = %stream_name,
            timeout_secs = timeout.as_secs(),
            "pipeline subscribed"
        );
        Ok(true)
    }

    /// Route one validated heartbeat into its stream's pipeline.
    ///
    /// Awaits channel capacity only (bounded send); never performs IO.
    pub async fn ingest(&self, record: HeartbeatRecord) -> Result<(), WatchError> {
        if !self.registry.contains(&record.stream_name) {
            return Err(WatchError::UnknownStream(record.stream_name));
        }

        tracing::debug!(
            stream = %record.stream_name,
            customer_id = record.customer_id,
            instance = %record.instance_id,
            "heartbeat received"
        );
        self.bus.publish(record).await
    }

    /// Tear down a stream's pipeline.
    ///
    /// Pending idle timers are cancelled; groups still active are abandoned
    /// without emitting events. Idempotent: returns whether a pipeline was
    /// actually stopped.
    pub async fn unsubscribe(&self, stream_name: &str) -> bool {
        let pipeline = {
            let mut pipelines = self.pipelines.lock().expect("pipeline lock poisoned");
            pipelines.remove(stream_name)
        };
        let Some(pipeline) = pipeline else {
            return false;
        };

        self.bus.deregister(stream_name);
        pipeline.cancel.cancel();
        let _ = pipeline.handle.await;
        tracing::info!(stream = %stream_name, "pipeline unsubscribed");
        true
    }

    /// Tear down every pipeline. Idempotent.
    pub async fn shutdown_all(&self) {
        let drained: Vec<(String, Pipeline)> = {
            let mut pipelines = self.pipelines.lock().expect("pipeline lock poisoned");
            pipelines.drain().collect()
        };

        for (stream_name, pipeline) in drained {
            self.bus.deregister(&stream_name);
            pipeline.cancel.cancel();
            let _ = pipeline.handle.await;
            tracing::info!(stream = %stream_name, "pipeline unsubscribed");
        }
    }

    /// Streams with a running pipeline, sorted.
    pub fn subscriptions(&self) -> Vec<String> {
        self.bus.active_streams()
    }
}

// ─── Pipeline task ────────────────────────────────────────────────

async fn run_pipeline(
    stream_name: String,
    timeout: Duration,
    mut rx: mpsc::Receiver<HeartbeatRecord>,
    cancel: CancellationToken,
    dispatcher: Dispatcher,
) {
    let mut table = GroupTable::new(stream_name.clone(), timeout);

    loop {
        let next_deadline = table.next_deadline();
        tokio::select! {
            () = cancel.cancelled() => {
                if !table.is_empty() {
                    tracing::debug!(
                        stream = %stream_name,
                        abandoned = table.active_groups(),
                        "pipeline cancelled with active groups"
                    );
                }
                return;
            }
            maybe = rx.recv() => {
                let Some(record) = maybe else {
                    // Publish point deregistered; nothing more can arrive.
                    return;
                };
                let key = record.key();
                let outcome = table.record_heartbeat(record, Utc::now());
                tracing::debug!(
                    group = %key,
                    started = matches!(outcome, BeatOutcome::Started),
                    "group timer armed"
                );
            }
            () = sleep_until_deadline(next_deadline) => {
                for event in table.expire_due(Utc::now()) {
                    tracing::info!(
                        stream = %event.stream_name,
                        customer_id = event.customer_id,
                        customer = %event.customer_name,
                        instance = %event.instance_id,
                        last_seen_at = %event.last_seen_at,
                        "group expired, disconnect detected"
                    );
                    dispatcher.dispatch(event);
                }
            }
        }
    }
}

/// Sleep until the given deadline; with no deadline, wait forever (the
/// surrounding select wakes on heartbeats and cancellation).
async fn sleep_until_deadline(deadline: Option<DateTime<Utc>>) {
    let Some(deadline) = deadline else {
        return std::future::pending().await;
    };
    let wait = (deadline - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    tokio::time::sleep(wait).await;
}

// ─── Tests ────────────────────────────────────────────────────────
