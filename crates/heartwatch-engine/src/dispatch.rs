//! Notification dispatch: the seam between the watchdog pipelines and the
//! alerting transport.
//!
//! Pipelines hand disconnect events to a [`Dispatcher`], which forwards
//! them to the configured [`Notifier`] on its own task. A slow or failing
//! notifier can therefore never block heartbeat processing; its failures
//! stay on this side of the seam.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use heartwatch_core::types::DisconnectEvent;

/// Default dispatch queue depth.
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

// ─── Notifier ─────────────────────────────────────────────────────

/// Alerting transport invoked once per disconnect event.
///
/// Fire-and-forget from the engine's perspective: implementations own
/// their errors and must not panic or block for long. Long-running sends
/// belong on a task spawned by the implementation.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &DisconnectEvent);
}

/// Notifier that only writes a structured warning log.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &DisconnectEvent) {
        tracing::warn!(
            stream = %event.stream_name,
            customer_id = event.customer_id,
            customer = %event.customer_name,
            instance = %event.instance_id,
            last_seen_at = %event.last_seen_at,
            "client disconnected"
        );
    }
}

// ─── Dispatcher ───────────────────────────────────────────────────

/// Queue + worker task in front of a [`Notifier`].
///
/// `dispatch` never waits: when the queue is full the event is dropped
/// with a warning. Delivery is best-effort by design.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<DisconnectEvent>,
}

impl Dispatcher {
    /// Spawn the dispatch worker. The returned handle ends when every
    /// `Dispatcher` clone has been dropped and the queue has drained.
    pub fn spawn(notifier: Arc<dyn Notifier>, capacity: usize) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<DisconnectEvent>(capacity);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                notifier.notify(&event);
                tracing::debug!(
                    stream = %event.stream_name,
                    customer_id = event.customer_id,
                    "disconnect notification dispatched"
                );
            }
        });
        (Self { tx }, handle)
    }

    /// Enqueue an event for notification without waiting.
    pub fn dispatch(&self, event: DisconnectEvent) {
        if let Err(err) = self.tx.try_send(event) {
            let event = match err {
                mpsc::error::TrySendError::Full(event) => event,
                mpsc::error::TrySendError::Closed(event) => event,
            };
            tracing::warn!(
                stream = %event.stream_name,
                customer_id = event.customer_id,
                "notification dropped: dispatch queue unavailable"
            );
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────
