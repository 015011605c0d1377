//! Webhook notification transport.
//!
//! Each disconnect event is POSTed as JSON on a spawned task; the send
//! outcome is logged and goes no further. The engine never sees transport
//! failures.

use heartwatch_core::types::DisconnectEvent;
use heartwatch_engine::dispatch::Notifier;

/// POSTs disconnect events to a configured URL.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, event: &DisconnectEvent) {
        let client = self.client.clone();
        let url = self.url.clone();
        let event = event.clone();
        tokio::spawn(async move {
            match client.post(&url).json(&event).send().await {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(
                        stream = %event.stream_name,
                        customer_id = event.customer_id,
                        "disconnect notification delivered"
                    );
                }
                Ok(resp) => {
                    tracing::warn!(
                        stream = %event.stream_name,
                        customer_id = event.customer_id,
                        status = %resp.status(),
                        "disconnect notification rejected by webhook"
                    );
                }
                Err(e) => {
                    tracing::warn!(
                        stream = %event.stream_name,
                        customer_id = event.customer_id,
                        "disconnect notification failed: {e}"
                    );
                }
            }
        });
    }
}
