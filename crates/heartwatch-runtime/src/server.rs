//! UDS ingestion server: newline-delimited JSON heartbeats.
//!
//! Each connection may send any number of heartbeat lines; every line is
//! answered with one ack line. Validation happens here, before the core:
//! unknown streams and empty customer/instance ids never reach the engine.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use uuid::Uuid;

use heartwatch_core::registry::StreamRegistry;
use heartwatch_core::types::HeartbeatRecord;
use heartwatch_engine::watchdog::WatchdogEngine;

// ─── Payload ──────────────────────────────────────────────────────

/// Inbound heartbeat payload as sent by clients.
///
/// `id` and `created_at` are optional and assigned at ingestion when
/// absent; everything else must be present and non-empty.
#[derive(Debug, Deserialize)]
pub struct HeartbeatPayload {
    #[serde(default)]
    pub id: Option<Uuid>,
    pub customer_id: i64,
    #[serde(default)]
    pub customer_name: String,
    pub stream_name: String,
    #[serde(default)]
    pub app_name: String,
    #[serde(default)]
    pub app_version: String,
    pub instance_id: Uuid,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("stream_name is not a configured stream: {0}")]
    UnknownStream(String),

    #[error("customer_id must be non-zero")]
    MissingCustomerId,

    #[error("instance_id must be a non-nil uuid")]
    MissingInstanceId,
}

impl HeartbeatPayload {
    /// Validate against the registry and fill in generated fields.
    pub fn into_record(
        self,
        registry: &StreamRegistry,
        now: DateTime<Utc>,
    ) -> Result<HeartbeatRecord, ValidationError> {
        if !registry.contains(&self.stream_name) {
            return Err(ValidationError::UnknownStream(self.stream_name));
        }
        if self.customer_id == 0 {
            return Err(ValidationError::MissingCustomerId);
        }
        if self.instance_id.is_nil() {
            return Err(ValidationError::MissingInstanceId);
        }

        Ok(HeartbeatRecord {
            id: self.id.unwrap_or_else(Uuid::new_v4),
            customer_id: self.customer_id,
            customer_name: self.customer_name,
            stream_name: self.stream_name,
            app_name: self.app_name,
            app_version: self.app_version,
            instance_id: self.instance_id,
            created_at: self.created_at.unwrap_or(now),
        })
    }
}

// ─── Server ───────────────────────────────────────────────────────

/// Run the UDS ingestion server until the listener fails.
pub async fn run_server(
    socket_path: &str,
    engine: Arc<WatchdogEngine>,
    registry: Arc<StreamRegistry>,
) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("ingestion server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let engine = Arc::clone(&engine);
        let registry = Arc::clone(&registry);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, engine, registry).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    engine: Arc<WatchdogEngine>,
    registry: Arc<StreamRegistry>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        if line.trim().is_empty() {
            continue;
        }

        let ack = ingest_line(line.trim(), &engine, &registry).await;
        let mut resp = serde_json::to_string(&ack)?;
        resp.push('\n');
        writer.write_all(resp.as_bytes()).await?;
    }
}

/// Parse, validate and ingest one heartbeat line; build the ack.
async fn ingest_line(
    line: &str,
    engine: &WatchdogEngine,
    registry: &StreamRegistry,
) -> serde_json::Value {
    let payload: HeartbeatPayload = match serde_json::from_str(line) {
        Ok(payload) => payload,
        Err(e) => return err_ack(format!("malformed heartbeat: {e}")),
    };

    let record = match payload.into_record(registry, Utc::now()) {
        Ok(record) => record,
        Err(e) => {
            tracing::debug!("heartbeat rejected: {e}");
            return err_ack(e.to_string());
        }
    };

    let id = record.id;
    match engine.ingest(record).await {
        Ok(()) => serde_json::json!({ "ok": true, "id": id }),
        Err(e) => err_ack(e.to_string()),
    }
}

fn err_ack(error: String) -> serde_json::Value {
    serde_json::json!({ "ok": false, "error": error })
}

// ─── Tests ────────────────────────────────────────────────────────
