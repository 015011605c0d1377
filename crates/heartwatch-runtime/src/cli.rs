//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "heartwatch", about = "heartbeat watchdog for worker fleets")]
pub struct Cli {
    /// UDS socket path (default: /tmp/heartwatch-$USER/heartwatchd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the watchdog daemon (ingestion server + stream pipelines)
    Daemon(DaemonOpts),
    /// Send a single heartbeat over the socket (operational probe)
    Beat(BeatOpts),
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Comma-separated stream names to monitor
    #[arg(long, env = "HEARTWATCH_STREAMS")]
    pub streams: Option<String>,

    /// Default idle timeout in seconds (per-stream overrides via
    /// HEARTWATCH_TIMEOUT_<STREAM>)
    #[arg(long, env = "HEARTWATCH_TIMEOUT_DEFAULT")]
    pub default_timeout_secs: Option<u64>,

    /// Per-stream heartbeat channel capacity
    #[arg(long, default_value = "1024")]
    pub channel_capacity: usize,

    /// POST disconnect events to this URL instead of only logging them
    #[arg(long, env = "HEARTWATCH_WEBHOOK_URL")]
    pub webhook_url: Option<String>,
}

#[derive(clap::Args)]
pub struct BeatOpts {
    /// Stream name the heartbeat belongs to
    #[arg(long)]
    pub stream: String,

    /// Customer id
    #[arg(long)]
    pub customer_id: i64,

    /// Customer display name
    #[arg(long, default_value = "")]
    pub customer_name: String,

    /// Instance id (random when omitted)
    #[arg(long)]
    pub instance_id: Option<uuid::Uuid>,

    /// Application name
    #[arg(long, default_value = "heartwatch-cli")]
    pub app_name: String,

    /// Application version
    #[arg(long, default_value = env!("CARGO_PKG_VERSION"))]
    pub app_version: String,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/heartwatch/heartwatchd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/heartwatch-{user}/heartwatchd.sock")
}
