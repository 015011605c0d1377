//! UDS client for the `beat` subcommand.

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use crate::cli::BeatOpts;

/// Send one heartbeat line to the daemon and print the ack.
pub async fn cmd_beat(socket_path: &str, opts: BeatOpts) -> anyhow::Result<()> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let payload = serde_json::json!({
        "customer_id": opts.customer_id,
        "customer_name": opts.customer_name,
        "stream_name": opts.stream,
        "app_name": opts.app_name,
        "app_version": opts.app_version,
        "instance_id": opts.instance_id.unwrap_or_else(uuid::Uuid::new_v4),
    });
    let mut line = serde_json::to_string(&payload)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut resp = String::new();
    reader.read_line(&mut resp).await?;

    let ack: serde_json::Value = serde_json::from_str(resp.trim())?;
    if ack["ok"] != true {
        anyhow::bail!("heartbeat rejected: {}", ack["error"]);
    }
    println!("{}", ack["id"].as_str().unwrap_or_default());
    Ok(())
}
