//! Daemon lifecycle: wires config → registry → dispatcher → engine →
//! ingestion server, then waits for a shutdown signal and tears the
//! pipelines down cleanly.

use std::sync::Arc;

use heartwatch_engine::dispatch::{DEFAULT_QUEUE_CAPACITY, Dispatcher, LogNotifier, Notifier};
use heartwatch_engine::watchdog::WatchdogEngine;

use crate::cli::DaemonOpts;
use crate::config::WatchConfig;
use crate::notifier::WebhookNotifier;
use crate::server;

/// Run the watchdog daemon until ctrl-c or SIGTERM.
pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = WatchConfig::resolve(
        opts.streams.as_deref(),
        opts.default_timeout_secs,
        |key| std::env::var(key).ok(),
    )?;
    let registry = Arc::new(config.into_registry());
    tracing::info!(
        streams = ?registry.streams(),
        default_timeout_secs = registry.default_timeout().as_secs(),
        "stream registry loaded"
    );

    let notifier: Arc<dyn Notifier> = match opts.webhook_url {
        Some(url) => {
            tracing::info!(url = %url, "dispatching disconnect events to webhook");
            Arc::new(WebhookNotifier::new(url))
        }
        None => Arc::new(LogNotifier),
    };
    let (dispatcher, _dispatch_handle) = Dispatcher::spawn(notifier, DEFAULT_QUEUE_CAPACITY);

    let engine = Arc::new(WatchdogEngine::with_channel_capacity(
        Arc::clone(&registry),
        dispatcher,
        opts.channel_capacity,
    ));
    for stream in registry.streams() {
        engine.subscribe(stream)?;
    }

    // Start ingestion server
    let server_engine = Arc::clone(&engine);
    let server_registry = Arc::clone(&registry);
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_engine, server_registry).await {
            tracing::error!("ingestion server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM)
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = server_handle => {
            tracing::warn!("ingestion server exited unexpectedly");
        }
    }

    // Abandon active groups without emitting events, then clean up.
    engine.shutdown_all().await;
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}
