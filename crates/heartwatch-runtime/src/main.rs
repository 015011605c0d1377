//! heartwatch: heartbeat watchdog daemon binary.
//! Single process embedding the ingestion server and all stream pipelines.

use clap::Parser;

mod cli;
mod client;
mod config;
mod daemon;
mod notifier;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("HEARTWATCH_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("heartwatch daemon starting");
            daemon::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Beat(opts) => {
            client::cmd_beat(&socket_path, opts).await?;
        }
    }

    Ok(())
}
