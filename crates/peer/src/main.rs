//! Signaling relay peer — terminal client.
//!
//! Optional env: RELAY_WS_URL (default ws://localhost:8080/ws)

use std::time::Duration;

use clap::Parser;
use peer::{cli, relay_client};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so relayed frames on stdout stay pipeable.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = cli::Cli::parse();

    match cli.command.unwrap_or(cli::Commands::Chat) {
        cli::Commands::Chat => relay_client::run_chat(&cli.url).await?,
        cli::Commands::Listen { reconnect } => relay_client::run_listen(&cli.url, reconnect).await?,
        cli::Commands::Send {
            message,
            linger_secs,
        } => relay_client::send_once(&cli.url, &message, Duration::from_secs(linger_secs)).await?,
    }

    Ok(())
}
