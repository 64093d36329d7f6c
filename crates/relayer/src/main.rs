//! Signaling relayer — HTTP + WebSocket backend.
//!
//! Optional env: HOST, PORT, JWT_SECRET, REQUEST_TIMEOUT_SECS, MAX_MESSAGE_SIZE,
//! OUTBOUND_QUEUE_CAPACITY, PING_INTERVAL_SECS, CLOSE_TIMEOUT_SECS, ACCESS_TOKEN_TTL_SECS,
//! REFRESH_TOKEN_TTL_SECS

use clap::Parser;
use tracing_subscriber::EnvFilter;

use relayer::{auth, cli, config, server};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = cli::Cli::parse();
    let config = config::Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    match cli.command.unwrap_or(cli::Commands::Serve) {
        cli::Commands::Serve => {
            let server = server::Server::bind(config).await?;
            tracing::info!("Relayer listening on {}", server.local_addr()?);
            server.run(server::shutdown_signal()).await?;
        }
        cli::Commands::IssueToken { user_id, email } => {
            if std::env::var("JWT_SECRET").is_err() {
                anyhow::bail!("JWT_SECRET required to issue tokens the server will accept");
            }
            let tokens = auth::issue_session(user_id, &email, &config)?;
            println!("Access token (send as the {} cookie):", shared::ACCESS_TOKEN_COOKIE);
            println!("{}", tokens.access_token);
            println!();
            println!("Refresh token:");
            println!("{}", tokens.refresh_token);
        }
    }

    Ok(())
}
