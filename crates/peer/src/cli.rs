//! CLI argument parsing.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "peer")]
#[command(about = "Signaling relay participant")]
pub struct Cli {
    /// Relayer WebSocket URL
    #[arg(long, env = "RELAY_WS_URL", default_value = shared::DEFAULT_WS_URL)]
    pub url: String,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Send stdin lines as text frames and print relayed frames [default]
    Chat,

    /// Print relayed frames only
    Listen {
        /// Reconnect after the connection drops
        #[arg(long)]
        reconnect: bool,
    },

    /// Send one text frame and disconnect
    Send {
        #[arg(value_name = "MESSAGE")]
        message: String,

        /// Keep printing relayed frames for this many seconds before closing
        #[arg(long, default_value_t = 0)]
        linger_secs: u64,
    },
}
