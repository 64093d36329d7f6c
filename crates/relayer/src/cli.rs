//! CLI argument parsing.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "relayer")]
#[command(about = "Signaling relayer: WebSocket broadcast hub")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the relay server [default]
    Serve,

    /// Print an access/refresh token pair signed with the configured JWT_SECRET
    IssueToken {
        #[arg(value_name = "USER_ID")]
        user_id: i64,

        #[arg(value_name = "EMAIL")]
        email: String,
    },
}
