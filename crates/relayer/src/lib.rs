//! Signaling relayer: WebSocket connection hub relaying every message to all other peers.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod relay;
pub mod server;
