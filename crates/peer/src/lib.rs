//! Relay participant for the signaling relayer.

pub mod cli;
pub mod relay_client;
