//! Client side of the relay.

mod ws;

pub use ws::{connect, pump, render, run_chat, run_listen, send_once, WsStream};
