//! Shared types and constants for the signaling relay workspace.

mod models;

// Explicit re-exports (avoids rust-analyzer issues with `pub use models::*`)
pub use models::{IceCandidate, SignalKind, SignalMessage};

/// Path of the WebSocket upgrade endpoint.
pub const WS_PATH: &str = "/ws";

/// Body returned by the liveness endpoint.
pub const LIVENESS_MESSAGE: &str = "Signaling relay is up, WebSocket endpoint at /ws";

/// Cookie carrying the access token checked by the relayer's session middleware.
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Default relayer WebSocket URL used by peers.
pub const DEFAULT_WS_URL: &str = "ws://localhost:8080/ws";
