//! API route handlers.

use std::net::SocketAddr;

use axum::{
    extract::{ws::WebSocketUpgrade, ConnectInfo, State},
    response::Response,
    Extension, Json,
};

use crate::api::AppState;
use crate::auth::Claims;
use crate::relay::{session, HubStats};

// --- WebSocket ---

/// Upgrade to a relay connection. Failed handshakes are answered by axum and
/// never reach the hub.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(state): State<AppState>,
) -> Response {
    let settings = session::SessionSettings::from(state.config.as_ref());
    ws.max_message_size(state.config.max_message_size)
        .on_failed_upgrade(move |e| tracing::warn!(%addr, error = %e, "websocket upgrade failed"))
        .on_upgrade(move |socket| session::run(state.hub, socket, addr, settings))
}

pub async fn stats(State(state): State<AppState>) -> Json<HubStats> {
    Json(state.hub.stats())
}

// --- Session ---

pub async fn me(Extension(claims): Extension<Claims>) -> Json<Claims> {
    Json(claims)
}
