//! Drives one upgraded WebSocket: registers it with the hub, runs its writer
//! task, and reads it until it ends.

use std::fmt::Display;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::{Sink, SinkExt, StreamExt};
use tracing::Instrument;

use super::{Connection, Hub, Outlet};
use crate::config::Config;

/// Per-connection transport settings.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub outbound_queue_capacity: usize,
    pub ping_interval: Duration,
    pub close_timeout: Duration,
}

impl From<&Config> for SessionSettings {
    fn from(config: &Config) -> Self {
        Self {
            outbound_queue_capacity: config.outbound_queue_capacity,
            ping_interval: config.ping_interval,
            close_timeout: config.close_timeout,
        }
    }
}

/// Run a freshly upgraded socket until either side closes it.
pub async fn run(hub: Arc<Hub>, socket: WebSocket, addr: SocketAddr, settings: SessionSettings) {
    let (sink, stream) = socket.split();
    let (conn, outlet) = Connection::open(settings.outbound_queue_capacity);
    let span = tracing::info_span!("peer", id = %conn.id(), %addr);

    async move {
        hub.register(&conn);
        let writer =
            tokio::spawn(write_loop(conn.clone(), outlet, sink, settings).in_current_span());
        hub.receive_loop(conn, stream).await;
        if let Err(e) = writer.await {
            tracing::warn!(error = %e, "writer task failed");
        }
    }
    .instrument(span)
    .await
}

/// Drain queued frames into the socket and keep it alive with pings.
///
/// Any write error closes the connection; its reader then unregisters it. A
/// write still pending when the connection is closed is abandoned and the sink
/// dropped, so a peer that stopped reading cannot pin the task. The final close
/// frame is bounded by `close_timeout`.
async fn write_loop<W>(conn: Connection, mut outlet: Outlet, mut sink: W, settings: SessionSettings)
where
    W: Sink<Message> + Unpin,
    W::Error: Display,
{
    let mut ping = tokio::time::interval(settings.ping_interval);
    ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    ping.tick().await;

    let closed = conn.closed();
    futures_util::pin_mut!(closed);

    loop {
        let msg = tokio::select! {
            frame = outlet.next() => match frame {
                Some(frame) => frame.into_message(),
                None => break,
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };
        let sent = tokio::select! {
            biased;
            _ = &mut closed => {
                tracing::debug!("connection closed during write, dropping socket");
                return;
            }
            sent = sink.send(msg) => sent,
        };
        if let Err(e) = sent {
            tracing::debug!(error = %e, "write failed");
            conn.close();
            return;
        }
    }

    let goodbye = async {
        match sink.send(Message::Close(None)).await {
            Ok(()) => sink.close().await,
            Err(e) => Err(e),
        }
    };
    match tokio::time::timeout(settings.close_timeout, goodbye).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(error = %e, "close frame failed"),
        Err(_) => tracing::debug!("close frame timed out, dropping socket"),
    }
}
