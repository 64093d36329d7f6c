//! Connection handles and their outbound queues.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use super::Frame;

/// Identity of one accepted connection. A reconnecting peer gets a fresh one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Why a frame could not be handed to a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("connection closed")]
    Closed,
    #[error("outbound queue full")]
    QueueFull,
}

/// Handle to one open connection. Clones share the same queue and close state.
///
/// Closing is one-way: once closed, a connection never accepts frames again
/// and is never re-registered.
#[derive(Debug, Clone)]
pub struct Connection {
    id: ConnectionId,
    outbound: mpsc::Sender<Frame>,
    closed: Arc<watch::Sender<bool>>,
}

/// Receiving half of a connection, drained by the socket writer.
#[derive(Debug)]
pub struct Outlet {
    frames: mpsc::Receiver<Frame>,
    closed: watch::Receiver<bool>,
}

impl Connection {
    /// Open a connection with room for `capacity` queued frames.
    pub fn open(capacity: usize) -> (Self, Outlet) {
        let (outbound, frames) = mpsc::channel(capacity.max(1));
        let (closed_tx, closed) = watch::channel(false);
        let conn = Self {
            id: ConnectionId::new(),
            outbound,
            closed: Arc::new(closed_tx),
        };
        (conn, Outlet { frames, closed })
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.borrow()
    }

    /// Queue a frame without waiting. A full queue means the peer is not keeping up.
    pub fn try_deliver(&self, frame: Frame) -> Result<(), DeliveryError> {
        if self.is_closed() {
            return Err(DeliveryError::Closed);
        }
        self.outbound.try_send(frame).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => DeliveryError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => DeliveryError::Closed,
        })
    }

    /// Mark closed and wake the reader and writer. Returns false if already closed.
    pub fn close(&self) -> bool {
        self.closed.send_if_modified(|closed| {
            if *closed {
                false
            } else {
                *closed = true;
                true
            }
        })
    }

    /// Resolves once the connection is closed.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.closed.subscribe();
        async move {
            let _ = rx.wait_for(|closed| *closed).await;
        }
    }
}

impl Outlet {
    /// Next queued frame, or `None` once the connection is closed.
    pub async fn next(&mut self) -> Option<Frame> {
        tokio::select! {
            biased;
            _ = wait_closed(&mut self.closed) => None,
            frame = self.frames.recv() => frame,
        }
    }

    /// Next already-queued frame, without waiting.
    pub fn try_next(&mut self) -> Option<Frame> {
        self.frames.try_recv().ok()
    }
}

async fn wait_closed(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|closed| *closed).await;
}
