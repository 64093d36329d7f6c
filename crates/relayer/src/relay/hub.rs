//! Connection hub: the registry of open connections and the broadcast relay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use axum::extract::ws::Message;
use futures_util::{Stream, StreamExt};
use serde::Serialize;

use super::{Connection, ConnectionId, Frame};

/// Monotonic counters, reset only on restart.
#[derive(Debug, Default)]
struct HubCounters {
    accepted: AtomicU64,
    frames_relayed: AtomicU64,
    deliveries: AtomicU64,
    reaped: AtomicU64,
}

/// Point-in-time view of hub activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HubStats {
    pub connections: usize,
    pub accepted_total: u64,
    pub frames_relayed_total: u64,
    pub deliveries_total: u64,
    pub reaped_total: u64,
}

/// Owns the set of open connections and relays every inbound frame to all
/// other members.
///
/// One mutex guards the registry for each insert, removal and full broadcast
/// pass. Delivery under the lock only enqueues, so a slow peer can never stall
/// a broadcaster: a peer whose queue is full or closed is removed on the spot.
#[derive(Debug, Default)]
pub struct Hub {
    registry: Mutex<HashMap<ConnectionId, Connection>>,
    counters: HubCounters,
}

/// Unregisters its connection when dropped, whatever way the receive loop exits.
struct Registration<'a> {
    hub: &'a Hub,
    conn: Connection,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.hub.unregister(&self.conn);
    }
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    fn registry(&self) -> MutexGuard<'_, HashMap<ConnectionId, Connection>> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a freshly accepted connection. Registering the same identity twice
    /// is a no-op, and a closed connection is never admitted.
    pub fn register(&self, conn: &Connection) -> bool {
        let total = {
            let mut registry = self.registry();
            if conn.is_closed() {
                tracing::debug!(peer = %conn.id(), "refusing to register closed connection");
                return false;
            }
            if registry.contains_key(&conn.id()) {
                return false;
            }
            registry.insert(conn.id(), conn.clone());
            registry.len()
        };
        self.counters.accepted.fetch_add(1, Ordering::Relaxed);
        tracing::info!(peer = %conn.id(), total, "peer connected");
        true
    }

    /// Remove the connection if present and close it. Safe to repeat.
    ///
    /// Closing happens under the registry lock so a racing `register` either
    /// runs first and is undone here, or sees the connection already closed.
    pub fn unregister(&self, conn: &Connection) -> bool {
        let (removed, total) = {
            let mut registry = self.registry();
            let removed = registry.remove(&conn.id()).is_some();
            conn.close();
            (removed, registry.len())
        };
        if removed {
            tracing::info!(peer = %conn.id(), total, "peer disconnected");
        }
        removed
    }

    /// Deliver `frame` to every registered connection except `sender`.
    ///
    /// A member that cannot take the frame is removed and closed immediately;
    /// the pass continues with the rest. Returns how many members got it.
    pub fn broadcast(&self, sender: ConnectionId, frame: &Frame) -> usize {
        let mut delivered = 0;
        let mut reaped = Vec::new();
        let total = {
            let mut registry = self.registry();
            registry.retain(|id, conn| {
                if *id == sender {
                    return true;
                }
                match conn.try_deliver(frame.clone()) {
                    Ok(()) => {
                        delivered += 1;
                        true
                    }
                    Err(err) => {
                        conn.close();
                        reaped.push((*id, err));
                        false
                    }
                }
            });
            registry.len()
        };

        for (peer, err) in &reaped {
            tracing::warn!(%peer, error = %err, total, "delivery failed, dropping peer");
        }
        self.counters.frames_relayed.fetch_add(1, Ordering::Relaxed);
        self.counters
            .deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.counters
            .reaped
            .fetch_add(reaped.len() as u64, Ordering::Relaxed);
        tracing::trace!(%sender, bytes = frame.len(), delivered, "frame relayed");
        delivered
    }

    /// Read `conn` until it errors, closes, or is closed by the hub,
    /// broadcasting every data frame in arrival order. Must be the only reader
    /// of `inbound`. The connection is unregistered on every exit path.
    pub async fn receive_loop<S, E>(&self, conn: Connection, inbound: S)
    where
        S: Stream<Item = Result<Message, E>>,
        E: std::fmt::Display,
    {
        let _registration = Registration {
            hub: self,
            conn: conn.clone(),
        };
        let closed = conn.closed();
        futures_util::pin_mut!(closed);
        futures_util::pin_mut!(inbound);

        loop {
            let next = tokio::select! {
                _ = &mut closed => {
                    tracing::debug!(peer = %conn.id(), "connection closed by hub");
                    break;
                }
                next = inbound.next() => next,
            };
            match next {
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(peer = %conn.id(), "peer closed connection");
                    break;
                }
                Some(Ok(msg)) => {
                    if let Some(frame) = Frame::from_message(msg) {
                        self.broadcast(conn.id(), &frame);
                    }
                }
                Some(Err(e)) => {
                    tracing::debug!(peer = %conn.id(), error = %e, "read failed");
                    break;
                }
            }
        }
    }

    /// Close every connection. Receive loops then exit through their normal path.
    pub fn close_all(&self) -> usize {
        let drained: Vec<Connection> = {
            let mut registry = self.registry();
            registry
                .drain()
                .map(|(_, conn)| {
                    conn.close();
                    conn
                })
                .collect()
        };
        if !drained.is_empty() {
            tracing::info!(count = drained.len(), "closed all connections");
        }
        drained.len()
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.registry().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> HubStats {
        HubStats {
            connections: self.len(),
            accepted_total: self.counters.accepted.load(Ordering::Relaxed),
            frames_relayed_total: self.counters.frames_relayed.load(Ordering::Relaxed),
            deliveries_total: self.counters.deliveries.load(Ordering::Relaxed),
            reaped_total: self.counters.reaped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::Outlet;
    use rand::seq::SliceRandom;
    use rand::Rng;
    use std::sync::Arc;
    use std::time::Duration;

    fn open(hub: &Hub) -> (Connection, Outlet) {
        let (conn, outlet) = Connection::open(8);
        assert!(hub.register(&conn));
        (conn, outlet)
    }

    fn drain(outlet: &mut Outlet) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = outlet.try_next() {
            frames.push(frame);
        }
        frames
    }

    #[test]
    fn register_is_idempotent() {
        let hub = Hub::new();
        let (conn, _outlet) = Connection::open(4);

        assert!(hub.register(&conn));
        assert!(!hub.register(&conn));
        assert!(!hub.register(&conn.clone()));
        assert_eq!(hub.len(), 1);
        assert!(hub.contains(conn.id()));
        assert_eq!(hub.stats().accepted_total, 1);
    }

    #[test]
    fn closed_connection_is_never_registered() {
        let hub = Hub::new();
        let (conn, _outlet) = open(&hub);
        hub.unregister(&conn);

        assert!(!hub.register(&conn));
        assert!(hub.is_empty());
    }

    #[test]
    fn broadcast_skips_sender() {
        let hub = Hub::new();
        let (a, mut a_out) = open(&hub);
        let (_b, mut b_out) = open(&hub);
        let (_c, mut c_out) = open(&hub);

        let frame = Frame::text(r#"{"type":"offer","sdp":"v=0"}"#);
        assert_eq!(hub.broadcast(a.id(), &frame), 2);

        assert!(drain(&mut a_out).is_empty());
        assert_eq!(drain(&mut b_out), vec![frame.clone()]);
        assert_eq!(drain(&mut c_out), vec![frame]);
    }

    #[test]
    fn lone_sender_reaches_nobody() {
        let hub = Hub::new();
        let (a, mut a_out) = open(&hub);

        assert_eq!(hub.broadcast(a.id(), &Frame::binary(vec![1, 2, 3])), 0);
        assert!(drain(&mut a_out).is_empty());
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn failed_delivery_reaps_only_that_peer() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (b, b_out) = open(&hub);
        let (c, mut c_out) = open(&hub);
        drop(b_out);

        let frame = Frame::text("candidate");
        assert_eq!(hub.broadcast(a.id(), &frame), 1);

        assert!(!hub.contains(b.id()));
        assert!(b.is_closed());
        assert!(hub.contains(c.id()));
        assert_eq!(drain(&mut c_out), vec![frame]);
        assert_eq!(hub.stats().reaped_total, 1);
    }

    #[test]
    fn slow_consumer_is_dropped() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (slow, _slow_out) = Connection::open(1);
        hub.register(&slow);

        assert_eq!(hub.broadcast(a.id(), &Frame::text("1")), 1);
        assert_eq!(hub.broadcast(a.id(), &Frame::text("2")), 0);
        assert!(!hub.contains(slow.id()));
        assert!(slow.is_closed());
    }

    #[test]
    fn unregister_is_idempotent() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (b, _b_out) = open(&hub);

        assert!(hub.unregister(&b));
        assert!(!hub.unregister(&b));
        assert_eq!(hub.len(), 1);
        assert!(hub.contains(a.id()));
    }

    #[test]
    fn unregister_after_reap_is_a_no_op() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (b, b_out) = open(&hub);
        drop(b_out);
        hub.broadcast(a.id(), &Frame::text("x"));

        assert!(!hub.unregister(&b));
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn unregister_racing_register_never_leaves_closed_entry() {
        use std::sync::Barrier;

        let hub = Arc::new(Hub::new());
        for _ in 0..2000 {
            let (conn, _outlet) = Connection::open(1);
            let barrier = Arc::new(Barrier::new(2));
            let registering = {
                let hub = hub.clone();
                let conn = conn.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    hub.register(&conn);
                })
            };
            barrier.wait();
            hub.unregister(&conn);
            registering.join().unwrap();

            assert!(conn.is_closed());
            assert!(!hub.contains(conn.id()), "closed connection re-registered");
        }
        assert!(hub.is_empty());
    }

    #[test]
    fn close_all_empties_registry() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (b, _b_out) = open(&hub);

        assert_eq!(hub.close_all(), 2);
        assert!(hub.is_empty());
        assert!(a.is_closed() && b.is_closed());
    }

    #[tokio::test]
    async fn receive_loop_relays_in_order_and_unregisters_on_end() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (_b, mut b_out) = open(&hub);

        let inbound = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Message::Text("first".into())),
            Ok(Message::Ping(Default::default())),
            Ok(Message::Binary(vec![7u8, 8].into())),
            Ok(Message::Text("third".into())),
        ]);
        hub.receive_loop(a.clone(), inbound).await;

        assert_eq!(
            drain(&mut b_out),
            vec![
                Frame::text("first"),
                Frame::binary(vec![7u8, 8]),
                Frame::text("third"),
            ]
        );
        assert!(!hub.contains(a.id()));
        assert!(a.is_closed());
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn receive_loop_stops_at_close_frame_and_read_error() {
        let hub = Hub::new();
        let (a, _a_out) = open(&hub);
        let (b, mut b_out) = open(&hub);
        let (_c, mut c_out) = open(&hub);

        let closing = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Message::Close(None)),
            Ok(Message::Text("after close".into())),
        ]);
        hub.receive_loop(a.clone(), closing).await;
        assert!(!hub.contains(a.id()));

        let failing = futures_util::stream::iter(vec![
            Err(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset")),
            Ok(Message::Text("after error".into())),
        ]);
        hub.receive_loop(b.clone(), failing).await;
        assert!(!hub.contains(b.id()));

        assert!(drain(&mut b_out).is_empty());
        assert!(drain(&mut c_out).is_empty());
        assert_eq!(hub.len(), 1);
    }

    #[tokio::test]
    async fn receive_loop_exits_when_hub_closes_connection() {
        let hub = Arc::new(Hub::new());
        let (a, _a_out) = open(&hub);

        let task = {
            let hub = hub.clone();
            let a = a.clone();
            tokio::spawn(async move {
                hub.receive_loop(a, futures_util::stream::pending::<Result<Message, std::io::Error>>())
                    .await
            })
        };
        tokio::task::yield_now().await;
        hub.close_all();

        tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(hub.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_register_and_broadcast_stays_consistent() {
        const PEERS: usize = 64;
        const BROADCASTS: usize = 48;

        #[derive(Clone, Copy)]
        enum Fate {
            Live,
            Dead,
            Leaves,
        }

        let hub = Arc::new(Hub::new());
        let mut rng = rand::thread_rng();

        let mut peers = Vec::new();
        for _ in 0..PEERS {
            let (conn, outlet) = Connection::open(BROADCASTS + 2);
            let fate = match rng.gen_range(0..4) {
                0 => Fate::Dead,
                1 => Fate::Leaves,
                _ => Fate::Live,
            };
            let outlet = match fate {
                Fate::Dead => None,
                _ => Some(outlet),
            };
            peers.push((conn, fate, outlet));
        }

        let mut order: Vec<usize> = (0..PEERS + BROADCASTS).collect();
        order.shuffle(&mut rng);
        let senders: Vec<usize> = (0..BROADCASTS).map(|_| rng.gen_range(0..PEERS)).collect();
        let delays: Vec<u64> = order.iter().map(|_| rng.gen_range(0..3)).collect();

        let mut tasks = Vec::new();
        for (slot, step) in order.into_iter().enumerate() {
            let hub = hub.clone();
            let delay = delays[slot];
            if step < PEERS {
                let (conn, fate, _) = &peers[step];
                let conn = conn.clone();
                let fate = *fate;
                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    hub.register(&conn);
                    tokio::task::yield_now().await;
                    if let Fate::Leaves = fate {
                        hub.unregister(&conn);
                    }
                }));
            } else {
                let sender = senders[step - PEERS];
                let sender_id = peers[sender].0.id();
                tasks.push(tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    hub.broadcast(sender_id, &Frame::text(sender.to_string()));
                }));
            }
        }
        for task in tasks {
            task.await.unwrap();
        }

        // Sweep dead peers that registered after the last broadcast.
        hub.broadcast(ConnectionId::new(), &Frame::text("sweep"));

        let expected_live: Vec<ConnectionId> = peers
            .iter()
            .filter(|(_, fate, _)| matches!(fate, Fate::Live))
            .map(|(conn, _, _)| conn.id())
            .collect();
        assert_eq!(hub.len(), expected_live.len());
        for id in &expected_live {
            assert!(hub.contains(*id));
        }

        for (index, (conn, fate, outlet)) in peers.iter_mut().enumerate() {
            if let (Fate::Live, Some(outlet)) = (*fate, outlet.as_mut()) {
                assert!(!conn.is_closed());
                for frame in drain(outlet) {
                    assert_ne!(frame, Frame::text(index.to_string()), "peer got its own frame");
                }
            }
        }
    }
}
