use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::extract::ws::Message;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Channel sender half for pushing frames to one WebSocket connection.
pub type ClientSender = mpsc::UnboundedSender<Message>;

pub type ConnectionId = u64;

/// The live set of WebSocket clients eligible for broadcast.
///
/// Every connection is represented by the sender half of its outbound channel;
/// the socket task owns the receiver. Once a socket task is gone its channel is
/// closed, which is how a broadcast tells open from closed connections.
///
/// After [`ConnectionSet::close_all`] the set stays shut: late registrations are
/// handed a Close frame instead of a slot.
pub struct ConnectionSet {
    next_id: AtomicU64,
    closing: AtomicBool,
    connections: RwLock<HashMap<ConnectionId, ClientSender>>,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            closing: AtomicBool::new(false),
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns its id and the receiver the socket task drains into the sink.
    pub fn add(&self) -> (ConnectionId, mpsc::UnboundedReceiver<Message>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        let count = {
            let mut conns = self.connections.write();
            // checked under the write lock so close_all cannot slip in between
            if self.closing.load(Ordering::Acquire) {
                let _ = tx.send(Message::Close(None));
                debug!(conn_id = id, "Set is closing, refusing connection");
                return (id, rx);
            }
            conns.insert(id, tx);
            conns.len()
        };
        metrics::gauge!("relay_connections").set(count as f64);
        (id, rx)
    }

    pub fn remove(&self, id: ConnectionId) -> bool {
        let (removed, count) = {
            let mut conns = self.connections.write();
            (conns.remove(&id).is_some(), conns.len())
        };
        metrics::gauge!("relay_connections").set(count as f64);
        removed
    }

    /// Send one text frame to every open connection.
    ///
    /// Closed connections are skipped silently and dropped from the set.
    /// Returns the number of connections the frame was handed to.
    pub fn broadcast(&self, text: &str) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();
        {
            let conns = self.connections.read();
            for (id, sender) in conns.iter() {
                if sender.send(Message::Text(text.to_owned())).is_ok() {
                    delivered += 1;
                } else {
                    closed.push(*id);
                }
            }
        }

        if !closed.is_empty() {
            let mut conns = self.connections.write();
            for id in &closed {
                conns.remove(id);
            }
            debug!(pruned = closed.len(), remaining = conns.len(), "Pruned closed connections");
            metrics::gauge!("relay_connections").set(conns.len() as f64);
        }
        delivered
    }

    pub fn len(&self) -> usize {
        self.connections.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Send a Close frame to every connection, then clear and shut the set.
    pub fn close_all(&self) {
        let mut conns = self.connections.write();
        self.closing.store(true, Ordering::Release);
        let count = conns.len();
        for sender in conns.values() {
            let _ = sender.send(Message::Close(None));
        }
        conns.clear();
        metrics::gauge!("relay_connections").set(0.0);
        info!(count, "Closed all WebSocket connections");
    }
}

impl Default for ConnectionSet {
    fn default() -> Self {
        Self::new()
    }
}
