//! Open viewer connections and snapshot fan-out

use std::sync::Arc;

use dashmap::{mapref::entry::Entry, DashMap};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, error, warn};
use uuid::Uuid;

use super::protocol::ServerMsg;

pub type ConnectionId = Uuid;

/// Authenticated identity attached to a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

/// Frame queued for a connection's writer task
#[derive(Debug, Clone)]
pub enum Outbound {
    Text(Arc<str>),
    Close,
}

struct ConnectionEntry {
    identity: Identity,
    tx: mpsc::Sender<Outbound>,
}

impl ConnectionEntry {
    fn is_live(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Registry of open connections
pub struct ConnectionRegistry {
    connections: DashMap<ConnectionId, ConnectionEntry>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Register a connection. Returns false if it was already present.
    pub fn attach(&self, id: ConnectionId, identity: Identity, tx: mpsc::Sender<Outbound>) -> bool {
        match self.connections.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(ConnectionEntry { identity, tx });
                true
            }
        }
    }

    /// Remove a connection, returning its identity if it was present
    pub fn detach(&self, id: ConnectionId) -> Option<Identity> {
        self.connections.remove(&id).map(|(_, entry)| entry.identity)
    }

    pub fn identity(&self, id: ConnectionId) -> Option<Identity> {
        self.connections.get(&id).map(|e| e.identity.clone())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Serialize once for every recipient
    pub fn encode(msg: &ServerMsg) -> Option<Arc<str>> {
        match serde_json::to_string(msg) {
            Ok(json) => Some(Arc::from(json)),
            Err(e) => {
                error!(error = %e, "Failed to encode server message");
                None
            }
        }
    }

    /// Send to every live connection, returning how many accepted it
    pub fn broadcast(&self, msg: &ServerMsg) -> usize {
        self.fan_out(msg, None)
    }

    /// Send to every live connection except `skip`
    pub fn broadcast_except(&self, msg: &ServerMsg, skip: ConnectionId) -> usize {
        self.fan_out(msg, Some(skip))
    }

    fn fan_out(&self, msg: &ServerMsg, skip: Option<ConnectionId>) -> usize {
        let Some(text) = Self::encode(msg) else {
            return 0;
        };

        let mut delivered = 0;
        for entry in self.connections.iter() {
            if Some(*entry.key()) == skip || !entry.is_live() {
                continue;
            }
            if deliver(*entry.key(), &entry.tx, Outbound::Text(text.clone())) {
                delivered += 1;
            }
        }
        delivered
    }

    /// Send to a single connection
    pub fn send_to(&self, id: ConnectionId, msg: &ServerMsg) -> bool {
        let Some(entry) = self.connections.get(&id) else {
            return false;
        };
        match Self::encode(msg) {
            Some(text) => deliver(id, &entry.tx, Outbound::Text(text)),
            None => false,
        }
    }

    /// Ask every writer to close and forget all connections
    pub fn close_all(&self) -> usize {
        let ids: Vec<ConnectionId> = self.connections.iter().map(|e| *e.key()).collect();
        for id in &ids {
            if let Some((_, entry)) = self.connections.remove(id) {
                deliver(*id, &entry.tx, Outbound::Close);
            }
        }
        ids.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Queue a frame without waiting; failures only affect this connection
fn deliver(id: ConnectionId, tx: &mpsc::Sender<Outbound>, frame: Outbound) -> bool {
    match tx.try_send(frame) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(conn_id = %id, "Outbound queue full, dropping message");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(conn_id = %id, "Connection closed, skipping until detach");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(name: &str) -> Identity {
        Identity {
            user_id: name.to_string(),
            display_name: name.to_string(),
        }
    }

    fn text(frame: Outbound) -> String {
        match frame {
            Outbound::Text(t) => t.to_string(),
            Outbound::Close => panic!("expected text frame"),
        }
    }

    #[test]
    fn failing_connection_does_not_block_others() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, rx2) = mpsc::channel(8);
        let (tx3, mut rx3) = mpsc::channel(8);
        let (id1, id2, id3) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        registry.attach(id1, identity("one"), tx1);
        registry.attach(id2, identity("two"), tx2);
        registry.attach(id3, identity("three"), tx3);

        // Connection #2's writer is gone
        drop(rx2);

        let delivered = registry.broadcast(&ServerMsg::GameStatus {
            message: "Game started!".to_string(),
        });
        assert_eq!(delivered, 2);
        assert!(text(rx1.try_recv().unwrap()).contains("Game started!"));
        assert!(text(rx3.try_recv().unwrap()).contains("Game started!"));
        assert_eq!(registry.len(), 3);
    }

    #[test]
    fn broadcast_payload_is_identical_for_everyone() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        registry.attach(Uuid::new_v4(), identity("a"), tx1);
        registry.attach(Uuid::new_v4(), identity("b"), tx2);

        registry.broadcast(&ServerMsg::system("hello"));
        match (rx1.try_recv().unwrap(), rx2.try_recv().unwrap()) {
            (Outbound::Text(a), Outbound::Text(b)) => assert!(Arc::ptr_eq(&a, &b)),
            _ => panic!("expected text frames"),
        }
    }

    #[test]
    fn attach_and_detach_are_idempotent() {
        let registry = ConnectionRegistry::new();
        let id = Uuid::new_v4();
        let (tx, _rx) = mpsc::channel(8);
        assert!(registry.attach(id, identity("a"), tx.clone()));
        assert!(!registry.attach(id, identity("a"), tx));
        assert_eq!(registry.len(), 1);

        assert_eq!(registry.detach(id), Some(identity("a")));
        assert_eq!(registry.detach(id), None);
        assert!(registry.is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_attach_admits_exactly_one() {
        let registry = Arc::new(ConnectionRegistry::new());
        let id = Uuid::new_v4();

        let attempts: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let (tx, _rx) = mpsc::channel(1);
                    registry.attach(id, identity(&format!("u{i}")), tx)
                })
            })
            .collect();

        let mut admitted = 0;
        for attempt in attempts {
            if attempt.await.unwrap() {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn broadcast_except_skips_sender() {
        let registry = ConnectionRegistry::new();
        let (tx1, mut rx1) = mpsc::channel(8);
        let (tx2, mut rx2) = mpsc::channel(8);
        let sender = Uuid::new_v4();
        registry.attach(sender, identity("a"), tx1);
        registry.attach(Uuid::new_v4(), identity("b"), tx2);

        assert_eq!(registry.broadcast_except(&ServerMsg::system("hi"), sender), 1);
        assert!(rx1.try_recv().is_err());
        assert!(rx2.try_recv().is_ok());
    }

    #[test]
    fn close_all_sends_close_and_empties() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::channel(8);
        registry.attach(Uuid::new_v4(), identity("a"), tx);

        assert_eq!(registry.close_all(), 1);
        assert!(matches!(rx.try_recv(), Ok(Outbound::Close)));
        assert!(registry.is_empty());
    }
}
