//! Connection registry — live mapping from recipient to WebSocket connection.
//!
//! Owned and mutated exclusively by the relay process. One active handle per
//! recipient: a reconnect replaces the previous handle (last writer wins),
//! and a disconnect only removes the entry when it still belongs to the
//! disconnecting connection, so a stale close can never evict a newer one.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender half of one live connection's outbound message channel.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    id: Uuid,
    tx: mpsc::UnboundedSender<String>,
}

/// What happened to a forwarded message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwardOutcome {
    Delivered,
    /// Nobody is connected for this recipient; the event is dropped.
    NoConnection,
    /// The connection died mid-send; the stale entry was evicted and the
    /// event dropped.
    ConnectionClosed,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<HashMap<String, ConnectionHandle>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection for `recipient`, replacing any previous one.
    /// Returns the handle id the caller must present on disconnect.
    pub fn register(&self, recipient: &str, tx: mpsc::UnboundedSender<String>) -> Uuid {
        let handle = ConnectionHandle {
            id: Uuid::new_v4(),
            tx,
        };
        let id = handle.id;

        let mut connections = self.connections.lock().unwrap();
        if let Some(previous) = connections.insert(recipient.to_string(), handle) {
            tracing::info!(recipient, replaced = %previous.id, "Connection replaced");
        }

        id
    }

    /// Remove the entry for `recipient` if it still belongs to `handle_id`.
    ///
    /// Returns false when a newer connection owns the slot; that connection
    /// stays registered.
    pub fn unregister(&self, recipient: &str, handle_id: Uuid) -> bool {
        let mut connections = self.connections.lock().unwrap();
        match connections.get(recipient) {
            Some(current) if current.id == handle_id => {
                connections.remove(recipient);
                true
            }
            _ => false,
        }
    }

    /// Forward a message to the recipient's live connection, if any.
    pub fn forward(&self, recipient: &str, message: &str) -> ForwardOutcome {
        let handle = {
            let connections = self.connections.lock().unwrap();
            connections.get(recipient).cloned()
        };

        let Some(handle) = handle else {
            return ForwardOutcome::NoConnection;
        };

        if handle.tx.send(message.to_string()).is_ok() {
            return ForwardOutcome::Delivered;
        }

        // Receiver gone. Evict the entry unless a newer connection has
        // already taken the slot.
        let mut connections = self.connections.lock().unwrap();
        if connections
            .get(recipient)
            .is_some_and(|current| current.id == handle.id)
        {
            connections.remove(recipient);
        }

        ForwardOutcome::ConnectionClosed
    }

    pub fn active_connections(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_forward() {
        let registry = ConnectionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();

        registry.register("u1", tx);
        assert_eq!(registry.forward("u1", "hi"), ForwardOutcome::Delivered);
        assert_eq!(rx.try_recv().unwrap(), "hi");
    }

    #[test]
    fn test_forward_without_connection_drops() {
        let registry = ConnectionRegistry::new();
        assert_eq!(registry.forward("u1", "hi"), ForwardOutcome::NoConnection);
        assert_eq!(registry.active_connections(), 0);
    }

    #[test]
    fn test_reconnect_replaces_previous_handle() {
        let registry = ConnectionRegistry::new();
        let (old_tx, mut old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        registry.register("u1", old_tx);
        registry.register("u1", new_tx);
        assert_eq!(registry.active_connections(), 1);

        assert_eq!(registry.forward("u1", "hi"), ForwardOutcome::Delivered);
        assert_eq!(new_rx.try_recv().unwrap(), "hi");
        assert!(old_rx.try_recv().is_err());
    }

    #[test]
    fn test_stale_disconnect_keeps_live_handle() {
        let registry = ConnectionRegistry::new();
        let (old_tx, _old_rx) = mpsc::unbounded_channel();
        let (new_tx, mut new_rx) = mpsc::unbounded_channel();

        let stale_id = registry.register("u1", old_tx);
        registry.register("u1", new_tx);

        // The replaced connection closes late; its unregister must not evict
        // the current one.
        assert!(!registry.unregister("u1", stale_id));
        assert_eq!(registry.active_connections(), 1);
        assert_eq!(registry.forward("u1", "still here"), ForwardOutcome::Delivered);
        assert_eq!(new_rx.try_recv().unwrap(), "still here");
    }

    #[test]
    fn test_own_disconnect_removes_entry() {
        let registry = ConnectionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();

        let id = registry.register("u1", tx);
        assert!(registry.unregister("u1", id));
        assert_eq!(registry.active_connections(), 0);
    }

    #[test]
    fn test_forward_to_closed_connection_evicts_entry() {
        let registry = ConnectionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();

        registry.register("u1", tx);
        drop(rx);

        assert_eq!(registry.forward("u1", "hi"), ForwardOutcome::ConnectionClosed);
        assert_eq!(registry.active_connections(), 0);
        // Subsequent events for the recipient are plain drops.
        assert_eq!(registry.forward("u1", "hi"), ForwardOutcome::NoConnection);
    }
}
