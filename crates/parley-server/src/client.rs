use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use parley_core::{ChatAddr, ConnId, ServerEvent};

/// A connected chat participant.
///
/// The handle owns the send side of the connection's outbound queue; the
/// paired receiver is drained by the connection's writer task.
pub struct Client {
    pub conn_id: ConnId,
    pub addr: ChatAddr,
    pub is_admin: bool,
    tx: mpsc::Sender<String>,
}

impl Client {
    fn new(addr: ChatAddr, is_admin: bool, tx: mpsc::Sender<String>) -> Self {
        Self {
            conn_id: ConnId::new(),
            addr,
            is_admin,
            tx,
        }
    }

    /// Queue an already-serialized event for this client.
    ///
    /// Returns `false` when the queue is full or closed; the event is
    /// dropped either way and nothing retries.
    pub fn send_raw(&self, json: String) -> bool {
        self.tx.try_send(json).is_ok()
    }

    /// Serialize an event and queue it for this client.
    pub fn send(&self, event: &ServerEvent) -> bool {
        match serde_json::to_string(event) {
            Ok(json) => self.send_raw(json),
            Err(e) => {
                warn!(conn_id = %self.conn_id, error = %e, "failed to serialize event");
                false
            }
        }
    }
}

/// Registry of all connected clients, keyed by address.
///
/// At most one entry per address: a second connection from the same address
/// replaces the first, which stays open but stops receiving relayed
/// traffic.
pub struct ClientRegistry {
    clients: DashMap<ChatAddr, Arc<Client>>,
    max_send_queue: usize,
}

impl ClientRegistry {
    pub fn new(max_send_queue: usize) -> Self {
        Self {
            clients: DashMap::new(),
            max_send_queue,
        }
    }

    /// Register a connection under its address and return its handle plus
    /// the receiver for its outbound queue.
    pub fn register(
        &self,
        addr: ChatAddr,
        is_admin: bool,
    ) -> (Arc<Client>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(self.max_send_queue);
        let client = Arc::new(Client::new(addr.clone(), is_admin, tx));
        if let Some(prev) = self.clients.insert(addr, client.clone()) {
            debug!(
                conn_id = %prev.conn_id,
                addr = %prev.addr,
                "address re-registered; previous handle orphaned"
            );
        }
        (client, rx)
    }

    /// Remove the entry for an address, whichever connection currently owns
    /// it. Called on every disconnect.
    pub fn deregister(&self, addr: &ChatAddr) {
        self.clients.remove(addr);
    }

    /// Serialize an event once and queue it to every registered client,
    /// privileged or not.
    pub fn broadcast(&self, event: &ServerEvent) {
        self.fan_out(event, |_| true);
    }

    /// Queue an event to privileged clients only.
    pub fn send_to_admins(&self, event: &ServerEvent) {
        self.fan_out(event, |client| client.is_admin);
    }

    fn fan_out(&self, event: &ServerEvent, filter: impl Fn(&Client) -> bool) {
        let json = match serde_json::to_string(event) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to serialize event");
                return;
            }
        };
        for entry in self.clients.iter() {
            let client = entry.value();
            if filter(client) && !client.send_raw(json.clone()) {
                // Delivery is best-effort: no retry, no disconnect.
                debug!(
                    conn_id = %client.conn_id,
                    addr = %client.addr,
                    "send queue full or closed, event dropped"
                );
            }
        }
    }

    /// Addresses of all registered clients.
    pub fn roster(&self) -> Vec<String> {
        self.clients
            .iter()
            .map(|entry| entry.key().to_string())
            .collect()
    }

    /// Number of registered clients.
    pub fn count(&self) -> usize {
        self.clients.len()
    }
}
