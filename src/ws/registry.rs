//! Per-connection outbound channels for unicast messages

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

use crate::ws::protocol::ServerMsg;

/// Registry of connected clients' direct channels
pub struct ClientRegistry {
    clients: DashMap<Uuid, mpsc::Sender<ServerMsg>>,
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
        }
    }

    pub fn register(&self, conn_id: Uuid, tx: mpsc::Sender<ServerMsg>) {
        self.clients.insert(conn_id, tx);
    }

    pub fn unregister(&self, conn_id: &Uuid) {
        self.clients.remove(conn_id);
    }

    /// Send to a single client. Returns false if it is gone or its queue is full.
    pub fn send_to(&self, conn_id: &Uuid, msg: ServerMsg) -> bool {
        let Some(tx) = self.clients.get(conn_id).map(|c| c.value().clone()) else {
            return false;
        };

        match tx.try_send(msg) {
            Ok(()) => true,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "Failed to deliver direct message");
                false
            }
        }
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}
