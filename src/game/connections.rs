use super::types::PlayerKey;
use crate::protocol::ServerEvent;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

pub type Outbox = mpsc::UnboundedSender<ServerEvent>;

struct Connection {
    player: PlayerKey,
    outbox: Outbox,
}

/// Outbound channels of live sockets
///
/// A player identity maps to its most recent connection.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    by_conn: Arc<DashMap<String, Connection>>,
    by_player: Arc<DashMap<PlayerKey, String>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, conn_id: &str, player: PlayerKey, outbox: Outbox) {
        self.by_player.insert(player.clone(), conn_id.to_string());
        self.by_conn
            .insert(conn_id.to_string(), Connection { player, outbox });
    }

    /// Forget a connection. Returns the player when this was their current
    /// connection.
    pub fn unregister(&self, conn_id: &str) -> Option<PlayerKey> {
        let (_, connection) = self.by_conn.remove(conn_id)?;
        let removed = self
            .by_player
            .remove_if(&connection.player, |_, current| current == conn_id);
        removed.map(|(player, _)| player)
    }

    pub fn conn_for(&self, player: &PlayerKey) -> Option<String> {
        self.by_player.get(player).map(|c| c.value().clone())
    }

    pub fn send_to_conn(&self, conn_id: &str, event: ServerEvent) -> bool {
        match self.by_conn.get(conn_id) {
            Some(connection) => connection.outbox.send(event).is_ok(),
            None => {
                debug!(conn_id, event = event.name(), "Dropping event for closed connection");
                false
            }
        }
    }

    pub fn send_to_player(&self, player: &PlayerKey, event: ServerEvent) -> bool {
        match self.conn_for(player) {
            Some(conn_id) => self.send_to_conn(&conn_id, event),
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.by_conn.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_conn.is_empty()
    }
}
