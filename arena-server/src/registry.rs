//! The connection registry: one entry per accepted transport, tracking the
//! outbound channel, timestamps and the player binding. Ended entries stay
//! retrievable for a short window so reconnect diagnostics keep their
//! context, but they no longer take part in broadcasts.

use arena_core::Clock;
use axum::extract::ws::Utf8Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Everything the server tracks per transport.
#[derive(Debug)]
pub struct Connection {
    /// Frames queued here are written by the connection's send task.
    pub outbound: mpsc::Sender<Utf8Bytes>,
    pub connected_at_ms: u64,
    pub last_activity_ms: u64,
    /// Set once the client has joined as a player.
    pub player_id: Option<String>,
    pub player_name: Option<String>,
    /// Set when the transport closed; such entries are skipped by
    /// broadcasts and purged after the reconnect window.
    pub ended_at_ms: Option<u64>,
}

impl Connection {
    fn is_active(&self) -> bool {
        self.ended_at_ms.is_none()
    }
}

pub struct ConnectionRegistry {
    clock: Arc<dyn Clock>,
    connections: HashMap<String, Connection>,
}

impl ConnectionRegistry {
    pub fn new(clock: Arc<dyn Clock>) -> ConnectionRegistry {
        ConnectionRegistry {
            clock,
            connections: HashMap::new(),
        }
    }

    /// Registers a transport and hands back its fresh client id.
    pub fn add_connection(&mut self, outbound: mpsc::Sender<Utf8Bytes>) -> String {
        let client_id = Uuid::new_v4().to_string();
        let now = self.clock.now_ms();
        self.connections.insert(
            client_id.clone(),
            Connection {
                outbound,
                connected_at_ms: now,
                last_activity_ms: now,
                player_id: None,
                player_name: None,
                ended_at_ms: None,
            },
        );
        client_id
    }

    /// Marks a connection as ended and returns the player it controlled.
    pub fn remove_connection(&mut self, client_id: &str) -> Option<String> {
        let connection = self.connections.get_mut(client_id)?;
        connection.ended_at_ms = Some(self.clock.now_ms());
        connection.player_id.clone()
    }

    /// Drops ended entries older than the reconnect window.
    pub fn purge_ended(&mut self, window_ms: u64) {
        let now = self.clock.now_ms();
        self.connections.retain(|_, connection| match connection.ended_at_ms {
            Some(ended_at) => now.saturating_sub(ended_at) < window_ms,
            None => true,
        });
    }

    pub fn touch(&mut self, client_id: &str) {
        if let Some(connection) = self.connections.get_mut(client_id) {
            connection.last_activity_ms = self.clock.now_ms();
        }
    }

    /// Binds a player (id and display name) to the connection.
    pub fn set_player(&mut self, client_id: &str, player_id: &str, player_name: &str) {
        if let Some(connection) = self.connections.get_mut(client_id) {
            connection.player_id = Some(player_id.to_string());
            connection.player_name = Some(player_name.to_string());
        }
    }

    pub fn player_id(&self, client_id: &str) -> Option<String> {
        self.connections.get(client_id)?.player_id.clone()
    }

    pub fn connection(&self, client_id: &str) -> Option<&Connection> {
        self.connections.get(client_id)
    }

    /// The outbound channel of an active connection.
    pub fn sender(&self, client_id: &str) -> Option<mpsc::Sender<Utf8Bytes>> {
        let connection = self.connections.get(client_id)?;
        connection.is_active().then(|| connection.outbound.clone())
    }

    /// Snapshot of every active connection's outbound channel, taken under
    /// the registry lock so broadcast writes can happen outside it.
    pub fn active_senders(&self) -> Vec<(String, mpsc::Sender<Utf8Bytes>)> {
        self.connections
            .iter()
            .filter(|(_, connection)| connection.is_active())
            .map(|(client_id, connection)| (client_id.clone(), connection.outbound.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_core::ManualClock;

    fn registry() -> (ConnectionRegistry, Arc<ManualClock>) {
        let clock = ManualClock::new(10_000);
        (ConnectionRegistry::new(clock.clone()), clock)
    }

    fn channel() -> mpsc::Sender<Utf8Bytes> {
        mpsc::channel(4).0
    }

    #[test]
    fn add_touch_and_bind() {
        let (mut registry, clock) = registry();
        let client_id = registry.add_connection(channel());
        assert_eq!(registry.connection(&client_id).unwrap().connected_at_ms, 10_000);

        clock.advance(500);
        registry.touch(&client_id);
        assert_eq!(registry.connection(&client_id).unwrap().last_activity_ms, 10_500);

        registry.set_player(&client_id, "p-1", "ada");
        assert_eq!(registry.player_id(&client_id).as_deref(), Some("p-1"));
    }

    #[test]
    fn ended_connections_leave_the_broadcast_set_but_stay_retrievable() {
        let (mut registry, _) = registry();
        let first = registry.add_connection(channel());
        let second = registry.add_connection(channel());

        registry.set_player(&first, "p-1", "ada");
        assert_eq!(registry.remove_connection(&first).as_deref(), Some("p-1"));

        let active: Vec<String> = registry
            .active_senders()
            .into_iter()
            .map(|(client_id, _)| client_id)
            .collect();
        assert_eq!(active, vec![second.clone()]);
        // Still retrievable until the purge window passes.
        assert!(registry.connection(&first).is_some());
        assert!(registry.sender(&first).is_none());
    }

    #[test]
    fn purge_drops_only_expired_ended_entries() {
        let (mut registry, clock) = registry();
        let stale = registry.add_connection(channel());
        let live = registry.add_connection(channel());
        registry.remove_connection(&stale);

        clock.advance(999);
        registry.purge_ended(1_000);
        assert!(registry.connection(&stale).is_some());

        clock.advance(1);
        registry.purge_ended(1_000);
        assert!(registry.connection(&stale).is_none());
        assert!(registry.connection(&live).is_some());
    }
}
