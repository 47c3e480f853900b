use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::debug;

/// Transport-assigned connection id, used as the player identity.
pub type ConnectionId = String;

/// Outbound frames for one connection.
pub type Outbox = mpsc::UnboundedSender<String>;

/// Live connections and the room each player is bound to.
#[derive(Default)]
pub struct SessionManager {
    connections: HashMap<ConnectionId, Outbox>,
    player_rooms: HashMap<ConnectionId, String>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connect(&mut self, id: ConnectionId, outbox: Outbox) {
        self.connections.insert(id, outbox);
    }

    pub fn disconnect(&mut self, id: &str) -> bool {
        self.connections.remove(id).is_some()
    }

    pub fn is_connected(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Last write wins. Removing the player from a previous room is the
    /// registry's job.
    pub fn bind(&mut self, player_id: &str, room_code: &str) -> Option<String> {
        self.player_rooms.insert(player_id.to_string(), room_code.to_string())
    }

    pub fn unbind(&mut self, player_id: &str) -> Option<String> {
        self.player_rooms.remove(player_id)
    }

    pub fn room_of(&self, player_id: &str) -> Option<&str> {
        self.player_rooms.get(player_id).map(String::as_str)
    }

    pub fn send_to(&self, id: &str, frame: String) {
        match self.connections.get(id) {
            Some(outbox) => deliver(id, outbox, frame),
            None => debug!("Dropping frame for unknown connection {}", id),
        }
    }

    /// Fan a frame out to every live connection not in `exclude`.
    pub fn broadcast(&self, frame: &str, exclude: &[&str]) {
        for (id, outbox) in &self.connections {
            if !exclude.contains(&id.as_str()) {
                deliver(id, outbox, frame.to_string());
            }
        }
    }

    /// Fan a frame out to the listed players that are still connected.
    pub fn send_to_members<'a>(
        &self,
        members: impl IntoIterator<Item = &'a str>,
        frame: &str,
        exclude: &[&str],
    ) {
        for id in members {
            if exclude.contains(&id) {
                continue;
            }
            if let Some(outbox) = self.connections.get(id) {
                deliver(id, outbox, frame.to_string());
            }
        }
    }
}

fn deliver(id: &str, outbox: &Outbox, frame: String) {
    // A closed outbox means the writer is gone; the close event will follow.
    if outbox.send(frame).is_err() {
        debug!("Connection {} is no longer accepting frames", id);
    }
}
