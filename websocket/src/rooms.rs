//! Room membership and the client/server message protocol.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A message sent by a client.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum ClientMessage {
    Join { room: String },
    Leave { room: String },
    Ping,
}

/// A message sent to a client.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ServerMessage {
    Ack { action: String, room: String },
    Error { message: String },
    Pong,
    /// A notice addressed to one of the client's rooms.
    Event {
        event: String,
        room: String,
        data: serde_json::Value,
    },
}

impl ServerMessage {
    pub fn to_text(&self) -> String {
        // Every variant is plain strings and JSON values.
        serde_json::to_string(self).unwrap_or_else(|_| r#"{"type":"error"}"#.to_string())
    }
}

/// `kind:name` with both halves non-empty, e.g. `user:s1` or `role:faculty`.
pub fn is_valid_room(room: &str) -> bool {
    match room.split_once(':') {
        Some((kind, name)) => !kind.is_empty() && !name.trim().is_empty(),
        None => false,
    }
}

/// The rooms one connection has joined.
#[derive(Clone, Debug, Default)]
pub struct ClientRooms {
    rooms: HashSet<String>,
}

impl ClientRooms {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if already joined.
    pub fn join(&mut self, room: impl Into<String>) -> bool {
        self.rooms.insert(room.into())
    }

    /// Returns `false` if the room was not joined.
    pub fn leave(&mut self, room: &str) -> bool {
        self.rooms.remove(room)
    }

    pub fn contains(&self, room: &str) -> bool {
        self.rooms.contains(room)
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_client_messages() {
        let join: ClientMessage =
            serde_json::from_str(r#"{"action":"join","room":"user:s1"}"#).unwrap();
        assert_eq!(join, ClientMessage::Join { room: "user:s1".into() });
        let ping: ClientMessage = serde_json::from_str(r#"{"action":"ping"}"#).unwrap();
        assert_eq!(ping, ClientMessage::Ping);
        assert!(serde_json::from_str::<ClientMessage>(r#"{"action":"shout"}"#).is_err());
    }

    #[test]
    fn server_messages_are_tagged() {
        let ack = ServerMessage::Ack {
            action: "join".into(),
            room: "role:faculty".into(),
        };
        let v: serde_json::Value = serde_json::from_str(&ack.to_text()).unwrap();
        assert_eq!(v["type"], "ack");
        assert_eq!(v["room"], "role:faculty");
        assert_eq!(ServerMessage::Pong.to_text(), r#"{"type":"pong"}"#);
    }

    #[test]
    fn room_names() {
        assert!(is_valid_room("user:s1"));
        assert!(is_valid_room("role:faculty"));
        assert!(!is_valid_room("faculty"));
        assert!(!is_valid_room(":x"));
        assert!(!is_valid_room("user: "));
    }

    #[test]
    fn join_and_leave() {
        let mut rooms = ClientRooms::new();
        assert!(rooms.join("user:s1"));
        assert!(!rooms.join("user:s1"));
        assert!(rooms.contains("user:s1"));
        assert!(rooms.leave("user:s1"));
        assert!(!rooms.leave("user:s1"));
        assert!(rooms.is_empty());
    }
}
