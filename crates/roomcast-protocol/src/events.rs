//! Intent and event types exchanged between connections and the broker.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A unique message identifier.
///
/// Identifiers are timestamp-derived so that ids sort in send order within
/// a room. Uniqueness is best-effort; only display ordering depends on it.
pub type MessageId = u64;

/// Atomic counter disambiguating ids minted within the same millisecond.
static ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a new message ID.
#[must_use]
pub fn generate_message_id() -> MessageId {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64;
    let counter = ID_COUNTER.fetch_add(1, Ordering::Relaxed) & 0xFFFF;
    // Upper bits millisecond timestamp, lower 16 bits counter.
    (timestamp << 16) | counter
}

/// A chat message as stored in room history and delivered to clients.
///
/// `author` is a snapshot of the sender's display name at send time; a
/// later rename does not rewrite history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message identifier, monotonic within a room.
    pub id: MessageId,
    /// Display name of the sender at send time.
    pub author: String,
    /// Message payload. Opaque to the broker.
    pub text: String,
    /// The room this message was sent to.
    pub room_id: String,
}

impl ChatMessage {
    /// Create a new message with a freshly generated id.
    #[must_use]
    pub fn new(
        room_id: impl Into<String>,
        author: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: generate_message_id(),
            author: author.into(),
            text: text.into(),
            room_id: room_id.into(),
        }
    }
}

/// One entry in the global presence list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    /// Connection identifier.
    pub connection_id: String,
    /// Display name declared by the connection.
    pub display_name: String,
}

impl UserEntry {
    /// Create a new presence entry.
    #[must_use]
    pub fn new(connection_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            display_name: display_name.into(),
        }
    }
}

/// An intent sent by a connection to the broker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "data", rename_all = "camelCase")]
pub enum ClientIntent {
    /// Declare a display name for this connection.
    #[serde(rename_all = "camelCase")]
    Join {
        /// The display name to register.
        display_name: String,
    },

    /// Subscribe to a room.
    #[serde(rename_all = "camelCase")]
    JoinRoom {
        /// Room to join; created lazily on first join.
        room_id: String,
    },

    /// Post a message to a room.
    #[serde(rename_all = "camelCase")]
    SendMessage {
        /// Target room.
        room_id: String,
        /// Message text.
        message: String,
    },
}

impl ClientIntent {
    /// Get the intent name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientIntent::Join { .. } => "join",
            ClientIntent::JoinRoom { .. } => "joinRoom",
            ClientIntent::SendMessage { .. } => "sendMessage",
        }
    }
}

/// An event delivered by the broker to one or more connections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerEvent {
    /// Full presence list. Broadcast to every connection on every instance
    /// whenever a connection becomes named or a named connection leaves.
    UpdateUserList(Vec<UserEntry>),

    /// A human-readable notice (welcome, joined, departed).
    SystemMessage(String),

    /// Recent history of a room, sent to a joining connection only.
    /// At most the newest 100 messages, oldest first.
    MessageHistory(Vec<ChatMessage>),

    /// A freshly posted message, fanned out to all members of its room.
    NewMessage(ChatMessage),
}

impl ServerEvent {
    /// Get the event name as it appears on the wire.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::UpdateUserList(_) => "updateUserList",
            ServerEvent::SystemMessage(_) => "systemMessage",
            ServerEvent::MessageHistory(_) => "messageHistory",
            ServerEvent::NewMessage(_) => "newMessage",
        }
    }

    /// Create a system message event.
    #[must_use]
    pub fn system(text: impl Into<String>) -> Self {
        ServerEvent::SystemMessage(text.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_ids_increase() {
        let a = generate_message_id();
        let b = generate_message_id();
        assert!(b > a);
    }

    #[test]
    fn test_chat_message_construction() {
        let msg = ChatMessage::new("general", "alice", "hi");
        assert_eq!(msg.room_id, "general");
        assert_eq!(msg.author, "alice");
        assert_eq!(msg.text, "hi");
    }

    #[test]
    fn test_intent_names() {
        let intent = ClientIntent::Join {
            display_name: "alice".into(),
        };
        assert_eq!(intent.name(), "join");

        let intent = ClientIntent::SendMessage {
            room_id: "general".into(),
            message: "hi".into(),
        };
        assert_eq!(intent.name(), "sendMessage");
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ServerEvent::system("hello").name(), "systemMessage");
        assert_eq!(ServerEvent::UpdateUserList(vec![]).name(), "updateUserList");
    }
}
