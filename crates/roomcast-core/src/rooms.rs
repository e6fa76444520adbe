//! Room directory.
//!
//! Maps room names to their member connections and a bounded history of
//! recent messages. Rooms are created lazily on first join and persist
//! when empty; they are never deleted.

use dashmap::DashMap;
use roomcast_protocol::ChatMessage;
use std::collections::{HashSet, VecDeque};
use tracing::{debug, trace};

use crate::connection::ConnectionId;

/// Maximum number of messages retained per room.
pub const HISTORY_LIMIT: usize = 100;

/// Result of joining a room.
#[derive(Debug)]
pub struct JoinSnapshot {
    /// Copy of the room history at join time, oldest first.
    pub history: Vec<ChatMessage>,
    /// Whether the connection was not already a member. A repeat join
    /// re-fetches history but is otherwise a no-op.
    pub newly_joined: bool,
}

#[derive(Debug)]
struct Room {
    members: HashSet<ConnectionId>,
    history: VecDeque<ChatMessage>,
}

impl Room {
    fn new() -> Self {
        Self {
            members: HashSet::new(),
            history: VecDeque::new(),
        }
    }
}

/// Directory of rooms, keyed by name.
#[derive(Debug)]
pub struct RoomDirectory {
    rooms: DashMap<String, Room>,
    history_limit: usize,
}

impl Default for RoomDirectory {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomDirectory {
    /// Create an empty directory with the default history cap.
    #[must_use]
    pub fn new() -> Self {
        Self::with_history_limit(HISTORY_LIMIT)
    }

    /// Create an empty directory with a custom history cap.
    #[must_use]
    pub fn with_history_limit(history_limit: usize) -> Self {
        Self {
            rooms: DashMap::new(),
            history_limit,
        }
    }

    /// Add a connection to a room, creating the room if absent.
    ///
    /// Idempotent: joining a room twice only re-fetches the history.
    pub fn join(&self, room_id: &str, connection_id: &ConnectionId) -> JoinSnapshot {
        let mut room = self
            .rooms
            .entry(room_id.to_string())
            .or_insert_with(|| {
                debug!(room = %room_id, "Creating room");
                Room::new()
            });

        let newly_joined = room.members.insert(connection_id.clone());
        if newly_joined {
            debug!(room = %room_id, connection = %connection_id, members = room.members.len(), "Member joined");
        }

        JoinSnapshot {
            history: room.history.iter().cloned().collect(),
            newly_joined,
        }
    }

    /// Remove a connection from a room.
    ///
    /// Returns `true` if the connection was a member. Unknown rooms and
    /// non-members are a no-op, not an error.
    pub fn leave(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            let removed = room.members.remove(connection_id);
            if removed {
                debug!(room = %room_id, connection = %connection_id, "Member left");
            }
            removed
        } else {
            false
        }
    }

    /// Remove a connection from every room it is a member of.
    ///
    /// Returns the names of the rooms left.
    pub fn leave_all(&self, connection_id: &ConnectionId) -> Vec<String> {
        let mut left = Vec::new();
        for mut room in self.rooms.iter_mut() {
            if room.members.remove(connection_id) {
                left.push(room.key().clone());
            }
        }
        if !left.is_empty() {
            debug!(connection = %connection_id, rooms = left.len(), "Left all rooms");
        }
        left
    }

    /// Build a message from an author snapshot and append it to the room's
    /// history, creating the room if absent.
    ///
    /// Membership is not required to post; the caller decides whether the
    /// sender is allowed.
    pub fn post(&self, room_id: &str, author: &str, text: &str) -> ChatMessage {
        let message = ChatMessage::new(room_id, author, text);
        self.append(message.clone());
        message
    }

    /// Append an already-built message to its room's history, evicting the
    /// oldest entry when the cap is reached.
    pub fn append(&self, message: ChatMessage) {
        let mut room = self
            .rooms
            .entry(message.room_id.clone())
            .or_insert_with(Room::new);

        room.history.push_back(message);
        while room.history.len() > self.history_limit {
            room.history.pop_front();
        }
        trace!(room = %room.key(), history = room.history.len(), "Appended message");
    }

    /// Snapshot of a room's members. Unknown rooms yield an empty set.
    #[must_use]
    pub fn members_of(&self, room_id: &str) -> Vec<ConnectionId> {
        self.rooms
            .get(room_id)
            .map(|room| room.members.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Check whether a connection is a member of a room.
    #[must_use]
    pub fn is_member(&self, room_id: &str, connection_id: &ConnectionId) -> bool {
        self.rooms
            .get(room_id)
            .map(|room| room.members.contains(connection_id))
            .unwrap_or(false)
    }

    /// Snapshot of a room's history, oldest first. Unknown rooms yield an
    /// empty history.
    #[must_use]
    pub fn history_of(&self, room_id: &str) -> Vec<ChatMessage> {
        self.rooms
            .get(room_id)
            .map(|room| room.history.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Get the number of rooms ever created.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
