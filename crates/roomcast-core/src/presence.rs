//! Global presence registry.
//!
//! Maps each live connection to its declared display name. This is the
//! source of truth for "who is online": the `updateUserList` broadcast is
//! always a fresh snapshot of this registry, never a cached copy.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use roomcast_protocol::UserEntry;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::connection::ConnectionId;

#[derive(Debug)]
struct PresenceEntry {
    display_name: String,
    /// Registration order, used to keep snapshots deterministic.
    seq: u64,
}

/// Registry of named, connected users.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    entries: DashMap<ConnectionId, PresenceEntry>,
    next_seq: AtomicU64,
}

impl PresenceRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a display name for a connection.
    ///
    /// Idempotent per connection: registering again overwrites the name
    /// (rename-via-rejoin) without changing the connection's position in
    /// the snapshot order.
    pub fn register(&self, connection_id: &ConnectionId, display_name: impl Into<String>) {
        let display_name = display_name.into();
        match self.entries.entry(connection_id.clone()) {
            Entry::Occupied(mut occupied) => {
                debug!(connection = %connection_id, name = %display_name, "Presence: renamed");
                occupied.get_mut().display_name = display_name;
            }
            Entry::Vacant(vacant) => {
                let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
                debug!(connection = %connection_id, name = %display_name, "Presence: registered");
                vacant.insert(PresenceEntry { display_name, seq });
            }
        }
    }

    /// Remove a connection's entry.
    ///
    /// Returns the display name if one was registered. Unregistering an
    /// unknown connection is a no-op, not an error: never-named connections
    /// may disconnect too.
    pub fn unregister(&self, connection_id: &ConnectionId) -> Option<String> {
        let removed = self
            .entries
            .remove(connection_id)
            .map(|(_, entry)| entry.display_name);
        if let Some(name) = &removed {
            debug!(connection = %connection_id, name = %name, "Presence: unregistered");
        }
        removed
    }

    /// Get the display name of a connection, if registered.
    #[must_use]
    pub fn name_of(&self, connection_id: &ConnectionId) -> Option<String> {
        self.entries
            .get(connection_id)
            .map(|entry| entry.display_name.clone())
    }

    /// Check whether a connection has declared a name.
    #[must_use]
    pub fn is_named(&self, connection_id: &ConnectionId) -> bool {
        self.entries.contains_key(connection_id)
    }

    /// Get the number of named connections.
    #[must_use]
    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Snapshot of all named connections, in registration order.
    #[must_use]
    pub fn list_all(&self) -> Vec<UserEntry> {
        let mut entries: Vec<(u64, UserEntry)> = self
            .entries
            .iter()
            .map(|entry| {
                (
                    entry.seq,
                    UserEntry::new(entry.key().as_str(), entry.display_name.clone()),
                )
            })
            .collect();
        entries.sort_by_key(|(seq, _)| *seq);
        entries.into_iter().map(|(_, user)| user).collect()
    }
}
