//! Event router for the roomcast broker.
//!
//! The router validates inbound client intents, mutates the presence
//! registry and room directory, and fans outgoing events out to the right
//! connections: local connections directly through their delivery
//! channels, remote ones by relaying the event over the backplane so every
//! other instance delivers it to its own matching connections.

use bytes::Bytes;
use dashmap::DashMap;
use roomcast_backplane::Backplane;
use roomcast_protocol::{ChatMessage, ServerEvent};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::connection::ConnectionId;
use crate::presence::PresenceRegistry;
use crate::rooms::RoomDirectory;

/// The single backplane channel carrying relayed events.
pub const EVENTS_CHANNEL: &str = "roomcast:events";

/// Broker errors.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// Display name must not be empty.
    #[error("Display name cannot be empty")]
    EmptyName,

    /// Room operations require a declared display name first.
    #[error("Connection has not declared a display name")]
    NotNamed,

    /// Message posted by a connection with no registered name. Never
    /// surfaced to the sender; the message is dropped and logged.
    #[error("Message from a connection with no registered name")]
    UnknownSender,

    /// The connection has disconnected; no further intents are processed.
    #[error("Connection is closed")]
    ConnectionClosed,
}

/// Broker statistics.
#[derive(Debug, Clone)]
pub struct BrokerStats {
    /// Live connections on this instance, named or not.
    pub connection_count: usize,
    /// Connections that have declared a display name.
    pub named_count: usize,
    /// Rooms created on this instance.
    pub room_count: usize,
}

/// Addressing scope of a relayed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "roomId", rename_all = "camelCase")]
enum Scope {
    /// Every connection on every instance.
    Global,
    /// Members of one room, on every instance.
    Room(String),
}

/// A serialized event in flight between broker instances.
///
/// The embedded event is the exact [`ServerEvent`] shape clients see, so
/// local and relayed deliveries are indistinguishable to a client.
#[derive(Debug, Serialize, Deserialize)]
struct BackplaneFrame {
    origin: String,
    scope: Scope,
    event: ServerEvent,
}

static INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_instance_id() -> String {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    let counter = INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("broker_{timestamp:x}_{counter:x}")
}

/// The session/room broker for one server process.
///
/// One logical task per connection calls into the router; the registry and
/// directory are shared, internally synchronized maps. No lock is held
/// across a backplane publish: state is mutated first, then the relayed
/// frame is built from owned data and published.
pub struct EventRouter {
    instance_id: String,
    presence: PresenceRegistry,
    rooms: RoomDirectory,
    /// Delivery channels of connections local to this instance. A
    /// connection's presence in this map is what "not Closed" means.
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
    backplane: Arc<dyn Backplane>,
}

impl EventRouter {
    /// Create a router on top of a backplane.
    #[must_use]
    pub fn new(backplane: Arc<dyn Backplane>) -> Self {
        let instance_id = generate_instance_id();
        info!(instance = %instance_id, backplane = backplane.name(), "Creating event router");
        Self {
            instance_id,
            presence: PresenceRegistry::new(),
            rooms: RoomDirectory::new(),
            connections: DashMap::new(),
            backplane,
        }
    }

    /// Get this instance's identifier.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Get the presence registry.
    #[must_use]
    pub fn presence(&self) -> &PresenceRegistry {
        &self.presence
    }

    /// Get the room directory.
    #[must_use]
    pub fn rooms(&self) -> &RoomDirectory {
        &self.rooms
    }

    /// Get broker statistics.
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        BrokerStats {
            connection_count: self.connections.len(),
            named_count: self.presence.count(),
            room_count: self.rooms.room_count(),
        }
    }

    /// Subscribe to the backplane and start relaying inbound frames.
    ///
    /// Frames published by this instance are skipped; everything else is
    /// delivered to matching local connections. If the subscription fails
    /// the router keeps working in local-only mode and the caller decides
    /// whether that is acceptable.
    ///
    /// # Errors
    ///
    /// Returns an error if the backplane subscription cannot be
    /// established.
    pub async fn connect_backplane(
        self: &Arc<Self>,
    ) -> Result<(), roomcast_backplane::BackplaneError> {
        let mut inbound = self.backplane.subscribe(EVENTS_CHANNEL).await?;
        let router = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(payload) = inbound.recv().await {
                router.handle_remote(&payload);
            }
            debug!(instance = %router.instance_id, "Backplane listener stopped");
        });
        info!(instance = %self.instance_id, "Listening on backplane");
        Ok(())
    }

    /// Register a new, anonymous connection.
    ///
    /// Returns the assigned connection ID and the receiver the transport
    /// drains to deliver events to the client. No broadcast happens yet.
    pub fn connect(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let connection_id = ConnectionId::generate();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id.clone(), tx);
        debug!(connection = %connection_id, "Connection opened");
        (connection_id, rx)
    }

    /// Handle a `join` intent: declare a display name.
    ///
    /// Registers (or renames) the connection and broadcasts the updated
    /// presence list to every connection on every instance.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::EmptyName`] for an empty name and
    /// [`BrokerError::ConnectionClosed`] after disconnect.
    pub async fn join_identity(
        &self,
        connection_id: &ConnectionId,
        display_name: &str,
    ) -> Result<(), BrokerError> {
        if !self.connections.contains_key(connection_id) {
            return Err(BrokerError::ConnectionClosed);
        }
        if display_name.is_empty() {
            return Err(BrokerError::EmptyName);
        }

        self.presence.register(connection_id, display_name);
        info!(connection = %connection_id, name = %display_name, "Joined the chat");

        self.broadcast_global(ServerEvent::UpdateUserList(self.presence.list_all()))
            .await;
        Ok(())
    }

    /// Handle a `joinRoom` intent.
    ///
    /// Sends the welcome notice and the room history to the joiner only,
    /// and a joined-notice to the other current members of the room. The
    /// notice is suppressed on an idempotent re-join.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::NotNamed`] if the connection has not
    /// declared a display name, [`BrokerError::ConnectionClosed`] after
    /// disconnect.
    pub async fn join_room(
        &self,
        connection_id: &ConnectionId,
        room_id: &str,
    ) -> Result<(), BrokerError> {
        if !self.connections.contains_key(connection_id) {
            return Err(BrokerError::ConnectionClosed);
        }
        let display_name = self
            .presence
            .name_of(connection_id)
            .ok_or(BrokerError::NotNamed)?;

        let snapshot = self.rooms.join(room_id, connection_id);
        debug!(connection = %connection_id, room = %room_id, "Joined room");

        self.deliver_to(
            connection_id,
            ServerEvent::system(format!("Welcome to the #{room_id} room!")),
        );
        self.deliver_to(connection_id, ServerEvent::MessageHistory(snapshot.history));

        if snapshot.newly_joined {
            self.broadcast_room(
                room_id,
                ServerEvent::system(format!("{display_name} has joined the room.")),
                Some(connection_id),
            )
            .await;
        }
        Ok(())
    }

    /// Handle a `sendMessage` intent.
    ///
    /// On success the message is appended to the room history and fanned
    /// out to every current member of the room, across all instances.
    /// Messages from connections with no registered name are dropped
    /// silently. Membership is not required to post.
    ///
    /// # Errors
    ///
    /// Returns [`BrokerError::ConnectionClosed`] after disconnect.
    pub async fn send_message(
        &self,
        connection_id: &ConnectionId,
        room_id: &str,
        text: &str,
    ) -> Result<(), BrokerError> {
        if !self.connections.contains_key(connection_id) {
            return Err(BrokerError::ConnectionClosed);
        }

        let message = match self.post(connection_id, room_id, text) {
            Ok(message) => message,
            Err(BrokerError::UnknownSender) => {
                warn!(connection = %connection_id, room = %room_id, "Dropping message from unnamed connection");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        trace!(connection = %connection_id, room = %room_id, id = message.id, "Posted message");
        self.broadcast_room(room_id, ServerEvent::NewMessage(message), None)
            .await;
        Ok(())
    }

    fn post(
        &self,
        connection_id: &ConnectionId,
        room_id: &str,
        text: &str,
    ) -> Result<ChatMessage, BrokerError> {
        let author = self
            .presence
            .name_of(connection_id)
            .ok_or(BrokerError::UnknownSender)?;
        Ok(self.rooms.post(room_id, &author, text))
    }

    /// Handle a disconnect.
    ///
    /// The delivery entry is removed first, so disconnect wins every race:
    /// once it is gone, no other intent for this connection is accepted
    /// and no event is delivered to it. The connection is then removed
    /// from presence and from every room it had joined. If it was named, a
    /// presence update and a departure notice go out to every connection
    /// on every instance.
    pub async fn disconnect(&self, connection_id: &ConnectionId) {
        if self.connections.remove(connection_id).is_none() {
            return;
        }

        self.rooms.leave_all(connection_id);

        match self.presence.unregister(connection_id) {
            Some(display_name) => {
                info!(connection = %connection_id, name = %display_name, "Disconnected");
                self.broadcast_global(ServerEvent::UpdateUserList(self.presence.list_all()))
                    .await;
                self.broadcast_global(ServerEvent::system(format!(
                    "{display_name} has left the chat."
                )))
                .await;
            }
            None => {
                debug!(connection = %connection_id, "Anonymous connection disconnected");
            }
        }
    }

    /// Deliver an event to one local connection.
    fn deliver_to(&self, connection_id: &ConnectionId, event: ServerEvent) {
        if let Some(tx) = self.connections.get(connection_id) {
            // A send error means the transport side is gone; disconnect
            // cleanup will remove the entry.
            let _ = tx.send(event);
        }
    }

    /// Deliver an event to every local connection.
    fn deliver_local_all(&self, event: &ServerEvent) {
        for entry in self.connections.iter() {
            let _ = entry.value().send(event.clone());
        }
    }

    /// Deliver an event to the local members of a room.
    fn deliver_local_room(&self, room_id: &str, event: &ServerEvent, skip: Option<&ConnectionId>) {
        for member in self.rooms.members_of(room_id) {
            if Some(&member) == skip {
                continue;
            }
            self.deliver_to(&member, event.clone());
        }
    }

    /// Broadcast to all connections, local and remote.
    async fn broadcast_global(&self, event: ServerEvent) {
        self.deliver_local_all(&event);
        self.publish_remote(Scope::Global, event).await;
    }

    /// Broadcast to all members of a room, local and remote.
    async fn broadcast_room(&self, room_id: &str, event: ServerEvent, skip: Option<&ConnectionId>) {
        self.deliver_local_room(room_id, &event, skip);
        self.publish_remote(Scope::Room(room_id.to_string()), event)
            .await;
    }

    /// Relay an event over the backplane.
    ///
    /// Failures degrade to local-only delivery; the triggering client
    /// operation has already succeeded.
    async fn publish_remote(&self, scope: Scope, event: ServerEvent) {
        let frame = BackplaneFrame {
            origin: self.instance_id.clone(),
            scope,
            event,
        };
        let payload = match serde_json::to_vec(&frame) {
            Ok(payload) => Bytes::from(payload),
            Err(e) => {
                warn!(error = %e, "Failed to encode backplane frame");
                return;
            }
        };
        if let Err(e) = self.backplane.publish(EVENTS_CHANNEL, payload).await {
            warn!(error = %e, "Backplane publish failed; delivered locally only");
        }
    }

    /// Handle a frame relayed by another instance.
    fn handle_remote(&self, payload: &[u8]) {
        let frame: BackplaneFrame = match serde_json::from_slice(payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed backplane frame");
                return;
            }
        };
        if frame.origin == self.instance_id {
            // Our own publish; local delivery already happened.
            return;
        }

        trace!(origin = %frame.origin, event = frame.event.name(), "Relayed event");
        match frame.scope {
            Scope::Global => self.deliver_local_all(&frame.event),
            Scope::Room(room_id) => {
                if let ServerEvent::NewMessage(message) = &frame.event {
                    // Keep local history converged so late joiners on this
                    // instance see messages posted elsewhere.
                    self.rooms.append(message.clone());
                }
                self.deliver_local_room(&room_id, &frame.event, None);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomcast_backplane::MemoryBackplane;
    use roomcast_protocol::UserEntry;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    async fn router_on(backplane: MemoryBackplane) -> Arc<EventRouter> {
        let router = Arc::new(EventRouter::new(Arc::new(backplane)));
        router.connect_backplane().await.unwrap();
        router
    }

    async fn router() -> Arc<EventRouter> {
        router_on(MemoryBackplane::new()).await
    }

    async fn next_event(rx: &mut UnboundedReceiver<ServerEvent>) -> ServerEvent {
        timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for event")
            .expect("delivery channel closed")
    }

    /// Receive events until one matches, failing after a timeout.
    async fn recv_matching(
        rx: &mut UnboundedReceiver<ServerEvent>,
        pred: impl Fn(&ServerEvent) -> bool,
    ) -> ServerEvent {
        timeout(Duration::from_secs(1), async {
            loop {
                let event = rx.recv().await.expect("delivery channel closed");
                if pred(&event) {
                    return event;
                }
            }
        })
        .await
        .expect("timed out waiting for matching event")
    }

    async fn assert_no_event(rx: &mut UnboundedReceiver<ServerEvent>) {
        assert!(
            timeout(Duration::from_millis(50), rx.recv()).await.is_err(),
            "expected no event"
        );
    }

    fn user_names(event: &ServerEvent) -> Vec<String> {
        match event {
            ServerEvent::UpdateUserList(users) => users
                .iter()
                .map(|u: &UserEntry| u.display_name.clone())
                .collect(),
            other => panic!("expected updateUserList, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_name_rejected() {
        let router = router().await;
        let (conn, _rx) = router.connect();

        assert!(matches!(
            router.join_identity(&conn, "").await,
            Err(BrokerError::EmptyName)
        ));
        assert!(router.presence().list_all().is_empty());
    }

    #[tokio::test]
    async fn test_anonymous_room_join_rejected() {
        let router = router().await;
        let (conn, mut rx) = router.connect();

        assert!(matches!(
            router.join_room(&conn, "general").await,
            Err(BrokerError::NotNamed)
        ));
        assert!(router.rooms().members_of("general").is_empty());
        assert_no_event(&mut rx).await;
    }

    #[tokio::test]
    async fn test_join_broadcasts_presence_to_everyone() {
        let router = router().await;
        let (alice, mut alice_rx) = router.connect();
        let (_bob, mut bob_rx) = router.connect();

        router.join_identity(&alice, "alice").await.unwrap();

        // Both connections, named or not, receive the updated list.
        assert_eq!(user_names(&next_event(&mut alice_rx).await), vec!["alice"]);
        assert_eq!(user_names(&next_event(&mut bob_rx).await), vec!["alice"]);
    }

    #[tokio::test]
    async fn test_unnamed_post_is_dropped() {
        let router = router().await;
        let (bob, mut bob_rx) = router.connect();
        router.join_identity(&bob, "bob").await.unwrap();
        router.join_room(&bob, "general").await.unwrap();
        while bob_rx.try_recv().is_ok() {}

        let (anon, _anon_rx) = router.connect();
        router.send_message(&anon, "general", "hi").await.unwrap();

        assert!(router.rooms().history_of("general").is_empty());
        assert_no_event(&mut bob_rx).await;
    }

    #[tokio::test]
    async fn test_join_and_message_scenario() {
        let router = router().await;

        let (alice, mut alice_rx) = router.connect();
        let (bob, mut bob_rx) = router.connect();
        router.join_identity(&alice, "alice").await.unwrap();
        router.join_identity(&bob, "bob").await.unwrap();

        // Bob joins first: welcome notice plus empty history, to him only.
        router.join_room(&bob, "general").await.unwrap();
        let welcome = recv_matching(&mut bob_rx, |e| matches!(e, ServerEvent::SystemMessage(_))).await;
        assert_eq!(
            welcome,
            ServerEvent::system("Welcome to the #general room!")
        );
        let history = next_event(&mut bob_rx).await;
        assert_eq!(history, ServerEvent::MessageHistory(vec![]));

        // Alice joins: bob gets the joined notice.
        router.join_room(&alice, "general").await.unwrap();
        let notice = next_event(&mut bob_rx).await;
        assert_eq!(notice, ServerEvent::system("alice has joined the room."));

        // Alice posts: both members receive the message.
        router.send_message(&alice, "general", "hi").await.unwrap();
        let to_alice =
            recv_matching(&mut alice_rx, |e| matches!(e, ServerEvent::NewMessage(_))).await;
        let to_bob = recv_matching(&mut bob_rx, |e| matches!(e, ServerEvent::NewMessage(_))).await;
        assert_eq!(to_alice, to_bob);
        match to_alice {
            ServerEvent::NewMessage(message) => {
                assert_eq!(message.author, "alice");
                assert_eq!(message.text, "hi");
                assert_eq!(message.room_id, "general");
            }
            other => panic!("expected newMessage, got {:?}", other),
        }

        assert_eq!(router.rooms().history_of("general").len(), 1);
    }

    #[tokio::test]
    async fn test_rejoin_suppresses_notice_but_resends_history() {
        let router = router().await;

        let (alice, mut alice_rx) = router.connect();
        let (bob, mut bob_rx) = router.connect();
        router.join_identity(&alice, "alice").await.unwrap();
        router.join_identity(&bob, "bob").await.unwrap();
        router.join_room(&bob, "general").await.unwrap();
        router.join_room(&alice, "general").await.unwrap();
        while bob_rx.try_recv().is_ok() {}
        while alice_rx.try_recv().is_ok() {}

        router.join_room(&alice, "general").await.unwrap();

        // Alice gets welcome and history again; bob gets no second notice.
        assert_eq!(
            next_event(&mut alice_rx).await,
            ServerEvent::system("Welcome to the #general room!")
        );
        assert!(matches!(
            next_event(&mut alice_rx).await,
            ServerEvent::MessageHistory(_)
        ));
        assert_no_event(&mut bob_rx).await;
    }

    #[tokio::test]
    async fn test_history_cap_for_new_joiner() {
        let router = router().await;

        let (alice, mut alice_rx) = router.connect();
        router.join_identity(&alice, "alice").await.unwrap();
        router.join_room(&alice, "general").await.unwrap();

        for i in 0..101 {
            router
                .send_message(&alice, "general", &format!("msg-{i}"))
                .await
                .unwrap();
        }
        while alice_rx.try_recv().is_ok() {}

        let (bob, mut bob_rx) = router.connect();
        router.join_identity(&bob, "bob").await.unwrap();
        router.join_room(&bob, "general").await.unwrap();

        let history =
            recv_matching(&mut bob_rx, |e| matches!(e, ServerEvent::MessageHistory(_))).await;
        match history {
            ServerEvent::MessageHistory(messages) => {
                assert_eq!(messages.len(), 100);
                assert_eq!(messages[0].text, "msg-1");
                assert_eq!(messages[99].text, "msg-100");
            }
            other => panic!("expected messageHistory, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_post_without_membership() {
        let router = router().await;

        let (alice, _alice_rx) = router.connect();
        let (bob, mut bob_rx) = router.connect();
        router.join_identity(&alice, "alice").await.unwrap();
        router.join_identity(&bob, "bob").await.unwrap();
        router.join_room(&bob, "general").await.unwrap();
        while bob_rx.try_recv().is_ok() {}

        // Alice never joined the room, but her post still lands.
        router.send_message(&alice, "general", "hi").await.unwrap();

        let event = recv_matching(&mut bob_rx, |e| matches!(e, ServerEvent::NewMessage(_))).await;
        assert!(matches!(event, ServerEvent::NewMessage(m) if m.author == "alice"));
        assert_eq!(router.rooms().history_of("general").len(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_cleans_up_everywhere() {
        let router = router().await;

        let (alice, _alice_rx) = router.connect();
        let (bob, mut bob_rx) = router.connect();
        router.join_identity(&alice, "alice").await.unwrap();
        router.join_identity(&bob, "bob").await.unwrap();
        router.join_room(&alice, "general").await.unwrap();
        router.join_room(&bob, "general").await.unwrap();
        while bob_rx.try_recv().is_ok() {}

        router.disconnect(&alice).await;

        assert_eq!(user_names(&next_event(&mut bob_rx).await), vec!["bob"]);
        assert_eq!(
            next_event(&mut bob_rx).await,
            ServerEvent::system("alice has left the chat.")
        );
        assert!(!router.rooms().is_member("general", &alice));
        assert_eq!(router.stats().connection_count, 1);
    }

    #[tokio::test]
    async fn test_no_intents_after_disconnect() {
        let router = router().await;
        let (conn, _rx) = router.connect();
        router.join_identity(&conn, "alice").await.unwrap();

        router.disconnect(&conn).await;

        assert!(matches!(
            router.join_identity(&conn, "alice").await,
            Err(BrokerError::ConnectionClosed)
        ));
        assert!(matches!(
            router.join_room(&conn, "general").await,
            Err(BrokerError::ConnectionClosed)
        ));
        assert!(matches!(
            router.send_message(&conn, "general", "hi").await,
            Err(BrokerError::ConnectionClosed)
        ));
        // Repeat disconnect is a no-op.
        router.disconnect(&conn).await;
    }

    #[tokio::test]
    async fn test_rename_via_rejoin() {
        let router = router().await;
        let (conn, mut rx) = router.connect();

        router.join_identity(&conn, "alice").await.unwrap();
        router.join_identity(&conn, "alicia").await.unwrap();

        assert_eq!(user_names(&next_event(&mut rx).await), vec!["alice"]);
        assert_eq!(user_names(&next_event(&mut rx).await), vec!["alicia"]);
    }

    #[tokio::test]
    async fn test_cross_instance_fanout() {
        let backplane = MemoryBackplane::new();
        let router_a = router_on(backplane.clone()).await;
        let router_b = router_on(backplane).await;

        let (alice, mut alice_rx) = router_a.connect();
        let (bob, mut bob_rx) = router_b.connect();
        router_a.join_identity(&alice, "alice").await.unwrap();
        router_b.join_identity(&bob, "bob").await.unwrap();
        router_a.join_room(&alice, "general").await.unwrap();
        router_b.join_room(&bob, "general").await.unwrap();

        router_a
            .send_message(&alice, "general", "hi across")
            .await
            .unwrap();

        let on_a = recv_matching(&mut alice_rx, |e| matches!(e, ServerEvent::NewMessage(_))).await;
        let on_b = recv_matching(&mut bob_rx, |e| matches!(e, ServerEvent::NewMessage(_))).await;
        assert_eq!(on_a, on_b);

        // The receiving instance appended the relayed message, so a late
        // joiner there sees it in history.
        let history = router_b.rooms().history_of("general");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].text, "hi across");
    }

    #[tokio::test]
    async fn test_cross_instance_presence_notice() {
        let backplane = MemoryBackplane::new();
        let router_a = router_on(backplane.clone()).await;
        let router_b = router_on(backplane).await;

        let (alice, _alice_rx) = router_a.connect();
        let (bob, mut bob_rx) = router_b.connect();
        router_b.join_identity(&bob, "bob").await.unwrap();
        while bob_rx.try_recv().is_ok() {}

        router_a.join_identity(&alice, "alice").await.unwrap();
        router_a.disconnect(&alice).await;

        // Bob observes instance A's presence churn via the backplane.
        recv_matching(&mut bob_rx, |e| matches!(e, ServerEvent::UpdateUserList(_))).await;
        recv_matching(&mut bob_rx, |e| {
            e == &ServerEvent::system("alice has left the chat.")
        })
        .await;
    }

    #[tokio::test]
    async fn test_local_only_when_backplane_unsubscribed() {
        // A router that never connected its listener still works locally.
        let router = Arc::new(EventRouter::new(Arc::new(MemoryBackplane::new())));
        let (conn, mut rx) = router.connect();

        router.join_identity(&conn, "alice").await.unwrap();
        router.join_room(&conn, "general").await.unwrap();
        router.send_message(&conn, "general", "hi").await.unwrap();

        recv_matching(&mut rx, |e| matches!(e, ServerEvent::NewMessage(_))).await;
    }
}
