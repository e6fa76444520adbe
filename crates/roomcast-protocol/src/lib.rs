//! # roomcast-protocol
//!
//! Wire schema for the roomcast messaging broker.
//!
//! This crate defines the two halves of the client boundary:
//!
//! - **`ClientIntent`** - What a connection asks the broker to do
//!   (`join`, `joinRoom`, `sendMessage`)
//! - **`ServerEvent`** - What the broker delivers to connections
//!   (`updateUserList`, `systemMessage`, `messageHistory`, `newMessage`)
//!
//! Events are serialized as JSON text. The same [`ServerEvent`] shape is
//! used for local delivery and for frames relayed between broker instances
//! over the backplane, so clients observe identical payloads regardless of
//! which instance they are attached to.

pub mod codec;
pub mod events;

pub use codec::{decode_event, decode_intent, encode_event, encode_intent, ProtocolError};
pub use events::{ChatMessage, ClientIntent, MessageId, ServerEvent, UserEntry};
