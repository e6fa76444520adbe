//! # roomcast-core
//!
//! The session/room broker for the roomcast messaging service.
//!
//! This crate tracks live connections and their identities, maintains
//! per-room membership and bounded message history, and fans events out to
//! the right set of subscribers - locally and, through the backplane, on
//! every other broker instance.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────┐     ┌───────────────┐
//! │  Connection │────▶│ EventRouter  │────▶│ RoomDirectory │
//! └─────────────┘     └──────────────┘     └───────────────┘
//!                        │         │
//!                        ▼         ▼
//!              ┌──────────────┐  ┌───────────┐
//!              │ PresenceReg. │  │ Backplane │──▶ other instances
//!              └──────────────┘  └───────────┘
//! ```
//!
//! All broker state lives in process memory and is lost on restart; the
//! bounded per-room history (newest 100 messages) is the only retention.

pub mod connection;
pub mod presence;
pub mod rooms;
pub mod router;

pub use connection::ConnectionId;
pub use presence::PresenceRegistry;
pub use rooms::{JoinSnapshot, RoomDirectory, HISTORY_LIMIT};
pub use router::{BrokerError, BrokerStats, EventRouter, EVENTS_CHANNEL};
