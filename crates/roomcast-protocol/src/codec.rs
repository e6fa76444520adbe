//! JSON codec for roomcast intents and events.
//!
//! Events travel as self-delimited JSON text (WebSocket text frames), so no
//! length-prefix framing is needed.

use thiserror::Error;

use crate::events::{ClientIntent, ServerEvent};

/// Maximum accepted size of an inbound intent (64 KiB).
pub const MAX_INTENT_SIZE: usize = 64 * 1024;

/// Protocol errors that can occur during encoding/decoding.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Inbound intent exceeds maximum size.
    #[error("Intent size {0} exceeds maximum {MAX_INTENT_SIZE}")]
    IntentTooLarge(usize),

    /// JSON encoding error.
    #[error("Encoding error: {0}")]
    Encode(#[source] serde_json::Error),

    /// JSON decoding error.
    #[error("Decoding error: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a server event to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_event(event: &ServerEvent) -> Result<String, ProtocolError> {
    serde_json::to_string(event).map_err(ProtocolError::Encode)
}

/// Decode a server event from JSON text.
///
/// # Errors
///
/// Returns an error if the text is not a valid event.
pub fn decode_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}

/// Encode a client intent to JSON text.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn encode_intent(intent: &ClientIntent) -> Result<String, ProtocolError> {
    serde_json::to_string(intent).map_err(ProtocolError::Encode)
}

/// Decode a client intent from JSON text.
///
/// # Errors
///
/// Returns an error if the text is oversized or not a valid intent.
pub fn decode_intent(text: &str) -> Result<ClientIntent, ProtocolError> {
    if text.len() > MAX_INTENT_SIZE {
        return Err(ProtocolError::IntentTooLarge(text.len()));
    }
    serde_json::from_str(text).map_err(ProtocolError::Decode)
}
