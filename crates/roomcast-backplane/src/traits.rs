//! Backplane abstraction.
//!
//! The broker core only ever calls the two methods defined here. Channel
//! naming and payload encoding are decided by the caller.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;

/// Backplane errors.
///
/// All of these are non-fatal to the broker: a failed publish degrades to
/// local-only delivery, and reconnection is the backplane's own concern.
#[derive(Debug, Error)]
pub enum BackplaneError {
    /// The backplane transport cannot be reached.
    #[error("Backplane unavailable: {0}")]
    Unavailable(String),

    /// A publish was not accepted.
    #[error("Publish failed: {0}")]
    PublishFailed(String),

    /// A subscription could not be established.
    #[error("Subscribe failed: {0}")]
    SubscribeFailed(String),
}

/// A publish/subscribe transport shared by broker instances.
///
/// Payloads published to a channel are delivered to every subscriber of
/// that channel, including subscribers on the publishing instance.
/// Delivery is best-effort; there is no acknowledgment or replay.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Publish a payload to a channel.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload could not be handed to the
    /// transport.
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BackplaneError>;

    /// Subscribe to a channel.
    ///
    /// Returns a receiver yielding every payload published to the channel
    /// from the moment of subscription. Dropping the receiver ends the
    /// subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the subscription could not be established.
    async fn subscribe(&self, channel: &str)
        -> Result<mpsc::UnboundedReceiver<Bytes>, BackplaneError>;

    /// Get the backplane name (e.g., "memory", "redis").
    fn name(&self) -> &'static str;
}
