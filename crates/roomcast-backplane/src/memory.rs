//! In-process backplane.
//!
//! Delivers payloads synchronously to every subscriber of a channel. Used
//! as the single-instance default and as the fake in broker tests, where
//! several routers share one `MemoryBackplane` clone to simulate a
//! multi-instance deployment.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use crate::traits::{Backplane, BackplaneError};

/// An in-process pub/sub backplane.
///
/// Cloning is cheap and clones share the same channel table.
#[derive(Clone, Default)]
pub struct MemoryBackplane {
    /// Subscriber senders per channel.
    channels: Arc<DashMap<String, Vec<mpsc::UnboundedSender<Bytes>>>>,
}

impl MemoryBackplane {
    /// Create a new, empty backplane.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the number of live subscribers on a channel.
    #[must_use]
    pub fn subscriber_count(&self, channel: &str) -> usize {
        self.channels.get(channel).map(|s| s.len()).unwrap_or(0)
    }
}

#[async_trait]
impl Backplane for MemoryBackplane {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BackplaneError> {
        if let Some(mut subscribers) = self.channels.get_mut(channel) {
            // Drop subscribers whose receiver has gone away.
            subscribers.retain(|tx| tx.send(payload.clone()).is_ok());
            trace!(channel = %channel, subscribers = subscribers.len(), "Published payload");
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Bytes>, BackplaneError> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.channels.entry(channel.to_string()).or_default().push(tx);
        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_all_subscribers() {
        let backplane = MemoryBackplane::new();

        let mut rx1 = backplane.subscribe("events").await.unwrap();
        let mut rx2 = backplane.subscribe("events").await.unwrap();

        backplane
            .publish("events", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        assert_eq!(rx1.recv().await.unwrap(), Bytes::from_static(b"hello"));
        assert_eq!(rx2.recv().await.unwrap(), Bytes::from_static(b"hello"));
    }

    #[tokio::test]
    async fn test_channels_are_isolated() {
        let backplane = MemoryBackplane::new();

        let mut rx = backplane.subscribe("a").await.unwrap();
        backplane
            .publish("b", Bytes::from_static(b"wrong channel"))
            .await
            .unwrap();

        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let backplane = MemoryBackplane::new();
        assert!(backplane
            .publish("nobody", Bytes::from_static(b"x"))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let backplane = MemoryBackplane::new();

        let rx = backplane.subscribe("events").await.unwrap();
        assert_eq!(backplane.subscriber_count("events"), 1);
        drop(rx);

        backplane
            .publish("events", Bytes::from_static(b"x"))
            .await
            .unwrap();
        assert_eq!(backplane.subscriber_count("events"), 0);
    }

    #[tokio::test]
    async fn test_clones_share_channels() {
        let backplane = MemoryBackplane::new();
        let other = backplane.clone();

        let mut rx = backplane.subscribe("events").await.unwrap();
        other
            .publish("events", Bytes::from_static(b"shared"))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), Bytes::from_static(b"shared"));
    }
}
