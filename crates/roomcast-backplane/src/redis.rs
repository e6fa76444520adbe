//! Redis pub/sub backplane.
//!
//! One multiplexed connection (via `ConnectionManager`) serves all
//! publishes; each subscription opens a dedicated pub/sub connection and
//! forwards payloads into an mpsc channel from a spawned task.
//! Reconnection of the publish path is handled by the connection manager.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::traits::{Backplane, BackplaneError};

/// A Redis-backed backplane.
pub struct RedisBackplane {
    client: redis::Client,
    publisher: ConnectionManager,
}

impl RedisBackplane {
    /// Connect to a Redis server.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or the initial connection
    /// cannot be established.
    pub async fn connect(url: &str) -> Result<Self, BackplaneError> {
        let client = redis::Client::open(url)
            .map_err(|e| BackplaneError::Unavailable(e.to_string()))?;

        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BackplaneError::Unavailable(e.to_string()))?;

        info!(url = %url, "Connected to Redis backplane");

        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn publish(&self, channel: &str, payload: Bytes) -> Result<(), BackplaneError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(channel, payload.as_ref())
            .await
            .map_err(|e| BackplaneError::PublishFailed(e.to_string()))?;

        debug!(channel = %channel, receivers = receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(
        &self,
        channel: &str,
    ) -> Result<mpsc::UnboundedReceiver<Bytes>, BackplaneError> {
        let mut pubsub = self
            .client
            .get_async_pubsub()
            .await
            .map_err(|e| BackplaneError::SubscribeFailed(e.to_string()))?;

        pubsub
            .subscribe(channel)
            .await
            .map_err(|e| BackplaneError::SubscribeFailed(e.to_string()))?;

        let (tx, rx) = mpsc::unbounded_channel();
        let channel_name = channel.to_string();

        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            while let Some(msg) = stream.next().await {
                let payload: Vec<u8> = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!(channel = %channel_name, error = %e, "Bad Redis payload");
                        continue;
                    }
                };
                if tx.send(Bytes::from(payload)).is_err() {
                    // Subscriber went away.
                    break;
                }
            }
            debug!(channel = %channel_name, "Redis subscription ended");
        });

        Ok(rx)
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
