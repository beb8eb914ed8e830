//! Redis pub/sub backplane.

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::StreamExt;
use tracing::{debug, info};

use super::{Backplane, BackplaneError, BackplaneMessage, Subscription};

/// A backplane on Redis PUBLISH/SUBSCRIBE.
///
/// Publishing shares one reconnecting connection. Each subscription opens
/// its own pub/sub connection, which closes when the stream is dropped.
#[derive(Clone)]
pub struct RedisBackplane {
    client: Client,
    publisher: ConnectionManager,
}

impl RedisBackplane {
    /// Connect to Redis at `url` (e.g. `redis://127.0.0.1:6379/0`).
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid or Redis cannot be reached.
    pub async fn connect(url: &str) -> Result<Self, BackplaneError> {
        let client = Client::open(url)?;
        let publisher = ConnectionManager::new(client.clone())
            .await
            .map_err(|e| BackplaneError::Connection(e.to_string()))?;

        info!("Connected to Redis backplane");
        Ok(Self { client, publisher })
    }
}

#[async_trait]
impl Backplane for RedisBackplane {
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BackplaneError> {
        let mut conn = self.publisher.clone();
        let receivers: i64 = conn
            .publish(topic, payload.to_vec())
            .await
            .map_err(|e| BackplaneError::Publish(e.to_string()))?;

        debug!(topic = %topic, receivers, "Published to Redis");
        Ok(())
    }

    async fn subscribe(&self, topics: &[String]) -> Result<Subscription, BackplaneError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub
            .subscribe(topics)
            .await
            .map_err(|e| BackplaneError::Subscribe(e.to_string()))?;

        let stream = pubsub.into_on_message().map(|msg| BackplaneMessage {
            topic: msg.get_channel_name().to_string(),
            payload: Bytes::copy_from_slice(msg.get_payload_bytes()),
        });

        Ok(Box::pin(stream))
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
