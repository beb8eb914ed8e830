//! Backplane abstraction.
//!
//! The backplane is the shared pub/sub bus that lets several server
//! processes reach each other's clients. A subscription covers a whole topic
//! set at once; changing the set means dropping the subscription and opening
//! a new one.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use thiserror::Error;

pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;

pub use memory::MemoryBackplane;
#[cfg(feature = "redis")]
pub use self::redis::RedisBackplane;

/// Backplane errors.
#[derive(Debug, Error)]
pub enum BackplaneError {
    /// Could not reach the backplane.
    #[error("Backplane connection failed: {0}")]
    Connection(String),

    /// Publishing failed.
    #[error("Publish failed: {0}")]
    Publish(String),

    /// Subscribing failed.
    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    /// Redis error.
    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] ::redis::RedisError),
}

/// A message received from the backplane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackplaneMessage {
    /// Topic the message was published on.
    pub topic: String,
    /// Raw payload.
    pub payload: Bytes,
}

/// A live subscription. Dropping it unsubscribes.
pub type Subscription = BoxStream<'static, BackplaneMessage>;

/// A shared publish/subscribe bus.
#[async_trait]
pub trait Backplane: Send + Sync {
    /// Publish a payload on a topic.
    async fn publish(&self, topic: &str, payload: Bytes) -> Result<(), BackplaneError>;

    /// Subscribe to exactly `topics`.
    ///
    /// The stream ends if the backplane drops the subscription.
    async fn subscribe(&self, topics: &[String]) -> Result<Subscription, BackplaneError>;

    /// Backplane name for logs (e.g., "redis", "memory").
    fn name(&self) -> &'static str;
}
