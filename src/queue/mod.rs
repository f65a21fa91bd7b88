//! Durable message queues carrying loan events.
//!
//! Consumers receive a [`Delivery`] and must settle it exactly once with
//! [`MessageQueue::ack`] or [`MessageQueue::nack`]. Unsettled deliveries stay
//! parked until [`MessageQueue::recover`] puts them back on their queue.
//!
//! The loan system publishes over AMQP (`amqp://`, `amqps://`). A Redis list
//! queue (`redis://`, `rediss://`) is available for deployments without a broker.

pub mod amqp;
pub mod consumer;
pub mod memory;
pub mod redis;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub use self::amqp::AmqpQueue;
pub use self::consumer::{Acknowledgement, ConsumerSettings, LoanEventConsumer};
pub use self::memory::InMemoryQueue;
pub use self::redis::RedisQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue transport error: {0}")]
    Transport(#[from] ::redis::RedisError),

    #[error("AMQP error: {0}")]
    Amqp(#[from] ::lapin::Error),

    #[error("queue unavailable: {0}")]
    Unavailable(String),

    #[error("unsupported queue URL scheme: {0}")]
    UnsupportedScheme(String),
}

/// A message taken from a queue and awaiting settlement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub queue: String,
    pub payload: Vec<u8>,
    /// Broker delivery tag. List-based queues identify a delivery by its payload and leave this at 0.
    pub tag: u64,
}

#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Return deliveries left unsettled by a previous consumer to the queue.
    /// Returns how many were moved.
    async fn recover(&self, queue: &str) -> Result<u64, QueueError>;

    /// Wait up to `timeout` for the oldest message on `queue`
    async fn receive(&self, queue: &str, timeout: Duration)
        -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery: &Delivery) -> Result<(), QueueError>;

    /// Reject a delivery. With `requeue` it is redelivered before any other message;
    /// without it the message is dead-lettered.
    async fn nack(&self, delivery: &Delivery, requeue: bool) -> Result<(), QueueError>;
}

/// Open a transport for `url`, picked by its scheme
pub async fn connect(url: &str) -> Result<Arc<dyn MessageQueue>, QueueError> {
    let scheme = url.split_once("://").map(|(scheme, _)| scheme).unwrap_or("");
    match scheme {
        "amqp" | "amqps" => Ok(Arc::new(AmqpQueue::connect(url).await?)),
        "redis" | "rediss" => Ok(Arc::new(RedisQueue::connect(url).await?)),
        other => Err(QueueError::UnsupportedScheme(other.to_string())),
    }
}
