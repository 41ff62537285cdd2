use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::Serialize;

use crate::{Delivery, Outbound, Result, envelope};

/// A stream of deliveries from one queue. Ends when the queue is deleted.
pub type Subscription = Pin<Box<dyn Stream<Item = Delivery> + Send>>;

/// Suffix appended to a queue name to form its dead-letter queue.
pub const DEAD_LETTER_SUFFIX: &str = ".dead_letter";

/// Returns the dead-letter queue name for a queue.
pub fn dead_letter_queue(queue: &str) -> String {
    format!("{queue}{DEAD_LETTER_SUFFIX}")
}

/// Core trait for message broker implementations.
///
/// Brokers provide durable point-to-point queues plus exclusive,
/// auto-deleting reply queues for request/response.
/// All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait Broker: Send + Sync {
    /// Declares a durable queue and its dead-letter queue. Idempotent.
    async fn declare_queue(&self, name: &str) -> Result<()>;

    /// Declares an exclusive reply queue with a broker-generated name.
    ///
    /// The queue is deleted when the returned guard is dropped.
    async fn declare_reply_queue(&self) -> Result<ReplyQueue>;

    /// Publishes a message to a declared queue.
    ///
    /// Fails with `QueueNotFound` if the queue does not exist.
    async fn publish(&self, queue: &str, message: Outbound) -> Result<()>;

    /// Starts consuming a queue.
    async fn subscribe(&self, queue: &str) -> Result<Subscription>;
}

/// Extension trait providing convenience methods for brokers.
#[async_trait]
pub trait BrokerExt: Broker {
    /// Encodes a tagged message into an envelope and publishes it.
    async fn publish_message<M: Serialize + Sync>(&self, queue: &str, message: &M) -> Result<()> {
        let body = envelope::encode(message)?;
        self.publish(queue, Outbound::new(body)).await
    }

    /// Publishes a reply to the `reply_to` queue of a request, if it has one.
    ///
    /// Returns false when the request did not ask for a reply.
    async fn reply<M: Serialize + Sync>(&self, request: &Delivery, message: &M) -> Result<bool> {
        let Some(reply_to) = request.properties.reply_to.as_deref() else {
            return Ok(false);
        };
        let mut outbound = Outbound::new(envelope::encode(message)?);
        outbound.properties.correlation_id = request.properties.correlation_id;
        self.publish(reply_to, outbound).await?;
        Ok(true)
    }
}

// Blanket implementation for all Broker implementations
impl<T: Broker + ?Sized> BrokerExt for T {}

/// Guard for an exclusive reply queue.
///
/// Dropping the guard deletes the queue, which ends any subscription on it
/// and makes later publishes fail with `QueueNotFound`.
pub struct ReplyQueue {
    name: String,
    release: Option<Box<dyn FnOnce(&str) + Send + Sync>>,
}

impl ReplyQueue {
    pub fn new(name: impl Into<String>, release: impl FnOnce(&str) + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            release: Some(Box::new(release)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ReplyQueue {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(&self.name);
        }
    }
}

impl std::fmt::Debug for ReplyQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplyQueue").field("name", &self.name).finish()
    }
}
