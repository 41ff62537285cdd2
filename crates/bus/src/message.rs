use async_trait::async_trait;
use common::CorrelationId;
use uuid::Uuid;

use crate::Result;

/// Transport properties carried alongside a message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageProperties {
    /// Unique identifier assigned at publish time.
    pub message_id: Uuid,

    /// Correlates an RPC request with its reply.
    pub correlation_id: Option<CorrelationId>,

    /// Queue the consumer should publish its reply to.
    pub reply_to: Option<String>,
}

impl Default for MessageProperties {
    fn default() -> Self {
        Self {
            message_id: Uuid::new_v4(),
            correlation_id: None,
            reply_to: None,
        }
    }
}

/// A message ready to be published.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub body: Vec<u8>,
    pub properties: MessageProperties,
}

impl Outbound {
    /// Creates an outbound message with fresh properties.
    pub fn new(body: Vec<u8>) -> Self {
        Self {
            body,
            properties: MessageProperties::default(),
        }
    }

    pub fn with_correlation_id(mut self, correlation_id: CorrelationId) -> Self {
        self.properties.correlation_id = Some(correlation_id);
        self
    }

    pub fn with_reply_to(mut self, reply_to: impl Into<String>) -> Self {
        self.properties.reply_to = Some(reply_to.into());
        self
    }
}

/// How a delivery is settled with the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Settlement {
    /// Processing finished; remove the message.
    Ack,
    /// Return the message to the broker, optionally for redelivery.
    Nack { requeue: bool },
    /// Route the message to the queue's dead-letter queue.
    Reject,
}

/// Broker-side handle used to settle a single delivery.
#[async_trait]
pub trait Acker: Send + Sync {
    /// Settles the delivery. Called at most once.
    async fn settle(&self, settlement: Settlement) -> Result<()>;

    /// Called when the delivery is dropped without being settled.
    fn abandon(&self);
}

/// A message received from a queue, awaiting settlement.
///
/// Dropping a delivery without settling it hands it back to the broker
/// for redelivery.
pub struct Delivery {
    pub queue: String,
    pub body: Vec<u8>,
    pub properties: MessageProperties,
    /// Number of times this message has been delivered, starting at 1.
    pub delivery_count: u32,
    acker: Option<Box<dyn Acker>>,
}

impl Delivery {
    pub fn new(
        queue: impl Into<String>,
        body: Vec<u8>,
        properties: MessageProperties,
        delivery_count: u32,
        acker: Box<dyn Acker>,
    ) -> Self {
        Self {
            queue: queue.into(),
            body,
            properties,
            delivery_count,
            acker: Some(acker),
        }
    }

    /// Returns true if this is not the first delivery of the message.
    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }

    pub async fn ack(self) -> Result<()> {
        self.settle(Settlement::Ack).await
    }

    pub async fn nack(self, requeue: bool) -> Result<()> {
        self.settle(Settlement::Nack { requeue }).await
    }

    pub async fn reject(self) -> Result<()> {
        self.settle(Settlement::Reject).await
    }

    pub async fn settle(mut self, settlement: Settlement) -> Result<()> {
        match self.acker.take() {
            Some(acker) => acker.settle(settlement).await,
            None => Ok(()),
        }
    }
}

impl Drop for Delivery {
    fn drop(&mut self) {
        if let Some(acker) = self.acker.take() {
            acker.abandon();
        }
    }
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("queue", &self.queue)
            .field("properties", &self.properties)
            .field("delivery_count", &self.delivery_count)
            .field("body_len", &self.body.len())
            .finish()
    }
}
