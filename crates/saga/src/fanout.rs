//! Status fan-out: one status change delivered to every interested service.
//!
//! Each originating service publishes to the queues of the other services.
//! Delivery is at-least-once; consumers treat a repeated `(order_id, status)`
//! as a no-op.

use std::sync::Arc;

use bus::{Broker, BrokerExt};
use serde::{Deserialize, Serialize};

use crate::{
    messages::{ServiceMessage, StatusChanged},
    settings::QueueNames,
};

/// The service a status change originates from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Origin {
    #[serde(rename = "order")]
    OrderService,
    #[serde(rename = "staff")]
    StaffService,
    #[serde(rename = "payment")]
    PaymentService,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::OrderService => "order",
            Origin::StaffService => "staff",
            Origin::PaymentService => "payment",
        }
    }
}

/// Publishes status changes to the queues interested in them.
#[derive(Clone)]
pub struct StatusFanout {
    broker: Arc<dyn Broker>,
    queues: QueueNames,
}

impl StatusFanout {
    pub fn new(broker: Arc<dyn Broker>, queues: QueueNames) -> Self {
        Self { broker, queues }
    }

    /// Queues that receive changes made by `origin`.
    pub fn targets(&self, origin: Origin) -> Vec<&str> {
        let q = &self.queues;
        match origin {
            Origin::OrderService => vec![&q.staff, &q.notification],
            Origin::StaffService => vec![&q.order, &q.notification],
            Origin::PaymentService => vec![&q.order, &q.staff, &q.notification],
        }
    }

    /// Stamps the change with `origin` and publishes it to every target queue.
    ///
    /// A failed target does not stop the others; the local change that caused
    /// the event has already been committed. Returns how many targets got it.
    #[tracing::instrument(
        skip(self, event),
        fields(origin = origin.as_str(), order_id = %event.order_id, status = %event.new_status)
    )]
    pub async fn publish(&self, origin: Origin, mut event: StatusChanged) -> usize {
        event.origin = Some(origin);
        let message = ServiceMessage::StatusChanged(event);
        let mut delivered = 0;

        for queue in self.targets(origin) {
            match self.broker.publish_message(queue, &message).await {
                Ok(()) => delivered += 1,
                Err(e) => {
                    metrics::counter!("fanout_publish_failures_total", "queue" => queue.to_string())
                        .increment(1);
                    tracing::warn!(queue, error = %e, "status fan-out failed for queue");
                }
            }
        }

        tracing::debug!(delivered, "status fanned out");
        delivered
    }
}
