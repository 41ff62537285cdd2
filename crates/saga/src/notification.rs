//! Notification service consumer.

use async_trait::async_trait;
use bus::{Delivery, MessageHandler, envelope};
use projections::NotificationDispatcher;

use crate::{Result, SagaError, messages::ServiceMessage};

/// Tells guests about status changes arriving on the notification queue.
///
/// A failed send is retried through redelivery; duplicates are dropped by
/// the dispatcher.
pub struct NotificationHandler {
    dispatcher: NotificationDispatcher,
}

impl NotificationHandler {
    pub fn new(dispatcher: NotificationDispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MessageHandler for NotificationHandler {
    type Error = SagaError;

    fn name(&self) -> &'static str {
        "notification-service"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        match envelope::decode::<ServiceMessage>(&delivery.body)? {
            ServiceMessage::StatusChanged(event) => {
                self.dispatcher
                    .notify_status(event.order_id, event.new_status, event.email)
                    .await?;
                Ok(())
            }
            other => Err(SagaError::unexpected(&other, self.name())),
        }
    }
}
