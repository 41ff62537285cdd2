//! Customer notifications for order status changes.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{OrderId, OrderStatus};
use tokio::sync::RwLock;

use crate::{ProjectionError, Result};

/// A message to a guest about their order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub recipient: Option<String>,
    pub subject: String,
    pub body: String,
}

impl Notification {
    /// Builds the standard status update message.
    pub fn status_update(order_id: OrderId, status: OrderStatus, recipient: Option<String>) -> Self {
        Self {
            order_id,
            status,
            recipient,
            subject: format!("Status update for order #{order_id}"),
            body: format!("Your order status changed to: {status}."),
        }
    }
}

/// Delivery channel for notifications (email, SMS, push).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// Writes notifications to the log instead of delivering them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        tracing::info!(
            order_id = %notification.order_id,
            recipient = notification.recipient.as_deref().unwrap_or("-"),
            subject = %notification.subject,
            "notification sent"
        );
        Ok(())
    }
}

#[derive(Debug, Default)]
struct RecorderState {
    sent: Vec<Notification>,
    fail: bool,
}

/// In-memory notifier for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryNotifier {
    state: Arc<Mutex<RecorderState>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the notifier to fail every send.
    pub fn set_fail(&self, fail: bool) {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).fail = fail;
    }

    /// Returns every notification sent so far.
    pub fn sent(&self) -> Vec<Notification> {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sent
            .clone()
    }
}

#[async_trait]
impl Notifier for InMemoryNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.fail {
            return Err(ProjectionError::Delivery("notifier unavailable".to_string()));
        }
        state.sent.push(notification.clone());
        Ok(())
    }
}

/// Finished orders remembered by default before the oldest is forgotten.
pub const DEFAULT_FINISHED_RETENTION: usize = 10_000;

/// What has been sent so far.
///
/// Open orders keep the statuses already announced. Once an order reaches a
/// terminal status its set is dropped and only the order id is kept, in a
/// bounded FIFO.
#[derive(Debug, Default)]
struct DeliveryLog {
    open: HashMap<OrderId, HashSet<OrderStatus>>,
    finished: HashSet<OrderId>,
    finished_fifo: VecDeque<OrderId>,
}

impl DeliveryLog {
    fn already_sent(&self, order_id: OrderId, status: OrderStatus) -> bool {
        self.finished.contains(&order_id)
            || self
                .open
                .get(&order_id)
                .is_some_and(|sent| sent.contains(&status))
    }

    fn record(&mut self, order_id: OrderId, status: OrderStatus, retention: usize) {
        if !status.is_terminal() {
            self.open.entry(order_id).or_default().insert(status);
            return;
        }

        self.open.remove(&order_id);
        if self.finished.insert(order_id) {
            self.finished_fifo.push_back(order_id);
        }
        while self.finished_fifo.len() > retention {
            if let Some(oldest) = self.finished_fifo.pop_front() {
                self.finished.remove(&oldest);
            }
        }
    }
}

/// Sends one notification per `(order_id, status)` pair.
///
/// A pair is remembered only after a successful send, so a failed send is
/// attempted again when the message is redelivered. After a terminal status
/// the order is not notified again.
#[derive(Clone)]
pub struct NotificationDispatcher {
    notifier: Arc<dyn Notifier>,
    default_recipient: Option<String>,
    retention: usize,
    log: Arc<RwLock<DeliveryLog>>,
}

impl NotificationDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            default_recipient: None,
            retention: DEFAULT_FINISHED_RETENTION,
            log: Arc::default(),
        }
    }

    /// Address used when a status change carries no guest email.
    pub fn with_default_recipient(mut self, recipient: impl Into<String>) -> Self {
        self.default_recipient = Some(recipient.into());
        self
    }

    /// How many finished orders are remembered for duplicate suppression.
    pub fn with_retention(mut self, retention: usize) -> Self {
        self.retention = retention;
        self
    }

    /// Notifies the guest of a status change. Returns false for a duplicate.
    #[tracing::instrument(skip(self, recipient))]
    pub async fn notify_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
        recipient: Option<String>,
    ) -> Result<bool> {
        if self.log.read().await.already_sent(order_id, status) {
            tracing::debug!("duplicate status notification skipped");
            return Ok(false);
        }

        let recipient = recipient.or_else(|| self.default_recipient.clone());
        let notification = Notification::status_update(order_id, status, recipient);
        self.notifier.send(&notification).await?;

        self.log
            .write()
            .await
            .record(order_id, status, self.retention);
        metrics::counter!("notifications_sent_total", "status" => status.as_str()).increment(1);
        Ok(true)
    }

    /// Orders with at least one notification and no terminal one yet.
    pub async fn open_orders(&self) -> usize {
        self.log.read().await.open.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_update_text() {
        let order_id = OrderId::new();
        let n = Notification::status_update(order_id, OrderStatus::InProgress, None);
        assert_eq!(n.subject, format!("Status update for order #{order_id}"));
        assert_eq!(n.body, "Your order status changed to: in_progress.");
    }

    #[tokio::test]
    async fn test_duplicates_are_sent_once() {
        let notifier = InMemoryNotifier::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier.clone()));
        let order_id = OrderId::new();

        assert!(
            dispatcher
                .notify_status(order_id, OrderStatus::Paid, Some("a@b.c".into()))
                .await
                .unwrap()
        );
        assert!(
            !dispatcher
                .notify_status(order_id, OrderStatus::Paid, Some("a@b.c".into()))
                .await
                .unwrap()
        );
        dispatcher
            .notify_status(order_id, OrderStatus::InProgress, None)
            .await
            .unwrap();

        assert_eq!(notifier.sent().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_send_is_retried_later() {
        let notifier = InMemoryNotifier::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier.clone()));
        let order_id = OrderId::new();

        notifier.set_fail(true);
        assert!(
            dispatcher
                .notify_status(order_id, OrderStatus::Ready, None)
                .await
                .is_err()
        );

        notifier.set_fail(false);
        assert!(
            dispatcher
                .notify_status(order_id, OrderStatus::Ready, None)
                .await
                .unwrap()
        );
        assert_eq!(notifier.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_email_falls_back_to_default_recipient() {
        let notifier = InMemoryNotifier::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier.clone()))
            .with_default_recipient("kitchen@example.com");
        let order_id = OrderId::new();

        dispatcher
            .notify_status(order_id, OrderStatus::Paid, None)
            .await
            .unwrap();
        dispatcher
            .notify_status(order_id, OrderStatus::InProgress, Some("guest@example.com".into()))
            .await
            .unwrap();

        let recipients: Vec<_> = notifier
            .sent()
            .into_iter()
            .map(|n| n.recipient)
            .collect();
        assert_eq!(
            recipients,
            vec![
                Some("kitchen@example.com".to_string()),
                Some("guest@example.com".to_string())
            ]
        );
    }

    #[tokio::test]
    async fn test_finished_orders_are_forgotten_except_for_their_id() {
        let notifier = InMemoryNotifier::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier.clone()));
        let order_id = OrderId::new();

        for status in [OrderStatus::Pending, OrderStatus::Paid] {
            dispatcher.notify_status(order_id, status, None).await.unwrap();
        }
        assert_eq!(dispatcher.open_orders().await, 1);

        assert!(
            dispatcher
                .notify_status(order_id, OrderStatus::Refunded, None)
                .await
                .unwrap()
        );
        assert_eq!(dispatcher.open_orders().await, 0);

        // Redelivered or stale changes for a finished order stay quiet.
        for status in [OrderStatus::Refunded, OrderStatus::Paid] {
            assert!(!dispatcher.notify_status(order_id, status, None).await.unwrap());
        }
        assert_eq!(notifier.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_finished_order_retention_is_bounded() {
        let notifier = InMemoryNotifier::new();
        let dispatcher = NotificationDispatcher::new(Arc::new(notifier.clone())).with_retention(2);
        let orders: Vec<_> = (0..3).map(|_| OrderId::new()).collect();

        for &order_id in &orders {
            dispatcher
                .notify_status(order_id, OrderStatus::Delivered, None)
                .await
                .unwrap();
        }

        // The oldest finished order has been forgotten; the newest two have not.
        assert!(
            dispatcher
                .notify_status(orders[0], OrderStatus::Delivered, None)
                .await
                .unwrap()
        );
        assert!(
            !dispatcher
                .notify_status(orders[2], OrderStatus::Delivered, None)
                .await
                .unwrap()
        );
        assert_eq!(notifier.sent().len(), 4);
    }
}
