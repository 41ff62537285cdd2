//! Staff service: the kitchen and floor board, fed by the fan-out, and the
//! status changes staff make from it.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{Broker, BrokerExt, Delivery, MessageHandler, envelope};
use common::{OrderId, OrderStatus, StaffRole};
use domain::Order;
use projections::{ProjectionUpdate, StaffOrderSummary, StaffOrdersView, StatusUpdate};

use crate::{
    Result, SagaError,
    fanout::{Origin, StatusFanout},
    messages::{CompensationRequest, ServiceMessage, StatusChanged},
    order_service::{OrderService, status_event},
};

/// Statuses a chef or waiter may still move an order out of.
const OPEN_STATUSES: [OrderStatus; 4] = [
    OrderStatus::Pending,
    OrderStatus::Paid,
    OrderStatus::InProgress,
    OrderStatus::Ready,
];

fn status_update(event: &StatusChanged) -> StatusUpdate {
    StatusUpdate {
        table_number: event.table_number.clone(),
        user_id: event.user_id.clone(),
        payment_method: event.payment_method,
        ..StatusUpdate::new(event.order_id, event.new_status)
    }
}

pub struct StaffService {
    view: StaffOrdersView,
    orders: Arc<OrderService>,
    broker: Arc<dyn Broker>,
    fanout: StatusFanout,
    payment_queue: String,
}

impl StaffService {
    pub fn new(
        view: StaffOrdersView,
        orders: Arc<OrderService>,
        broker: Arc<dyn Broker>,
        fanout: StatusFanout,
        payment_queue: impl Into<String>,
    ) -> Self {
        Self {
            view,
            orders,
            broker,
            fanout,
            payment_queue: payment_queue.into(),
        }
    }

    pub fn view(&self) -> &StaffOrdersView {
        &self.view
    }

    /// Seeds the board with every order staff may still act on.
    ///
    /// The board lives in memory; after a restart it would otherwise only
    /// learn about orders as their next change is fanned out.
    #[tracing::instrument(skip(self))]
    pub async fn rebuild_view(&self) -> Result<usize> {
        let open = self.orders.list_by_status(&OPEN_STATUSES).await?;
        for order in &open {
            self.mirror(&status_event(order)).await;
        }
        tracing::info!(orders = open.len(), "staff board rebuilt");
        Ok(open.len())
    }

    /// Records a change fanned out by another service.
    pub async fn handle_status_changed(&self, event: &StatusChanged) -> Result<ProjectionUpdate> {
        Ok(self.view.observe(&status_update(event)).await?)
    }

    /// Orders the role should act on next.
    pub async fn list_for_role(&self, role: StaffRole) -> Vec<StaffOrderSummary> {
        self.view.queue_for(role).await
    }

    pub async fn list_by_status(&self, statuses: &[OrderStatus]) -> Vec<StaffOrderSummary> {
        self.view.list_by_status(statuses).await
    }

    /// Applies a staff member's status change and fans it out.
    ///
    /// The change is checked and written against the canonical order, so a
    /// concurrent owner cancel or refund wins or loses there and never only on
    /// the board. A refund also asks the payment service to return the money.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        role: StaffRole,
        order_id: OrderId,
        to: OrderStatus,
    ) -> Result<StaffOrderSummary> {
        let order = self.orders.apply_staff_change(order_id, role, to).await?;
        metrics::counter!("staff_status_changes_total", "role" => role.as_str(), "to" => to.as_str())
            .increment(1);

        if to == OrderStatus::Refunded {
            self.request_refund(&order).await;
        }

        let event = status_event(&order);
        let summary = self.mirror(&event).await;
        self.fanout.publish(Origin::StaffService, event).await;
        summary.ok_or_else(|| SagaError::not_found("order", order_id))
    }

    /// Brings the board in line with a canonical change. A board that is
    /// already further along keeps its status.
    async fn mirror(&self, event: &StatusChanged) -> Option<StaffOrderSummary> {
        if let Err(e) = self.view.observe(&status_update(event)).await {
            tracing::debug!(order_id = %event.order_id, error = %e, "board already ahead of change");
        }
        self.view.get(event.order_id).await
    }

    async fn request_refund(&self, order: &Order) {
        let message = ServiceMessage::RefundPaymentRequest(CompensationRequest {
            order_id: order.id(),
            table_number: order.table_number().clone(),
            user_id: order.user_id().clone(),
            reason: "Refunded by staff".to_string(),
        });
        let outcome = match self
            .broker
            .publish_message(&self.payment_queue, &message)
            .await
        {
            Ok(()) => "requested",
            Err(e) => {
                tracing::warn!(order_id = %order.id(), error = %e, "refund request not published");
                "publish_failed"
            }
        };
        metrics::counter!("compensations_total", "kind" => "refund", "outcome" => outcome)
            .increment(1);
    }
}

/// Consumer for the staff service queue.
pub struct StaffQueueHandler {
    service: Arc<StaffService>,
}

impl StaffQueueHandler {
    pub fn new(service: Arc<StaffService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for StaffQueueHandler {
    type Error = SagaError;

    fn name(&self) -> &'static str {
        "staff-service"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        match envelope::decode::<ServiceMessage>(&delivery.body)? {
            ServiceMessage::StatusChanged(event) => {
                self.service.handle_status_changed(&event).await?;
                Ok(())
            }
            other => Err(SagaError::unexpected(&other, self.name())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bus::{InMemoryBroker, RpcClient};
    use common::{PaymentMethod, TableNumber, UserId};
    use domain::{LineItem, Menu, MenuItem, Money, PlaceOrder};
    use store::InMemoryOrderStore;

    use crate::order_service::Checkout;
    use crate::orchestrator::PaymentOrchestrator;
    use crate::settings::{PaymentSettings, QueueNames};

    struct Fixture {
        broker: InMemoryBroker,
        orders: Arc<OrderService>,
        staff: StaffService,
    }

    impl Fixture {
        async fn new() -> Self {
            let broker = InMemoryBroker::new();
            let queues = QueueNames::default();
            for queue in queues.all() {
                broker.declare_queue(queue).await.unwrap();
            }
            let shared: Arc<dyn Broker> = Arc::new(broker.clone());
            let fanout = StatusFanout::new(shared.clone(), queues.clone());
            let rpc = Arc::new(RpcClient::start(shared.clone()).await.unwrap());
            let orders = Arc::new(OrderService::new(
                Arc::new(InMemoryOrderStore::new()),
                shared.clone(),
                PaymentOrchestrator::new(rpc, &queues.payment, Duration::from_secs(1)),
                fanout.clone(),
                Arc::new(Menu::new([MenuItem::new(1, "Bigos", Money::from_minor(3400))])),
                &queues.payment,
                PaymentSettings::default(),
            ));
            let staff = StaffService::new(
                StaffOrdersView::new(),
                orders.clone(),
                shared,
                fanout,
                queues.payment,
            );
            Self {
                broker,
                orders,
                staff,
            }
        }

        fn staff_on_same_orders(&self) -> StaffService {
            let shared: Arc<dyn Broker> = Arc::new(self.broker.clone());
            StaffService::new(
                StaffOrdersView::new(),
                self.orders.clone(),
                shared.clone(),
                StatusFanout::new(shared, QueueNames::default()),
                "payment_queue",
            )
        }

        /// A cash order the waiter has already confirmed as paid.
        async fn paid_cash_order(&self) -> OrderId {
            let placed = self
                .orders
                .place_order(Checkout {
                    order: PlaceOrder {
                        table_number: TableNumber::from("3"),
                        user_id: UserId::from("guest-1"),
                        email: Some("guest@example.com".to_string()),
                        payment_method: PaymentMethod::Cash,
                        items: vec![LineItem::new(1, 1)],
                    },
                    buyer: Default::default(),
                })
                .await
                .unwrap();
            let order_id = placed.order.id();
            self.staff
                .update_status(StaffRole::Waiter, order_id, OrderStatus::Paid)
                .await
                .unwrap();
            order_id
        }

        async fn canonical_status(&self, order_id: OrderId) -> OrderStatus {
            self.orders.get_order(order_id).await.unwrap().status()
        }

        /// Runs what the staff queue consumer would do with everything queued.
        async fn drain_staff_queue(&self) {
            for body in self.broker.drain("staff_queue") {
                let message: ServiceMessage = envelope::decode(&body).unwrap();
                let ServiceMessage::StatusChanged(event) = message else {
                    panic!("staff queue carries status changes only");
                };
                let _ = self.staff.handle_status_changed(&event).await;
            }
        }
    }

    #[tokio::test]
    async fn test_chef_change_lands_on_order_and_is_fanned_out() {
        let f = Fixture::new().await;
        let order_id = f.paid_cash_order().await;

        let summary = f
            .staff
            .update_status(StaffRole::Chef, order_id, OrderStatus::InProgress)
            .await
            .unwrap();

        assert_eq!(summary.status, OrderStatus::InProgress);
        assert_eq!(f.canonical_status(order_id).await, OrderStatus::InProgress);
        // paid and in_progress from staff; placement only reaches staff and notification.
        assert_eq!(f.broker.message_count("order_queue"), Some(2));
        assert_eq!(f.broker.message_count("notification_queue"), Some(3));
        assert_eq!(f.broker.message_count("staff_queue"), Some(1));
    }

    #[tokio::test]
    async fn test_staff_change_carries_guest_email() {
        let f = Fixture::new().await;
        let order_id = f.paid_cash_order().await;

        let bodies = f.broker.drain("notification_queue");
        let message: ServiceMessage = envelope::decode(&bodies[1]).unwrap();
        let ServiceMessage::StatusChanged(event) = message else {
            panic!("expected status change");
        };

        assert_eq!(event.order_id, order_id);
        assert_eq!(event.new_status, OrderStatus::Paid);
        assert_eq!(event.email.as_deref(), Some("guest@example.com"));
        assert_eq!(event.origin, Some(Origin::StaffService));
    }

    #[tokio::test]
    async fn test_waiter_cannot_start_cooking() {
        let f = Fixture::new().await;
        let order_id = f.paid_cash_order().await;

        let err = f
            .staff
            .update_status(StaffRole::Waiter, order_id, OrderStatus::InProgress)
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::PermissionDenied(_)));
        assert_eq!(f.canonical_status(order_id).await, OrderStatus::Paid);
        assert_eq!(f.broker.message_count("order_queue"), Some(1));
    }

    #[tokio::test]
    async fn test_chef_refund_requests_compensation() {
        let f = Fixture::new().await;
        let order_id = f.paid_cash_order().await;

        f.staff
            .update_status(StaffRole::Chef, order_id, OrderStatus::Refunded)
            .await
            .unwrap();

        let bodies = f.broker.drain("payment_queue");
        assert_eq!(bodies.len(), 1);
        let message: ServiceMessage = envelope::decode(&bodies[0]).unwrap();
        let ServiceMessage::RefundPaymentRequest(request) = message else {
            panic!("expected refund request, got {message:?}");
        };
        assert_eq!(request.order_id, order_id);
        assert_eq!(request.table_number, TableNumber::from("3"));
        assert_eq!(request.user_id, UserId::from("guest-1"));
    }

    #[tokio::test]
    async fn test_kitchen_cannot_work_an_order_the_owner_refunded() {
        let f = Fixture::new().await;
        let order_id = f.paid_cash_order().await;
        f.orders
            .refund_order(order_id, UserId::from("guest-1"), "wrong table".into())
            .await
            .unwrap();

        // The board has not seen the refund yet.
        for to in [OrderStatus::InProgress, OrderStatus::Ready] {
            let err = f
                .staff
                .update_status(StaffRole::Chef, order_id, to)
                .await
                .unwrap_err();
            assert!(
                matches!(
                    err,
                    SagaError::InvalidTransition {
                        from: OrderStatus::Refunded,
                        ..
                    }
                ),
                "{err:?}"
            );
        }

        f.drain_staff_queue().await;
        assert_eq!(f.canonical_status(order_id).await, OrderStatus::Refunded);
        let board = f.staff.view().get(order_id).await.unwrap();
        assert_eq!(board.status, OrderStatus::Refunded);
        assert!(f.staff.list_for_role(StaffRole::Chef).await.is_empty());
        assert!(f.staff.list_for_role(StaffRole::Waiter).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_order_is_not_found() {
        let f = Fixture::new().await;
        let err = f
            .staff
            .update_status(StaffRole::Chef, OrderId::new(), OrderStatus::InProgress)
            .await
            .unwrap_err();
        assert!(matches!(err, SagaError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn test_rebuilt_board_lists_open_orders() {
        let f = Fixture::new().await;
        let open = f.paid_cash_order().await;
        let done = f.paid_cash_order().await;
        f.staff
            .update_status(StaffRole::Chef, done, OrderStatus::Failed)
            .await
            .unwrap();

        let restarted = f.staff_on_same_orders();
        let seeded = restarted.rebuild_view().await.unwrap();

        assert_eq!(seeded, 1);
        let chef_queue = restarted.list_for_role(StaffRole::Chef).await;
        assert_eq!(chef_queue.len(), 1);
        assert_eq!(chef_queue[0].order_id, open);
        assert_eq!(chef_queue[0].table_number, Some(TableNumber::from("3")));
        assert!(restarted.view().get(done).await.is_none());
    }
}
