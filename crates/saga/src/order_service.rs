//! Order service: placement, owner cancellation and refund, and the order
//! queue consumer that keeps the canonical order in sync with the fan-out.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{Broker, BrokerExt, Delivery, MessageHandler, envelope};
use common::{OrderId, OrderStatus, PaymentMethod, StaffRole, UserId};
use domain::{Actor, Menu, Order, PlaceOrder, TransitionOutcome};
use store::OrderStore;

use crate::{
    Result, SagaError,
    fanout::{Origin, StatusFanout},
    messages::{CompensationRequest, ServiceMessage, StatusChanged},
    orchestrator::PaymentOrchestrator,
    payload::{BuyerDetails, build_payment_request},
    settings::PaymentSettings,
};

/// Attempts at a compare-and-set before giving up on a contended order.
const MAX_CAS_ATTEMPTS: u32 = 3;

/// An order placement request.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub order: PlaceOrder,
    pub buyer: BuyerDetails,
}

/// The result of placing an order.
#[derive(Debug, Clone)]
pub struct PlacedOrder {
    pub order: Order,
    /// Absent for cash orders.
    pub payment_redirect_uri: Option<String>,
}

#[derive(Debug, Clone, Copy)]
enum Compensation {
    Cancel,
    Refund,
}

impl Compensation {
    fn as_str(&self) -> &'static str {
        match self {
            Compensation::Cancel => "cancel",
            Compensation::Refund => "refund",
        }
    }
}

/// Builds the fan-out event for an order's current status.
pub fn status_event(order: &Order) -> StatusChanged {
    StatusChanged {
        email: order.email().map(str::to_string),
        table_number: Some(order.table_number().clone()),
        user_id: Some(order.user_id().clone()),
        payment_method: Some(order.payment_method()),
        ..StatusChanged::new(order.id(), order.status())
    }
}

/// Owner of the canonical order record.
pub struct OrderService {
    orders: Arc<dyn OrderStore>,
    broker: Arc<dyn Broker>,
    orchestrator: PaymentOrchestrator,
    fanout: StatusFanout,
    menu: Arc<Menu>,
    payment_queue: String,
    settings: PaymentSettings,
}

impl OrderService {
    pub fn new(
        orders: Arc<dyn OrderStore>,
        broker: Arc<dyn Broker>,
        orchestrator: PaymentOrchestrator,
        fanout: StatusFanout,
        menu: Arc<Menu>,
        payment_queue: impl Into<String>,
        settings: PaymentSettings,
    ) -> Self {
        Self {
            orders,
            broker,
            orchestrator,
            fanout,
            menu,
            payment_queue: payment_queue.into(),
            settings,
        }
    }

    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get(order_id)
            .await?
            .ok_or_else(|| SagaError::not_found("order", order_id))
    }

    /// Persists a new order and, for online payment, fetches its payment link.
    ///
    /// On timeout the order stays `pending` without a link. On a payment
    /// failure it is moved to `failed`.
    #[tracing::instrument(
        skip(self, checkout),
        fields(order_id = tracing::field::Empty, table = %checkout.order.table_number)
    )]
    pub async fn place_order(&self, checkout: Checkout) -> Result<PlacedOrder> {
        let order = Order::place(OrderId::new(), checkout.order, &self.menu)?;
        tracing::Span::current().record("order_id", tracing::field::display(order.id()));

        self.orders.insert(&order).await?;
        metrics::counter!("orders_placed_total", "payment_method" => order.payment_method().as_str())
            .increment(1);
        tracing::info!(total = %order.total(), "order placed");
        self.fanout
            .publish(Origin::OrderService, status_event(&order))
            .await;

        if order.payment_method() == PaymentMethod::Cash {
            return Ok(PlacedOrder {
                order,
                payment_redirect_uri: None,
            });
        }

        let request = build_payment_request(&order, &checkout.buyer, &self.settings);
        match self.orchestrator.request_payment_link(&request).await {
            Ok(link) => Ok(PlacedOrder {
                order,
                payment_redirect_uri: Some(link),
            }),
            Err(SagaError::GatewayError(reason)) => {
                if let Err(e) = self
                    .transition(order.id(), &Actor::System, OrderStatus::Failed)
                    .await
                {
                    tracing::error!(error = %e, "failed to mark order failed after payment error");
                }
                Err(SagaError::GatewayError(reason))
            }
            Err(e) => Err(e),
        }
    }

    /// Cancels a pending order on behalf of its owner.
    ///
    /// The local cancel stands regardless of what the payment side does later.
    #[tracing::instrument(skip(self, reason))]
    pub async fn cancel_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: String,
    ) -> Result<Order> {
        let (order, _) = self
            .apply(order_id, &Actor::Owner(user_id), OrderStatus::Cancelled)
            .await?;
        self.request_compensation(Compensation::Cancel, &order, reason)
            .await;
        self.fanout
            .publish(Origin::OrderService, status_event(&order))
            .await;
        Ok(order)
    }

    /// Refunds a paid order on behalf of its owner.
    #[tracing::instrument(skip(self, reason))]
    pub async fn refund_order(
        &self,
        order_id: OrderId,
        user_id: UserId,
        reason: String,
    ) -> Result<Order> {
        let (order, _) = self
            .apply(order_id, &Actor::Owner(user_id), OrderStatus::Refunded)
            .await?;
        self.request_compensation(Compensation::Refund, &order, reason)
            .await;
        self.fanout
            .publish(Origin::OrderService, status_event(&order))
            .await;
        Ok(order)
    }

    /// Applies a change and fans it out.
    pub async fn transition(
        &self,
        order_id: OrderId,
        actor: &Actor,
        to: OrderStatus,
    ) -> Result<(Order, TransitionOutcome)> {
        let (order, outcome) = self.apply(order_id, actor, to).await?;
        if outcome.is_applied() {
            self.fanout
                .publish(Origin::OrderService, status_event(&order))
                .await;
        }
        Ok((order, outcome))
    }

    /// Applies a staff member's change to the canonical order.
    ///
    /// Nothing is fanned out; the staff service publishes the change itself.
    #[tracing::instrument(skip(self))]
    pub async fn apply_staff_change(
        &self,
        order_id: OrderId,
        role: StaffRole,
        to: OrderStatus,
    ) -> Result<Order> {
        let (order, _) = self.apply(order_id, &Actor::Staff(role), to).await?;
        Ok(order)
    }

    /// Orders currently in any of `statuses`.
    pub async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        Ok(self.orders.list_by_status(statuses).await?)
    }

    /// Applies a status change received from another service.
    ///
    /// Changes from the payment service are the gateway's verdict and are
    /// checked as such. Everything else was authorized where it was made.
    #[tracing::instrument(skip(self, event), fields(order_id = %event.order_id, status = %event.new_status))]
    pub async fn apply_replica(&self, event: &StatusChanged) -> Result<TransitionOutcome> {
        let actor = match event.origin {
            Some(Origin::PaymentService) => Actor::PaymentGateway,
            _ => Actor::Replica,
        };
        if actor != Actor::Replica
            && self.get_order(event.order_id).await?.status() == event.new_status
        {
            tracing::debug!("status already applied");
            return Ok(TransitionOutcome::Unchanged);
        }

        let (_, outcome) = self.apply(event.order_id, &actor, event.new_status).await?;
        if !outcome.is_applied() {
            tracing::debug!("status already applied");
        }
        Ok(outcome)
    }

    /// Load, validate, compare-and-set. A lost race reloads and validates
    /// against the winner's status.
    async fn apply(
        &self,
        order_id: OrderId,
        actor: &Actor,
        to: OrderStatus,
    ) -> Result<(Order, TransitionOutcome)> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let order = self.get_order(order_id).await?;
            let outcome = order.check_transition(actor, to)?;
            if !outcome.is_applied() {
                return Ok((order, outcome));
            }

            match self
                .orders
                .compare_and_set_status(order_id, order.status(), to)
                .await
            {
                Ok(updated) => {
                    metrics::counter!("order_transitions_total", "to" => to.as_str()).increment(1);
                    tracing::info!(
                        %order_id,
                        from = %order.status(),
                        %to,
                        %actor,
                        "order status changed"
                    );
                    return Ok((updated, outcome));
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(%order_id, attempt, "concurrent status change; revalidating");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(SagaError::Conflict(order_id))
    }

    async fn request_compensation(&self, kind: Compensation, order: &Order, reason: String) {
        let request = CompensationRequest {
            order_id: order.id(),
            table_number: order.table_number().clone(),
            user_id: order.user_id().clone(),
            reason,
        };
        let message = match kind {
            Compensation::Cancel => ServiceMessage::CancelPaymentRequest(request),
            Compensation::Refund => ServiceMessage::RefundPaymentRequest(request),
        };

        let outcome = match self
            .broker
            .publish_message(&self.payment_queue, &message)
            .await
        {
            Ok(()) => "requested",
            Err(e) => {
                tracing::warn!(
                    order_id = %order.id(),
                    kind = kind.as_str(),
                    error = %e,
                    "compensation request not published; payment left for reconciliation"
                );
                "publish_failed"
            }
        };
        metrics::counter!("compensations_total", "kind" => kind.as_str(), "outcome" => outcome)
            .increment(1);
    }
}

/// Consumer for the order service queue.
pub struct OrderQueueHandler {
    service: Arc<OrderService>,
}

impl OrderQueueHandler {
    pub fn new(service: Arc<OrderService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl MessageHandler for OrderQueueHandler {
    type Error = SagaError;

    fn name(&self) -> &'static str {
        "order-service"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        match envelope::decode::<ServiceMessage>(&delivery.body)? {
            ServiceMessage::StatusChanged(event) => {
                self.service.apply_replica(&event).await?;
                Ok(())
            }
            other => Err(SagaError::unexpected(&other, self.name())),
        }
    }
}
