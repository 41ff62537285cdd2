//! Payment service: creates gateway orders, runs compensations and accepts
//! gateway notifications.

use std::sync::Arc;

use async_trait::async_trait;
use bus::{Broker, BrokerExt, BusError, Classify, Delivery, Disposition, MessageHandler, envelope};
use common::{OrderId, OrderStatus, PaymentStatus};
use domain::{
    CancelPlan, GatewayOrderStatus, PaymentRecord, RefundPlan, WebhookEffect,
    order_id_from_description,
};
use serde::{Deserialize, Serialize};
use store::{PaymentStore, StoreError};

use crate::{
    Result, SagaError,
    fanout::{Origin, StatusFanout},
    gateway::{GatewayError, PaymentGateway, RefundDetails},
    messages::{
        CompensationRequest, CreatePaymentRequest, PaymentFailed, PaymentLink, ServiceMessage,
        StatusChanged,
    },
};

const MAX_CAS_ATTEMPTS: u32 = 3;

/// Notification pushed by the gateway when a payment changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayNotification {
    pub order: NotifiedOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotifiedOrder {
    /// Gateway-side order reference.
    pub order_id: String,
    pub status: String,
    /// Contains the internal order id as `#<id>`.
    #[serde(default)]
    pub description: String,
}

/// What a gateway notification did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Updated {
        order_id: OrderId,
        payment_status: PaymentStatus,
        order_status: Option<OrderStatus>,
    },
    /// The payment was already settled or compensated.
    Ignored { order_id: OrderId },
}

/// Owner of the payment records.
pub struct PaymentService {
    payments: Arc<dyn PaymentStore>,
    gateway: Arc<dyn PaymentGateway>,
    fanout: StatusFanout,
}

impl PaymentService {
    pub fn new(
        payments: Arc<dyn PaymentStore>,
        gateway: Arc<dyn PaymentGateway>,
        fanout: StatusFanout,
    ) -> Self {
        Self {
            payments,
            gateway,
            fanout,
        }
    }

    pub async fn get_payment(&self, order_id: OrderId) -> Result<PaymentRecord> {
        self.payments
            .get_by_order(order_id)
            .await?
            .ok_or_else(|| SagaError::not_found("payment", order_id))
    }

    /// Creates the gateway order and records it as `NEW`.
    ///
    /// A redelivered request for an order that already has an open payment
    /// gets the stored link back; the gateway is not called twice.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn create_payment(&self, request: &CreatePaymentRequest) -> Result<PaymentLink> {
        request.validate().map_err(SagaError::InvalidOrder)?;

        if let Some(existing) = self.payments.get_by_order(request.order_id).await? {
            return stored_link(&existing);
        }

        let created = self
            .gateway
            .create_order(request)
            .await
            .map_err(|GatewayError(reason)| SagaError::GatewayError(reason))?;

        let record = PaymentRecord::new(
            request.order_id,
            request.table_number.clone(),
            request.user_id.clone(),
            created.order_id.clone(),
            created.redirect_uri.clone(),
        );
        match self.payments.insert(&record).await {
            Ok(()) => {}
            Err(StoreError::AlreadyExists { .. }) => {
                // A concurrent delivery of the same request got there first.
                let existing = self.get_payment(request.order_id).await?;
                return stored_link(&existing);
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(payu_order_id = %created.order_id, "payment created");
        Ok(PaymentLink {
            order_id: request.order_id,
            redirect_uri: created.redirect_uri,
        })
    }

    /// Compensates a cancelled order.
    ///
    /// Unpaid payments are cancelled at the gateway; completed ones can only
    /// be refunded. Gateway failures are recorded, not retried.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn cancel_payment(&self, request: &CompensationRequest) -> Result<PaymentStatus> {
        let record = self.compensation_target(request).await?;

        let new_status = match record.cancel_plan() {
            CancelPlan::AlreadyCompensated => {
                tracing::info!(status = %record.status, "payment already compensated");
                return Ok(record.status);
            }
            CancelPlan::AwaitingReconciliation => {
                tracing::warn!(status = %record.status, "payment awaits reconciliation; cancel skipped");
                return Ok(record.status);
            }
            CancelPlan::CancelAtGateway => match self.cancel_at_gateway(&record).await {
                Ok(()) => PaymentStatus::Cancelled,
                Err(e) => {
                    tracing::warn!(error = %e, "gateway cancellation failed");
                    PaymentStatus::CancellationFailedPayu
                }
            },
            CancelPlan::RefundAtGateway => {
                match self.refund_at_gateway(&record, &request.reason).await {
                    Ok(()) => PaymentStatus::RefundRequested,
                    Err(e) => {
                        tracing::warn!(error = %e, "gateway refund of completed payment failed");
                        PaymentStatus::CancellationFailedPayu
                    }
                }
            }
        };

        self.record_compensation("cancel", &record, new_status).await
    }

    /// Compensates a refunded order.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn refund_payment(&self, request: &CompensationRequest) -> Result<PaymentStatus> {
        let record = self.compensation_target(request).await?;

        let new_status = match record.refund_plan() {
            RefundPlan::AlreadyCompensated => {
                tracing::info!(status = %record.status, "payment already compensated");
                return Ok(record.status);
            }
            RefundPlan::AwaitingReconciliation => {
                tracing::warn!(status = %record.status, "payment awaits reconciliation; refund skipped");
                return Ok(record.status);
            }
            RefundPlan::RefundAtGateway => {
                match self.refund_at_gateway(&record, &request.reason).await {
                    Ok(()) => PaymentStatus::Refunded,
                    Err(e) => {
                        tracing::warn!(error = %e, "gateway refund failed");
                        PaymentStatus::RefundFailedPayu
                    }
                }
            }
        };

        self.record_compensation("refund", &record, new_status).await
    }

    /// Applies a gateway notification and fans out the resulting order status.
    ///
    /// The payment is found by gateway reference, falling back to the order
    /// id embedded in the description.
    #[tracing::instrument(
        skip(self, notification),
        fields(payu_order_id = %notification.order.order_id, gateway_status = %notification.order.status)
    )]
    pub async fn handle_notification(
        &self,
        notification: &GatewayNotification,
    ) -> Result<WebhookOutcome> {
        let gateway_status = GatewayOrderStatus::parse(&notification.order.status);
        let mut attempt = 1;

        loop {
            let record = self.resolve_notified(&notification.order).await?;

            let (payment_status, order_status) = match record.webhook_effect(&gateway_status) {
                WebhookEffect::Ignore => {
                    tracing::warn!(
                        order_id = %record.order_id,
                        payment_status = %record.status,
                        "notification ignored"
                    );
                    return Ok(WebhookOutcome::Ignored {
                        order_id: record.order_id,
                    });
                }
                WebhookEffect::Update {
                    payment_status,
                    order_status,
                } => (payment_status, order_status),
            };

            match self
                .payments
                .compare_and_set_status(record.order_id, record.status, payment_status)
                .await
            {
                Ok(updated) => {
                    tracing::info!(
                        order_id = %updated.order_id,
                        from = %record.status,
                        to = %payment_status,
                        "payment status updated from notification"
                    );
                    if let Some(status) = order_status {
                        let event = StatusChanged {
                            table_number: Some(updated.table_number.clone()),
                            user_id: Some(updated.user_id.clone()),
                            ..StatusChanged::new(updated.order_id, status)
                        };
                        self.fanout.publish(Origin::PaymentService, event).await;
                    }
                    return Ok(WebhookOutcome::Updated {
                        order_id: updated.order_id,
                        payment_status,
                        order_status,
                    });
                }
                Err(e) if e.is_conflict() && attempt < MAX_CAS_ATTEMPTS => {
                    tracing::debug!(attempt, "payment changed concurrently; re-reading");
                    attempt += 1;
                }
                Err(e) if e.is_conflict() => return Err(SagaError::Conflict(record.order_id)),
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Asks the gateway for the status of an order, for manual reconciliation.
    #[tracing::instrument(skip(self))]
    pub async fn get_order_status(&self, payu_order_id: &str) -> Result<GatewayOrderStatus> {
        self.gateway
            .get_order_status(payu_order_id)
            .await
            .map_err(|GatewayError(reason)| SagaError::GatewayError(reason))
    }

    /// Payments whose compensation failed at the gateway.
    pub async fn list_needing_reconciliation(&self) -> Result<Vec<PaymentRecord>> {
        Ok(self.payments.list_needing_reconciliation().await?)
    }

    async fn compensation_target(&self, request: &CompensationRequest) -> Result<PaymentRecord> {
        self.payments
            .find_for_compensation(request.order_id, &request.table_number, &request.user_id)
            .await?
            .ok_or_else(|| SagaError::not_found("payment", request.order_id))
    }

    async fn resolve_notified(&self, notified: &NotifiedOrder) -> Result<PaymentRecord> {
        if let Some(record) = self.payments.get_by_payu_order_id(&notified.order_id).await? {
            return Ok(record);
        }
        let order_id = order_id_from_description(&notified.description)
            .ok_or_else(|| SagaError::not_found("payment", &notified.order_id))?;
        tracing::debug!(%order_id, "payment resolved from description");
        self.get_payment(order_id).await
    }

    async fn cancel_at_gateway(&self, record: &PaymentRecord) -> std::result::Result<(), GatewayError> {
        let payu_order_id = gateway_reference(record)?;
        self.gateway.cancel_order(payu_order_id).await
    }

    async fn refund_at_gateway(
        &self,
        record: &PaymentRecord,
        reason: &str,
    ) -> std::result::Result<(), GatewayError> {
        let payu_order_id = gateway_reference(record)?;
        let refund = RefundDetails {
            description: reason.to_string(),
        };
        self.gateway.refund_order(payu_order_id, &refund).await
    }

    async fn record_compensation(
        &self,
        kind: &'static str,
        record: &PaymentRecord,
        new_status: PaymentStatus,
    ) -> Result<PaymentStatus> {
        let updated = self
            .payments
            .compare_and_set_status(record.order_id, record.status, new_status)
            .await?;
        metrics::counter!("compensations_total", "kind" => kind, "outcome" => new_status.as_str())
            .increment(1);
        if new_status.needs_reconciliation() {
            tracing::warn!(status = %new_status, "compensation failed; left for manual reconciliation");
        } else {
            tracing::info!(status = %new_status, "compensation recorded");
        }
        Ok(updated.status)
    }
}

fn gateway_reference(record: &PaymentRecord) -> std::result::Result<&str, GatewayError> {
    record
        .payu_order_id
        .as_deref()
        .ok_or_else(|| GatewayError("payment has no gateway order".to_string()))
}

fn stored_link(record: &PaymentRecord) -> Result<PaymentLink> {
    match (&record.payment_link, record.status.is_settled()) {
        (Some(link), false) => {
            tracing::info!("payment already exists; returning stored link");
            Ok(PaymentLink {
                order_id: record.order_id,
                redirect_uri: link.clone(),
            })
        }
        _ => Err(SagaError::GatewayError(format!(
            "payment for order {} is already {}",
            record.order_id, record.status
        ))),
    }
}

/// Consumer for the payment service queue.
pub struct PaymentQueueHandler {
    service: Arc<PaymentService>,
    broker: Arc<dyn Broker>,
}

impl PaymentQueueHandler {
    pub fn new(service: Arc<PaymentService>, broker: Arc<dyn Broker>) -> Self {
        Self { service, broker }
    }

    async fn handle_create(&self, delivery: &Delivery, request: &CreatePaymentRequest) -> Result<()> {
        let reply = match self.service.create_payment(request).await {
            Ok(link) => ServiceMessage::PaymentLink(link),
            // No reply: the redelivery will answer, or the caller times out.
            Err(e) if e.disposition() == Disposition::Retry => return Err(e),
            Err(e) => {
                let failed = ServiceMessage::PaymentFailed(PaymentFailed::new(e.to_string()));
                self.send_reply(delivery, &failed).await?;
                return Err(e);
            }
        };
        self.send_reply(delivery, &reply).await
    }

    async fn send_reply(&self, delivery: &Delivery, reply: &ServiceMessage) -> Result<()> {
        match self.broker.reply(delivery, reply).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                tracing::debug!("request has no reply_to; reply skipped");
                Ok(())
            }
            Err(BusError::QueueNotFound(queue)) => {
                tracing::warn!(reply_to = %queue, "caller stopped waiting; reply dropped");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl MessageHandler for PaymentQueueHandler {
    type Error = SagaError;

    fn name(&self) -> &'static str {
        "payment-service"
    }

    async fn handle(&self, delivery: &Delivery) -> Result<()> {
        match envelope::decode::<ServiceMessage>(&delivery.body)? {
            ServiceMessage::CreatePaymentRequest(request) => {
                self.handle_create(delivery, &request).await
            }
            ServiceMessage::CancelPaymentRequest(request) => {
                self.service.cancel_payment(&request).await.map(|_| ())
            }
            ServiceMessage::RefundPaymentRequest(request) => {
                self.service.refund_payment(&request).await.map(|_| ())
            }
            other => Err(SagaError::unexpected(&other, self.name())),
        }
    }
}
