//! Payment record kept by the payment service, and the decisions that drive it.

use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, PaymentStatus, TableNumber, UserId};
use serde::{Deserialize, Serialize};

/// Order status reported by the payment gateway in a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOrderStatus {
    Pending,
    WaitingForConfirmation,
    Completed,
    Canceled,
    Other(String),
}

impl GatewayOrderStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "PENDING" => GatewayOrderStatus::Pending,
            "WAITING_FOR_CONFIRMATION" => GatewayOrderStatus::WaitingForConfirmation,
            "COMPLETED" => GatewayOrderStatus::Completed,
            "CANCELED" | "CANCELLED" => GatewayOrderStatus::Canceled,
            other => GatewayOrderStatus::Other(other.to_string()),
        }
    }
}

/// The payment side of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub order_id: OrderId,
    pub table_number: TableNumber,
    pub user_id: UserId,
    /// Gateway-side order reference, known once the gateway order exists.
    pub payu_order_id: Option<String>,
    pub status: PaymentStatus,
    pub payment_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a cancellation request should do with a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPlan {
    /// Not yet paid: cancel the gateway order.
    CancelAtGateway,
    /// Already paid: a completed payment can only be refunded.
    RefundAtGateway,
    /// Nothing left to do.
    AlreadyCompensated,
    /// A previous gateway call failed; left for manual reconciliation.
    AwaitingReconciliation,
}

/// What a refund request should do with a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefundPlan {
    RefundAtGateway,
    AlreadyCompensated,
    AwaitingReconciliation,
}

/// Effect of a gateway notification on a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookEffect {
    /// Record the new payment status and fan out the order status, if any.
    Update {
        payment_status: PaymentStatus,
        order_status: Option<OrderStatus>,
    },
    /// The payment is already settled or compensated; nothing changes.
    Ignore,
}

impl PaymentRecord {
    /// Creates a record for a freshly created gateway order.
    pub fn new(
        order_id: OrderId,
        table_number: TableNumber,
        user_id: UserId,
        payu_order_id: impl Into<String>,
        payment_link: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            order_id,
            table_number,
            user_id,
            payu_order_id: Some(payu_order_id.into()),
            status: PaymentStatus::New,
            payment_link: Some(payment_link.into()),
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns true if the composite key of a compensation request matches.
    pub fn matches(&self, order_id: OrderId, table_number: &TableNumber, user_id: &UserId) -> bool {
        self.order_id == order_id && &self.table_number == table_number && &self.user_id == user_id
    }

    pub fn cancel_plan(&self) -> CancelPlan {
        match self.status {
            PaymentStatus::New | PaymentStatus::Pending => CancelPlan::CancelAtGateway,
            PaymentStatus::Completed => CancelPlan::RefundAtGateway,
            PaymentStatus::Cancelled | PaymentStatus::RefundRequested | PaymentStatus::Refunded => {
                CancelPlan::AlreadyCompensated
            }
            PaymentStatus::CancellationFailedPayu | PaymentStatus::RefundFailedPayu => {
                CancelPlan::AwaitingReconciliation
            }
        }
    }

    pub fn refund_plan(&self) -> RefundPlan {
        match self.status {
            PaymentStatus::New | PaymentStatus::Pending | PaymentStatus::Completed => {
                RefundPlan::RefundAtGateway
            }
            PaymentStatus::Cancelled | PaymentStatus::RefundRequested | PaymentStatus::Refunded => {
                RefundPlan::AlreadyCompensated
            }
            PaymentStatus::CancellationFailedPayu | PaymentStatus::RefundFailedPayu => {
                RefundPlan::AwaitingReconciliation
            }
        }
    }

    /// Decides how a gateway notification affects this payment.
    ///
    /// Only `NEW` and `PENDING` payments accept notifications, so a late
    /// completion for a cancelled or refunded payment cannot revive it.
    pub fn webhook_effect(&self, gateway_status: &GatewayOrderStatus) -> WebhookEffect {
        if self.status.is_settled() {
            return WebhookEffect::Ignore;
        }
        match gateway_status {
            GatewayOrderStatus::Completed => WebhookEffect::Update {
                payment_status: PaymentStatus::Completed,
                order_status: Some(OrderStatus::Paid),
            },
            GatewayOrderStatus::Canceled => WebhookEffect::Update {
                payment_status: PaymentStatus::Cancelled,
                order_status: Some(OrderStatus::Cancelled),
            },
            GatewayOrderStatus::Pending | GatewayOrderStatus::WaitingForConfirmation => {
                if self.status == PaymentStatus::Pending {
                    WebhookEffect::Ignore
                } else {
                    WebhookEffect::Update {
                        payment_status: PaymentStatus::Pending,
                        order_status: None,
                    }
                }
            }
            GatewayOrderStatus::Other(_) => WebhookEffect::Ignore,
        }
    }
}

/// Extracts the internal order id embedded as `#<id>` in a gateway description,
/// e.g. `"Order #5b7f...-8a10 for table 5"`.
pub fn order_id_from_description(description: &str) -> Option<OrderId> {
    let (_, rest) = description.split_once('#')?;
    let token: String = rest
        .chars()
        .take_while(|c| c.is_ascii_hexdigit() || *c == '-')
        .collect();
    OrderId::parse(&token).ok()
}
