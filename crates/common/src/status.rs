//! Status vocabulary shared by the order, payment, staff and notification services.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Returned when a string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

/// The status of an order in its lifecycle.
///
/// ```text
/// pending ──┬──► paid ──┬──► in_progress ──► ready ──► delivered
///           │           └──► refunded
///           └──► cancelled
///
/// any non-terminal ──► failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, awaiting payment.
    #[default]
    Pending,
    /// Payment confirmed, waiting for the kitchen.
    Paid,
    /// Being prepared by the kitchen.
    InProgress,
    /// Ready for pickup by a waiter.
    Ready,
    /// Delivered to the table (terminal).
    Delivered,
    /// Cancelled by the owner or the gateway (terminal).
    Cancelled,
    /// Unrecoverable processing error (terminal).
    Failed,
    /// Paid and refunded (terminal).
    Refunded,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 8] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::InProgress,
        OrderStatus::Ready,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Failed,
        OrderStatus::Refunded,
    ];

    /// Returns true if no further transition is permitted.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered
                | OrderStatus::Cancelled
                | OrderStatus::Failed
                | OrderStatus::Refunded
        )
    }

    /// Returns the wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::InProgress => "in_progress",
            OrderStatus::Ready => "ready",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Failed => "failed",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UnknownVariant {
                kind: "order status",
                value: s.to_string(),
            })
    }
}

/// The status of a payment record held by the payment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Gateway order created, buyer not yet redirected back.
    #[default]
    New,
    /// Gateway reports the payment as in progress.
    Pending,
    /// Gateway confirmed the payment.
    Completed,
    /// Gateway order cancelled before completion.
    Cancelled,
    /// Cancellation arrived after completion; a refund was requested instead.
    RefundRequested,
    /// Refund accepted by the gateway.
    Refunded,
    /// Gateway rejected the cancellation; needs manual reconciliation.
    CancellationFailedPayu,
    /// Gateway rejected the refund; needs manual reconciliation.
    RefundFailedPayu,
}

impl PaymentStatus {
    /// Returns true for statuses that a gateway notification may no longer overwrite.
    pub fn is_settled(&self) -> bool {
        !matches!(self, PaymentStatus::New | PaymentStatus::Pending)
    }

    /// Returns true for the gateway-failure statuses awaiting manual reconciliation.
    pub fn needs_reconciliation(&self) -> bool {
        matches!(
            self,
            PaymentStatus::CancellationFailedPayu | PaymentStatus::RefundFailedPayu
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::New => "NEW",
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::RefundRequested => "REFUND_REQUESTED",
            PaymentStatus::Refunded => "REFUNDED",
            PaymentStatus::CancellationFailedPayu => "CANCELLATION_FAILED_PAYU",
            PaymentStatus::RefundFailedPayu => "REFUND_FAILED_PAYU",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            PaymentStatus::New,
            PaymentStatus::Pending,
            PaymentStatus::Completed,
            PaymentStatus::Cancelled,
            PaymentStatus::RefundRequested,
            PaymentStatus::Refunded,
            PaymentStatus::CancellationFailedPayu,
            PaymentStatus::RefundFailedPayu,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
        .ok_or_else(|| UnknownVariant {
            kind: "payment status",
            value: s.to_string(),
        })
    }
}

/// How the guest intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Online,
    Cash,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Online => "online",
            PaymentMethod::Cash => "cash",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "online" => Ok(PaymentMethod::Online),
            "cash" => Ok(PaymentMethod::Cash),
            other => Err(UnknownVariant {
                kind: "payment method",
                value: other.to_string(),
            }),
        }
    }
}

/// Restaurant staff roles carried in the staff member's token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StaffRole {
    /// Kitchen staff.
    Chef,
    /// Floor staff.
    Waiter,
}

impl StaffRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            StaffRole::Chef => "chef",
            StaffRole::Waiter => "waiter",
        }
    }
}

impl std::fmt::Display for StaffRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for StaffRole {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chef" => Ok(StaffRole::Chef),
            "waiter" => Ok(StaffRole::Waiter),
            other => Err(UnknownVariant {
                kind: "staff role",
                value: other.to_string(),
            }),
        }
    }
}
