//! Saga error types.

use std::time::Duration;

use bus::{BusError, Classify, Disposition};
use common::{OrderId, OrderStatus};
use domain::OrderError;
use projections::ProjectionError;
use store::StoreError;
use thiserror::Error;

use crate::messages::ServiceMessage;

/// Errors that can occur while running the order saga.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The order cannot move to the requested status from its current one.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The caller's role or identity does not allow the change.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// An order, payment record or menu item does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The order request itself is unacceptable.
    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// The payment service did not answer within the RPC budget.
    #[error("Payment service did not respond within {timeout:?}")]
    GatewayTimeout { timeout: Duration },

    /// The payment provider rejected or failed a call.
    #[error("Payment gateway error: {0}")]
    GatewayError(String),

    /// A message could not be understood.
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Concurrent writers kept changing the order.
    #[error("Order {0} kept changing concurrently")]
    Conflict(OrderId),

    #[error("Message bus error: {0}")]
    Bus(BusError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("Projection error: {0}")]
    Projection(ProjectionError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SagaError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        SagaError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn unexpected(message: &ServiceMessage, consumer: &str) -> Self {
        SagaError::MalformedMessage(format!(
            "unexpected event_type '{}' for {consumer}",
            message.event_type()
        ))
    }

    /// Returns true for errors the caller caused; redelivery would not change them.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SagaError::InvalidTransition { .. }
                | SagaError::PermissionDenied(_)
                | SagaError::NotFound { .. }
                | SagaError::InvalidOrder(_)
        )
    }
}

impl Classify for SagaError {
    fn disposition(&self) -> Disposition {
        match self {
            SagaError::MalformedMessage(_) => Disposition::DeadLetter,
            SagaError::GatewayError(_) => Disposition::Discard,
            e if e.is_rejection() => Disposition::Discard,
            _ => Disposition::Retry,
        }
    }
}

impl From<OrderError> for SagaError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::InvalidTransition { from, to } => SagaError::InvalidTransition { from, to },
            OrderError::PermissionDenied { .. } => SagaError::PermissionDenied(e.to_string()),
            OrderError::UnknownMenuItem(id) => SagaError::not_found("menu item", id),
            OrderError::NoItems
            | OrderError::InvalidQuantity { .. }
            | OrderError::AmountOverflow => SagaError::InvalidOrder(e.to_string()),
        }
    }
}

impl From<BusError> for SagaError {
    fn from(e: BusError) -> Self {
        match e {
            BusError::RpcTimeout { timeout, .. } => SagaError::GatewayTimeout { timeout },
            BusError::MalformedMessage(reason) => SagaError::MalformedMessage(reason),
            e @ BusError::UnsupportedSchemaVersion { .. } => {
                SagaError::MalformedMessage(e.to_string())
            }
            e => SagaError::Bus(e),
        }
    }
}

impl From<StoreError> for SagaError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => SagaError::NotFound { entity, id },
            e => SagaError::Store(e),
        }
    }
}

impl From<ProjectionError> for SagaError {
    fn from(e: ProjectionError) -> Self {
        match e {
            ProjectionError::Transition(e) => e.into(),
            e => SagaError::Projection(e),
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_rejections_are_discarded() {
        let err: SagaError = OrderError::InvalidTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::Paid,
        }
        .into();
        assert_eq!(err.disposition(), Disposition::Discard);
        assert_eq!(
            SagaError::not_found("order", OrderId::new()).disposition(),
            Disposition::Discard
        );
    }

    #[test]
    fn test_unpriceable_order_is_invalid() {
        let err: SagaError = OrderError::AmountOverflow.into();
        assert!(matches!(err, SagaError::InvalidOrder(_)));
        assert_eq!(err.disposition(), Disposition::Discard);
    }

    #[test]
    fn test_malformed_bus_messages_are_dead_lettered() {
        let err: SagaError = BusError::MalformedMessage("missing event_type".into()).into();
        assert!(matches!(err, SagaError::MalformedMessage(_)));
        assert_eq!(err.disposition(), Disposition::DeadLetter);
    }

    #[test]
    fn test_rpc_timeout_becomes_gateway_timeout() {
        let err: SagaError = BusError::RpcTimeout {
            queue: "payment_queue".into(),
            timeout: Duration::from_secs(30),
        }
        .into();
        assert!(matches!(err, SagaError::GatewayTimeout { .. }));
        assert_eq!(err.disposition(), Disposition::Retry);
    }

    #[test]
    fn test_store_conflicts_are_retried() {
        let err: SagaError = StoreError::StatusConflict {
            entity: "order",
            id: "1".into(),
            expected: "pending".into(),
            actual: "paid".into(),
        }
        .into();
        assert_eq!(err.disposition(), Disposition::Retry);

        let err: SagaError = StoreError::NotFound {
            entity: "payment",
            id: "1".into(),
        }
        .into();
        assert!(matches!(err, SagaError::NotFound { entity: "payment", .. }));
    }
}
