//! HTTP handlers, one module per resource.

pub mod orders;
pub mod payments;
pub mod staff;
pub mod system;

use std::sync::Arc;

use common::OrderId;
use saga::{OrderService, PaymentService, SagaRuntime, StaffService};
use serde::Serialize;

use crate::error::ApiError;

/// Shared application state accessible from all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orders: Arc<OrderService>,
    pub payments: Arc<PaymentService>,
    pub staff: Arc<StaffService>,
}

impl AppState {
    pub fn from_runtime(runtime: &SagaRuntime) -> Self {
        Self {
            orders: runtime.orders(),
            payments: runtime.payments(),
            staff: runtime.staff(),
        }
    }
}

/// Acknowledgement returned by commands.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
    pub order_id: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>, order_id: OrderId) -> Self {
        Self {
            message: message.into(),
            order_id: order_id.to_string(),
        }
    }
}

pub(crate) fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
