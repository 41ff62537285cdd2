//! Messages exchanged between the order, payment, staff and notification services.
//!
//! Every variant travels inside the versioned bus envelope as
//! `{"event_type": "<variant>", "payload": {...}}`.

use common::{OrderId, OrderStatus, PaymentMethod, TableNumber, UserId};
use serde::{Deserialize, Serialize};

use crate::fanout::Origin;

/// All messages carried on the service queues and the RPC reply queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event_type", content = "payload", rename_all = "snake_case")]
pub enum ServiceMessage {
    CreatePaymentRequest(CreatePaymentRequest),
    CancelPaymentRequest(CompensationRequest),
    RefundPaymentRequest(CompensationRequest),
    StatusChanged(StatusChanged),
    /// RPC reply carrying the redirect link.
    PaymentLink(PaymentLink),
    /// RPC reply for a payment that could not be created.
    PaymentFailed(PaymentFailed),
}

impl ServiceMessage {
    pub fn event_type(&self) -> &'static str {
        match self {
            ServiceMessage::CreatePaymentRequest(_) => "create_payment_request",
            ServiceMessage::CancelPaymentRequest(_) => "cancel_payment_request",
            ServiceMessage::RefundPaymentRequest(_) => "refund_payment_request",
            ServiceMessage::StatusChanged(_) => "status_changed",
            ServiceMessage::PaymentLink(_) => "payment_link",
            ServiceMessage::PaymentFailed(_) => "payment_failed",
        }
    }
}

/// Buyer details forwarded to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Buyer {
    pub email: String,
    pub phone: String,
    pub first_name: String,
    pub last_name: String,
    pub language: String,
}

/// One priced line as the payment provider expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub name: String,
    /// Minor currency units.
    pub unit_price: String,
    pub quantity: String,
}

/// Request to create a gateway order and return its redirect link.
///
/// Amounts are integer minor-unit strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatePaymentRequest {
    pub order_id: OrderId,
    pub notify_url: String,
    pub customer_ip: String,
    pub description: String,
    pub currency_code: String,
    pub total_amount: String,
    pub buyer: Buyer,
    pub products: Vec<Product>,
    pub table_number: TableNumber,
    pub user_id: UserId,
}

impl CreatePaymentRequest {
    /// Checks that the amounts are integers and the total matches the products.
    pub fn validate(&self) -> Result<i64, String> {
        if self.products.is_empty() {
            return Err("payment request has no products".to_string());
        }

        let mut sum: i64 = 0;
        for product in &self.products {
            let unit_price: i64 = product
                .unit_price
                .parse()
                .map_err(|_| format!("invalid unit price '{}'", product.unit_price))?;
            let quantity: i64 = product
                .quantity
                .parse()
                .map_err(|_| format!("invalid quantity '{}'", product.quantity))?;
            if unit_price < 0 || quantity <= 0 {
                return Err(format!("invalid product line '{}'", product.name));
            }
            sum = unit_price
                .checked_mul(quantity)
                .and_then(|line| sum.checked_add(line))
                .ok_or_else(|| "total amount overflows".to_string())?;
        }

        let total: i64 = self
            .total_amount
            .parse()
            .map_err(|_| format!("invalid total amount '{}'", self.total_amount))?;
        if total != sum {
            return Err(format!(
                "total amount {total} does not match products sum {sum}"
            ));
        }
        Ok(total)
    }
}

/// Composite key and reason for a cancel or refund compensation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompensationRequest {
    pub order_id: OrderId,
    pub table_number: TableNumber,
    pub user_id: UserId,
    pub reason: String,
}

/// An order moved to a new status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChanged {
    pub order_id: OrderId,
    pub new_status: OrderStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_number: Option<TableNumber>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<UserId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    /// Stamped by the fan-out with the service that made the change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<Origin>,
}

impl StatusChanged {
    pub fn new(order_id: OrderId, new_status: OrderStatus) -> Self {
        Self {
            order_id,
            new_status,
            email: None,
            table_number: None,
            user_id: None,
            payment_method: None,
            origin: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLink {
    pub order_id: OrderId,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentFailed {
    pub error: String,
    pub status: String,
}

impl PaymentFailed {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            status: "failed".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(total: &str) -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_id: OrderId::new(),
            notify_url: "http://localhost/notify".into(),
            customer_ip: "127.0.0.1".into(),
            description: "Order".into(),
            currency_code: "PLN".into(),
            total_amount: total.into(),
            buyer: Buyer {
                email: "guest@example.com".into(),
                phone: "500600700".into(),
                first_name: "Jan".into(),
                last_name: "Kowalski".into(),
                language: "pl".into(),
            },
            products: vec![
                Product {
                    name: "Zurek".into(),
                    unit_price: "1850".into(),
                    quantity: "2".into(),
                },
                Product {
                    name: "Kompot".into(),
                    unit_price: "700".into(),
                    quantity: "1".into(),
                },
            ],
            table_number: TableNumber::from("5"),
            user_id: UserId::from("guest"),
        }
    }

    #[test]
    fn test_status_changed_wire_shape() {
        let order_id = OrderId::new();
        let message = ServiceMessage::StatusChanged(StatusChanged {
            email: Some("guest@example.com".into()),
            ..StatusChanged::new(order_id, OrderStatus::InProgress)
        });

        let value = serde_json::to_value(&message).unwrap();

        assert_eq!(
            value,
            json!({
                "event_type": "status_changed",
                "payload": {
                    "order_id": order_id.to_string(),
                    "new_status": "in_progress",
                    "email": "guest@example.com",
                }
            })
        );
        assert_eq!(message.event_type(), "status_changed");
    }

    #[test]
    fn test_status_changed_origin_round_trips_by_name() {
        let value = json!({
            "event_type": "status_changed",
            "payload": {
                "order_id": OrderId::new().to_string(),
                "new_status": "paid",
                "origin": "payment",
            }
        });

        let ServiceMessage::StatusChanged(event) = serde_json::from_value(value).unwrap() else {
            panic!("expected status change");
        };

        assert_eq!(event.origin, Some(Origin::PaymentService));
        assert_eq!(event.email, None);
    }

    #[test]
    fn test_payment_failed_reply_shape() {
        let value =
            serde_json::to_value(ServiceMessage::PaymentFailed(PaymentFailed::new("declined")))
                .unwrap();
        assert_eq!(value["payload"], json!({"error": "declined", "status": "failed"}));
    }

    #[test]
    fn test_link_reply_without_redirect_uri_does_not_parse() {
        let value = json!({
            "event_type": "payment_link",
            "payload": {"order_id": OrderId::new().to_string()}
        });
        assert!(serde_json::from_value::<ServiceMessage>(value).is_err());
    }

    #[test]
    fn test_validate_accepts_matching_total() {
        assert_eq!(request("4400").validate(), Ok(4400));
    }

    #[test]
    fn test_validate_rejects_bad_amounts() {
        assert!(request("4399").validate().is_err());
        assert!(request("44.00").validate().is_err());

        let mut empty = request("0");
        empty.products.clear();
        assert!(empty.validate().is_err());

        let mut zero_qty = request("0");
        zero_qty.products.truncate(1);
        zero_qty.products[0].quantity = "0".into();
        assert!(zero_qty.validate().is_err());
    }
}
