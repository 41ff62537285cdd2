//! Payment provider seam and an in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use domain::GatewayOrderStatus;
use thiserror::Error;

use crate::messages::CreatePaymentRequest;

/// A failed call to the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct GatewayError(pub String);

/// The provider's answer to an order creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayOrder {
    /// Provider-side order reference.
    pub order_id: String,
    pub redirect_uri: String,
}

/// Details sent with a refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundDetails {
    pub description: String,
}

/// Trait for the external payment provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Obtains an access token for subsequent calls.
    async fn authenticate(&self) -> Result<String, GatewayError>;

    /// Creates a provider order and returns where to send the buyer.
    async fn create_order(&self, request: &CreatePaymentRequest)
    -> Result<GatewayOrder, GatewayError>;

    async fn get_order_status(&self, order_id: &str) -> Result<GatewayOrderStatus, GatewayError>;

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError>;

    async fn refund_order(&self, order_id: &str, refund: &RefundDetails)
    -> Result<(), GatewayError>;
}

#[derive(Debug, Default)]
struct GatewayState {
    orders: HashMap<String, GatewayOrderStatus>,
    refunds: Vec<(String, RefundDetails)>,
    next_id: u32,
    tokens_issued: u32,
    create_calls: u32,
    fail_on_create: bool,
    fail_on_cancel: bool,
    fail_on_refund: bool,
}

/// In-memory payment provider for testing and local runs.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    redirect_base: String,
    state: Arc<Mutex<GatewayState>>,
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new("https://secure.snd.payu.example/pay/")
    }
}

impl InMemoryPaymentGateway {
    /// Creates a gateway whose redirect links start with `redirect_base`.
    pub fn new(redirect_base: impl Into<String>) -> Self {
        Self {
            redirect_base: redirect_base.into(),
            state: Arc::default(),
        }
    }

    fn state(&self) -> MutexGuard<'_, GatewayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_on_create(&self, fail: bool) {
        self.state().fail_on_create = fail;
    }

    pub fn set_fail_on_cancel(&self, fail: bool) {
        self.state().fail_on_cancel = fail;
    }

    pub fn set_fail_on_refund(&self, fail: bool) {
        self.state().fail_on_refund = fail;
    }

    /// Sets the provider-side status, as if the buyer acted on the payment page.
    pub fn set_status(&self, order_id: &str, status: GatewayOrderStatus) {
        self.state().orders.insert(order_id.to_string(), status);
    }

    /// Returns the provider-side status of an order.
    pub fn status_of(&self, order_id: &str) -> Option<GatewayOrderStatus> {
        self.state().orders.get(order_id).cloned()
    }

    /// Returns how many times `create_order` was called.
    pub fn create_calls(&self) -> u32 {
        self.state().create_calls
    }

    /// Returns the refunds issued so far.
    pub fn refunds(&self) -> Vec<(String, RefundDetails)> {
        self.state().refunds.clone()
    }

    pub fn tokens_issued(&self) -> u32 {
        self.state().tokens_issued
    }

    /// Every provider call authenticates first, as the hosted API requires.
    fn authorized(&self) -> MutexGuard<'_, GatewayState> {
        let mut state = self.state();
        state.tokens_issued += 1;
        state
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn authenticate(&self) -> Result<String, GatewayError> {
        let mut state = self.state();
        state.tokens_issued += 1;
        Ok(format!("token-{}", state.tokens_issued))
    }

    async fn create_order(
        &self,
        request: &CreatePaymentRequest,
    ) -> Result<GatewayOrder, GatewayError> {
        let mut state = self.authorized();
        state.create_calls += 1;
        if state.fail_on_create {
            return Err(GatewayError("order creation declined".to_string()));
        }

        state.next_id += 1;
        let order_id = format!("PAYU-{:06}", state.next_id);
        state
            .orders
            .insert(order_id.clone(), GatewayOrderStatus::Pending);

        tracing::debug!(
            payu_order_id = %order_id,
            total_amount = %request.total_amount,
            "gateway order created"
        );
        Ok(GatewayOrder {
            redirect_uri: format!("{}?orderId={order_id}", self.redirect_base),
            order_id,
        })
    }

    async fn get_order_status(&self, order_id: &str) -> Result<GatewayOrderStatus, GatewayError> {
        self.authorized()
            .orders
            .get(order_id)
            .cloned()
            .ok_or_else(|| GatewayError(format!("unknown order {order_id}")))
    }

    async fn cancel_order(&self, order_id: &str) -> Result<(), GatewayError> {
        let mut state = self.authorized();
        if state.fail_on_cancel {
            return Err(GatewayError("cancellation rejected".to_string()));
        }
        match state.orders.get_mut(order_id) {
            Some(status) => {
                *status = GatewayOrderStatus::Canceled;
                Ok(())
            }
            None => Err(GatewayError(format!("unknown order {order_id}"))),
        }
    }

    async fn refund_order(&self, order_id: &str, refund: &RefundDetails) -> Result<(), GatewayError> {
        let mut state = self.authorized();
        if state.fail_on_refund {
            return Err(GatewayError("refund rejected".to_string()));
        }
        if !state.orders.contains_key(order_id) {
            return Err(GatewayError(format!("unknown order {order_id}")));
        }
        state.refunds.push((order_id.to_string(), refund.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::{Buyer, Product};
    use common::{OrderId, TableNumber, UserId};

    fn request() -> CreatePaymentRequest {
        CreatePaymentRequest {
            order_id: OrderId::new(),
            notify_url: "http://localhost/notify".into(),
            customer_ip: "127.0.0.1".into(),
            description: "Order".into(),
            currency_code: "PLN".into(),
            total_amount: "1000".into(),
            buyer: Buyer {
                email: String::new(),
                phone: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                language: "pl".into(),
            },
            products: vec![Product {
                name: "Barszcz".into(),
                unit_price: "1000".into(),
                quantity: "1".into(),
            }],
            table_number: TableNumber::from("1"),
            user_id: UserId::from("guest"),
        }
    }

    #[tokio::test]
    async fn test_create_cancel_and_status() {
        let gateway = InMemoryPaymentGateway::default();

        let order = gateway.create_order(&request()).await.unwrap();
        assert_eq!(order.order_id, "PAYU-000001");
        assert!(order.redirect_uri.ends_with("?orderId=PAYU-000001"));

        gateway.cancel_order(&order.order_id).await.unwrap();
        assert_eq!(
            gateway.get_order_status(&order.order_id).await.unwrap(),
            GatewayOrderStatus::Canceled
        );
        assert_eq!(gateway.tokens_issued(), 3);
    }

    #[tokio::test]
    async fn test_failure_toggles() {
        let gateway = InMemoryPaymentGateway::default();
        let order = gateway.create_order(&request()).await.unwrap();

        gateway.set_fail_on_refund(true);
        let refund = RefundDetails {
            description: "kitchen refund".into(),
        };
        assert!(gateway.refund_order(&order.order_id, &refund).await.is_err());

        gateway.set_fail_on_create(true);
        assert!(gateway.create_order(&request()).await.is_err());
        assert_eq!(gateway.create_calls(), 2);
        assert!(gateway.refunds().is_empty());
    }
}
