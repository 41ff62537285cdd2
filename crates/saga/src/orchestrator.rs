//! Payment orchestrator: obtains a payment link over the bus.
//!
//! Order placement needs the redirect link before it can answer the guest,
//! but the payment service is reachable only through its queue. The
//! orchestrator turns that into one awaited call bounded by a timeout.

use std::sync::Arc;
use std::time::{Duration, Instant};

use bus::{BusError, RpcClient};

use crate::{
    Result, SagaError,
    messages::{CreatePaymentRequest, ServiceMessage},
};

/// Requests payment links from the payment service.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    rpc: Arc<RpcClient>,
    payment_queue: String,
    timeout: Duration,
}

impl PaymentOrchestrator {
    pub fn new(rpc: Arc<RpcClient>, payment_queue: impl Into<String>, timeout: Duration) -> Self {
        Self {
            rpc,
            payment_queue: payment_queue.into(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sends `create_payment_request` and waits for the redirect link.
    ///
    /// Fails with `GatewayTimeout` when no reply arrives in time and with
    /// `GatewayError` when the payment service reports a failure or replies
    /// without a link.
    #[tracing::instrument(skip(self, request), fields(order_id = %request.order_id))]
    pub async fn request_payment_link(&self, request: &CreatePaymentRequest) -> Result<String> {
        let start = Instant::now();
        let message = ServiceMessage::CreatePaymentRequest(request.clone());

        let reply = self
            .rpc
            .call::<ServiceMessage, ServiceMessage>(&self.payment_queue, &message, self.timeout)
            .await;
        metrics::histogram!("payment_rpc_duration_seconds").record(start.elapsed().as_secs_f64());

        let reply = match reply {
            Ok(reply) => reply,
            Err(BusError::RpcTimeout { timeout, .. }) => {
                metrics::counter!("payment_rpc_timeouts_total").increment(1);
                tracing::warn!(?timeout, "payment link request timed out; order left pending");
                return Err(SagaError::GatewayTimeout { timeout });
            }
            Err(e) if e.is_malformed() => {
                return Err(SagaError::GatewayError(format!("unreadable payment reply: {e}")));
            }
            Err(e) => return Err(e.into()),
        };

        match reply {
            ServiceMessage::PaymentLink(link) if link.order_id != request.order_id => {
                Err(SagaError::GatewayError(format!(
                    "payment reply is for order {}",
                    link.order_id
                )))
            }
            ServiceMessage::PaymentLink(link) if link.redirect_uri.trim().is_empty() => Err(
                SagaError::GatewayError("payment reply has no redirect_uri".to_string()),
            ),
            ServiceMessage::PaymentLink(link) => {
                tracing::info!("payment link received");
                Ok(link.redirect_uri)
            }
            ServiceMessage::PaymentFailed(failed) => {
                tracing::warn!(error = %failed.error, "payment service reported failure");
                Err(SagaError::GatewayError(failed.error))
            }
            other => Err(SagaError::GatewayError(format!(
                "unexpected payment reply '{}'",
                other.event_type()
            ))),
        }
    }
}
