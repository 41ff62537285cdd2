//! Payment gateway notification intake.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use saga::{GatewayNotification, WebhookOutcome};
use serde::Serialize;

use super::AppState;
use crate::error::ApiError;

#[derive(Debug, Serialize)]
pub struct NotifyResponse {
    pub status: &'static str,
}

/// POST /payments/notify — the gateway reports a payment status change.
///
/// Notifications for settled payments are acknowledged and ignored so the
/// gateway stops resending them.
#[tracing::instrument(skip(state, notification), fields(payu_order_id = %notification.order.order_id))]
pub async fn notify(
    State(state): State<Arc<AppState>>,
    Json(notification): Json<GatewayNotification>,
) -> Result<Json<NotifyResponse>, ApiError> {
    match state.payments.handle_notification(&notification).await? {
        WebhookOutcome::Updated { payment_status, .. } => {
            tracing::info!(%payment_status, "payment notification applied");
        }
        WebhookOutcome::Ignored { .. } => {
            tracing::debug!("payment notification ignored");
        }
    }
    Ok(Json(NotifyResponse { status: "ok" }))
}
