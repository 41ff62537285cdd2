//! Guest-facing order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderStatus, PaymentMethod};
use domain::{LineItem, Order, PlaceOrder};
use saga::Checkout;
use serde::{Deserialize, Serialize};

use super::{AppState, MessageResponse, parse_order_id};
use crate::error::ApiError;
use crate::identity::Identity;

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<OrderLineRequest>,
    #[serde(default)]
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Deserialize)]
pub struct OrderLineRequest {
    pub menu_item_id: i64,
    pub quantity: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct RefundRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

// -- Response types --

#[derive(Debug, Serialize)]
pub struct OrderPlacedResponse {
    pub message: String,
    pub order_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_redirect_uri: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub table_number: String,
    pub user_id: String,
    pub email: Option<String>,
    pub status: OrderStatus,
    pub payment_method: PaymentMethod,
    pub items: Vec<OrderItemResponse>,
    /// Total in minor currency units.
    pub total: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct OrderItemResponse {
    pub menu_item_id: i64,
    pub name: String,
    pub quantity: u32,
    pub unit_price: i64,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            table_number: order.table_number().to_string(),
            user_id: order.user_id().to_string(),
            email: order.email().map(str::to_string),
            status: order.status(),
            payment_method: order.payment_method(),
            items: order
                .items()
                .iter()
                .map(|item| OrderItemResponse {
                    menu_item_id: item.menu_item_id.as_i64(),
                    name: item.name.clone(),
                    quantity: item.quantity,
                    unit_price: item.unit_price.minor(),
                })
                .collect(),
            total: order.total().minor(),
            created_at: order.created_at(),
            updated_at: order.updated_at(),
        }
    }
}

// -- Handlers --

/// POST /orders — place an order from the caller's table.
///
/// Online orders wait for the payment link; cash orders return at once.
#[tracing::instrument(skip(state, identity, req), fields(user_id = %identity.user_id))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Json(req): Json<PlaceOrderRequest>,
) -> Result<(StatusCode, Json<OrderPlacedResponse>), ApiError> {
    let checkout = Checkout {
        order: PlaceOrder {
            table_number: identity.require_table()?,
            user_id: identity.user_id,
            email: identity.email,
            payment_method: req.payment_method,
            items: req
                .items
                .iter()
                .map(|line| LineItem::new(line.menu_item_id, line.quantity))
                .collect(),
        },
        buyer: identity.buyer,
    };

    let placed = state.orders.place_order(checkout).await?;

    Ok((
        StatusCode::CREATED,
        Json(OrderPlacedResponse {
            message: "Order created".to_string(),
            order_id: placed.order.id().to_string(),
            payment_redirect_uri: placed.payment_redirect_uri,
        }),
    ))
}

/// GET /orders/{id} — the order's current snapshot, for its owner or staff.
#[tracing::instrument(skip(state, identity))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.orders.get_order(order_id).await?;

    if identity.staff_role().is_none() && order.user_id() != &identity.user_id {
        return Err(ApiError::Forbidden(
            "order belongs to another user".to_string(),
        ));
    }
    Ok(Json(OrderResponse::from(&order)))
}

/// DELETE /orders/{id} — the owner cancels a pending order.
#[tracing::instrument(skip(state, identity))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    state
        .orders
        .cancel_order(order_id, identity.user_id, "Cancelled by customer".to_string())
        .await?;
    Ok(Json(MessageResponse::new("Order cancelled", order_id)))
}

/// POST /orders/{id}/refund — the owner asks for a paid order to be refunded.
#[tracing::instrument(skip(state, identity, req))]
pub async fn refund(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<RefundRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let reason = req
        .reason
        .unwrap_or_else(|| "Refund requested by customer".to_string());
    state
        .orders
        .refund_order(order_id, identity.user_id, reason)
        .await?;
    Ok(Json(MessageResponse::new("Refund requested", order_id)))
}
