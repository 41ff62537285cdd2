//! Staff board endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::OrderStatus;
use projections::StaffOrderSummary;
use serde::Deserialize;

use super::{AppState, MessageResponse, parse_order_id};
use crate::error::ApiError;
use crate::identity::Identity;

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub new_status: String,
}

/// PUT /staff/orders/{id}/status — move an order on behalf of a staff role.
#[tracing::instrument(skip(state, identity, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    identity: Identity,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let role = identity.require_staff()?;
    let order_id = parse_order_id(&id)?;
    let new_status: OrderStatus = req
        .new_status
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("{e}")))?;

    state.staff.update_status(role, order_id, new_status).await?;
    Ok(Json(MessageResponse::new(
        format!("Order status updated to {new_status}"),
        order_id,
    )))
}

/// GET /staff/orders — what the caller's role should pick up next.
#[tracing::instrument(skip(state, identity))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    identity: Identity,
) -> Result<Json<Vec<StaffOrderSummary>>, ApiError> {
    let role = identity.require_staff()?;
    Ok(Json(state.staff.list_for_role(role).await))
}
