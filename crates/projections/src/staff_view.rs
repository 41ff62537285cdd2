//! Staff order board: the staff service's local projection of order statuses.
//!
//! The order service owns the canonical order; staff changes are written
//! there first and only mirrored here. The board learns about orders through
//! status fan-out, which may arrive duplicated or out of order, and may name
//! an order the board has never seen (for example `paid` arriving before
//! `pending`). Unseen orders get a minimal record instead of being dropped.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, PaymentMethod, StaffRole, TableNumber, UserId};
use domain::{
    OrderError,
    order::transitions::{is_allowed_edge, is_reachable},
};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::Result;

/// A status change observed on the staff queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub table_number: Option<TableNumber>,
    pub user_id: Option<UserId>,
    pub payment_method: Option<PaymentMethod>,
}

impl StatusUpdate {
    pub fn new(order_id: OrderId, status: OrderStatus) -> Self {
        Self {
            order_id,
            status,
            table_number: None,
            user_id: None,
            payment_method: None,
        }
    }
}

/// What the staff board knows about one order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffOrderSummary {
    pub order_id: OrderId,
    pub status: OrderStatus,
    pub table_number: Option<TableNumber>,
    pub user_id: Option<UserId>,
    /// Unknown until an update carrying it arrives.
    pub payment_method: Option<PaymentMethod>,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StaffOrderSummary {
    fn minimal(update: &StatusUpdate) -> Self {
        let now = Utc::now();
        Self {
            order_id: update.order_id,
            status: update.status,
            table_number: update.table_number.clone(),
            user_id: update.user_id.clone(),
            payment_method: update.payment_method,
            first_seen_at: now,
            updated_at: now,
        }
    }

    fn fill_details(&mut self, update: &StatusUpdate) {
        if self.table_number.is_none() {
            self.table_number = update.table_number.clone();
        }
        if self.user_id.is_none() {
            self.user_id = update.user_id.clone();
        }
        if self.payment_method.is_none() {
            self.payment_method = update.payment_method;
        }
    }
}

/// How an observed update changed the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionUpdate {
    /// The order was unseen; a minimal record was created.
    Created,
    /// The status moved forward, possibly past changes the board missed.
    Applied { from: OrderStatus, to: OrderStatus },
    /// Duplicate delivery of the current status.
    Unchanged,
}

/// Staff-side projection of order statuses.
#[derive(Clone, Default)]
pub struct StaffOrdersView {
    orders: Arc<RwLock<HashMap<OrderId, StaffOrderSummary>>>,
}

impl StaffOrdersView {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get(&self, order_id: OrderId) -> Option<StaffOrderSummary> {
        self.orders.read().await.get(&order_id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.orders.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.orders.read().await.is_empty()
    }

    /// Orders in any of the given statuses, oldest first.
    pub async fn list_by_status(&self, statuses: &[OrderStatus]) -> Vec<StaffOrderSummary> {
        let mut orders: Vec<_> = self
            .orders
            .read()
            .await
            .values()
            .filter(|o| statuses.contains(&o.status))
            .cloned()
            .collect();
        orders.sort_by_key(|o| o.first_seen_at);
        orders
    }

    /// The work queue for a role: chefs cook paid orders, waiters serve ready ones.
    pub async fn queue_for(&self, role: StaffRole) -> Vec<StaffOrderSummary> {
        let status = match role {
            StaffRole::Chef => OrderStatus::Paid,
            StaffRole::Waiter => OrderStatus::Ready,
        };
        self.list_by_status(&[status]).await
    }

    /// Applies a status change published by the canonical order writer.
    ///
    /// Re-applying the current status is a no-op. The board catches up to any
    /// status reachable from its current one, so a missed intermediate change
    /// does not leave it stuck, and it adopts a terminal status the owner
    /// settled. Anything else would move the board backwards and is rejected
    /// with the record untouched.
    #[tracing::instrument(skip(self, update), fields(order_id = %update.order_id, status = %update.status))]
    pub async fn observe(&self, update: &StatusUpdate) -> Result<ProjectionUpdate> {
        let mut orders = self.orders.write().await;

        let Some(summary) = orders.get_mut(&update.order_id) else {
            orders.insert(update.order_id, StaffOrderSummary::minimal(update));
            tracing::info!("tracking previously unseen order");
            metrics::counter!("staff_view_updates_total", "outcome" => "created").increment(1);
            return Ok(ProjectionUpdate::Created);
        };

        summary.fill_details(update);
        let (from, to) = (summary.status, update.status);
        if from == to {
            metrics::counter!("staff_view_updates_total", "outcome" => "unchanged").increment(1);
            return Ok(ProjectionUpdate::Unchanged);
        }

        let settled = to.is_terminal() && !from.is_terminal();
        if !is_reachable(from, to) && !settled {
            return Err(OrderError::InvalidTransition { from, to }.into());
        }
        if !is_allowed_edge(from, to) {
            tracing::debug!(%from, "board caught up past missed changes");
        }

        summary.status = to;
        summary.updated_at = Utc::now();
        metrics::counter!("staff_view_updates_total", "outcome" => "applied").increment(1);
        Ok(ProjectionUpdate::Applied { from, to })
    }
}
