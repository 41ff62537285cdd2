//! Order entity, its state machine and related types.

mod model;
pub mod transitions;
mod value_objects;

pub use model::{Order, PlaceOrder};
pub use transitions::{Actor, TransitionOutcome};
pub use value_objects::{LineItem, Menu, MenuItem, MenuItemId, Money, OrderItem};

use common::OrderStatus;
use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The requested status change is not an edge of the order graph.
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// The actor may not write the requested status.
    #[error("Permission denied: {actor} may not set {to} ({reason})")]
    PermissionDenied {
        actor: &'static str,
        to: OrderStatus,
        reason: &'static str,
    },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    /// Invalid quantity.
    #[error("Invalid quantity {quantity} for menu item {menu_item_id} (must be greater than 0)")]
    InvalidQuantity {
        menu_item_id: MenuItemId,
        quantity: u32,
    },

    /// The menu has no such item.
    #[error("Menu item not found: {0}")]
    UnknownMenuItem(MenuItemId),

    /// The priced order does not fit in a money amount.
    #[error("Order total is too large")]
    AmountOverflow,
}
