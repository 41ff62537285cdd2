//! Domain layer for the restaurant ordering saga.
//!
//! This crate provides:
//! - The order entity and its state machine (allowed edges, actor permissions)
//! - Menu pricing in minor currency units
//! - The payment record and the compensation/webhook decisions made on it

pub mod order;
pub mod payment;

pub use order::{
    Actor, LineItem, Menu, MenuItem, MenuItemId, Money, Order, OrderError, OrderItem, PlaceOrder,
    TransitionOutcome,
};
pub use payment::{
    CancelPlan, GatewayOrderStatus, PaymentRecord, RefundPlan, WebhookEffect,
    order_id_from_description,
};
