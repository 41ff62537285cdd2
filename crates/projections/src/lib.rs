//! Read-side projections fed by the status fan-out.
//!
//! This crate provides:
//! - [`StaffOrdersView`], the staff service's local copy of order statuses
//! - [`NotificationDispatcher`] with the [`Notifier`] delivery seam
//!
//! Neither projection owns the canonical order. Both must tolerate
//! duplicate and out-of-order deliveries.

pub mod error;
pub mod notification;
pub mod staff_view;

pub use error::{ProjectionError, Result};
pub use notification::{
    DEFAULT_FINISHED_RETENTION, InMemoryNotifier, LogNotifier, Notification, NotificationDispatcher,
    Notifier,
};
pub use staff_view::{ProjectionUpdate, StaffOrderSummary, StaffOrdersView, StatusUpdate};
