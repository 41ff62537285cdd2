//! Shared types for the restaurant ordering services.
//!
//! Every service speaks the same status vocabulary and identifier types,
//! so a status written by one service is parsed identically by all others.

pub mod status;
pub mod types;

pub use status::{OrderStatus, PaymentMethod, PaymentStatus, StaffRole, UnknownVariant};
pub use types::{CorrelationId, OrderId, TableNumber, UserId};

/// Version of the message schema shared by every service on the bus.
pub const SCHEMA_VERSION: u32 = 1;
