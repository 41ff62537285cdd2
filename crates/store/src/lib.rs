//! Persistence for orders and payment records.
//!
//! Both stores expose status writes only as compare-and-set operations, so
//! concurrent writers (a user cancel racing a gateway webhook) cannot
//! silently overwrite each other.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::{InMemoryOrderStore, InMemoryPaymentStore};
pub use postgres::{PostgresOrderStore, PostgresPaymentStore, run_migrations};
pub use store::{OrderStore, PaymentStore};
