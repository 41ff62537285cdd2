use async_trait::async_trait;
use common::{OrderId, OrderStatus, PaymentStatus, TableNumber, UserId};
use domain::{Order, PaymentRecord};

use crate::Result;

/// Persistence for orders.
///
/// Status writes are compare-and-set: a write only lands if the stored status
/// still equals the status the caller validated against. There are no locks;
/// a lost race surfaces as `StatusConflict`.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Inserts a new order. Fails with `AlreadyExists` if the id is taken.
    async fn insert(&self, order: &Order) -> Result<()>;

    /// Loads an order by id.
    async fn get(&self, id: OrderId) -> Result<Option<Order>>;

    /// Atomically sets `new` if the current status is `expected`.
    ///
    /// Returns the updated order. Fails with `NotFound` if the order does not
    /// exist or `StatusConflict` if another writer changed it first.
    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<Order>;

    /// Lists orders in any of the given statuses, oldest first.
    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>>;
}

/// Persistence for payment records.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Inserts a record. Fails with `AlreadyExists` if the order already has one.
    async fn insert(&self, record: &PaymentRecord) -> Result<()>;

    /// Loads the record for an order.
    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>>;

    /// Loads the record matching the full compensation key.
    async fn find_for_compensation(
        &self,
        order_id: OrderId,
        table_number: &TableNumber,
        user_id: &UserId,
    ) -> Result<Option<PaymentRecord>>;

    /// Loads the record for a gateway-side order reference.
    async fn get_by_payu_order_id(&self, payu_order_id: &str) -> Result<Option<PaymentRecord>>;

    /// Atomically sets `new` if the current status is `expected`.
    async fn compare_and_set_status(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<PaymentRecord>;

    /// Lists records awaiting manual reconciliation after a failed gateway call.
    async fn list_needing_reconciliation(&self) -> Result<Vec<PaymentRecord>>;
}
