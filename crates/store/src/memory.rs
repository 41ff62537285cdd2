use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{OrderId, OrderStatus, PaymentStatus, TableNumber, UserId};
use domain::{Order, PaymentRecord};
use tokio::sync::RwLock;

use crate::{
    Result, StoreError,
    store::{OrderStore, PaymentStore},
};

/// In-memory order store for testing and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryOrderStore {
    orders: Arc<RwLock<HashMap<OrderId, Order>>>,
}

impl InMemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.orders.read().await.len()
    }
}

fn with_status(order: &Order, status: OrderStatus) -> Order {
    Order::restore(
        order.id(),
        order.table_number().clone(),
        order.user_id().clone(),
        order.email().map(str::to_string),
        status,
        order.payment_method(),
        order.items().to_vec(),
        order.created_at(),
        Utc::now(),
    )
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let mut orders = self.orders.write().await;
        if orders.contains_key(&order.id()) {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        orders.insert(order.id(), order.clone());
        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.orders.read().await.get(&id).cloned())
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<Order> {
        let mut orders = self.orders.write().await;
        let current = orders.get(&id).ok_or_else(|| StoreError::NotFound {
            entity: "order",
            id: id.to_string(),
        })?;

        if current.status() != expected {
            return Err(StoreError::StatusConflict {
                entity: "order",
                id: id.to_string(),
                expected: expected.to_string(),
                actual: current.status().to_string(),
            });
        }

        let updated = with_status(current, new);
        orders.insert(id, updated.clone());
        Ok(updated)
    }

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        let orders = self.orders.read().await;
        let mut matching: Vec<Order> = orders
            .values()
            .filter(|o| statuses.contains(&o.status()))
            .cloned()
            .collect();
        matching.sort_by_key(|o| o.created_at());
        Ok(matching)
    }
}

/// In-memory payment store for testing and single-process runs.
#[derive(Clone, Default)]
pub struct InMemoryPaymentStore {
    payments: Arc<RwLock<HashMap<OrderId, PaymentRecord>>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored payment records.
    pub async fn payment_count(&self) -> usize {
        self.payments.read().await.len()
    }
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<()> {
        let mut payments = self.payments.write().await;
        if payments.contains_key(&record.order_id) {
            return Err(StoreError::AlreadyExists {
                entity: "payment",
                id: record.order_id.to_string(),
            });
        }
        payments.insert(record.order_id, record.clone());
        Ok(())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.read().await.get(&order_id).cloned())
    }

    async fn find_for_compensation(
        &self,
        order_id: OrderId,
        table_number: &TableNumber,
        user_id: &UserId,
    ) -> Result<Option<PaymentRecord>> {
        Ok(self
            .payments
            .read()
            .await
            .get(&order_id)
            .filter(|r| r.matches(order_id, table_number, user_id))
            .cloned())
    }

    async fn get_by_payu_order_id(&self, payu_order_id: &str) -> Result<Option<PaymentRecord>> {
        Ok(self
            .payments
            .read()
            .await
            .values()
            .find(|r| r.payu_order_id.as_deref() == Some(payu_order_id))
            .cloned())
    }

    async fn compare_and_set_status(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<PaymentRecord> {
        let mut payments = self.payments.write().await;
        let record = payments
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "payment",
                id: order_id.to_string(),
            })?;

        if record.status != expected {
            return Err(StoreError::StatusConflict {
                entity: "payment",
                id: order_id.to_string(),
                expected: expected.to_string(),
                actual: record.status.to_string(),
            });
        }

        record.status = new;
        record.updated_at = Utc::now();
        Ok(record.clone())
    }

    async fn list_needing_reconciliation(&self) -> Result<Vec<PaymentRecord>> {
        let payments = self.payments.read().await;
        let mut records: Vec<PaymentRecord> = payments
            .values()
            .filter(|r| r.status.needs_reconciliation())
            .cloned()
            .collect();
        records.sort_by_key(|r| r.updated_at);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::PaymentMethod;
    use domain::{LineItem, Menu, MenuItem, Money, PlaceOrder};

    fn order() -> Order {
        Order::place(
            OrderId::new(),
            PlaceOrder {
                table_number: TableNumber::from("5"),
                user_id: UserId::from("guest"),
                email: None,
                payment_method: PaymentMethod::Online,
                items: vec![LineItem::new(1, 1)],
            },
            &Menu::new([MenuItem::new(1, "Rosol", Money::from_minor(1500))]),
        )
        .unwrap()
    }

    fn payment(order_id: OrderId) -> PaymentRecord {
        PaymentRecord::new(
            order_id,
            TableNumber::from("5"),
            UserId::from("guest"),
            format!("PAYU-{order_id}"),
            "https://pay.example/r",
        )
    }

    #[tokio::test]
    async fn test_insert_and_get_order() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.insert(&order).await.unwrap();

        assert_eq!(store.get(order.id()).await.unwrap(), Some(order.clone()));
        assert!(matches!(
            store.insert(&order).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_cas_applies_when_expected_matches() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.insert(&order).await.unwrap();

        let updated = store
            .compare_and_set_status(order.id(), OrderStatus::Pending, OrderStatus::Paid)
            .await
            .unwrap();

        assert_eq!(updated.status(), OrderStatus::Paid);
        assert_eq!(updated.items(), order.items());
    }

    #[tokio::test]
    async fn test_cas_conflict_leaves_status() {
        let store = InMemoryOrderStore::new();
        let order = order();
        store.insert(&order).await.unwrap();
        store
            .compare_and_set_status(order.id(), OrderStatus::Pending, OrderStatus::Cancelled)
            .await
            .unwrap();

        let err = store
            .compare_and_set_status(order.id(), OrderStatus::Pending, OrderStatus::Paid)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        let stored = store.get(order.id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_cas_missing_order() {
        let store = InMemoryOrderStore::new();
        let err = store
            .compare_and_set_status(OrderId::new(), OrderStatus::Pending, OrderStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "order", .. }));
    }

    #[tokio::test]
    async fn test_list_by_status() {
        let store = InMemoryOrderStore::new();
        let a = order();
        let b = order();
        store.insert(&a).await.unwrap();
        store.insert(&b).await.unwrap();
        store
            .compare_and_set_status(b.id(), OrderStatus::Pending, OrderStatus::Paid)
            .await
            .unwrap();

        let paid = store.list_by_status(&[OrderStatus::Paid]).await.unwrap();
        assert_eq!(paid.len(), 1);
        assert_eq!(paid[0].id(), b.id());
    }

    #[tokio::test]
    async fn test_payment_lookups() {
        let store = InMemoryPaymentStore::new();
        let order_id = OrderId::new();
        let record = payment(order_id);
        store.insert(&record).await.unwrap();

        assert!(store.get_by_order(order_id).await.unwrap().is_some());
        assert!(
            store
                .get_by_payu_order_id(&format!("PAYU-{order_id}"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_for_compensation(order_id, &TableNumber::from("5"), &UserId::from("guest"))
                .await
                .unwrap()
                .is_some()
        );
        assert!(
            store
                .find_for_compensation(order_id, &TableNumber::from("9"), &UserId::from("guest"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_payment_unique_per_order() {
        let store = InMemoryPaymentStore::new();
        let order_id = OrderId::new();
        store.insert(&payment(order_id)).await.unwrap();

        assert!(matches!(
            store.insert(&payment(order_id)).await,
            Err(StoreError::AlreadyExists { .. })
        ));
    }

    #[tokio::test]
    async fn test_payment_cas_and_reconciliation_list() {
        let store = InMemoryPaymentStore::new();
        let order_id = OrderId::new();
        store.insert(&payment(order_id)).await.unwrap();

        store
            .compare_and_set_status(
                order_id,
                PaymentStatus::New,
                PaymentStatus::CancellationFailedPayu,
            )
            .await
            .unwrap();
        let err = store
            .compare_and_set_status(order_id, PaymentStatus::New, PaymentStatus::Cancelled)
            .await
            .unwrap_err();

        assert!(err.is_conflict());
        let pending = store.list_needing_reconciliation().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].order_id, order_id);
    }
}
