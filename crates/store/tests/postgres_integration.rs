//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use common::{OrderId, OrderStatus, PaymentMethod, PaymentStatus, TableNumber, UserId};
use domain::{LineItem, Menu, MenuItem, Money, Order, PaymentRecord, PlaceOrder};
use serial_test::serial;
use sqlx::PgPool;
use store::{OrderStore, PaymentStore, PostgresOrderStore, PostgresPaymentStore, StoreError};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_and_payments.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh pool with cleared tables
async fn get_test_pool() -> PgPool {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE orders, payments")
        .execute(&pool)
        .await
        .unwrap();

    pool
}

fn new_order() -> Order {
    Order::place(
        OrderId::new(),
        PlaceOrder {
            table_number: TableNumber::from("5"),
            user_id: UserId::from("guest-1"),
            email: Some("guest@example.com".to_string()),
            payment_method: PaymentMethod::Online,
            items: vec![LineItem::new(1, 2), LineItem::new(2, 1)],
        },
        &Menu::new([
            MenuItem::new(1, "Pierogi", Money::from_minor(2599)),
            MenuItem::new(2, "Kompot", Money::from_minor(700)),
        ]),
    )
    .unwrap()
}

fn new_payment(order: &Order) -> PaymentRecord {
    PaymentRecord::new(
        order.id(),
        order.table_number().clone(),
        order.user_id().clone(),
        format!("PAYU-{}", order.id()),
        "https://pay.example/redirect",
    )
}

#[tokio::test]
#[serial]
async fn order_round_trips_through_postgres() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let order = new_order();

    store.insert(&order).await.unwrap();
    let loaded = store.get(order.id()).await.unwrap().unwrap();

    assert_eq!(loaded.id(), order.id());
    assert_eq!(loaded.status(), OrderStatus::Pending);
    assert_eq!(loaded.items(), order.items());
    assert_eq!(loaded.total().minor(), 2 * 2599 + 700);
    assert_eq!(loaded.email(), Some("guest@example.com"));
}

#[tokio::test]
#[serial]
async fn duplicate_order_insert_is_rejected() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let order = new_order();

    store.insert(&order).await.unwrap();
    let err = store.insert(&order).await.unwrap_err();

    assert!(matches!(err, StoreError::AlreadyExists { entity: "order", .. }));
}

#[tokio::test]
#[serial]
async fn order_cas_detects_concurrent_writer() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let order = new_order();
    store.insert(&order).await.unwrap();

    // Webhook wins the race.
    store
        .compare_and_set_status(order.id(), OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap();

    // Cancel validated against the stale pending status loses.
    let err = store
        .compare_and_set_status(order.id(), OrderStatus::Pending, OrderStatus::Cancelled)
        .await
        .unwrap_err();

    match err {
        StoreError::StatusConflict { actual, .. } => assert_eq!(actual, "paid"),
        other => panic!("expected conflict, got {other:?}"),
    }
    let stored = store.get(order.id()).await.unwrap().unwrap();
    assert_eq!(stored.status(), OrderStatus::Paid);
}

#[tokio::test]
#[serial]
async fn order_cas_on_missing_order_is_not_found() {
    let store = PostgresOrderStore::new(get_test_pool().await);

    let err = store
        .compare_and_set_status(OrderId::new(), OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap_err();

    assert!(matches!(err, StoreError::NotFound { .. }));
}

#[tokio::test]
#[serial]
async fn list_by_status_filters_orders() {
    let store = PostgresOrderStore::new(get_test_pool().await);
    let pending = new_order();
    let paid = new_order();
    store.insert(&pending).await.unwrap();
    store.insert(&paid).await.unwrap();
    store
        .compare_and_set_status(paid.id(), OrderStatus::Pending, OrderStatus::Paid)
        .await
        .unwrap();

    let listed = store
        .list_by_status(&[OrderStatus::Paid, OrderStatus::Ready])
        .await
        .unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].id(), paid.id());
}

#[tokio::test]
#[serial]
async fn payment_lookups_and_cas() {
    let pool = get_test_pool().await;
    let store = PostgresPaymentStore::new(pool);
    let order = new_order();
    let record = new_payment(&order);
    store.insert(&record).await.unwrap();

    let by_payu = store
        .get_by_payu_order_id(&format!("PAYU-{}", order.id()))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(by_payu.status, PaymentStatus::New);

    assert!(
        store
            .find_for_compensation(order.id(), order.table_number(), &UserId::from("other"))
            .await
            .unwrap()
            .is_none()
    );

    let updated = store
        .compare_and_set_status(order.id(), PaymentStatus::New, PaymentStatus::Completed)
        .await
        .unwrap();
    assert_eq!(updated.status, PaymentStatus::Completed);

    let err = store
        .compare_and_set_status(order.id(), PaymentStatus::New, PaymentStatus::Cancelled)
        .await
        .unwrap_err();
    assert!(err.is_conflict());
}

#[tokio::test]
#[serial]
async fn payment_is_unique_per_order() {
    let store = PostgresPaymentStore::new(get_test_pool().await);
    let order = new_order();
    store.insert(&new_payment(&order)).await.unwrap();

    let err = store.insert(&new_payment(&order)).await.unwrap_err();

    assert!(matches!(err, StoreError::AlreadyExists { entity: "payment", .. }));
}

#[tokio::test]
#[serial]
async fn failed_compensations_are_listed_for_reconciliation() {
    let store = PostgresPaymentStore::new(get_test_pool().await);
    let order = new_order();
    store.insert(&new_payment(&order)).await.unwrap();
    store
        .compare_and_set_status(
            order.id(),
            PaymentStatus::New,
            PaymentStatus::CancellationFailedPayu,
        )
        .await
        .unwrap();

    let listed = store.list_needing_reconciliation().await.unwrap();

    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].status, PaymentStatus::CancellationFailedPayu);
}
