use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, OrderStatus, PaymentMethod, PaymentStatus, TableNumber, UserId};
use domain::{Order, OrderItem, PaymentRecord};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use crate::{
    Result, StoreError,
    store::{OrderStore, PaymentStore},
};

/// Runs the database migrations shared by both stores.
pub async fn run_migrations(pool: &PgPool) -> std::result::Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("../../migrations").run(pool).await
}

fn corrupt(entity: &'static str, id: impl ToString, reason: impl ToString) -> StoreError {
    StoreError::Corrupt {
        entity,
        id: id.to_string(),
        reason: reason.to_string(),
    }
}

/// PostgreSQL-backed order store.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let id = OrderId::from_uuid(row.try_get::<Uuid, _>("id")?);
        let status: String = row.try_get("status")?;
        let payment_method: String = row.try_get("payment_method")?;
        let items: serde_json::Value = row.try_get("items")?;
        let items: Vec<OrderItem> = serde_json::from_value(items)?;

        Ok(Order::restore(
            id,
            TableNumber::new(row.try_get::<String, _>("table_number")?),
            UserId::new(row.try_get::<String, _>("user_id")?),
            row.try_get("email")?,
            status
                .parse::<OrderStatus>()
                .map_err(|e| corrupt("order", id, e))?,
            payment_method
                .parse::<PaymentMethod>()
                .map_err(|e| corrupt("order", id, e))?,
            items,
            row.try_get::<DateTime<Utc>, _>("created_at")?,
            row.try_get::<DateTime<Utc>, _>("updated_at")?,
        ))
    }

    async fn current_status(&self, id: OrderId) -> Result<Option<String>> {
        Ok(
            sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await?,
        )
    }
}

const ORDER_COLUMNS: &str =
    "id, table_number, user_id, email, status, payment_method, items, created_at, updated_at";

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn insert(&self, order: &Order) -> Result<()> {
        let items = serde_json::to_value(order.items())?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, table_number, user_id, email, status, payment_method, items, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(order.id().as_uuid())
        .bind(order.table_number().as_str())
        .bind(order.user_id().as_str())
        .bind(order.email())
        .bind(order.status().as_str())
        .bind(order.payment_method().as_str())
        .bind(items)
        .bind(order.created_at())
        .bind(order.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return StoreError::AlreadyExists {
                    entity: "order",
                    id: order.id().to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>> {
        let row = sqlx::query(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?;

        row.map(Self::row_to_order).transpose()
    }

    async fn compare_and_set_status(
        &self,
        id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<Order> {
        let row = sqlx::query(&format!(
            "UPDATE orders SET status = $3, updated_at = NOW() \
             WHERE id = $1 AND status = $2 RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id.as_uuid())
        .bind(expected.as_str())
        .bind(new.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_order(row);
        }

        match self.current_status(id).await? {
            Some(actual) => {
                tracing::debug!(order_id = %id, %expected, %actual, "order status compare-and-set lost");
                Err(StoreError::StatusConflict {
                    entity: "order",
                    id: id.to_string(),
                    expected: expected.to_string(),
                    actual,
                })
            }
            None => Err(StoreError::NotFound {
                entity: "order",
                id: id.to_string(),
            }),
        }
    }

    async fn list_by_status(&self, statuses: &[OrderStatus]) -> Result<Vec<Order>> {
        let statuses: Vec<&str> = statuses.iter().map(OrderStatus::as_str).collect();
        let rows = sqlx::query(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = ANY($1) ORDER BY created_at ASC"
        ))
        .bind(statuses)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_order).collect()
    }
}

/// PostgreSQL-backed payment store.
#[derive(Clone)]
pub struct PostgresPaymentStore {
    pool: PgPool,
}

const PAYMENT_COLUMNS: &str = "order_id, table_number, user_id, payu_order_id, status, payment_link, created_at, updated_at";

impl PostgresPaymentStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn row_to_payment(row: PgRow) -> Result<PaymentRecord> {
        let order_id = OrderId::from_uuid(row.try_get::<Uuid, _>("order_id")?);
        let status: String = row.try_get("status")?;

        Ok(PaymentRecord {
            order_id,
            table_number: TableNumber::new(row.try_get::<String, _>("table_number")?),
            user_id: UserId::new(row.try_get::<String, _>("user_id")?),
            payu_order_id: row.try_get("payu_order_id")?,
            status: status
                .parse::<PaymentStatus>()
                .map_err(|e| corrupt("payment", order_id, e))?,
            payment_link: row.try_get("payment_link")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[async_trait]
impl PaymentStore for PostgresPaymentStore {
    async fn insert(&self, record: &PaymentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO payments (order_id, table_number, user_id, payu_order_id, status, payment_link, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(record.order_id.as_uuid())
        .bind(record.table_number.as_str())
        .bind(record.user_id.as_str())
        .bind(record.payu_order_id.as_deref())
        .bind(record.status.as_str())
        .bind(record.payment_link.as_deref())
        .bind(record.created_at)
        .bind(record.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("unique_payment_order")
            {
                return StoreError::AlreadyExists {
                    entity: "payment",
                    id: record.order_id.to_string(),
                };
            }
            StoreError::Database(e)
        })?;

        Ok(())
    }

    async fn get_by_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE order_id = $1"
        ))
        .bind(order_id.as_uuid())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn find_for_compensation(
        &self,
        order_id: OrderId,
        table_number: &TableNumber,
        user_id: &UserId,
    ) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments \
             WHERE order_id = $1 AND table_number = $2 AND user_id = $3"
        ))
        .bind(order_id.as_uuid())
        .bind(table_number.as_str())
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn get_by_payu_order_id(&self, payu_order_id: &str) -> Result<Option<PaymentRecord>> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE payu_order_id = $1"
        ))
        .bind(payu_order_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_payment).transpose()
    }

    async fn compare_and_set_status(
        &self,
        order_id: OrderId,
        expected: PaymentStatus,
        new: PaymentStatus,
    ) -> Result<PaymentRecord> {
        let row = sqlx::query(&format!(
            "UPDATE payments SET status = $3, updated_at = NOW() \
             WHERE order_id = $1 AND status = $2 RETURNING {PAYMENT_COLUMNS}"
        ))
        .bind(order_id.as_uuid())
        .bind(expected.as_str())
        .bind(new.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = row {
            return Self::row_to_payment(row);
        }

        let actual: Option<String> =
            sqlx::query_scalar("SELECT status FROM payments WHERE order_id = $1")
                .bind(order_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;

        match actual {
            Some(actual) => Err(StoreError::StatusConflict {
                entity: "payment",
                id: order_id.to_string(),
                expected: expected.to_string(),
                actual,
            }),
            None => Err(StoreError::NotFound {
                entity: "payment",
                id: order_id.to_string(),
            }),
        }
    }

    async fn list_needing_reconciliation(&self) -> Result<Vec<PaymentRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE status = ANY($1) ORDER BY updated_at ASC"
        ))
        .bind(vec![
            PaymentStatus::CancellationFailedPayu.as_str(),
            PaymentStatus::RefundFailedPayu.as_str(),
        ])
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_payment).collect()
    }
}
