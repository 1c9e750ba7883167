use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::PgPool;
use uuid::Uuid;

use crate::domain::order::{Order, OrderAddress, OrderItem, OrderStatus};
use crate::errors::{ServiceError, ServiceResult};
use super::{OrderChange, OrderCommandStore};

// ============================================================================
// Command Store - authoritative orders in Postgres
// ============================================================================

pub struct PgOrderCommandStore {
    pool: PgPool,
}

impl PgOrderCommandStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    total_price: Decimal,
    payment_id: Option<Uuid>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    deleted_at: Option<DateTime<Utc>>,
}

#[derive(sqlx::FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_price: Decimal,
    product_quantity: i64,
    shipping_cost: Decimal,
    note: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderAddressRow {
    id: Uuid,
    order_id: Uuid,
    street: String,
    city: String,
    state: String,
    zip_code: String,
    note: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_price: row.product_price,
            product_quantity: row.product_quantity,
            shipping_cost: row.shipping_cost,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

impl From<OrderAddressRow> for OrderAddress {
    fn from(row: OrderAddressRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            street: row.street,
            city: row.city,
            state: row.state,
            zipcode: row.zip_code,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn parse_status(raw: &str) -> ServiceResult<OrderStatus> {
    raw.parse()
        .map_err(|e| ServiceError::persistence("decode order status", e))
}

#[async_trait]
impl OrderCommandStore for PgOrderCommandStore {
    async fn insert(&self, order: &Order) -> ServiceResult<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ServiceError::persistence("begin order transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            r#"
            INSERT INTO orders (id, user_id, status, total_price, payment_id, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.total_price)
        .bind(order.payment_id)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ServiceError::persistence("insert order", e))?;

        for (line_no, item) in order.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items (
                    id, order_id, line_no, product_id, product_price,
                    product_quantity, shipping_cost, note, created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                "#,
            )
            .bind(item.id)
            .bind(order.id)
            .bind(line_no as i32)
            .bind(item.product_id)
            .bind(item.product_price)
            .bind(item.product_quantity)
            .bind(item.shipping_cost)
            .bind(&item.note)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| ServiceError::persistence("insert order item", e))?;
        }

        let address = &order.address;
        sqlx::query(
            r#"
            INSERT INTO order_addresses (
                id, order_id, street, city, state, zip_code, note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(address.id)
        .bind(order.id)
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zipcode)
        .bind(&address.note)
        .bind(address.created_at)
        .bind(address.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ServiceError::persistence("insert order address", e))?;

        tx.commit()
            .await
            .map_err(|e| ServiceError::persistence("commit order transaction", e))?;

        tracing::debug!(order_id = %order.id, items = order.items.len(), "Order persisted");
        Ok(())
    }

    async fn find(&self, order_id: Uuid) -> ServiceResult<Option<Order>> {
        let row: Option<OrderRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, status, total_price, payment_id, created_at, updated_at, deleted_at
            FROM orders
            WHERE id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("load order", e))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let items: Vec<OrderItemRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, product_price, product_quantity,
                   shipping_cost, note, created_at, updated_at
            FROM order_items
            WHERE order_id = $1 AND deleted_at IS NULL
            ORDER BY line_no
            "#,
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("load order items", e))?;

        let address: OrderAddressRow = sqlx::query_as(
            r#"
            SELECT id, order_id, street, city, state, zip_code, note, created_at, updated_at
            FROM order_addresses
            WHERE order_id = $1 AND deleted_at IS NULL
            "#,
        )
        .bind(order_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("load order address", e))?;

        Ok(Some(Order {
            id: row.id,
            user_id: row.user_id,
            status: parse_status(&row.status)?,
            total_price: row.total_price,
            payment_id: row.payment_id,
            items: items.into_iter().map(OrderItem::from).collect(),
            address: address.into(),
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        }))
    }

    async fn update(&self, change: &OrderChange) -> ServiceResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $1, payment_id = COALESCE($2, payment_id), updated_at = $3
            WHERE id = $4 AND status = $5 AND deleted_at IS NULL
            "#,
        )
        .bind(change.status.as_str())
        .bind(change.payment_id)
        .bind(change.updated_at)
        .bind(change.order_id)
        .bind(change.expected_status.as_str())
        .execute(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("update order", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> ServiceResult<Vec<Uuid>> {
        let ids: Vec<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE status = $1 AND created_at < $2 AND deleted_at IS NULL
            ORDER BY created_at
            LIMIT $3
            "#,
        )
        .bind(OrderStatus::Pending.as_str())
        .bind(cutoff)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("scan stale pending orders", e))?;

        Ok(ids)
    }
}
