use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgPool, Postgres};
use sqlx::Transaction;
use std::collections::HashMap;
use uuid::Uuid;

use crate::domain::order::{
    OrderAddressView, OrderItemView, OrderStatus, OrderView, PaymentStatus, ViewFilter, ViewUpdate, ViewWrite,
};
use crate::errors::{ServiceError, ServiceResult};
use super::OrderViewStore;

// ============================================================================
// View Store - read projection in Postgres
// ============================================================================
//
// Reads select the matching view rows first, then load items and addresses
// for exactly those orders and stitch them together in memory, keeping the
// row order (most recent first) of the first query.
//
// Updates that reach an order before its view row exists are parked in
// `pending_view_updates` and folded in by the insert. Both paths hold a
// per-order advisory lock, so an update cannot slip in between the two.
//
// ============================================================================

const VIEW_COLUMNS: &str = "id, order_id, user_id, status, total_price, payment_id, payment_status, \
                            payment_image_url, payment_admin_note, created_at, updated_at";

pub struct PgOrderViewStore {
    pool: PgPool,
}

impl PgOrderViewStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn load(&self, rows: Vec<OrderViewRow>) -> ServiceResult<Vec<OrderView>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let order_ids: Vec<Uuid> = rows.iter().map(|row| row.order_id).collect();

        let items: Vec<OrderItemViewRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, product_id, product_name, product_price, product_quantity,
                   product_image_url, product_description, product_category_id,
                   product_category_name, shipping_cost, note, created_at, updated_at
            FROM order_items_view
            WHERE order_id = ANY($1) AND deleted_at IS NULL
            ORDER BY order_id, line_no
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("load view items", e))?;

        let addresses: Vec<OrderAddressViewRow> = sqlx::query_as(
            r#"
            SELECT id, order_id, street, city, state, zip_code, note, created_at, updated_at
            FROM order_addresses_view
            WHERE order_id = ANY($1) AND deleted_at IS NULL
            "#,
        )
        .bind(&order_ids)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ServiceError::persistence("load view addresses", e))?;

        assemble(rows, items, addresses)
    }
}

// ============================================================================
// Rows
// ============================================================================

#[derive(sqlx::FromRow)]
struct OrderViewRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    status: String,
    total_price: Decimal,
    payment_id: Option<Uuid>,
    payment_status: String,
    payment_image_url: String,
    payment_admin_note: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderItemViewRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    product_name: String,
    product_price: Decimal,
    product_quantity: i64,
    product_image_url: String,
    product_description: String,
    product_category_id: Option<Uuid>,
    product_category_name: String,
    shipping_cost: Decimal,
    note: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct OrderAddressViewRow {
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

fn assemble(
    rows: Vec<OrderViewRow>,
    items: Vec<OrderItemViewRow>,
    addresses: Vec<OrderAddressViewRow>,
) -> ServiceResult<Vec<OrderView>> {
    let mut items_by_order: HashMap<Uuid, Vec<OrderItemView>> = HashMap::new();
    for row in items {
        items_by_order.entry(row.order_id).or_default().push(OrderItemView {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            product_name: row.product_name,
            product_price: row.product_price,
            product_quantity: row.product_quantity,
            product_image_url: row.product_image_url,
            product_description: row.product_description,
            product_category_id: row.product_category_id,
            product_category_name: row.product_category_name,
            shipping_cost: row.shipping_cost,
            note: row.note,
            created_at: row.created_at,
            updated_at: row.updated_at,
        });
    }

    let mut address_by_order: HashMap<Uuid, OrderAddressView> = addresses
        .into_iter()
        .map(|row| {
            (
                row.order_id,
                OrderAddressView {
                    id: row.id,
                    order_id: row.order_id,
                    street: row.street,
                    city: row.city,
                    state: row.state,
                    zipcode: row.zip_code,
                    note: row.note,
                    created_at: row.created_at,
                    updated_at: row.updated_at,
                },
            )
        })
        .collect();

    rows.into_iter()
        .map(|row| {
            let address = address_by_order.remove(&row.order_id).ok_or_else(|| {
                ServiceError::Persistence(format!("view for order {} has no address", row.order_id))
            })?;
            let status: OrderStatus = row
                .status
                .parse()
                .map_err(|e| ServiceError::persistence("decode view status", e))?;
            let payment_status = PaymentStatus::from_wire(&row.payment_status).ok_or_else(|| {
                ServiceError::Persistence(format!("unknown payment status {}", row.payment_status))
            })?;

            Ok(OrderView {
                id: row.id,
                order_id: row.order_id,
                user_id: row.user_id,
                status,
                total_price: row.total_price,
                payment_id: row.payment_id,
                payment_status,
                payment_image_url: row.payment_image_url,
                payment_admin_note: row.payment_admin_note,
                items: items_by_order.remove(&row.order_id).unwrap_or_default(),
                address,
                created_at: row.created_at,
                updated_at: row.updated_at,
            })
        })
        .collect()
}

// ============================================================================
// Trait Implementation
// ============================================================================

/// Serialize writers of one order's view rows and buffered updates.
async fn lock_order(tx: &mut Transaction<'_, Postgres>, order_id: Uuid) -> ServiceResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
        .bind(order_id.to_string())
        .execute(&mut **tx)
        .await
        .map_err(|e| ServiceError::persistence("lock order view", e))?;
    Ok(())
}

async fn update_row(tx: &mut Transaction<'_, Postgres>, update: &ViewUpdate) -> ServiceResult<u64> {
    let result = match update {
        ViewUpdate::Payment(payment) => sqlx::query(
            r#"
            UPDATE orders_view
            SET payment_id = $1,
                payment_status = COALESCE($2, payment_status),
                payment_image_url = $3,
                payment_admin_note = $4,
                updated_at = $5
            WHERE order_id = $6 AND deleted_at IS NULL
            "#,
        )
        .bind(payment.payment_id)
        .bind(payment.payment_status.map(|status| status.as_str()))
        .bind(&payment.image_url)
        .bind(&payment.admin_note)
        .bind(payment.updated_at)
        .bind(payment.order_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| ServiceError::persistence("update view payment", e))?,
        ViewUpdate::Status(change) => sqlx::query(
            "UPDATE orders_view SET status = $1, updated_at = $2 WHERE order_id = $3 AND deleted_at IS NULL",
        )
        .bind(change.status.as_str())
        .bind(change.updated_at)
        .bind(change.order_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| ServiceError::persistence("update view status", e))?,
    };
    Ok(result.rows_affected())
}

// ============================================================================
// Trait Implementation
// ============================================================================

#[async_trait]
impl OrderViewStore for PgOrderViewStore {
    async fn insert(&self, view: &OrderView) -> ServiceResult<Option<OrderView>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ServiceError::persistence("begin view transaction", e))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL READ COMMITTED")
            .execute(&mut *tx)
            .await?;
        lock_order(&mut tx, view.order_id).await?;

        let buffered: Vec<(String,)> =
            sqlx::query_as("SELECT payload FROM pending_view_updates WHERE order_id = $1 ORDER BY seq")
                .bind(view.order_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| ServiceError::persistence("load buffered view updates", e))?;

        let mut view = view.clone();
        for (payload,) in &buffered {
            let update: ViewUpdate = serde_json::from_str(payload)
                .map_err(|e| ServiceError::persistence("decode buffered view update", e))?;
            view.apply(&update);
        }

        let inserted = sqlx::query(
            r#"
            INSERT INTO orders_view (
                id, order_id, user_id, status, total_price, payment_id, payment_status,
                payment_image_url, payment_admin_note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (order_id) DO NOTHING
            "#,
        )
        .bind(view.id)
        .bind(view.order_id)
        .bind(view.user_id)
        .bind(view.status.as_str())
        .bind(view.total_price)
        .bind(view.payment_id)
        .bind(view.payment_status.as_str())
        .bind(&view.payment_image_url)
        .bind(&view.payment_admin_note)
        .bind(view.created_at)
        .bind(view.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ServiceError::persistence("insert order view", e))?
        .rows_affected();

        if inserted == 0 {
            tx.rollback()
                .await
                .map_err(|e| ServiceError::persistence("rollback view transaction", e))?;
            return Ok(None);
        }

        for (line_no, item) in view.items.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO order_items_view (
                    id, order_id, line_no, product_id, product_name, product_price,
                    product_quantity, product_image_url, product_description,
                    product_category_id, product_category_name, shipping_cost, note,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                "#,
            )
            .bind(item.id)
            .bind(view.order_id)
            .bind(line_no as i32)
            .bind(item.product_id)
            .bind(&item.product_name)
            .bind(item.product_price)
            .bind(item.product_quantity)
            .bind(&item.product_image_url)
            .bind(&item.product_description)
            .bind(item.product_category_id)
            .bind(&item.product_category_name)
            .bind(item.shipping_cost)
            .bind(&item.note)
            .bind(item.created_at)
            .bind(item.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(|e| ServiceError::persistence("insert view item", e))?;
        }

        let address = &view.address;
        sqlx::query(
            r#"
            INSERT INTO order_addresses_view (
                id, order_id, street, city, state, zip_code, note, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(address.id)
        .bind(view.order_id)
        .bind(&address.street)
        .bind(&address.city)
        .bind(&address.state)
        .bind(&address.zipcode)
        .bind(&address.note)
        .bind(address.created_at)
        .bind(address.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| ServiceError::persistence("insert view address", e))?;

        if !buffered.is_empty() {
            sqlx::query("DELETE FROM pending_view_updates WHERE order_id = $1")
                .bind(view.order_id)
                .execute(&mut *tx)
                .await
                .map_err(|e| ServiceError::persistence("drain buffered view updates", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| ServiceError::persistence("commit view transaction", e))?;
        Ok(Some(view))
    }

    async fn apply(&self, update: &ViewUpdate) -> ServiceResult<ViewWrite> {
        let order_id = update.order_id();
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ServiceError::persistence("begin view transaction", e))?;
        lock_order(&mut tx, order_id).await?;

        let write = if update_row(&mut tx, update).await? > 0 {
            ViewWrite::Applied
        } else {
            let payload = serde_json::to_string(update)
                .map_err(|e| ServiceError::persistence("encode view update", e))?;
            sqlx::query("INSERT INTO pending_view_updates (order_id, payload, received_at) VALUES ($1, $2, $3)")
                .bind(order_id)
                .bind(payload)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await
                .map_err(|e| ServiceError::persistence("buffer view update", e))?;
            ViewWrite::Buffered
        };

        tx.commit()
            .await
            .map_err(|e| ServiceError::persistence("commit view transaction", e))?;
        Ok(write)
    }

    async fn find_by_order_id(&self, order_id: Uuid) -> ServiceResult<Option<OrderView>> {
        let sql = format!(
            "SELECT {} FROM orders_view WHERE order_id = $1 AND deleted_at IS NULL",
            VIEW_COLUMNS
        );
        let rows: Vec<OrderViewRow> = sqlx::query_as(&sql)
            .bind(order_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ServiceError::persistence("load order view", e))?;

        Ok(self.load(rows).await?.into_iter().next())
    }

    async fn list(&self, filter: ViewFilter) -> ServiceResult<Vec<OrderView>> {
        let clause = match filter {
            ViewFilter::All => "",
            ViewFilter::User(_) => " AND user_id = $1",
            ViewFilter::Payment(_) => " AND payment_id = $1",
            ViewFilter::Status(_) => " AND status = $1",
        };
        let sql = format!(
            "SELECT {} FROM orders_view WHERE deleted_at IS NULL{} ORDER BY created_at DESC, id DESC",
            VIEW_COLUMNS, clause
        );

        let query = sqlx::query_as::<_, OrderViewRow>(&sql);
        let query = match filter {
            ViewFilter::All => query,
            ViewFilter::User(id) | ViewFilter::Payment(id) => query.bind(id),
            ViewFilter::Status(status) => query.bind(status.as_str()),
        };

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| ServiceError::persistence("list order views", e))?;

        self.load(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn view_row(order_id: Uuid, status: &str) -> OrderViewRow {
        let now = Utc::now();
        OrderViewRow {
            id: Uuid::now_v7(),
            order_id,
            user_id: Uuid::now_v7(),
            status: status.to_string(),
            total_price: Decimal::new(2350, 2),
            payment_id: None,
            payment_status: "PENDING".to_string(),
            payment_image_url: String::new(),
            payment_admin_note: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn item_row(order_id: Uuid, name: &str) -> OrderItemViewRow {
        let now = Utc::now();
        OrderItemViewRow {
            id: Uuid::now_v7(),
            order_id,
            product_id: Uuid::now_v7(),
            product_name: name.to_string(),
            product_price: Decimal::TEN,
            product_quantity: 1,
            product_image_url: String::new(),
            product_description: String::new(),
            product_category_id: None,
            product_category_name: String::new(),
            shipping_cost: Decimal::ZERO,
            note: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    fn address_row(order_id: Uuid) -> OrderAddressViewRow {
        let now = Utc::now();
        OrderAddressViewRow {
            id: Uuid::now_v7(),
            order_id,
            street: "1 Main St".to_string(),
            city: "New York".to_string(),
            state: "NY".to_string(),
            zip_code: "10001".to_string(),
            note: String::new(),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_assemble_groups_items_and_keeps_row_order() {
        let newer = Uuid::now_v7();
        let older = Uuid::now_v7();

        let views = assemble(
            vec![view_row(newer, "PENDING"), view_row(older, "DELIVERED")],
            vec![
                item_row(older, "mug"),
                item_row(newer, "lamp"),
                item_row(newer, "desk"),
            ],
            vec![address_row(older), address_row(newer)],
        )
        .unwrap();

        assert_eq!(views.len(), 2);
        assert_eq!(views[0].order_id, newer);
        assert_eq!(views[0].status, OrderStatus::Pending);
        let names: Vec<&str> = views[0].items.iter().map(|i| i.product_name.as_str()).collect();
        assert_eq!(names, vec!["lamp", "desk"]);
        assert_eq!(views[1].items.len(), 1);
        assert_eq!(views[1].address.zipcode, "10001");
        assert_eq!(views[1].status, OrderStatus::Delivered);
    }

    #[test]
    fn test_assemble_rejects_view_without_address() {
        let order_id = Uuid::now_v7();
        let result = assemble(vec![view_row(order_id, "PENDING")], vec![], vec![]);
        assert!(matches!(result, Err(ServiceError::Persistence(_))));
    }

    #[test]
    fn test_assemble_rejects_unknown_status() {
        let order_id = Uuid::now_v7();
        let result = assemble(vec![view_row(order_id, "SHIPPED")], vec![], vec![address_row(order_id)]);
        assert!(matches!(result, Err(ServiceError::Persistence(_))));
    }
}
