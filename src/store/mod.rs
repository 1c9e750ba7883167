use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use std::time::Duration;
use uuid::Uuid;

use crate::domain::order::{Order, OrderStatus, OrderView, ViewFilter, ViewUpdate, ViewWrite};
use crate::errors::ServiceResult;

// ============================================================================
// Store Adapters
// ============================================================================
//
// - command_store: authoritative orders (Postgres, command schema)
// - view_store:    denormalized projection (Postgres, query schema)
// - expiry_store:  per-order TTL keys and expiration events (Redis)
//
// Use cases depend on the traits below; the Postgres/Redis types are only
// named during wiring in `main`.
//
// ============================================================================

pub mod command_store;
pub mod expiry_store;
pub mod postgres;
pub mod view_store;

pub use command_store::PgOrderCommandStore;
pub use expiry_store::RedisOrderExpiryStore;
pub use view_store::PgOrderViewStore;

/// Compare-and-set update of an order row.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderChange {
    pub order_id: Uuid,
    /// Status the row must still have for the update to apply.
    pub expected_status: OrderStatus,
    pub status: OrderStatus,
    pub payment_id: Option<Uuid>,
    pub updated_at: DateTime<Utc>,
}

#[async_trait]
pub trait OrderCommandStore: Send + Sync {
    /// Persist order, items and address atomically.
    async fn insert(&self, order: &Order) -> ServiceResult<()>;

    async fn find(&self, order_id: Uuid) -> ServiceResult<Option<Order>>;

    /// Apply `change`; `false` when the row no longer has the expected status.
    async fn update(&self, change: &OrderChange) -> ServiceResult<bool>;

    /// Pending orders created before `cutoff`, oldest first.
    async fn find_pending_created_before(
        &self,
        cutoff: DateTime<Utc>,
        limit: i64,
    ) -> ServiceResult<Vec<Uuid>>;
}

#[async_trait]
pub trait OrderViewStore: Send + Sync {
    /// Insert a materialized view with any buffered updates folded in.
    /// Returns the stored view, or `None` when one already exists for the order.
    async fn insert(&self, view: &OrderView) -> ServiceResult<Option<OrderView>>;

    /// Apply `update` to the order's view, or buffer it when the view row
    /// does not exist yet.
    async fn apply(&self, update: &ViewUpdate) -> ServiceResult<ViewWrite>;

    async fn find_by_order_id(&self, order_id: Uuid) -> ServiceResult<Option<OrderView>>;

    /// Matching views, most recent first.
    async fn list(&self, filter: ViewFilter) -> ServiceResult<Vec<OrderView>>;
}

#[async_trait]
pub trait OrderExpiryStore: Send + Sync {
    async fn register(&self, order_id: Uuid, ttl: Duration) -> ServiceResult<()>;

    async fn remove(&self, order_id: Uuid) -> ServiceResult<()>;

    /// Remaining time to live, `None` when the key is absent.
    async fn remaining(&self, order_id: Uuid) -> ServiceResult<Option<Duration>>;

    /// Names of keys as they expire.
    async fn expirations(&self) -> ServiceResult<BoxStream<'static, String>>;
}

const EXPIRY_KEY_PREFIX: &str = "order:";

pub fn expiry_key(order_id: Uuid) -> String {
    format!("{}{}", EXPIRY_KEY_PREFIX, order_id)
}

/// Recover the order id from an expired key name; other keys yield `None`.
pub fn order_id_from_key(key: &str) -> Option<Uuid> {
    key.strip_prefix(EXPIRY_KEY_PREFIX)
        .and_then(|raw| Uuid::parse_str(raw).ok())
}
