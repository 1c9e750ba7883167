use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::domain::order::ProductDetails;
use crate::errors::ServiceResult;

// ============================================================================
// External Service Clients
// ============================================================================
//
// Interface-level contracts of the sibling services the order flow relies
// on. Every HTTP implementation goes through `http::ServiceClient`, which
// bounds each call with the configured timeout and a per-service circuit
// breaker.
//
// ============================================================================

pub mod http;
pub mod identity;
pub mod product;
pub mod shipping;
pub mod warehouse;

pub use http::{build_http_client, ServiceClient};
pub use identity::HttpTokenVerifier;
pub use product::HttpProductCatalog;
pub use shipping::HttpShippingCostClient;
pub use warehouse::HttpWarehouseClient;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockMovementItem {
    pub product_id: Uuid,
    pub quantity: i64,
    pub price: Decimal,
}

/// Stock leaving the warehouses for one order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StockMovement {
    pub items: Vec<StockMovementItem>,
    pub zipcode: String,
}

#[async_trait]
pub trait WarehouseClient: Send + Sync {
    /// Zipcode of the closest warehouse stocking `product_id`.
    async fn nearest_warehouse_zip(&self, token: &str, product_id: Uuid, zipcode: &str) -> ServiceResult<String>;

    /// Reserve stock; anything but `201 Created` is a failure.
    async fn move_out(&self, token: &str, movement: &StockMovement) -> ServiceResult<()>;
}

#[async_trait]
pub trait ShippingCostClient: Send + Sync {
    async fn shipping_cost(&self, from_zip: &str, to_zip: &str) -> ServiceResult<Decimal>;
}

#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn product(&self, token: Option<&str>, product_id: Uuid) -> ServiceResult<ProductDetails>;
}

/// Validates a bearer token and yields the user it belongs to.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> ServiceResult<Uuid>;
}
