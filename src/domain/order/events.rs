use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::cqrs::IntegrationEvent;
use super::aggregate::Order;
use super::value_objects::OrderStatus;

// ============================================================================
// Topics
// ============================================================================

pub const ORDER_CREATED_TOPIC: &str = "order-created";
pub const ORDER_STATUS_UPDATED_TOPIC: &str = "order-status-updated";
pub const PAYMENT_UPDATED_TOPIC: &str = "payment-updated";
pub const SALE_CREATED_TOPIC: &str = "sale-created";

/// Topics the broker consumer subscribes to.
pub const CONSUMED_TOPICS: [&str; 3] = [
    ORDER_CREATED_TOPIC,
    PAYMENT_UPDATED_TOPIC,
    ORDER_STATUS_UPDATED_TOPIC,
];

// ============================================================================
// Domain Events - produced by the Order aggregate
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum OrderEvent {
    PaymentRecorded { payment_id: Uuid },
    StatusChanged { from: OrderStatus, to: OrderStatus },
}

// ============================================================================
// order-created
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub total_price: Decimal,
    pub items: Vec<OrderCreatedItem>,
    pub address: OrderCreatedAddress,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_price: Decimal,
    pub product_quantity: i64,
    pub shipping_cost: Decimal,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreatedAddress {
    pub id: Uuid,
    pub order_id: Uuid,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    #[serde(default)]
    pub note: String,
}

impl OrderCreatedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            total_price: order.total_price,
            items: order
                .items
                .iter()
                .map(|item| OrderCreatedItem {
                    id: item.id,
                    order_id: order.id,
                    product_id: item.product_id,
                    product_price: item.product_price,
                    product_quantity: item.product_quantity,
                    shipping_cost: item.shipping_cost,
                    note: item.note.clone(),
                })
                .collect(),
            address: OrderCreatedAddress {
                id: order.address.id,
                order_id: order.id,
                street: order.address.street.clone(),
                city: order.address.city.clone(),
                state: order.address.state.clone(),
                zipcode: order.address.zipcode.clone(),
                note: order.address.note.clone(),
            },
            created_at: order.created_at,
        }
    }
}

impl IntegrationEvent for OrderCreatedEvent {
    const TOPIC: &'static str = ORDER_CREATED_TOPIC;

    fn event_type() -> &'static str {
        "OrderCreated"
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

// ============================================================================
// payment-updated (consumed; published by the payment service)
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentUpdatedEvent {
    pub payment_id: Uuid,
    pub order_id: Uuid,
    #[serde(default)]
    pub image_url: String,
    pub status: String,
    #[serde(default, alias = "adminNote")]
    pub note: String,
}

impl IntegrationEvent for PaymentUpdatedEvent {
    const TOPIC: &'static str = PAYMENT_UPDATED_TOPIC;

    fn event_type() -> &'static str {
        "PaymentUpdated"
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

// ============================================================================
// order-status-updated
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusUpdatedEvent {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

impl IntegrationEvent for OrderStatusUpdatedEvent {
    const TOPIC: &'static str = ORDER_STATUS_UPDATED_TOPIC;

    fn event_type() -> &'static str {
        "OrderStatusUpdated"
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}

// ============================================================================
// sale-created
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleCreatedEvent {
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<SaleCreatedItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SaleCreatedItem {
    pub product_id: Uuid,
    pub quantity: i64,
}

impl SaleCreatedEvent {
    pub fn from_order(order: &Order) -> Self {
        Self {
            order_id: order.id,
            user_id: order.user_id,
            items: order
                .items
                .iter()
                .map(|item| SaleCreatedItem {
                    product_id: item.product_id,
                    quantity: item.product_quantity,
                })
                .collect(),
        }
    }
}

impl IntegrationEvent for SaleCreatedEvent {
    const TOPIC: &'static str = SALE_CREATED_TOPIC;

    fn event_type() -> &'static str {
        "SaleCreated"
    }

    fn key(&self) -> String {
        self.order_id.to_string()
    }
}
