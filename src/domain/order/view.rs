use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::value_objects::{OrderStatus, PaymentStatus};

// ============================================================================
// Order View - denormalized read model
// ============================================================================
//
// Owned by the query side. It references the authoritative order through
// `order_id` and carries its own `id` so the projection can be rebuilt or
// reshaped without touching the command store.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub payment_id: Option<Uuid>,
    pub payment_status: PaymentStatus,
    pub payment_image_url: String,
    pub payment_admin_note: String,
    pub items: Vec<OrderItemView>,
    pub address: OrderAddressView,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderItemView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_name: String,
    pub product_price: Decimal,
    pub product_quantity: i64,
    pub product_image_url: String,
    pub product_description: String,
    pub product_category_id: Option<Uuid>,
    pub product_category_name: String,
    pub shipping_cost: Decimal,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderAddressView {
    pub id: Uuid,
    pub order_id: Uuid,
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Product record used to enrich view items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDetails {
    pub id: Uuid,
    #[serde(default)]
    pub sku: String,
    pub name: String,
    #[serde(default)]
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    pub price: Decimal,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub category_name: String,
}

/// Payment columns written onto a view row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentViewUpdate {
    pub order_id: Uuid,
    pub payment_id: Uuid,
    /// `None` keeps the stored payment status.
    pub payment_status: Option<PaymentStatus>,
    pub image_url: String,
    pub admin_note: String,
    pub updated_at: DateTime<Utc>,
}

/// Status column written onto a view row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusViewUpdate {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub updated_at: DateTime<Utc>,
}

/// A change to an existing view row.
///
/// Updates for an order whose view is not materialized yet are buffered
/// by the store and folded in, in arrival order, when the view is inserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ViewUpdate {
    Payment(PaymentViewUpdate),
    Status(StatusViewUpdate),
}

impl ViewUpdate {
    pub fn order_id(&self) -> Uuid {
        match self {
            ViewUpdate::Payment(update) => update.order_id,
            ViewUpdate::Status(update) => update.order_id,
        }
    }
}

/// Where a view update ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewWrite {
    Applied,
    /// No view row yet; held until the order's view is materialized.
    Buffered,
}

impl OrderView {
    pub fn apply(&mut self, update: &ViewUpdate) {
        match update {
            ViewUpdate::Payment(payment) => {
                self.payment_id = Some(payment.payment_id);
                if let Some(status) = payment.payment_status {
                    self.payment_status = status;
                }
                self.payment_image_url = payment.image_url.clone();
                self.payment_admin_note = payment.admin_note.clone();
                self.updated_at = payment.updated_at;
            }
            ViewUpdate::Status(change) => {
                self.status = change.status;
                self.updated_at = change.updated_at;
            }
        }
    }
}

/// Read selectors supported by the view store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewFilter {
    All,
    User(Uuid),
    Payment(Uuid),
    Status(OrderStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_view(order_id: Uuid) -> OrderView {
        let now = Utc::now();
        OrderView {
            id: Uuid::now_v7(),
            order_id,
            user_id: Uuid::now_v7(),
            status: OrderStatus::Pending,
            total_price: Decimal::new(2350, 2),
            payment_id: None,
            payment_status: PaymentStatus::Pending,
            payment_image_url: String::new(),
            payment_admin_note: String::new(),
            items: Vec::new(),
            address: OrderAddressView {
                id: Uuid::now_v7(),
                order_id,
                street: "350 5th Ave".to_string(),
                city: "New York".to_string(),
                state: "NY".to_string(),
                zipcode: "10001".to_string(),
                note: String::new(),
                created_at: now,
                updated_at: now,
            },
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_apply_in_arrival_order() {
        let order_id = Uuid::now_v7();
        let mut view = empty_view(order_id);
        let payment_id = Uuid::now_v7();

        let updates = [
            ViewUpdate::Status(StatusViewUpdate {
                order_id,
                status: OrderStatus::PaymentAccepted,
                updated_at: Utc::now(),
            }),
            ViewUpdate::Payment(PaymentViewUpdate {
                order_id,
                payment_id,
                payment_status: None,
                image_url: "https://cdn.example.com/receipt.png".to_string(),
                admin_note: String::new(),
                updated_at: Utc::now(),
            }),
            ViewUpdate::Status(StatusViewUpdate {
                order_id,
                status: OrderStatus::OnDelivery,
                updated_at: Utc::now(),
            }),
        ];
        for update in &updates {
            view.apply(update);
        }

        assert_eq!(view.status, OrderStatus::OnDelivery);
        assert_eq!(view.payment_id, Some(payment_id));
        // An unrecognized payment status leaves the stored one alone.
        assert_eq!(view.payment_status, PaymentStatus::Pending);
        assert_eq!(view.payment_image_url, "https://cdn.example.com/receipt.png");
    }

    #[test]
    fn test_buffered_update_is_tagged_by_kind() {
        let update = ViewUpdate::Status(StatusViewUpdate {
            order_id: Uuid::nil(),
            status: OrderStatus::Rejected,
            updated_at: Utc::now(),
        });

        let encoded = serde_json::to_value(&update).unwrap();
        assert_eq!(encoded["kind"], "status");
        assert_eq!(encoded["status"], "REJECTED");

        let decoded: ViewUpdate = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded, update);
    }
}
