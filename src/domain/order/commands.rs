use rust_decimal::Decimal;
use uuid::Uuid;

use super::value_objects::{OrderStatus, PaymentStatus};

// ============================================================================
// Order Commands - Represent user intent
// ============================================================================

/// Placement request after HTTP binding, before ids are allocated.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    pub user_id: Uuid,
    pub items: Vec<PlaceOrderItem>,
    pub address: PlaceOrderAddress,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderItem {
    pub product_id: Uuid,
    pub quantity: i64,
    /// Unit price as sent by the client.
    pub price: Decimal,
    pub note: String,
}

#[derive(Debug, Clone)]
pub struct PlaceOrderAddress {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    pub note: String,
}

/// Mutations of an existing order.
#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Payment service reported a decision. `status` is `None` for decisions
    /// this service does not act on; the payment id is still recorded.
    RecordPayment {
        payment_id: Uuid,
        status: Option<PaymentStatus>,
    },
    ChangeStatus {
        target: OrderStatus,
    },
}
