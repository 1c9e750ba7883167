use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::order::{PlaceOrder, PlaceOrderAddress, PlaceOrderItem};

// ============================================================================
// Request bodies
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PlaceOrderRequest {
    pub items: Vec<PlaceOrderItemRequest>,
    pub address: AddressRequest,
}

#[derive(Debug, Deserialize)]
pub struct PlaceOrderItemRequest {
    pub product_id: Uuid,
    pub quantity: i64,
    pub price: Decimal,
    #[serde(default)]
    pub note: String,
}

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zipcode: String,
    #[serde(default)]
    pub note: String,
}

impl PlaceOrderRequest {
    pub fn into_command(self, user_id: Uuid) -> PlaceOrder {
        PlaceOrder {
            user_id,
            items: self
                .items
                .into_iter()
                .map(|item| PlaceOrderItem {
                    product_id: item.product_id,
                    quantity: item.quantity,
                    price: item.price,
                    note: item.note,
                })
                .collect(),
            address: PlaceOrderAddress {
                street: self.address.street,
                city: self.address.city,
                state: self.address.state,
                zipcode: self.address.zipcode,
                note: self.address.note,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdateRequest {
    pub status: String,
}

/// Optional selectors for `GET /v1/orders`.
#[derive(Debug, Default, Deserialize)]
pub struct ListOrdersQuery {
    pub status: Option<String>,
    pub payment_id: Option<Uuid>,
}

// ============================================================================
// Responses
// ============================================================================

/// Success envelope shared by every order endpoint.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub data: Option<T>,
    pub message: &'static str,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn created(data: T) -> Self {
        Self {
            code: 201,
            data: Some(data),
            message: "order created",
        }
    }

    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            data: Some(data),
            message: "success",
        }
    }
}

impl ApiResponse<()> {
    pub fn updated() -> Self {
        Self {
            code: 200,
            data: None,
            message: "order updated",
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TtlResponse {
    pub ttl_seconds: u64,
}
