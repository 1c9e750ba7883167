use rust_decimal::Decimal;

use super::value_objects::OrderStatus;

// ============================================================================
// Order Business Rule Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("order items cannot be empty")]
    EmptyItems,

    #[error("invalid item quantity: {0}")]
    InvalidQuantity(i64),

    #[error("invalid item price: {0}")]
    InvalidPrice(Decimal),

    #[error("invalid shipping cost: {0}")]
    InvalidShippingCost(Decimal),

    #[error("address zipcode is required")]
    MissingZipcode,

    #[error("no item at position {0}")]
    UnknownItem(usize),

    #[error("total price {actual} does not match items ({expected})")]
    TotalMismatch { expected: Decimal, actual: Decimal },

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("unknown order status: {0}")]
    UnknownStatus(String),
}
