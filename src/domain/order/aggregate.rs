use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

use crate::cqrs::Aggregate;
use super::commands::{OrderCommand, PlaceOrder};
use super::errors::OrderError;
use super::events::OrderEvent;
use super::value_objects::{to_money, OrderStatus};

// ============================================================================
// Order Aggregate - authoritative write model
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: OrderStatus,
    pub total_price: Decimal,
    pub payment_id: Option<Uuid>,
    pub items: Vec<OrderItem>,
    pub address: OrderAddress,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderItem {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub product_price: Decimal,
    pub product_quantity: i64,
    pub shipping_cost: Decimal,
    pub note: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderItem {
    pub fn subtotal(&self) -> Decimal {
        self.product_price * Decimal::from(self.product_quantity)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderAddress {
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

impl Order {
    /// Validate a placement request and build the pending order.
    ///
    /// Unit prices are rounded to cents so the stored order matches the
    /// order held in memory and published.
    ///
    /// All ids are allocated here, before any I/O, so callers can report
    /// them even when a later step fails. Shipping costs start at zero and
    /// are added with [`Order::record_shipping_cost`].
    pub fn place(command: PlaceOrder, now: DateTime<Utc>) -> Result<Self, OrderError> {
        if command.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        if command.address.zipcode.trim().is_empty() {
            return Err(OrderError::MissingZipcode);
        }

        let order_id = Uuid::now_v7();
        let mut items = Vec::with_capacity(command.items.len());

        for item in command.items {
            if item.quantity <= 0 {
                return Err(OrderError::InvalidQuantity(item.quantity));
            }
            if item.price.is_sign_negative() {
                return Err(OrderError::InvalidPrice(item.price));
            }

            items.push(OrderItem {
                id: Uuid::now_v7(),
                order_id,
                product_id: item.product_id,
                product_price: to_money(item.price),
                product_quantity: item.quantity,
                shipping_cost: Decimal::ZERO,
                note: item.note,
                created_at: now,
                updated_at: now,
            });
        }

        let address = OrderAddress {
            id: Uuid::now_v7(),
            order_id,
            street: command.address.street,
            city: command.address.city,
            state: command.address.state,
            zipcode: command.address.zipcode.trim().to_string(),
            note: command.address.note,
            created_at: now,
            updated_at: now,
        };

        let total_price = items.iter().map(OrderItem::subtotal).sum();

        Ok(Self {
            id: order_id,
            user_id: command.user_id,
            status: OrderStatus::Pending,
            total_price,
            payment_id: None,
            items,
            address,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    /// Store the shipping cost of one item, rounded to cents, and add it to the total.
    pub fn record_shipping_cost(&mut self, index: usize, cost: Decimal) -> Result<(), OrderError> {
        if cost.is_sign_negative() {
            return Err(OrderError::InvalidShippingCost(cost));
        }
        let cost = to_money(cost);
        let item = self.items.get_mut(index).ok_or(OrderError::UnknownItem(index))?;

        self.total_price -= item.shipping_cost;
        item.shipping_cost = cost;
        self.total_price += cost;
        Ok(())
    }

    /// Sum of item subtotals plus shipping.
    pub fn expected_total(&self) -> Decimal {
        self.items
            .iter()
            .map(|item| item.subtotal() + item.shipping_cost)
            .sum()
    }

    /// Check the structural invariants before the order is persisted.
    pub fn validate(&self) -> Result<(), OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::EmptyItems);
        }
        if let Some(item) = self.items.iter().find(|item| item.product_quantity <= 0) {
            return Err(OrderError::InvalidQuantity(item.product_quantity));
        }
        if self.address.zipcode.is_empty() {
            return Err(OrderError::MissingZipcode);
        }

        let expected = self.expected_total();
        if expected != self.total_price {
            return Err(OrderError::TotalMismatch {
                expected,
                actual: self.total_price,
            });
        }
        Ok(())
    }
}

// ============================================================================
// Aggregate Trait Implementation
// ============================================================================

impl Aggregate for Order {
    type Event = OrderEvent;
    type Command = OrderCommand;
    type Error = OrderError;

    fn aggregate_id(&self) -> Uuid {
        self.id
    }

    fn handle_command(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            OrderCommand::RecordPayment { payment_id, status } => {
                let mut events = Vec::new();

                if self.payment_id != Some(*payment_id) {
                    events.push(OrderEvent::PaymentRecorded {
                        payment_id: *payment_id,
                    });
                }

                // Only a pending order reacts to the decision; once it has left
                // PENDING a redelivered or late decision is absorbed.
                let target = status.and_then(|s| s.order_status());
                if let Some(target) = target {
                    if self.status == OrderStatus::Pending {
                        events.push(OrderEvent::StatusChanged {
                            from: self.status,
                            to: target,
                        });
                    }
                }

                Ok(events)
            }
            OrderCommand::ChangeStatus { target } => {
                if self.status == *target {
                    return Ok(Vec::new());
                }
                if !self.status.can_transition_to(*target) {
                    return Err(OrderError::InvalidTransition {
                        from: self.status,
                        to: *target,
                    });
                }
                Ok(vec![OrderEvent::StatusChanged {
                    from: self.status,
                    to: *target,
                }])
            }
        }
    }

    fn apply_event(&mut self, event: &Self::Event) {
        self.updated_at = Utc::now();

        match event {
            OrderEvent::PaymentRecorded { payment_id } => {
                self.payment_id = Some(*payment_id);
            }
            OrderEvent::StatusChanged { to, .. } => {
                self.status = *to;
            }
        }
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
