use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::OrderError;

// ============================================================================
// Order Value Objects
// ============================================================================

/// Lifecycle state of an order.
///
/// ```text
/// PENDING ──payment APPROVED──► PAYMENT_ACCEPTED ──admin──► ON_DELIVERY ──user──► DELIVERED
///    ├──────payment REJECTED──► REJECTED
///    └──────key TTL elapsed───► EXPIRED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    PaymentAccepted,
    OnDelivery,
    Rejected,
    Delivered,
    Expired,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::Pending,
        OrderStatus::PaymentAccepted,
        OrderStatus::OnDelivery,
        OrderStatus::Rejected,
        OrderStatus::Delivered,
        OrderStatus::Expired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::PaymentAccepted => "PAYMENT_ACCEPTED",
            OrderStatus::OnDelivery => "ON_DELIVERY",
            OrderStatus::Rejected => "REJECTED",
            OrderStatus::Delivered => "DELIVERED",
            OrderStatus::Expired => "EXPIRED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Rejected | OrderStatus::Expired)
    }

    /// The complete legality table. Anything not listed is rejected.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        matches!(
            (self, next),
            (OrderStatus::Pending, OrderStatus::PaymentAccepted)
                | (OrderStatus::Pending, OrderStatus::Rejected)
                | (OrderStatus::Pending, OrderStatus::Expired)
                | (OrderStatus::PaymentAccepted, OrderStatus::OnDelivery)
                | (OrderStatus::OnDelivery, OrderStatus::Delivered)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Payment decision reported by the payment service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Pending,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Approved => "APPROVED",
            PaymentStatus::Rejected => "REJECTED",
        }
    }

    /// Parse a status as sent on the bus; anything unrecognised is `None`.
    pub fn from_wire(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => Some(PaymentStatus::Pending),
            "APPROVED" => Some(PaymentStatus::Approved),
            "REJECTED" => Some(PaymentStatus::Rejected),
            _ => None,
        }
    }

    /// Order status a pending order moves to once this decision is known.
    pub fn order_status(&self) -> Option<OrderStatus> {
        match self {
            PaymentStatus::Approved => Some(OrderStatus::PaymentAccepted),
            PaymentStatus::Rejected => Some(OrderStatus::Rejected),
            PaymentStatus::Pending => None,
        }
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Money
// ============================================================================

/// Decimal places kept for every amount; the money columns are `NUMERIC(14, 2)`.
pub const MONEY_SCALE: u32 = 2;

/// Round an amount to the stored scale, halves away from zero as Postgres does.
pub fn to_money(amount: Decimal) -> Decimal {
    amount.round_dp_with_strategy(MONEY_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

// ============================================================================
// Unit Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use OrderStatus::*;

        let legal = [
            (Pending, PaymentAccepted),
            (Pending, Rejected),
            (Pending, Expired),
            (PaymentAccepted, OnDelivery),
            (OnDelivery, Delivered),
        ];

        for from in OrderStatus::ALL {
            for to in OrderStatus::ALL {
                assert_eq!(
                    from.can_transition_to(to),
                    legal.contains(&(from, to)),
                    "{} -> {}",
                    from,
                    to
                );
            }
        }
    }

    #[test]
    fn test_terminal_states_have_no_exit() {
        for from in OrderStatus::ALL.into_iter().filter(OrderStatus::is_terminal) {
            assert!(OrderStatus::ALL.iter().all(|to| !from.can_transition_to(*to)));
        }
    }

    #[test]
    fn test_nothing_re_enters_pending() {
        assert!(OrderStatus::ALL.iter().all(|from| !from.can_transition_to(OrderStatus::Pending)));
    }

    #[test]
    fn test_status_wire_format() {
        let json = serde_json::to_string(&OrderStatus::PaymentAccepted).unwrap();
        assert_eq!(json, "\"PAYMENT_ACCEPTED\"");

        let parsed: OrderStatus = serde_json::from_str("\"ON_DELIVERY\"").unwrap();
        assert_eq!(parsed, OrderStatus::OnDelivery);
    }

    #[test]
    fn test_status_from_str() {
        assert_eq!("delivered".parse::<OrderStatus>().unwrap(), OrderStatus::Delivered);
        assert_eq!(" EXPIRED ".parse::<OrderStatus>().unwrap(), OrderStatus::Expired);
        assert!(matches!(
            "SHIPPED".parse::<OrderStatus>(),
            Err(OrderError::UnknownStatus(_))
        ));
    }

    #[test]
    fn test_payment_status_mapping() {
        assert_eq!(PaymentStatus::from_wire("approved"), Some(PaymentStatus::Approved));
        assert_eq!(PaymentStatus::from_wire("REFUNDED"), None);
        assert_eq!(PaymentStatus::Approved.order_status(), Some(OrderStatus::PaymentAccepted));
        assert_eq!(PaymentStatus::Rejected.order_status(), Some(OrderStatus::Rejected));
        assert_eq!(PaymentStatus::Pending.order_status(), None);
    }

    #[test]
    fn test_money_rounds_half_away_from_zero() {
        assert_eq!(to_money(Decimal::new(12345, 3)), Decimal::new(1235, 2));
        assert_eq!(to_money(Decimal::new(-12345, 3)), Decimal::new(-1235, 2));
        assert_eq!(to_money(Decimal::new(12344, 3)), Decimal::new(1234, 2));
        assert_eq!(to_money(Decimal::new(350, 2)), Decimal::new(350, 2));
    }
}
